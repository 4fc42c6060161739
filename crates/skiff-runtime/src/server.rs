//! Framed connection serving.
//!
//! Serves the typed API over any byte stream: frames are decoded with the
//! proto codec, dispatched to the gateway under the frame's deadline, and
//! answered under a per-connection write mutex (the consumer transport does
//! not permit concurrent sends). A configuration subscription turns into a
//! stream of frames on the same connection: the `Response` frame carries
//! the subscription id, every later `Stream` frame carries changed items.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use skiff_proto::codec::{Codec, CodecError, FrameHeader, FrameType, FRAME_HEADER_SIZE};
use skiff_proto::messages::configuration::SubscribeConfigurationResponse;
use skiff_proto::{ApiRequest, ApiResponse, ApiResult, Frame, FrameMeta};

use crate::context::CallContext;
use crate::errors::ApiError;
use crate::gateway::Gateway;

/// Capacity of the per-subscription frame channel feeding the writer.
const STREAM_CHANNEL_CAPACITY: usize = 16;

/// Serves one connection until the peer disconnects, a protocol error
/// occurs, or the gateway closes.
pub async fn serve_connection<S>(gateway: Gateway, stream: S) -> Result<(), CodecError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let writer = Arc::new(Mutex::new(writer));
    let close = gateway.close_token();

    loop {
        let Some(frame) = read_frame(&mut reader, &close).await? else {
            return Ok(());
        };

        handle_frame(&gateway, &writer, frame).await?;
    }
}

async fn read_frame<S>(
    reader: &mut ReadHalf<S>,
    close: &tokio_util::sync::CancellationToken,
) -> Result<Option<Frame<ApiRequest>>, CodecError>
where
    S: AsyncRead + AsyncWrite,
{
    let mut header_buf = [0u8; FRAME_HEADER_SIZE];
    tokio::select! {
        () = close.cancelled() => return Ok(None),
        read = reader.read_exact(&mut header_buf) => {
            if read.is_err() {
                // Peer disconnected between requests.
                return Ok(None);
            }
        }
    }

    let header = FrameHeader::decode(&header_buf)?;
    if !header.is_version_supported() {
        return Err(CodecError::UnsupportedVersion(header.version));
    }
    header.validate_payload_len()?;

    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Codec::decode(&payload)?))
}

async fn handle_frame<S>(
    gateway: &Gateway,
    writer: &Arc<Mutex<WriteHalf<S>>>,
    frame: Frame<ApiRequest>,
) -> Result<(), CodecError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let meta = frame.meta.clone();
    let operation = frame.body.operation();

    if meta.is_expired() {
        let status = ApiError::deadline_exceeded().status();
        return write_result(writer, &meta, ApiResult::Err(status), None).await;
    }

    let ctx = match CallContext::from_frame_meta(&meta) {
        Ok(ctx) => ctx.with_cancel(gateway.close_token().child_token()),
        Err(err) => {
            debug!(operation, error = %err, "rejected malformed request metadata");
            return write_result(writer, &meta, ApiResult::Err(err.status()), None).await;
        }
    };

    match frame.body {
        ApiRequest::SubscribeConfiguration(req) => {
            let (tx, rx) = mpsc::channel::<SubscribeConfigurationResponse>(STREAM_CHANNEL_CAPACITY);
            let forward = tokio::spawn(forward_stream(writer.clone(), meta.clone(), rx));

            let result = gateway.subscribe_configuration(&ctx, req, tx).await;
            let _ = forward.await;

            if let Err(err) = result {
                debug!(operation, error = %err, "subscription failed");
                write_result(writer, &meta, ApiResult::Err(err.status()), None).await?;
            }
            Ok(())
        }
        body => {
            let dispatch = dispatch(gateway, &ctx, body);
            let result = match ctx.deadline() {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline.into(), dispatch).await {
                        Ok(result) => result,
                        Err(_) => ApiResult::Err(ApiError::deadline_exceeded().status()),
                    }
                }
                None => dispatch.await,
            };

            let response_metadata = ctx.take_response_metadata();
            write_result(writer, &meta, result, Some(response_metadata)).await
        }
    }
}

/// Forwards subscription frames to the connection under the write mutex.
///
/// The id frame goes out as `Response`, every later frame as `Stream`. A
/// failed write means the consumer is gone; dropping the receiver sends
/// the owning subscription through its draining path.
async fn forward_stream<S>(
    writer: Arc<Mutex<WriteHalf<S>>>,
    request_meta: FrameMeta,
    mut rx: mpsc::Receiver<SubscribeConfigurationResponse>,
) where
    S: AsyncRead + AsyncWrite,
{
    let mut codec = Codec::new();
    let mut first = true;

    while let Some(event) = rx.recv().await {
        let frame_type = if first {
            FrameType::Response
        } else {
            FrameType::Stream
        };
        first = false;

        let frame = Frame::response_to(
            &request_meta,
            ApiResult::Ok(ApiResponse::ConfigurationEvent(event)),
        );
        let encoded = match codec.encode(&frame, frame_type) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(error = %err, "failed encoding subscription frame");
                return;
            }
        };

        let mut guard = writer.lock().await;
        if guard.write_all(encoded).await.is_err() || guard.flush().await.is_err() {
            return;
        }
    }
}

async fn write_result<S>(
    writer: &Arc<Mutex<WriteHalf<S>>>,
    request_meta: &FrameMeta,
    result: ApiResult,
    response_metadata: Option<skiff_proto::Metadata>,
) -> Result<(), CodecError>
where
    S: AsyncRead + AsyncWrite,
{
    let mut frame = Frame::response_to(request_meta, result);
    if let Some(metadata) = response_metadata {
        frame.meta.metadata = metadata;
    }

    let mut codec = Codec::new();
    let encoded = codec.encode(&frame, FrameType::Response)?;

    let mut guard = writer.lock().await;
    guard.write_all(encoded).await?;
    guard.flush().await?;
    Ok(())
}

async fn dispatch(gateway: &Gateway, ctx: &CallContext, body: ApiRequest) -> ApiResult {
    let operation = body.operation();
    let result = match body {
        ApiRequest::PublishEvent(req) => gateway
            .publish_event(ctx, req)
            .await
            .map(|()| ApiResponse::Empty),
        ApiRequest::BulkPublishEvent(req) => gateway
            .bulk_publish_event(ctx, req)
            .await
            .map(ApiResponse::BulkPublish),
        ApiRequest::InvokeBinding(req) => gateway
            .invoke_binding(ctx, req)
            .await
            .map(ApiResponse::BindingInvoked),
        ApiRequest::GetState(req) => gateway.get_state(ctx, req).await.map(ApiResponse::State),
        ApiRequest::GetBulkState(req) => gateway
            .get_bulk_state(ctx, req)
            .await
            .map(ApiResponse::BulkState),
        ApiRequest::SaveState(req) => gateway
            .save_state(ctx, req)
            .await
            .map(|()| ApiResponse::Empty),
        ApiRequest::DeleteState(req) => gateway
            .delete_state(ctx, req)
            .await
            .map(|()| ApiResponse::Empty),
        ApiRequest::DeleteBulkState(req) => gateway
            .delete_bulk_state(ctx, req)
            .await
            .map(|()| ApiResponse::Empty),
        ApiRequest::ExecuteStateTransaction(req) => gateway
            .execute_state_transaction(ctx, req)
            .await
            .map(|()| ApiResponse::Empty),
        ApiRequest::GetActorState(req) => gateway
            .get_actor_state(ctx, req)
            .await
            .map(ApiResponse::ActorState),
        ApiRequest::ExecuteActorStateTransaction(req) => gateway
            .execute_actor_state_transaction(ctx, req)
            .await
            .map(|()| ApiResponse::Empty),
        ApiRequest::InvokeActor(req) => gateway
            .invoke_actor(ctx, req)
            .await
            .map(ApiResponse::ActorInvoked),
        ApiRequest::GetConfiguration(req) => gateway
            .get_configuration(ctx, req)
            .await
            .map(ApiResponse::Configuration),
        ApiRequest::SubscribeConfiguration(_) => Err(ApiError::new(
            skiff_proto::StatusCode::InvalidArgument,
            "ERR_SUBSCRIBE_UNARY",
            "subscribe_configuration requires the streaming path",
        )),
        ApiRequest::UnsubscribeConfiguration(req) => gateway
            .unsubscribe_configuration(ctx, req)
            .await
            .map(ApiResponse::Unsubscribed),
        ApiRequest::GetSecret(req) => gateway.get_secret(ctx, req).await.map(ApiResponse::Secret),
        ApiRequest::GetBulkSecret(req) => gateway
            .get_bulk_secret(ctx, req)
            .await
            .map(ApiResponse::BulkSecret),
        ApiRequest::InvokeService(req) => gateway
            .invoke_service(ctx, req)
            .await
            .map(ApiResponse::ServiceInvoked),
    };

    match result {
        Ok(response) => ApiResult::Ok(response),
        Err(err) => {
            debug!(operation, error = %err, "request failed");
            ApiResult::Err(err.status())
        }
    }
}
