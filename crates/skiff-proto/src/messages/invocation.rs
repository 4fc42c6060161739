//! Service invocation and output binding request types.

use rkyv::{Archive, Deserialize, Serialize};

use crate::Metadata;

/// The message carried by a legacy direct invocation.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InvokeRequest {
    /// Method (or route) to invoke on the target application.
    pub method: String,

    /// Request payload bytes.
    pub data: Vec<u8>,

    /// Content type of `data`.
    pub content_type: String,

    /// HTTP verb hint for targets reached over an HTTP channel.
    pub http_verb: String,
}

/// Invokes a method on another application through the sidecar mesh.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InvokeServiceRequest {
    /// Target application id.
    pub id: String,

    /// The invocation message.
    pub message: InvokeRequest,
}

/// Result of a direct invocation.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InvokeServiceResponse {
    /// Response payload bytes.
    pub data: Vec<u8>,

    /// Content type of `data`.
    pub content_type: String,
}

/// Invokes an operation on an output binding.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InvokeBindingRequest {
    /// Logical name of the binding component.
    pub name: String,

    /// Request payload bytes.
    pub data: Vec<u8>,

    /// Binding operation (e.g. `create`, `get`).
    pub operation: String,

    /// Request metadata; reserved transport headers are remapped before the
    /// driver sees them.
    pub metadata: Metadata,
}

/// Result of an output binding invocation.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InvokeBindingResponse {
    /// Response payload bytes.
    pub data: Vec<u8>,

    /// Driver response metadata; also copied into caller response headers
    /// under the `metadata.` prefix.
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_request_defaults() {
        let req = InvokeBindingRequest {
            name: "queue".into(),
            operation: "create".into(),
            ..Default::default()
        };
        assert!(req.data.is_empty());
        assert!(req.metadata.is_empty());
    }
}
