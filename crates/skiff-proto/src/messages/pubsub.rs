//! Publish/subscribe messaging request types.

use rkyv::{Archive, Deserialize, Serialize};

use crate::Metadata;

/// Publishes a single event to a topic.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PublishEventRequest {
    /// Logical name of the pubsub component.
    pub pubsub_name: String,

    /// Destination topic.
    pub topic: String,

    /// User payload bytes.
    pub data: Vec<u8>,

    /// Content type of `data`; defaults to `text/plain` when empty.
    pub data_content_type: String,

    /// Request metadata, forwarded to the broker and consulted for the
    /// raw-payload flag.
    pub metadata: Metadata,
}

/// One entry of a bulk publish.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BulkPublishEntry {
    /// Caller-assigned id, unique within the batch.
    pub entry_id: String,

    /// User payload bytes.
    pub event: Vec<u8>,

    /// Content type of `event`.
    pub content_type: String,

    /// Entry-level metadata; keys override request-level metadata.
    pub metadata: Metadata,
}

/// Publishes a batch of events to a single topic.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BulkPublishRequest {
    /// Logical name of the pubsub component.
    pub pubsub_name: String,

    /// Destination topic.
    pub topic: String,

    /// Entries to publish.
    pub entries: Vec<BulkPublishEntry>,

    /// Request-level metadata.
    pub metadata: Metadata,
}

/// One failed entry of a bulk publish.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BulkPublishFailedEntry {
    /// The entry id that failed.
    pub entry_id: String,

    /// Broker-reported failure text.
    pub error: String,
}

/// Result of a bulk publish.
///
/// A partial broker failure is still a successful call: the failed entries
/// are listed here and the remaining entries were published.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BulkPublishResponse {
    /// Entries the broker rejected.
    pub failed_entries: Vec<BulkPublishFailedEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_response_default_has_no_failures() {
        let res = BulkPublishResponse::default();
        assert!(res.failed_entries.is_empty());
    }

    #[test]
    fn entry_metadata_is_independent() {
        let mut entry = BulkPublishEntry {
            entry_id: "a".into(),
            event: b"{}".to_vec(),
            content_type: "application/json".into(),
            metadata: Metadata::new(),
        };
        entry.metadata.insert("ttlInSeconds".into(), "60".into());
        assert_eq!(entry.metadata.len(), 1);
    }
}
