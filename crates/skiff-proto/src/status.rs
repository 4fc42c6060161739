//! The stable error taxonomy returned to callers.

use rkyv::{Archive, Deserialize, Serialize};

/// Status kinds for failed API calls.
///
/// This set is stable: drivers and collaborators fail in their own
/// vocabularies, and the gateway maps every failure onto exactly one of
/// these kinds at the API boundary. Discriminants are part of the wire
/// contract and must not be reused.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    /// The addressed building block has no component configured at all.
    NotConfigured = 1,
    /// The named component (or entity within it) does not exist.
    NotFound = 2,
    /// The request is malformed or violates a precondition checked before
    /// any side effect.
    InvalidArgument = 3,
    /// The component exists but does not advertise the required capability.
    NotSupported = 4,
    /// The component refused the operation (e.g. broker ACL).
    Forbidden = 5,
    /// An optimistic-concurrency precondition (etag) did not hold.
    ConditionFailed = 6,
    /// Payload or envelope serialisation failed.
    Serialization = 7,
    /// The driver failed in a way that has no more specific kind.
    Internal = 8,
    /// The failure was transient: the component or the gateway itself is
    /// temporarily unable to serve, and the caller may retry. This is the
    /// only kind with that contract.
    Unavailable = 9,
    /// The call's wall-clock budget was exhausted.
    DeadlineExceeded = 10,
    /// The caller cancelled the call.
    Cancelled = 11,
}

impl StatusCode {
    /// Returns the numeric value of this status code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Creates a status code from a numeric value.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::NotConfigured),
            2 => Some(Self::NotFound),
            3 => Some(Self::InvalidArgument),
            4 => Some(Self::NotSupported),
            5 => Some(Self::Forbidden),
            6 => Some(Self::ConditionFailed),
            7 => Some(Self::Serialization),
            8 => Some(Self::Internal),
            9 => Some(Self::Unavailable),
            10 => Some(Self::DeadlineExceeded),
            11 => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "not_configured"),
            Self::NotFound => write!(f, "not_found"),
            Self::InvalidArgument => write!(f, "invalid_argument"),
            Self::NotSupported => write!(f, "not_supported"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::ConditionFailed => write!(f, "condition_failed"),
            Self::Serialization => write!(f, "serialization"),
            Self::Internal => write!(f, "internal"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::DeadlineExceeded => write!(f, "deadline_exceeded"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The rich error payload returned with every failed call.
///
/// `error_code` is a stable machine-readable identifier (e.g.
/// `ERR_PUBSUB_NOT_FOUND`); `message` is templated on the component name,
/// the operation, and the upstream failure text.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiStatus {
    /// The taxonomy kind.
    pub kind: StatusCode,

    /// Stable machine-readable error code.
    pub error_code: String,

    /// Human-readable templated message.
    pub message: String,
}

impl ApiStatus {
    /// Creates a new status payload.
    #[must_use]
    pub fn new(kind: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.error_code, self.message)
    }
}

impl std::error::Error for ApiStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_roundtrip() {
        let codes = [
            StatusCode::NotConfigured,
            StatusCode::NotFound,
            StatusCode::InvalidArgument,
            StatusCode::NotSupported,
            StatusCode::Forbidden,
            StatusCode::ConditionFailed,
            StatusCode::Serialization,
            StatusCode::Internal,
            StatusCode::Unavailable,
            StatusCode::DeadlineExceeded,
            StatusCode::Cancelled,
        ];

        for code in codes {
            let value = code.as_u16();
            let restored = StatusCode::from_u16(value);
            assert_eq!(restored, Some(code));
        }

        assert_eq!(StatusCode::from_u16(0), None);
        assert_eq!(StatusCode::from_u16(999), None);
    }

    #[test]
    fn status_display() {
        let status = ApiStatus::new(
            StatusCode::ConditionFailed,
            "ERR_STATE_SAVE",
            "possible etag mismatch",
        );
        let rendered = status.to_string();
        assert!(rendered.contains("condition_failed"));
        assert!(rendered.contains("ERR_STATE_SAVE"));
    }
}
