use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code used when the sidecar reports a failure without a machine-readable code.
pub const UNKNOWN_CODE: &str = "UNKNOWN";
pub const UNAVAILABLE_CODE: &str = "UNAVAILABLE";
pub const INVALID_ARGUMENT_CODE: &str = "INVALID_ARGUMENT";
pub const TIMEOUT_CODE: &str = "TIMEOUT";
pub const SERIALIZATION_CODE: &str = "SERIALIZATION";

/// Normalized failure reported by the sidecar or the transport below it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub code: String,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl FailureRecord {
    /// Build a record; an empty code falls back to [`UNKNOWN_CODE`].
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            code: if code.is_empty() {
                UNKNOWN_CODE.to_owned()
            } else {
                code
            },
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// `"<code>: <message>"`. The separator stays even when `message` is empty.
    pub fn rendered(&self) -> String {
        format!("{}: {}", self.code, self.message)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidArgument,
    Unavailable,
    Timeout,
    RemoteFailure,
    Serialization,
}

#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InvokeError {
    #[error("INVALID_ARGUMENT: {0}")]
    InvalidArgument(String),
    #[error("{}", .0.rendered())]
    Unavailable(FailureRecord),
    #[error("Timeout on blocking read for {} NANOSECONDS", .waited.as_nanos())]
    Timeout { waited: Duration },
    #[error("{}", .0.rendered())]
    RemoteFailure(FailureRecord),
    #[error("SERIALIZATION: {0}")]
    Serialization(String),
}

impl InvokeError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(FailureRecord::new(UNAVAILABLE_CODE, message))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::RemoteFailure(_) => ErrorKind::RemoteFailure,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Stable machine-readable code. Branch on [`InvokeError::kind`] to tell a
    /// local timeout from a remote failure; codes alone may look alike.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidArgument(_) => INVALID_ARGUMENT_CODE,
            Self::Unavailable(record) | Self::RemoteFailure(record) => &record.code,
            Self::Timeout { .. } => TIMEOUT_CODE,
            Self::Serialization(_) => SERIALIZATION_CODE,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Failure record for sidecar- or transport-reported errors.
    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            Self::Unavailable(record) | Self::RemoteFailure(record) => Some(record),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_code_defaults_to_unknown_and_keeps_separator() {
        let record = FailureRecord::new("", "");
        assert_eq!(record.code, "UNKNOWN");
        assert_eq!(record.rendered(), "UNKNOWN: ");

        let err = InvokeError::RemoteFailure(record);
        assert_eq!(err.code(), "UNKNOWN");
        assert_eq!(err.message(), "UNKNOWN: ");
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
    }

    #[test]
    fn timeout_renders_requested_nanos() {
        let err = InvokeError::Timeout {
            waited: Duration::from_millis(10),
        };
        assert_eq!(
            err.message(),
            "Timeout on blocking read for 10000000 NANOSECONDS"
        );
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.failure().is_none());
    }

    #[test]
    fn unavailable_uses_transport_code() {
        let err = InvokeError::unavailable("connection refused");
        assert_eq!(err.code(), "UNAVAILABLE");
        assert_eq!(err.message(), "UNAVAILABLE: connection refused");
    }
}
