use std::collections::HashMap;

use bytes::Bytes;
use prost::Message;
use serde_json::Value;
use tonic::Code;

use crate::errors::{FailureRecord, InvokeError, UNAVAILABLE_CODE, UNKNOWN_CODE};
use crate::proto::{ErrorInfo, RpcStatus, ERROR_INFO_TYPE_URL};

/// Failure exactly as the transport observed it, before normalization.
#[derive(Debug)]
pub enum RawFailure {
    /// Non-2xx response from the HTTP sidecar API.
    Http { status: u16, body: Bytes },
    /// Non-OK status from the gRPC sidecar API.
    Rpc(tonic::Status),
    /// Connection-level failure: refused, reset, channel never became ready.
    Transport(String),
}

/// Map a raw failure into the fixed record shape.
/// Allocation: message and detail clones. Complexity: O(body + details).
pub fn normalize(raw: &RawFailure) -> FailureRecord {
    match raw {
        RawFailure::Http { body, .. } => normalize_http_body(body),
        RawFailure::Rpc(status) => {
            let mut record = FailureRecord::new(grpc_code_name(status.code()), status.message());
            collect_status_details(status.details(), &mut record.details);
            record
        }
        RawFailure::Transport(message) => FailureRecord::new(UNAVAILABLE_CODE, message.clone()),
    }
}

/// Normalize and pick the client-visible error kind.
pub fn classify(raw: RawFailure) -> InvokeError {
    let record = normalize(&raw);
    match raw {
        RawFailure::Transport(_) => InvokeError::Unavailable(record),
        RawFailure::Rpc(status) if status.code() == Code::Unavailable => {
            InvokeError::Unavailable(record)
        }
        RawFailure::Rpc(_) | RawFailure::Http { .. } => InvokeError::RemoteFailure(record),
    }
}

/// Canonical upper-snake name of a gRPC status code.
pub fn grpc_code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}

fn normalize_http_body(body: &[u8]) -> FailureRecord {
    let trimmed = body.trim_ascii();
    if trimmed.is_empty() {
        return FailureRecord::new(UNKNOWN_CODE, "");
    }

    let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(trimmed) else {
        return FailureRecord::new(UNKNOWN_CODE, String::from_utf8_lossy(trimmed));
    };

    let code = object
        .get("errorCode")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut record = FailureRecord::new(code, message);

    if let Some(details) = object.get("details").and_then(Value::as_array) {
        for detail in details {
            collect_json_detail(detail, &mut record.details);
        }
    }
    record
}

fn collect_json_detail(detail: &Value, out: &mut HashMap<String, String>) {
    let Some(detail) = detail.as_object() else {
        return;
    };
    for (key, value) in detail {
        match value {
            Value::String(s) => {
                out.insert(key.clone(), s.clone());
            }
            Value::Object(metadata) if key == "metadata" => {
                for (meta_key, meta_value) in metadata {
                    if let Some(s) = meta_value.as_str() {
                        out.insert(meta_key.clone(), s.to_owned());
                    }
                }
            }
            _ => {}
        }
    }
}

fn collect_status_details(raw: &[u8], out: &mut HashMap<String, String>) {
    if raw.is_empty() {
        return;
    }
    let Ok(status) = RpcStatus::decode(raw) else {
        out.insert("statusDetails".to_owned(), hex::encode(raw));
        return;
    };

    for detail in status.details {
        if detail.type_url == ERROR_INFO_TYPE_URL {
            if let Ok(info) = ErrorInfo::decode(detail.value.as_slice()) {
                if !info.reason.is_empty() {
                    out.insert("reason".to_owned(), info.reason);
                }
                if !info.domain.is_empty() {
                    out.insert("domain".to_owned(), info.domain);
                }
                out.extend(info.metadata);
                continue;
            }
        }
        out.insert(detail.type_url, hex::encode(detail.value));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::errors::ErrorKind;

    fn http(status: u16, body: &'static [u8]) -> RawFailure {
        RawFailure::Http {
            status,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn http_without_body_is_unknown() {
        let err = classify(http(500, b""));
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
        assert_eq!(err.code(), "UNKNOWN");
        assert_eq!(err.message(), "UNKNOWN: ");
    }

    #[test]
    fn http_structured_body_keeps_code_verbatim() {
        let body = json!({
            "errorCode": "ERR_DIRECT_INVOKE",
            "message": "app not found",
            "details": [
                {
                    "@type": "type.googleapis.com/google.rpc.ErrorInfo",
                    "reason": "DAPR_DIRECT_INVOKE",
                    "metadata": {"appID": "orders"}
                },
                "ignored"
            ]
        })
        .to_string();
        let record = normalize(&RawFailure::Http {
            status: 500,
            body: Bytes::from(body),
        });

        assert_eq!(record.code, "ERR_DIRECT_INVOKE");
        assert_eq!(record.rendered(), "ERR_DIRECT_INVOKE: app not found");
        assert_eq!(record.details.get("reason").map(String::as_str), Some("DAPR_DIRECT_INVOKE"));
        assert_eq!(record.details.get("appID").map(String::as_str), Some("orders"));
    }

    #[test]
    fn http_empty_error_code_falls_back_to_unknown() {
        let record = normalize(&http(400, br#"{"errorCode":"","message":"bad"}"#));
        assert_eq!(record.rendered(), "UNKNOWN: bad");
    }

    #[test]
    fn http_plain_text_body_becomes_message() {
        let record = normalize(&http(502, b"upstream exploded\n"));
        assert_eq!(record.code, "UNKNOWN");
        assert_eq!(record.message, "upstream exploded");
    }

    #[test]
    fn rpc_unknown_without_message() {
        let err = classify(RawFailure::Rpc(tonic::Status::new(Code::Unknown, "")));
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
        assert_eq!(err.message(), "UNKNOWN: ");
    }

    #[test]
    fn rpc_unavailable_is_transport_failure() {
        let err = classify(RawFailure::Rpc(tonic::Status::unavailable("tcp connect error")));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(err.message(), "UNAVAILABLE: tcp connect error");
    }

    #[test]
    fn rpc_status_details_become_entries() {
        let info = ErrorInfo {
            reason: "DAPR_APP_FAILED".to_owned(),
            domain: "dapr.io".to_owned(),
            metadata: HashMap::from([("appID".to_owned(), "orders".to_owned())]),
        };
        let status = RpcStatus {
            code: Code::NotFound as i32,
            message: "missing".to_owned(),
            details: vec![
                prost_types::Any {
                    type_url: ERROR_INFO_TYPE_URL.to_owned(),
                    value: info.encode_to_vec(),
                },
                prost_types::Any {
                    type_url: "type.example/Opaque".to_owned(),
                    value: vec![0xab, 0xcd],
                },
            ],
        };
        let raw = tonic::Status::with_details(
            Code::NotFound,
            "missing",
            Bytes::from(status.encode_to_vec()),
        );

        let record = normalize(&RawFailure::Rpc(raw));
        assert_eq!(record.code, "NOT_FOUND");
        assert_eq!(record.message, "missing");
        let expected = HashMap::from([
            ("reason".to_owned(), "DAPR_APP_FAILED".to_owned()),
            ("domain".to_owned(), "dapr.io".to_owned()),
            ("appID".to_owned(), "orders".to_owned()),
            ("type.example/Opaque".to_owned(), "abcd".to_owned()),
        ]);
        assert_eq!(record.details, expected);
    }

    #[test]
    fn transport_failure_is_unavailable() {
        let err = classify(RawFailure::Transport("connection refused".to_owned()));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(err.code(), "UNAVAILABLE");
    }
}
