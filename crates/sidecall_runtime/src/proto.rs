//! Hand-maintained protobuf messages for the sidecar's unary invoke call and
//! the `google.rpc` status details it attaches to failures.

use std::collections::HashMap;

pub const INVOKE_SERVICE_PATH: &str = "/dapr.proto.runtime.v1.Dapr/InvokeService";
pub const ERROR_INFO_TYPE_URL: &str = "type.googleapis.com/google.rpc.ErrorInfo";

#[derive(Clone, PartialEq, prost::Message)]
pub struct InvokeServiceRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(message, optional, tag = "3")]
    pub message: Option<InvokeRequest>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InvokeRequest {
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(message, optional, tag = "2")]
    pub data: Option<prost_types::Any>,
    #[prost(string, tag = "3")]
    pub content_type: String,
    #[prost(message, optional, tag = "4")]
    pub http_extension: Option<HttpExtension>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpExtension {
    #[prost(enumeration = "Verb", tag = "1")]
    pub verb: i32,
    #[prost(string, tag = "2")]
    pub querystring: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Verb {
    None = 0,
    Get = 1,
    Head = 2,
    Post = 3,
    Put = 4,
    Delete = 5,
    Connect = 6,
    Options = 7,
    Trace = 8,
    Patch = 9,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InvokeResponse {
    #[prost(message, optional, tag = "1")]
    pub data: Option<prost_types::Any>,
    #[prost(string, tag = "2")]
    pub content_type: String,
}

/// `google.rpc.Status`, carried in the `grpc-status-details-bin` trailer.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<prost_types::Any>,
}

/// `google.rpc.ErrorInfo`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorInfo {
    #[prost(string, tag = "1")]
    pub reason: String,
    #[prost(string, tag = "2")]
    pub domain: String,
    #[prost(map = "string, string", tag = "3")]
    pub metadata: HashMap<String, String>,
}
