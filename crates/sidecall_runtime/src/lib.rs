pub mod client;
pub mod codec;
pub mod deferred;
pub mod envelope;
pub mod errors;
pub mod metrics;
pub mod normalize;
pub mod proto;
pub mod transport;

pub use client::{
    Client, ClientConfig, ClientError, DEFAULT_GRPC_PORT, DEFAULT_HTTP_PORT, DEFAULT_SIDECAR_HOST,
    GRPC_PORT_ENV, HTTP_PORT_ENV, PROTOCOL_ENV, SIDECAR_HOST_ENV,
};
pub use codec::{JsonCodec, PayloadCodec, ProtoCodec};
pub use deferred::{DeferredCall, InvocationResult, TypedCall};
pub use envelope::{
    build, Envelope, HttpEnvelope, HttpExtension, HttpVerb, InvocationRequest, Protocol,
    RequestBuilder, RpcEnvelope,
};
pub use errors::{ErrorKind, FailureRecord, InvokeError, UNKNOWN_CODE};
pub use metrics::InvocationMetricsSnapshot;
pub use normalize::{classify, normalize, RawFailure};
