//! Public facade for the sidecall workspace.
//! Default path: use [`Client`] from async code and [`BlockingClient`] elsewhere.
//! Use `sidecall::runtime` for envelopes, transport and normalization internals.

mod blocking;

pub use blocking::BlockingClient;
pub use sidecall_runtime::{
    build, Client, ClientConfig, ClientError, DeferredCall, ErrorKind, FailureRecord,
    HttpExtension, HttpVerb, InvocationMetricsSnapshot, InvocationRequest, InvocationResult,
    InvokeError, JsonCodec, PayloadCodec, ProtoCodec, Protocol, RequestBuilder, TypedCall,
    UNKNOWN_CODE,
};

pub use sidecall_runtime as runtime;
