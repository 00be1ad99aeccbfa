use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::runtime::Handle;

use crate::codec::PayloadCodec;
use crate::deferred::{DeferredCall, InvocationResult, TypedCall};
use crate::envelope::{HttpExtension, InvocationRequest, Protocol, RequestBuilder};
use crate::errors::InvokeError;
use crate::metrics::{InvocationMetrics, InvocationMetricsSnapshot};
use crate::transport::Dispatcher;

mod config;

pub use config::{
    ClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_GRPC_PORT, DEFAULT_HTTP_PORT,
    DEFAULT_SIDECAR_HOST, GRPC_PORT_ENV, HTTP_PORT_ENV, PROTOCOL_ENV, SIDECAR_HOST_ENV,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("no tokio runtime in scope; use Client::with_handle")]
    NoRuntime,
    #[error("failed to build http client: {0}")]
    HttpClient(String),
    #[error("failed to build runtime: {0}")]
    Runtime(String),
}

/// Invokes methods on other services through the local sidecar.
///
/// Cheap to clone; clones share the transport and metrics.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    dispatcher: Dispatcher,
    metrics: Arc<InvocationMetrics>,
}

impl Client {
    /// Build a client on the current tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let handle = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        Self::with_handle(config, handle)
    }

    /// Build a client from `DAPR_*` environment variables on the current runtime.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Build a client whose dispatch tasks run on `handle`.
    pub fn with_handle(config: ClientConfig, handle: Handle) -> Result<Self, ClientError> {
        config.validate()?;
        let metrics = Arc::new(InvocationMetrics::new());
        let dispatcher = Dispatcher::new(&config, handle, Arc::clone(&metrics))?;
        tracing::debug!(
            http = %config.http_base_url(),
            grpc = %config.grpc_endpoint_uri(),
            protocol = %config.protocol,
            "sidecar client ready"
        );
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                dispatcher,
                metrics,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn metrics_snapshot(&self) -> InvocationMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Request builder preset with this client's default protocol.
    pub fn request(&self, service_id: impl Into<String>, method: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(service_id, method).protocol(self.inner.config.protocol)
    }

    /// Send a built request without waiting for it.
    pub fn dispatch(&self, request: InvocationRequest) -> DeferredCall {
        self.inner.dispatcher.dispatch(request)
    }

    /// Send a built request and wait, optionally bounded by `timeout`.
    pub async fn invoke(
        &self,
        request: InvocationRequest,
        timeout: Option<Duration>,
    ) -> InvocationResult {
        self.dispatch(request).wait(timeout).await
    }

    /// Raw-bytes invocation using the default protocol.
    /// Invalid identifiers fail here, before anything is sent.
    pub fn invoke_method(
        &self,
        service_id: &str,
        method: &str,
        payload: impl Into<Bytes>,
        extension: HttpExtension,
    ) -> Result<DeferredCall, InvokeError> {
        self.invoke_method_with_protocol(
            service_id,
            method,
            payload,
            self.inner.config.protocol,
            extension,
        )
    }

    pub fn invoke_method_with_protocol(
        &self,
        service_id: &str,
        method: &str,
        payload: impl Into<Bytes>,
        protocol: Protocol,
        extension: HttpExtension,
    ) -> Result<DeferredCall, InvokeError> {
        let request = RequestBuilder::new(service_id, method)
            .payload(payload)
            .protocol(protocol)
            .extension(extension)
            .build()?;
        Ok(self.dispatch(request))
    }

    /// Build, dispatch and wait in one step.
    pub async fn invoke_method_and_wait(
        &self,
        service_id: &str,
        method: &str,
        payload: impl Into<Bytes>,
        protocol: Protocol,
        extension: HttpExtension,
        timeout: Option<Duration>,
    ) -> InvocationResult {
        self.invoke_method_with_protocol(service_id, method, payload, protocol, extension)?
            .wait(timeout)
            .await
    }

    /// Typed invocation: `request` is encoded with codec `C` and the response
    /// decoded into `Resp` when the call is awaited.
    pub fn invoke_method_typed<C, Req, Resp>(
        &self,
        service_id: &str,
        method: &str,
        request: &Req,
        extension: HttpExtension,
    ) -> Result<TypedCall<Resp, C>, InvokeError>
    where
        C: PayloadCodec<Req> + PayloadCodec<Resp>,
    {
        let payload = <C as PayloadCodec<Req>>::encode(request)?;
        let request = self
            .request(service_id, method)
            .payload(payload)
            .extension(extension)
            .content_type(<C as PayloadCodec<Req>>::CONTENT_TYPE)
            .build()?;
        Ok(TypedCall::new(self.dispatch(request)))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
