use std::time::Duration;

use bytes::Bytes;
use sidecall_runtime::{
    Client, ClientConfig, ClientError, DeferredCall, HttpExtension, InvocationMetricsSnapshot,
    InvocationRequest, InvocationResult, InvokeError, PayloadCodec, Protocol, TypedCall,
};
use tokio::runtime::{Builder, Runtime};

const IO_THREADS: usize = 2;

/// Synchronous client for callers without a tokio runtime.
///
/// Owns a small multi-thread runtime that drives dispatch; the calling thread
/// only ever parks in [`DeferredCall::block`]. Do not use it from inside an
/// async context: blocking there stalls the executor.
pub struct BlockingClient {
    client: Client,
    runtime: Option<Runtime>,
}

impl BlockingClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(IO_THREADS)
            .thread_name("sidecall-io")
            .enable_all()
            .build()
            .map_err(|err| ClientError::Runtime(err.to_string()))?;
        let client = Client::with_handle(config, runtime.handle().clone())?;
        Ok(Self {
            client,
            runtime: Some(runtime),
        })
    }

    /// Build from `DAPR_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Async client sharing this client's transport and metrics.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &ClientConfig {
        self.client.config()
    }

    pub fn metrics_snapshot(&self) -> InvocationMetricsSnapshot {
        self.client.metrics_snapshot()
    }

    pub fn invoke_method(
        &self,
        service_id: &str,
        method: &str,
        payload: impl Into<Bytes>,
        extension: HttpExtension,
    ) -> Result<DeferredCall, InvokeError> {
        self.client
            .invoke_method(service_id, method, payload, extension)
    }

    pub fn invoke_method_with_protocol(
        &self,
        service_id: &str,
        method: &str,
        payload: impl Into<Bytes>,
        protocol: Protocol,
        extension: HttpExtension,
    ) -> Result<DeferredCall, InvokeError> {
        self.client
            .invoke_method_with_protocol(service_id, method, payload, protocol, extension)
    }

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
        self.client
            .invoke_method_typed::<C, Req, Resp>(service_id, method, request, extension)
    }

    /// Dispatch a built request and block, optionally bounded by `timeout`.
    pub fn invoke(&self, request: InvocationRequest, timeout: Option<Duration>) -> InvocationResult {
        self.client.dispatch(request).block(timeout)
    }
}

impl Drop for BlockingClient {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            tracing::debug!("shutting down blocking client runtime");
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
