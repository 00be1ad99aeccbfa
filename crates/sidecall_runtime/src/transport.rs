use std::sync::Arc;

use reqwest::Url;
use tokio::runtime::Handle;
use tracing::Instrument;

use crate::client::{ClientConfig, ClientError};
use crate::deferred::{deferred_pair, DeferredCall, InvocationResult};
use crate::envelope::{Envelope, InvocationRequest};
use crate::errors::ErrorKind;
use crate::metrics::InvocationMetrics;

mod grpc;
mod http;

use grpc::GrpcChannel;

/// Sends built requests to the local sidecar. Each dispatch runs as its own
/// task on the configured runtime; calls share no mutable state beyond the
/// lazily created gRPC channel, which is acquired without locking.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    http: reqwest::Client,
    http_base: Url,
    grpc: GrpcChannel,
    handle: Handle,
    metrics: Arc<InvocationMetrics>,
}

impl Dispatcher {
    pub(crate) fn new(
        config: &ClientConfig,
        handle: Handle,
        metrics: Arc<InvocationMetrics>,
    ) -> Result<Self, ClientError> {
        let http_base = Url::parse(&config.http_base_url()).map_err(|err| {
            ClientError::InvalidConfig(format!("invalid sidecar http url: {err}"))
        })?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| ClientError::HttpClient(err.to_string()))?;
        let grpc = GrpcChannel::new(&config.grpc_endpoint_uri(), config.connect_timeout)?;

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                http,
                http_base,
                grpc,
                handle,
                metrics,
            }),
        })
    }

    /// Start the call and return immediately. No retries are attempted; the
    /// transport runs to completion even if the waiter times out.
    pub fn dispatch(&self, request: InvocationRequest) -> DeferredCall {
        let (call, resolver) = deferred_pair(Arc::clone(&self.inner.metrics));
        let span = tracing::debug_span!(
            "invoke",
            call_id = %call.id(),
            service_id = request.service_id(),
            method = request.method(),
            protocol = %request.protocol(),
        );
        let inner = Arc::clone(&self.inner);

        tracing::debug!(parent: &span, payload_len = request.payload().len(), "dispatching invocation");
        self.inner.handle.spawn(
            async move {
                let outcome = send(&inner, request).await;
                match &outcome {
                    Ok(payload) => {
                        tracing::debug!(payload_len = payload.len(), "invocation succeeded");
                    }
                    Err(err) if err.kind() == ErrorKind::Unavailable => {
                        tracing::warn!(error = %err, "sidecar unavailable");
                    }
                    Err(err) => {
                        tracing::debug!(code = err.code(), error = %err, "invocation failed");
                    }
                }
                resolver.resolve(outcome);
            }
            .instrument(span),
        );
        call
    }
}

async fn send(inner: &DispatcherInner, request: InvocationRequest) -> InvocationResult {
    let (payload, envelope) = request.into_parts();
    match envelope {
        Envelope::Http(envelope) => {
            http::send(&inner.http, &inner.http_base, payload, envelope).await
        }
        Envelope::Rpc(envelope) => grpc::send(&inner.grpc, envelope).await,
    }
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !rendered.contains(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}
