use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

use crate::client::ClientError;
use crate::deferred::InvocationResult;
use crate::envelope::RpcEnvelope;
use crate::normalize::{classify, RawFailure};
use crate::proto::{InvokeResponse, InvokeServiceRequest, INVOKE_SERVICE_PATH};

use super::error_chain;

/// Lazily connected channel shared by all RPC-style calls.
/// HTTP/2 multiplexes calls over it, so a slow call never holds it exclusively.
pub(super) struct GrpcChannel {
    endpoint: Endpoint,
    channel: ArcSwapOption<Channel>,
}

impl GrpcChannel {
    pub(super) fn new(uri: &str, connect_timeout: Duration) -> Result<Self, ClientError> {
        let endpoint = Endpoint::from_shared(uri.to_owned())
            .map_err(|err| ClientError::InvalidConfig(format!("invalid sidecar grpc uri: {err}")))?
            .connect_timeout(connect_timeout);
        Ok(Self {
            endpoint,
            channel: ArcSwapOption::empty(),
        })
    }

    /// Must run inside the runtime: the first call spawns the connection task.
    fn acquire(&self) -> Channel {
        if let Some(channel) = self.channel.load_full() {
            return (*channel).clone();
        }
        let fresh = Arc::new(self.endpoint.connect_lazy());
        self.channel
            .rcu(|current| current.clone().or_else(|| Some(Arc::clone(&fresh))));
        match self.channel.load_full() {
            Some(channel) => (*channel).clone(),
            None => (*fresh).clone(),
        }
    }
}

/// Unary `InvokeService` call; service and method also travel as call metadata.
pub(super) async fn send(channel: &GrpcChannel, envelope: RpcEnvelope) -> InvocationResult {
    let (metadata, message) = envelope.into_parts();
    let mut grpc = Grpc::new(channel.acquire());
    grpc.ready().await.map_err(|err| {
        classify(RawFailure::Transport(format!(
            "sidecar channel not ready: {}",
            error_chain(&err)
        )))
    })?;

    let mut request = tonic::Request::new(message);
    *request.metadata_mut() = metadata;
    let codec: ProstCodec<InvokeServiceRequest, InvokeResponse> = ProstCodec::default();
    let response = grpc
        .unary(request, PathAndQuery::from_static(INVOKE_SERVICE_PATH), codec)
        .await
        .map_err(|status| classify(RawFailure::Rpc(status)))?;

    Ok(response
        .into_inner()
        .data
        .map(|any| Bytes::from(any.value))
        .unwrap_or_default())
}
