use bytes::Bytes;
use reqwest::Url;

use crate::deferred::InvocationResult;
use crate::envelope::HttpEnvelope;
use crate::normalize::{classify, RawFailure};

use super::error_chain;

/// One request/response exchange with the sidecar's HTTP invoke API.
/// Status and body of a non-2xx reply are handed to the normalizer verbatim.
pub(super) async fn send(
    client: &reqwest::Client,
    base: &Url,
    payload: Bytes,
    envelope: HttpEnvelope,
) -> InvocationResult {
    let url = envelope.url(base)?;
    let response = client
        .request(envelope.verb().clone(), url)
        .headers(envelope.headers().clone())
        .body(payload)
        .send()
        .await
        .map_err(|err| classify(RawFailure::Transport(error_chain(&err))))?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| classify(RawFailure::Transport(error_chain(&err))))?;

    if status.is_success() {
        return Ok(body);
    }
    tracing::debug!(
        status = status.as_u16(),
        body_len = body.len(),
        "sidecar returned error status"
    );
    Err(classify(RawFailure::Http {
        status: status.as_u16(),
        body,
    }))
}
