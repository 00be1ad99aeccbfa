use std::fmt;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};

use crate::errors::InvokeError;
use crate::proto;

pub const APP_ID_METADATA_KEY: &str = "dapr-app-id";
pub const METHOD_METADATA_KEY: &str = "dapr-method";
const INVOKE_API_PREFIX: [&str; 2] = ["v1.0", "invoke"];

/// Wire protocol used to reach the local sidecar.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Protocol {
    #[default]
    Http,
    Rpc,
}

impl Protocol {
    /// Accepts `http`, `grpc` and `rpc`, case-insensitive.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "grpc" | "rpc" => Some(Self::Rpc),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Rpc => f.write_str("grpc"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HttpVerb {
    #[default]
    None,
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl HttpVerb {
    /// HTTP method sent to the sidecar. `None` goes out as `POST`.
    pub fn http_method(self) -> Method {
        match self {
            Self::None | Self::Post => Method::POST,
            Self::Get => Method::GET,
            Self::Head => Method::HEAD,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
            Self::Connect => Method::CONNECT,
            Self::Options => Method::OPTIONS,
            Self::Trace => Method::TRACE,
            Self::Patch => Method::PATCH,
        }
    }

    fn proto(self) -> proto::Verb {
        match self {
            Self::None => proto::Verb::None,
            Self::Get => proto::Verb::Get,
            Self::Head => proto::Verb::Head,
            Self::Post => proto::Verb::Post,
            Self::Put => proto::Verb::Put,
            Self::Delete => proto::Verb::Delete,
            Self::Connect => proto::Verb::Connect,
            Self::Options => proto::Verb::Options,
            Self::Trace => proto::Verb::Trace,
            Self::Patch => proto::Verb::Patch,
        }
    }
}

/// HTTP verb, query string and headers attached to an invocation.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpExtension {
    pub verb: HttpVerb,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpExtension {
    pub const NONE: Self = Self::new(HttpVerb::None);
    pub const GET: Self = Self::new(HttpVerb::Get);
    pub const HEAD: Self = Self::new(HttpVerb::Head);
    pub const POST: Self = Self::new(HttpVerb::Post);
    pub const PUT: Self = Self::new(HttpVerb::Put);
    pub const DELETE: Self = Self::new(HttpVerb::Delete);
    pub const CONNECT: Self = Self::new(HttpVerb::Connect);
    pub const OPTIONS: Self = Self::new(HttpVerb::Options);
    pub const TRACE: Self = Self::new(HttpVerb::Trace);
    pub const PATCH: Self = Self::new(HttpVerb::Patch);

    pub const fn new(verb: HttpVerb) -> Self {
        Self {
            verb,
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Url-encoded `k=v&k2=v2` rendering of [`HttpExtension::query`].
    pub fn querystring(&self) -> Result<String, InvokeError> {
        if self.query.is_empty() {
            return Ok(String::new());
        }
        let url = Url::parse_with_params("http://localhost/", &self.query)
            .map_err(|err| InvokeError::invalid_argument(format!("invalid query: {err}")))?;
        Ok(url.query().unwrap_or_default().to_owned())
    }
}

/// Fully formed invocation. Fields are fixed once built; dispatch consumes it.
#[derive(Clone, Debug)]
pub struct InvocationRequest {
    service_id: String,
    method: String,
    payload: Bytes,
    content_type: Option<String>,
    envelope: Envelope,
}

impl InvocationRequest {
    pub fn builder(service_id: impl Into<String>, method: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(service_id, method)
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn protocol(&self) -> Protocol {
        match self.envelope {
            Envelope::Http(_) => Protocol::Http,
            Envelope::Rpc(_) => Protocol::Rpc,
        }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub(crate) fn into_parts(self) -> (Bytes, Envelope) {
        (self.payload, self.envelope)
    }
}

/// Protocol-specific form of a request, chosen when the request is built.
#[derive(Clone, Debug)]
pub enum Envelope {
    Http(HttpEnvelope),
    Rpc(RpcEnvelope),
}

#[derive(Clone, Debug)]
pub struct HttpEnvelope {
    verb: Method,
    path_segments: Vec<String>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
}

impl HttpEnvelope {
    pub fn verb(&self) -> &Method {
        &self.verb
    }

    pub fn path_segments(&self) -> &[String] {
        &self.path_segments
    }

    /// Unencoded path, for logs.
    pub fn path(&self) -> String {
        format!("/{}", self.path_segments.join("/"))
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Join this envelope onto the sidecar base url; each segment is percent-encoded.
    pub fn url(&self, base: &Url) -> Result<Url, InvokeError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                InvokeError::invalid_argument(format!("sidecar url cannot be a base: {base}"))
            })?
            .clear()
            .extend(self.path_segments.iter());
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

#[derive(Clone, Debug)]
pub struct RpcEnvelope {
    metadata: MetadataMap,
    message: proto::InvokeServiceRequest,
}

impl RpcEnvelope {
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn message(&self) -> &proto::InvokeServiceRequest {
        &self.message
    }

    pub(crate) fn into_parts(self) -> (MetadataMap, proto::InvokeServiceRequest) {
        (self.metadata, self.message)
    }
}

#[derive(Clone, Debug)]
pub struct RequestBuilder {
    service_id: String,
    method: String,
    payload: Bytes,
    protocol: Protocol,
    extension: HttpExtension,
    content_type: Option<String>,
}

impl RequestBuilder {
    pub fn new(service_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            method: method.into(),
            payload: Bytes::new(),
            protocol: Protocol::default(),
            extension: HttpExtension::NONE,
            content_type: None,
        }
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn extension(mut self, extension: HttpExtension) -> Self {
        self.extension = extension;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Validate and freeze the request. Pure: no I/O.
    pub fn build(self) -> Result<InvocationRequest, InvokeError> {
        if self.service_id.trim().is_empty() {
            return Err(InvokeError::invalid_argument("service id must not be empty"));
        }
        if method_segments(&self.method).next().is_none() {
            return Err(InvokeError::invalid_argument(
                "method must contain a non-empty path segment",
            ));
        }

        let envelope = match self.protocol {
            Protocol::Http => Envelope::Http(http_envelope(
                &self.service_id,
                &self.method,
                &self.extension,
                self.content_type.as_deref(),
            )?),
            Protocol::Rpc => Envelope::Rpc(rpc_envelope(
                &self.service_id,
                &self.method,
                &self.payload,
                &self.extension,
                self.content_type.as_deref(),
            )?),
        };

        Ok(InvocationRequest {
            service_id: self.service_id,
            method: self.method,
            payload: self.payload,
            content_type: self.content_type,
            envelope,
        })
    }
}

/// Build an [`InvocationRequest`] from its parts.
pub fn build(
    service_id: &str,
    method: &str,
    payload: impl Into<Bytes>,
    protocol: Protocol,
    extension: HttpExtension,
) -> Result<InvocationRequest, InvokeError> {
    RequestBuilder::new(service_id, method)
        .payload(payload)
        .protocol(protocol)
        .extension(extension)
        .build()
}

/// Non-blank `/`-separated segments of a method name.
fn method_segments(method: &str) -> impl Iterator<Item = &str> {
    method
        .split('/')
        .filter(|segment| !segment.trim().is_empty())
}

fn http_envelope(
    service_id: &str,
    method: &str,
    extension: &HttpExtension,
    content_type: Option<&str>,
) -> Result<HttpEnvelope, InvokeError> {
    let mut path_segments: Vec<String> = INVOKE_API_PREFIX.iter().map(|s| (*s).to_owned()).collect();
    path_segments.push(service_id.to_owned());
    path_segments.push("method".to_owned());
    path_segments.extend(method_segments(method).map(ToOwned::to_owned));

    let mut headers = HeaderMap::with_capacity(extension.headers.len() + 1);
    for (key, value) in &extension.headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|err| InvokeError::invalid_argument(format!("header {key:?}: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| InvokeError::invalid_argument(format!("header {key:?}: {err}")))?;
        headers.append(name, value);
    }
    if let Some(content_type) = content_type {
        let value = HeaderValue::from_str(content_type)
            .map_err(|err| InvokeError::invalid_argument(format!("content type: {err}")))?;
        headers.insert(CONTENT_TYPE, value);
    }

    Ok(HttpEnvelope {
        verb: extension.verb.http_method(),
        path_segments,
        query: extension.query.clone(),
        headers,
    })
}

fn rpc_envelope(
    service_id: &str,
    method: &str,
    payload: &Bytes,
    extension: &HttpExtension,
    content_type: Option<&str>,
) -> Result<RpcEnvelope, InvokeError> {
    let mut metadata = MetadataMap::new();
    metadata.insert(APP_ID_METADATA_KEY, ascii_metadata("service id", service_id)?);
    metadata.insert(METHOD_METADATA_KEY, ascii_metadata("method", method)?);
    for (key, value) in &extension.headers {
        let name = AsciiMetadataKey::from_bytes(key.as_bytes())
            .map_err(|err| InvokeError::invalid_argument(format!("header {key:?}: {err}")))?;
        metadata.append(name, ascii_metadata(key, value)?);
    }

    let message = proto::InvokeServiceRequest {
        id: service_id.to_owned(),
        message: Some(proto::InvokeRequest {
            method: method.to_owned(),
            data: Some(prost_types::Any {
                type_url: String::new(),
                value: payload.to_vec(),
            }),
            content_type: content_type.unwrap_or_default().to_owned(),
            http_extension: Some(proto::HttpExtension {
                verb: extension.verb.proto() as i32,
                querystring: extension.querystring()?,
            }),
        }),
    };

    Ok(RpcEnvelope { metadata, message })
}

fn ascii_metadata(label: &str, value: &str) -> Result<AsciiMetadataValue, InvokeError> {
    AsciiMetadataValue::try_from(value)
        .map_err(|err| InvokeError::invalid_argument(format!("{label} is not valid metadata: {err}")))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn empty_identifiers_are_rejected() {
        for (service, method) in [("", "m"), ("svc", ""), ("  ", "m"), ("svc", " ")] {
            let err = build(service, method, Bytes::new(), Protocol::Http, HttpExtension::POST)
                .expect_err("empty identifiers must fail");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn method_without_segments_is_rejected_for_both_protocols() {
        for method in ["/", "//", " / ", "/ /"] {
            for protocol in [Protocol::Http, Protocol::Rpc] {
                let err = build("svc", method, Bytes::new(), protocol, HttpExtension::POST)
                    .expect_err("method has no segment");
                assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            }
        }

        let request = build("svc", "/items//list/", Bytes::new(), Protocol::Http, HttpExtension::POST)
            .expect("build");
        let Envelope::Http(http) = request.envelope() else {
            panic!("expected http envelope");
        };
        assert_eq!(http.path(), "/v1.0/invoke/svc/method/items/list");
    }

    #[test]
    fn empty_payload_is_valid() {
        let request = build("svc", "m", Bytes::new(), Protocol::Rpc, HttpExtension::NONE)
            .expect("build");
        assert!(request.payload().is_empty());
        let Envelope::Rpc(rpc) = request.envelope() else {
            panic!("expected rpc envelope");
        };
        let data = rpc
            .message()
            .message
            .as_ref()
            .and_then(|m| m.data.as_ref())
            .expect("data present");
        assert!(data.value.is_empty());
    }

    #[test]
    fn http_envelope_shapes_invoke_path() {
        let request = RequestBuilder::new("orders", "items/list")
            .payload(&b"{}"[..])
            .extension(
                HttpExtension::GET
                    .with_query("page", "2")
                    .with_header("x-trace", "abc"),
            )
            .content_type("application/json")
            .build()
            .expect("build");

        assert_eq!(request.protocol(), Protocol::Http);
        let Envelope::Http(http) = request.envelope() else {
            panic!("expected http envelope");
        };
        assert_eq!(http.verb(), &Method::GET);
        assert_eq!(http.path(), "/v1.0/invoke/orders/method/items/list");
        assert_eq!(http.headers()["x-trace"], "abc");
        assert_eq!(http.headers()[CONTENT_TYPE], "application/json");

        let base = Url::parse("http://127.0.0.1:3500").expect("base url");
        let url = http.url(&base).expect("url");
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:3500/v1.0/invoke/orders/method/items/list?page=2"
        );
    }

    #[test]
    fn http_verb_none_is_sent_as_post() {
        let request =
            build("svc", "m", Bytes::new(), Protocol::Http, HttpExtension::NONE).expect("build");
        let Envelope::Http(http) = request.envelope() else {
            panic!("expected http envelope");
        };
        assert_eq!(http.verb(), &Method::POST);
    }

    #[test]
    fn http_path_segments_are_percent_encoded() {
        let request = build("svc", "say hello", Bytes::new(), Protocol::Http, HttpExtension::POST)
            .expect("build");
        let Envelope::Http(http) = request.envelope() else {
            panic!("expected http envelope");
        };
        let base = Url::parse("http://127.0.0.1:3500/").expect("base url");
        assert_eq!(
            http.url(&base).expect("url").path(),
            "/v1.0/invoke/svc/method/say%20hello"
        );
    }

    #[test]
    fn invalid_header_is_invalid_argument() {
        let err = RequestBuilder::new("svc", "m")
            .extension(HttpExtension::POST.with_header("bad header", "v"))
            .build()
            .expect_err("invalid header name");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn rpc_envelope_carries_ids_as_metadata() {
        let request = RequestBuilder::new("orders", "postMessage")
            .payload(vec![1_u8, 2, 3])
            .protocol(Protocol::Rpc)
            .extension(HttpExtension::POST.with_query("a", "1").with_query("b", "x y"))
            .content_type("application/x-protobuf")
            .build()
            .expect("build");

        let Envelope::Rpc(rpc) = request.envelope() else {
            panic!("expected rpc envelope");
        };
        assert_eq!(
            rpc.metadata().get(APP_ID_METADATA_KEY).map(|v| v.to_str().ok()),
            Some(Some("orders"))
        );
        assert_eq!(
            rpc.metadata().get(METHOD_METADATA_KEY).map(|v| v.to_str().ok()),
            Some(Some("postMessage"))
        );

        let message = rpc.message();
        assert_eq!(message.id, "orders");
        let inner = message.message.as_ref().expect("invoke request");
        assert_eq!(inner.method, "postMessage");
        assert_eq!(inner.content_type, "application/x-protobuf");
        assert_eq!(inner.data.as_ref().map(|d| d.value.clone()), Some(vec![1, 2, 3]));
        let ext = inner.http_extension.as_ref().expect("extension");
        assert_eq!(ext.verb, proto::Verb::Post as i32);
        assert_eq!(ext.querystring, "a=1&b=x+y");
    }

    #[test]
    fn protocol_parse_accepts_known_names() {
        assert_eq!(Protocol::parse("HTTP"), Some(Protocol::Http));
        assert_eq!(Protocol::parse(" grpc "), Some(Protocol::Rpc));
        assert_eq!(Protocol::parse("rpc"), Some(Protocol::Rpc));
        assert_eq!(Protocol::parse("smtp"), None);
    }
}
