use std::collections::HashMap;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

use super::*;
use crate::codec::JsonCodec;
use crate::envelope::Envelope;
use crate::errors::ErrorKind;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn config_defaults_point_at_local_sidecar() {
    let config = ClientConfig::from_lookup(lookup(&[])).expect("defaults");
    assert_eq!(config, ClientConfig::default());
    assert_eq!(config.http_base_url(), "http://127.0.0.1:3500/");
    assert_eq!(config.grpc_endpoint_uri(), "http://127.0.0.1:50001");
    assert_eq!(config.protocol, Protocol::Http);
}

#[test]
fn config_reads_environment_overrides() {
    let config = ClientConfig::from_lookup(lookup(&[
        (SIDECAR_HOST_ENV, "10.0.0.7"),
        (HTTP_PORT_ENV, " 3600 "),
        (GRPC_PORT_ENV, "50002"),
        (PROTOCOL_ENV, "GRPC"),
    ]))
    .expect("overrides");

    assert_eq!(
        config,
        ClientConfig::new()
            .with_sidecar_host("10.0.0.7")
            .with_http_port(3600)
            .with_grpc_port(50002)
            .with_protocol(Protocol::Rpc)
    );
}

#[test]
fn config_blank_values_keep_defaults() {
    let config = ClientConfig::from_lookup(lookup(&[(HTTP_PORT_ENV, "   "), (PROTOCOL_ENV, "")]))
        .expect("blank values");
    assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
    assert_eq!(config.protocol, Protocol::Http);
}

#[test]
fn config_rejects_unparsable_values() {
    let err = ClientConfig::from_lookup(lookup(&[(GRPC_PORT_ENV, "not-a-port")]))
        .expect_err("bad port");
    assert!(matches!(err, ClientError::InvalidConfig(_)));

    let err = ClientConfig::from_lookup(lookup(&[(PROTOCOL_ENV, "carrier-pigeon")]))
        .expect_err("bad protocol");
    assert!(matches!(err, ClientError::InvalidConfig(_)));
}

#[test]
fn config_validation_rejects_zero_values() {
    for config in [
        ClientConfig::new().with_http_port(0),
        ClientConfig::new().with_grpc_port(0),
        ClientConfig::new().with_sidecar_host(" "),
        ClientConfig::new().with_connect_timeout(Duration::ZERO),
    ] {
        assert!(matches!(
            config.validate(),
            Err(ClientError::InvalidConfig(_))
        ));
    }
}

#[test]
fn client_new_requires_runtime() {
    let err = Client::new(ClientConfig::new()).expect_err("no runtime in plain test");
    assert_eq!(err, ClientError::NoRuntime);
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_identifiers_fail_before_dispatch() {
    let client = Client::new(ClientConfig::new()).expect("client");

    let err = client
        .invoke_method("", "m", Bytes::new(), HttpExtension::POST)
        .expect_err("empty service id");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = client
        .invoke_method_and_wait("svc", "", Bytes::new(), Protocol::Rpc, HttpExtension::NONE, None)
        .await
        .expect_err("empty method");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(client.metrics_snapshot().dispatched_total, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn request_builder_uses_default_protocol() {
    let client = Client::new(ClientConfig::new().with_protocol(Protocol::Rpc)).expect("client");
    let request = client.request("svc", "m").build().expect("build");
    assert!(matches!(request.envelope(), Envelope::Rpc(_)));
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Ping {
    n: u32,
}

#[tokio::test(flavor = "current_thread")]
async fn typed_invocation_against_missing_sidecar_is_unavailable() {
    let port = {
        let free = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
        free.local_addr().expect("free port addr").port()
    };
    let client = Client::new(
        ClientConfig::new()
            .with_http_port(port)
            .with_connect_timeout(Duration::from_secs(1)),
    )
    .expect("client");

    let call = client
        .invoke_method_typed::<JsonCodec, Ping, Ping>("svc", "ping", &Ping { n: 1 }, HttpExtension::POST)
        .expect("typed call");
    let err = call
        .wait(Some(Duration::from_secs(5)))
        .await
        .expect_err("no sidecar");
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    let snapshot = client.metrics_snapshot();
    assert_eq!(snapshot.dispatched_total, 1);
    assert_eq!(snapshot.unavailable_total, 1);
}
