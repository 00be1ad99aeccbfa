use std::time::Duration;

use crate::envelope::Protocol;

use super::ClientError;

pub const DEFAULT_SIDECAR_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 3500;
pub const DEFAULT_GRPC_PORT: u16 = 50001;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub const SIDECAR_HOST_ENV: &str = "DAPR_SIDECAR_IP";
pub const HTTP_PORT_ENV: &str = "DAPR_HTTP_PORT";
pub const GRPC_PORT_ENV: &str = "DAPR_GRPC_PORT";
pub const PROTOCOL_ENV: &str = "DAPR_API_METHOD_INVOCATION_PROTOCOL";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub sidecar_host: String,
    pub http_port: u16,
    pub grpc_port: u16,
    /// Protocol used when a call does not pick one explicitly.
    pub protocol: Protocol,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sidecar_host: DEFAULT_SIDECAR_HOST.to_owned(),
            http_port: DEFAULT_HTTP_PORT,
            grpc_port: DEFAULT_GRPC_PORT,
            protocol: Protocol::Http,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Create config with local sidecar defaults.
    /// Allocation: one String. Complexity: O(1).
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve config from the process environment; blank variables keep defaults.
    /// Side effects: reads process env. Complexity: O(total value length).
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve config through an arbitrary variable lookup.
    /// Allocation: host String when overridden. Complexity: O(total value length).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(host) = read(SIDECAR_HOST_ENV) {
            config.sidecar_host = host;
        }
        if let Some(raw) = read(HTTP_PORT_ENV) {
            config.http_port = parse_port(HTTP_PORT_ENV, &raw)?;
        }
        if let Some(raw) = read(GRPC_PORT_ENV) {
            config.grpc_port = parse_port(GRPC_PORT_ENV, &raw)?;
        }
        if let Some(raw) = read(PROTOCOL_ENV) {
            config.protocol = Protocol::parse(&raw).ok_or_else(|| {
                ClientError::InvalidConfig(format!("{PROTOCOL_ENV}: unknown protocol {raw:?}"))
            })?;
        }
        Ok(config)
    }

    /// Override the sidecar host name or address.
    /// Allocation: one String move/clone from input. Complexity: O(host length).
    pub fn with_sidecar_host(mut self, host: impl Into<String>) -> Self {
        self.sidecar_host = host.into();
        self
    }

    /// Override the sidecar HTTP API port.
    /// Allocation: none. Complexity: O(1).
    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// Override the sidecar gRPC API port.
    /// Allocation: none. Complexity: O(1).
    pub fn with_grpc_port(mut self, port: u16) -> Self {
        self.grpc_port = port;
        self
    }

    /// Override the protocol used when a call does not pick one.
    /// Allocation: none. Complexity: O(1).
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Override the connect timeout for both transports.
    /// Allocation: none. Complexity: O(1).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Reject configs that can never reach a sidecar.
    /// Allocation: error message only. Complexity: O(host length).
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.sidecar_host.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "sidecar_host must not be empty".to_owned(),
            ));
        }
        if self.http_port == 0 {
            return Err(ClientError::InvalidConfig(
                "http_port must be > 0".to_owned(),
            ));
        }
        if self.grpc_port == 0 {
            return Err(ClientError::InvalidConfig(
                "grpc_port must be > 0".to_owned(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "connect_timeout must be > 0".to_owned(),
            ));
        }
        Ok(())
    }

    /// Base url of the HTTP API, with a trailing slash.
    /// Allocation: one String. Complexity: O(host length).
    pub fn http_base_url(&self) -> String {
        format!("http://{}:{}/", self.sidecar_host, self.http_port)
    }

    /// Endpoint uri of the gRPC API.
    /// Allocation: one String. Complexity: O(host length).
    pub fn grpc_endpoint_uri(&self) -> String {
        format!("http://{}:{}", self.sidecar_host, self.grpc_port)
    }
}

fn parse_port(key: &str, raw: &str) -> Result<u16, ClientError> {
    raw.parse::<u16>()
        .map_err(|err| ClientError::InvalidConfig(format!("{key}: invalid port {raw:?}: {err}")))
}
