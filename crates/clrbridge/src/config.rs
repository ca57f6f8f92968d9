//! Session configuration.
//!
//! Defaults target a bridge server on `localhost:56789`. Environment variables
//! (`CLRBRIDGE_*`) override defaults via [`SessionConfig::from_env`].

use std::path::PathBuf;
use std::time::Duration;

use crate::connect::RetryPolicy;
use crate::error::{BridgeError, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 56789;
pub const DEFAULT_CREATOR_CLASS: &str = "bridge.common.reflection.Creator";

/// How to start the companion server when nothing is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    /// Server executable (or assembly, when run through `runtime`).
    pub server: PathBuf,
    /// Host program for the server, e.g. `mono`.
    pub runtime: Option<String>,
    /// Assembly for the server to preload.
    pub dll: Option<PathBuf>,
    pub args: Vec<String>,
}

impl ServerSpec {
    /// Launch `server` directly, with no runtime host or assembly.
    pub fn new(server: impl Into<PathBuf>) -> Self {
        Self {
            server: server.into(),
            runtime: None,
            dll: None,
            args: Vec::new(),
        }
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    pub fn with_dll(mut self, dll: impl Into<PathBuf>) -> Self {
        self.dll = Some(dll.into());
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub retry: RetryPolicy,
    pub server: Option<ServerSpec>,
    /// Class whose static `NewByCtor` evaluates constructor expressions.
    pub creator_class: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            retry: RetryPolicy::default(),
            server: None,
            creator_class: DEFAULT_CREATOR_CLASS.to_owned(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `CLRBRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, which maps variable names to values.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(host) = lookup("CLRBRIDGE_HOST").filter(|h| !h.is_empty()) {
            self.host = host;
        }
        if let Some(port) = lookup("CLRBRIDGE_PORT") {
            self.port = parse_var("CLRBRIDGE_PORT", &port)?;
        }
        if let Some(retries) = lookup("CLRBRIDGE_RETRIES") {
            self.retry.retries = parse_var("CLRBRIDGE_RETRIES", &retries)?;
        }
        if let Some(gap) = lookup("CLRBRIDGE_RETRY_GAP_MS") {
            self.retry.retry_gap = Duration::from_millis(parse_var("CLRBRIDGE_RETRY_GAP_MS", &gap)?);
        }

        if let Some(server) = lookup("CLRBRIDGE_SERVER").filter(|s| !s.is_empty()) {
            self.server = Some(ServerSpec::new(server));
        }
        if let Some(spec) = self.server.as_mut() {
            if let Some(runtime) = lookup("CLRBRIDGE_RUNTIME").filter(|r| !r.is_empty()) {
                spec.runtime = Some(runtime);
            }
            if let Some(dll) = lookup("CLRBRIDGE_DLL").filter(|d| !d.is_empty()) {
                spec.dll = Some(dll.into());
            }
        }
        Ok(self)
    }

    /// Server host name or address.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Connection retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Server to launch when the first connection is refused.
    pub fn with_server(mut self, server: ServerSpec) -> Self {
        self.server = Some(server);
        self
    }

    /// Class whose `NewByCtor` evaluates constructor expressions.
    pub fn with_creator_class(mut self, class: impl Into<String>) -> Self {
        self.creator_class = class.into();
        self
    }

    /// `svc://host:port` URL handed to a launched server.
    pub fn service_url(&self) -> String {
        let host = if self.host.is_empty() {
            DEFAULT_HOST
        } else {
            &self.host
        };
        format!("svc://{host}:{}", self.port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| BridgeError::Config(format!("{name}={raw:?} is not a valid number")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = SessionConfig::new();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 56789);
        assert_eq!(config.retry.retries, 5);
        assert_eq!(config.retry.retry_gap, Duration::from_secs(2));
        assert!(config.server.is_none());
        assert_eq!(config.service_url(), "svc://localhost:56789");
    }

    #[test]
    fn env_overrides() {
        let config = SessionConfig::default()
            .with_env_from(env(&[
                ("CLRBRIDGE_HOST", "bridge.internal"),
                ("CLRBRIDGE_PORT", "6000"),
                ("CLRBRIDGE_RETRIES", "2"),
                ("CLRBRIDGE_RETRY_GAP_MS", "250"),
                ("CLRBRIDGE_SERVER", "/opt/bridge/CLRServer.exe"),
                ("CLRBRIDGE_RUNTIME", "mono"),
                ("CLRBRIDGE_DLL", "/opt/models/Models.dll"),
            ]))
            .unwrap();

        assert_eq!(config.service_url(), "svc://bridge.internal:6000");
        assert_eq!(config.retry.retries, 2);
        assert_eq!(config.retry.retry_gap, Duration::from_millis(250));

        let server = config.server.unwrap();
        assert_eq!(server.server, PathBuf::from("/opt/bridge/CLRServer.exe"));
        assert_eq!(server.runtime.as_deref(), Some("mono"));
        assert_eq!(server.dll, Some(PathBuf::from("/opt/models/Models.dll")));
    }

    #[test]
    fn runtime_without_server_is_ignored() {
        let config = SessionConfig::default()
            .with_env_from(env(&[("CLRBRIDGE_RUNTIME", "mono")]))
            .unwrap();
        assert!(config.server.is_none());
    }

    #[test]
    fn malformed_port_is_a_config_error() {
        let err = SessionConfig::default()
            .with_env_from(env(&[("CLRBRIDGE_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn builder() {
        let config = SessionConfig::new()
            .with_host("10.0.0.5")
            .with_port(7000)
            .with_creator_class("Acme.Creator")
            .with_server(ServerSpec::new("server.exe").with_args(["-v"]));
        assert_eq!(config.creator_class, "Acme.Creator");
        assert_eq!(config.server.unwrap().args, vec!["-v".to_string()]);
    }
}
