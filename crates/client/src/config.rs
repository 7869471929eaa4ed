//! Client configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const DEFAULT_API_HOST: &str = "http://localhost:3000";
pub const DEFAULT_SOCKET_HOST: &str = "http://localhost:3001/ws";
pub const DEFAULT_MESSAGE_CAPACITY: usize = 40;
pub const DEFAULT_AUTH_FAILURE_DELAY: Duration = Duration::from_secs(5);

const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Origin of the REST server, without the `/api/v1` prefix.
    pub api_host: String,
    /// Socket endpoint as configured; may use an http(s) scheme.
    pub socket_host: String,
    /// Messages kept per group before the oldest is evicted.
    pub message_capacity: usize,
    /// Time between an auth-failure notice and the credential purge.
    pub auth_failure_delay: Duration,
    /// Where the token and user profile are persisted.
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.to_string(),
            socket_host: DEFAULT_SOCKET_HOST.to_string(),
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
            auth_failure_delay: DEFAULT_AUTH_FAILURE_DELAY,
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ONECHAT_API_HOST`: REST origin (default: "http://localhost:3000")
    /// - `ONECHAT_SOCKET_HOST`: socket endpoint (default: "http://localhost:3001/ws")
    /// - `ONECHAT_MESSAGE_CAPACITY`: messages kept per group (default: 40)
    /// - `ONECHAT_AUTH_FAILURE_DELAY_SECS`: delay before forced re-login (default: 5)
    /// - `ONECHAT_DATA_DIR`: credential directory (default: platform config dir)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let message_capacity = lookup("ONECHAT_MESSAGE_CAPACITY")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.message_capacity);

        let auth_failure_delay = lookup("ONECHAT_AUTH_FAILURE_DELAY_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.auth_failure_delay);

        Self {
            api_host: lookup("ONECHAT_API_HOST").unwrap_or(defaults.api_host),
            socket_host: lookup("ONECHAT_SOCKET_HOST").unwrap_or(defaults.socket_host),
            message_capacity,
            auth_failure_delay,
            data_dir: lookup("ONECHAT_DATA_DIR").map(PathBuf::from),
        }
    }

    /// Base URL for REST calls, e.g. `http://localhost:3000/api/v1`.
    pub fn api_base_url(&self) -> String {
        format!("{}{}", self.api_host.trim_end_matches('/'), API_PREFIX)
    }

    /// Socket URL with the scheme mapped to `ws`/`wss`.
    pub fn socket_url(&self) -> Result<String, url::ParseError> {
        http_to_ws(&self.socket_host)
    }
}

/// Convert an http(s) URL to ws(s), keeping host, port and path.
pub fn http_to_ws(raw: &str) -> Result<String, url::ParseError> {
    let parsed = Url::parse(raw)?;
    let scheme = match parsed.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    let host = parsed.host_str().unwrap_or("localhost");
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
    Ok(format!("{scheme}://{host}{port}{}", parsed.path()))
}
