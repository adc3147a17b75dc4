//! Shared HTTP client utilities

use crate::{EgressError, Result};
use reqwest::{Client, ClientBuilder, Proxy};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds.
    ///
    /// None means no engine-level timeout; cancellation is the caller's
    /// responsibility.
    pub timeout_secs: Option<u64>,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum number of idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Honor HTTPS_PROXY / HTTP_PROXY on outbound requests
    pub use_env_proxy: bool,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 32,
            use_env_proxy: false,
            user_agent: format!("UltraMCP/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Configuration with proxy support enabled from the environment
    /// (`HTTPS_PROXY`, `HTTP_PROXY`, or the `GLOBAL_AGENT_HTTPS_PROXY`
    /// alias some deployments set).
    pub fn with_env_proxy() -> Self {
        Self {
            use_env_proxy: true,
            ..Self::default()
        }
    }
}

/// Create a configured HTTP client with connection pooling
pub fn create_client(config: &HttpClientConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        // Use rustls for TLS (no openssl dependency)
        .use_rustls_tls();

    if let Some(timeout) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(timeout));
    }

    if config.use_env_proxy {
        if let Some(proxy_url) = env_proxy_url() {
            debug!("Routing upstream requests through proxy {proxy_url}");
            match Proxy::all(&proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!("Ignoring invalid proxy URL '{proxy_url}': {e}"),
            }
        }
    }

    builder
        .build()
        .map_err(|e| EgressError::Config(format!("Failed to create HTTP client: {e}")))
}

fn env_proxy_url() -> Option<String> {
    ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy", "GLOBAL_AGENT_HTTPS_PROXY"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
}
