use crate::Result;

use config::{Config, Environment, File};
use tokio::time::Duration;

use std::path::Path;

/// Prefix of the environment variables overriding `HostConfig` fields, e.g
/// `PEER_RPC_DIAL_TIMEOUT_MS=2000`.
const ENV_PREFIX: &str = "PEER_RPC";

/// Slack given to the transport's own connect timeout so that it never fires before the
/// caller-visible dial timeout.
const TRANSPORT_TIMEOUT_SLACK: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HostConfig {
    pub dial_timeout_ms: u64,
    /// Watermarks high enough that trimming never kicks in for RPC call volumes.
    pub conn_mgr_low_water: usize,
    pub conn_mgr_high_water: usize,
    pub conn_mgr_grace_period_secs: u64,
    pub mux_keepalive_interval_ms: u64,
    pub mux_write_timeout_ms: u64,
    pub mux_max_stream_window: u32,
    pub mux_accept_backlog: usize,
    pub user_agent: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            dial_timeout_ms: 30_000,
            conn_mgr_low_water: 8192,
            conn_mgr_high_water: 16384,
            conn_mgr_grace_period_secs: 60,
            mux_keepalive_interval_ms: 10_000,
            mux_write_timeout_ms: 5_000,
            mux_max_stream_window: 32 << 20,
            mux_accept_backlog: 256,
            user_agent: String::from("peer-rpc"),
        }
    }
}

impl HostConfig {
    /// Default settings with the given dial timeout.
    pub fn with_timeout(dial_timeout: Duration) -> Self {
        HostConfig { dial_timeout_ms: dial_timeout.as_millis() as u64, ..HostConfig::default() }
    }

    /// Layers the defaults, the optional file at `path` and `PEER_RPC_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize::<HostConfig>()?;
        Ok(settings)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        self.dial_timeout() + TRANSPORT_TIMEOUT_SLACK
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.conn_mgr_grace_period_secs)
    }

    /// Multiplexer settings: keep-alive on, bounded writes, no limit on stream count.
    pub fn mux_config(&self) -> tokio_yamux::Config {
        tokio_yamux::Config {
            accept_backlog: self.mux_accept_backlog,
            enable_keepalive: true,
            keepalive_interval: Duration::from_millis(self.mux_keepalive_interval_ms),
            connection_write_timeout: Duration::from_millis(self.mux_write_timeout_ms),
            max_stream_count: usize::MAX,
            max_stream_window_size: self.mux_max_stream_window,
        }
    }
}
