//! Configuration data types.

use crate::config::directive::StickySource;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Upstream groups (peer pools)
    #[serde(default)]
    pub upstreams: Vec<UpstreamConfig>,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json, pretty or compact
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    /// One line per event, for terminals.
    Compact,
}

/// Upstream group configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Unique name for this upstream group
    pub name: String,

    /// Peers of the group; `backup: true` peers form the backup pool
    pub servers: Vec<ServerConfig>,

    /// Plain balancer for upstreams without session affinity
    #[serde(default)]
    pub balancer: Option<Algorithm>,

    /// Sticky-cookie settings, either a directive line or a map
    #[serde(default)]
    pub sticky: Option<StickyConfig>,
}

impl UpstreamConfig {
    /// Algorithm used when no sticky peer applies.
    pub fn algorithm(&self) -> Algorithm {
        match (&self.sticky, self.balancer) {
            (Some(sticky), _) => sticky.lb_alg,
            (None, Some(balancer)) => balancer,
            (None, None) => Algorithm::RoundRobin,
        }
    }
}

/// Individual peer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Peer address and port
    pub address: SocketAddr,

    /// Weight for weighted selection (default: 1)
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Failures within `fail_timeout` before the peer is skipped (0 disables)
    #[serde(default = "default_max_fails")]
    pub max_fails: u32,

    /// Window for counting failures and for forgiving them
    #[serde(default = "default_fail_timeout", with = "humantime_serde")]
    pub fail_timeout: Duration,

    /// Connection cap (0 = unlimited)
    #[serde(default)]
    pub max_conns: u32,

    /// Permanently marked unavailable
    #[serde(default)]
    pub down: bool,

    /// Member of the backup pool
    #[serde(default)]
    pub backup: bool,
}

impl ServerConfig {
    /// A peer with default limits.
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            weight: default_weight(),
            max_fails: default_max_fails(),
            fail_timeout: default_fail_timeout(),
            max_conns: 0,
            down: false,
            backup: false,
        }
    }
}

/// Fallback load balancing algorithm.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Smooth weighted round-robin.
    #[default]
    #[serde(alias = "rr")]
    RoundRobin,
    /// Weighted least connections with round-robin tie-break.
    #[serde(alias = "lc", alias = "least_conn")]
    LeastConnections,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::RoundRobin => f.write_str("rr"),
            Algorithm::LeastConnections => f.write_str("lc"),
        }
    }
}

/// Hash function behind a digest identity.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
}

/// How a peer is identified in the routing cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Decimal peer index.
    Index,
    /// Hex digest of the peer's binary address.
    Hash(DigestAlgorithm),
    /// The textual address, optionally hex digested.
    Text(Option<DigestAlgorithm>),
    /// Hex HMAC of the peer's binary address.
    Hmac { algorithm: DigestAlgorithm, key: String },
}

impl Identity {
    /// Whether cookie values are digests rather than indexes.
    pub fn uses_digest(&self) -> bool {
        !matches!(self, Identity::Index)
    }
}

/// Sticky-cookie settings of one upstream group.
///
/// Deserialized from either a directive line
/// (`"name=route hash=sha1 lb_alg=lc"`) or a map with the same keys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "StickySource")]
pub struct StickyConfig {
    pub cookie_name: String,
    pub cookie_domain: String,
    pub cookie_path: String,
    /// `None` makes the routing cookie a session cookie.
    pub cookie_expires: Option<Duration>,
    pub secure: bool,
    pub httponly: bool,
    pub identity: Identity,
    pub no_fallback: bool,
    pub lb_alg: Algorithm,
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            cookie_name: "route".to_string(),
            cookie_domain: String::new(),
            cookie_path: "/".to_string(),
            cookie_expires: None,
            secure: false,
            httponly: false,
            identity: Identity::Hash(DigestAlgorithm::Md5),
            no_fallback: false,
            lb_alg: Algorithm::RoundRobin,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_weight() -> u32 {
    1
}

fn default_max_fails() -> u32 {
    1
}

fn default_fail_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Custom serde module for humantime durations.
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Custom serde module for optional humantime durations.
pub(crate) mod option_humantime_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => {
                let d = humantime::parse_duration(&s).map_err(serde::de::Error::custom)?;
                Ok(Some(d))
            }
            None => Ok(None),
        }
    }
}
