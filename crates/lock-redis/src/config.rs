use std::time::Duration;

/// Connection configuration for the Redis-backed lock.
///
/// Key naming (`lock:<name>` / `lock-signal:<name>`) is fixed by the wire
/// contract and is not configurable here — see [`crate::handle`].
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g. `redis://127.0.0.1:6379`).
    ///
    /// Use `rediss://` scheme for TLS connections. When `tls_enabled` is set,
    /// the URL scheme is automatically upgraded to `rediss://`.
    pub url: String,

    /// Number of connections in the `deadpool-redis` pool.
    pub pool_size: usize,

    /// Timeout for acquiring a pooled connection.
    pub connection_timeout: Duration,

    /// Whether TLS is enabled. When `true`, a `redis://` URL is automatically
    /// upgraded to `rediss://`.
    pub tls_enabled: bool,

    /// Accept invalid certificates (dev/test only). Only applies when using
    /// `rediss://` connections.
    pub tls_insecure: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            pool_size: 10,
            connection_timeout: Duration::from_secs(5),
            tls_enabled: false,
            tls_insecure: false,
        }
    }
}

impl RedisConfig {
    /// Build a config pointed at the given URL, otherwise using defaults.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Return the effective connection URL, upgrading to `rediss://` when TLS
    /// is enabled and appending the `#insecure` fragment `redis` recognizes
    /// to skip certificate verification when `tls_insecure` is also set.
    pub fn effective_url(&self) -> String {
        if !self.tls_enabled {
            return self.url.clone();
        }
        let url = if self.url.starts_with("redis://") {
            self.url.replacen("redis://", "rediss://", 1)
        } else {
            self.url.clone()
        };
        if self.tls_insecure && !url.ends_with("#insecure") {
            format!("{url}#insecure")
        } else {
            url
        }
    }
}
