//! Configuration Module
//!
//! Immutable option structs for the base cache and the refresh-ahead layer,
//! plus the environment-driven configuration of the demo server.

use std::env;
use std::str::FromStr;
use std::time::Duration;

// == Defaults ==
/// Fallback time-to-refresh when the results cache has no default TTL.
pub const DEFAULT_TTR: Duration = Duration::from_secs(600);

/// Share of the default TTL after which a refresh is scheduled.
const TTR_SHARE_OF_TTL: f64 = 0.7;

// == Cache Config ==
/// Options recognised by [`Cache`](crate::cache::Cache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serialize non-string values to JSON text before storing
    pub force_string: bool,
    /// Size charged per field of an object value
    pub object_value_size: u64,
    /// Size charged for a payload that is still being produced
    pub promise_value_size: u64,
    /// Size charged per element of an array value
    pub array_value_size: u64,
    /// Default TTL in seconds, 0 = never expires
    pub std_ttl: f64,
    /// Interval of the periodic expiration sweep, zero disables it
    pub check_period: Duration,
    /// Store and return deep copies instead of shared handles
    pub use_clones: bool,
    /// Physically remove entries once they are found expired
    pub delete_on_expire: bool,
    /// Maximum number of keys, None = unbounded
    pub max_keys: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            force_string: false,
            object_value_size: 80,
            promise_value_size: 1,
            array_value_size: 40,
            std_ttl: 0.0,
            check_period: Duration::from_secs(600),
            use_clones: true,
            delete_on_expire: true,
            max_keys: None,
        }
    }
}

// == Refresh Config ==
/// Options recognised by [`RefreshCache`](crate::refresh::RefreshCache).
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Options of the results cache
    pub cache: CacheConfig,
    /// Time after a call before its result is refreshed in the background
    pub ttr: Option<Duration>,
    /// Re-arm a shorter refresh when a background refresh fails
    pub retry_on_error: bool,
    /// Delay before retrying a failed background refresh
    pub retry_pause: Option<Duration>,
    /// Clone mode of the remembered call arguments
    pub args_use_clones: bool,
    /// Sweep interval of the arguments cache, bounds refresh timing precision
    pub args_check_period: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            ttr: None,
            retry_on_error: true,
            retry_pause: None,
            args_use_clones: true,
            args_check_period: Duration::from_secs(1),
        }
    }
}

impl RefreshConfig {
    /// Effective time-to-refresh.
    ///
    /// An explicit `ttr` wins; otherwise 70% of a positive default TTL, or
    /// [`DEFAULT_TTR`] when results never expire by default.
    pub fn ttr(&self) -> Duration {
        match self.ttr {
            Some(ttr) => ttr,
            None if self.cache.std_ttl > 0.0 => {
                let ttr_ms = self.cache.std_ttl * 1000.0 * TTR_SHARE_OF_TTL;
                Duration::from_millis(ttr_ms.round() as u64)
            }
            None => DEFAULT_TTR,
        }
    }

    /// Effective retry pause, `ceil(ttr / 5)` in milliseconds unless set.
    pub fn retry_pause(&self) -> Duration {
        self.retry_pause.unwrap_or_else(|| {
            let ttr_ms = self.ttr().as_millis() as u64;
            Duration::from_millis(ttr_ms.div_ceil(5))
        })
    }
}

// == Server Config ==
/// Demo server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port
    pub server_port: u16,
    /// Artificial latency of the simulated downstream service, in milliseconds
    pub producer_delay_ms: u64,
    /// Options of the refresh-ahead cache served over HTTP
    pub refresh: RefreshConfig,
}

impl ServerConfig {
    /// Creates a new ServerConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `STD_TTL` - Default TTL in seconds, 0 = never (default: 60)
    /// - `CHECK_PERIOD` - Expiration sweep interval in seconds (default: 1)
    /// - `MAX_KEYS` - Maximum number of keys, unset = unbounded
    /// - `USE_CLONES` - Deep-copy values on write and read (default: true)
    /// - `TTR` - Refresh-ahead interval in seconds (default: derived from STD_TTL)
    /// - `PRODUCER_DELAY_MS` - Latency of the simulated service (default: 200)
    pub fn from_env() -> Self {
        let cache = CacheConfig {
            std_ttl: env_parse::<f64>("STD_TTL")
                .filter(|secs| !secs.is_nan())
                .unwrap_or(60.0),
            check_period: check_period_from(env_parse("CHECK_PERIOD")),
            max_keys: env_parse("MAX_KEYS"),
            use_clones: env_or("USE_CLONES", true),
            ..CacheConfig::default()
        };

        Self {
            server_port: env_or("SERVER_PORT", 3000),
            producer_delay_ms: env_or("PRODUCER_DELAY_MS", 200),
            refresh: RefreshConfig {
                cache,
                ttr: ttr_from(env_parse("TTR")),
                ..RefreshConfig::default()
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            producer_delay_ms: 200,
            refresh: RefreshConfig {
                cache: CacheConfig {
                    std_ttl: 60.0,
                    check_period: Duration::from_secs(1),
                    ..CacheConfig::default()
                },
                ..RefreshConfig::default()
            },
        }
    }
}

/// Sweep interval from seconds. Negative values disable the sweep; values
/// a `Duration` cannot hold fall back to one second.
fn check_period_from(secs: Option<f64>) -> Duration {
    secs.and_then(|secs| Duration::try_from_secs_f64(secs.max(0.0)).ok())
        .unwrap_or(Duration::from_secs(1))
}

/// Explicit refresh interval from seconds, ignored unless positive and
/// representable.
fn ttr_from(secs: Option<f64>) -> Option<Duration> {
    secs.filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env_parse(name).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert!(!config.force_string);
        assert_eq!(config.object_value_size, 80);
        assert_eq!(config.promise_value_size, 1);
        assert_eq!(config.array_value_size, 40);
        assert_eq!(config.std_ttl, 0.0);
        assert_eq!(config.check_period, Duration::from_secs(600));
        assert!(config.use_clones);
        assert!(config.delete_on_expire);
        assert!(config.max_keys.is_none());
    }

    #[test]
    fn test_ttr_derived_from_std_ttl() {
        let config = RefreshConfig {
            cache: CacheConfig {
                std_ttl: 100.0,
                ..CacheConfig::default()
            },
            ..RefreshConfig::default()
        };
        assert_eq!(config.ttr(), Duration::from_secs(70));
        assert_eq!(config.retry_pause(), Duration::from_secs(14));
    }

    #[test]
    fn test_ttr_fallback_without_std_ttl() {
        let config = RefreshConfig::default();
        assert_eq!(config.ttr(), DEFAULT_TTR);
        assert_eq!(config.retry_pause(), Duration::from_secs(120));
    }

    #[test]
    fn test_retry_pause_rounds_up() {
        let config = RefreshConfig {
            ttr: Some(Duration::from_millis(1001)),
            ..RefreshConfig::default()
        };
        assert_eq!(config.retry_pause(), Duration::from_millis(201));
    }

    #[test]
    fn test_explicit_overrides_win() {
        let config = RefreshConfig {
            ttr: Some(Duration::from_secs(5)),
            retry_pause: Some(Duration::from_millis(300)),
            ..RefreshConfig::default()
        };
        assert_eq!(config.ttr(), Duration::from_secs(5));
        assert_eq!(config.retry_pause(), Duration::from_millis(300));
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.refresh.cache.std_ttl, 60.0);
        assert_eq!(config.refresh.ttr(), Duration::from_secs(42));
    }

    #[test]
    fn test_server_config_from_env_defaults() {
        env::remove_var("SERVER_PORT");
        env::remove_var("STD_TTL");
        env::remove_var("CHECK_PERIOD");
        env::remove_var("MAX_KEYS");
        env::remove_var("USE_CLONES");
        env::remove_var("TTR");
        env::remove_var("PRODUCER_DELAY_MS");

        let config = ServerConfig::from_env();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.producer_delay_ms, 200);
        assert_eq!(config.refresh.cache.std_ttl, 60.0);
        assert_eq!(config.refresh.cache.check_period, Duration::from_secs(1));
        assert!(config.refresh.cache.max_keys.is_none());
        assert!(config.refresh.ttr.is_none());
    }

    #[test]
    fn test_check_period_from_seconds() {
        assert_eq!(check_period_from(None), Duration::from_secs(1));
        assert_eq!(check_period_from(Some(0.5)), Duration::from_millis(500));
        assert_eq!(check_period_from(Some(-3.0)), Duration::ZERO);
        assert_eq!(check_period_from(Some(f64::INFINITY)), Duration::from_secs(1));
        assert_eq!(check_period_from(Some(1e300)), Duration::from_secs(1));
    }

    #[test]
    fn test_ttr_from_seconds() {
        assert_eq!(ttr_from(None), None);
        assert_eq!(ttr_from(Some(2.5)), Some(Duration::from_millis(2500)));
        assert_eq!(ttr_from(Some(0.0)), None);
        assert_eq!(ttr_from(Some(f64::NAN)), None);
        assert_eq!(ttr_from(Some(f64::INFINITY)), None);
        assert_eq!(ttr_from(Some(1e300)), None);
    }
}
