//! Environment configuration.
//!
//! All options come from the process environment, with a `.env` overlay
//! for local development (existing environment variables always win).
//! Numeric options are forgiving: a malformed or out-of-range value
//! falls back to its default (clamped into the supported range) with a
//! warning — bad tuning must never keep the worker from starting.

use condeval_cache::CacheConfig;
use condeval_events::BusConfig;

/// Everything the worker reads at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Postgres connection string (`DATABASE_URL`).
    pub database_url: String,
    /// TTL / sweep / capacity knobs (`CACHE_TTL_SECONDS`,
    /// `CACHE_CHECK_PERIOD_SECONDS`, `CACHE_MAX_KEYS`).
    pub cache: CacheConfig,
    /// Pub/sub endpoint (`BUS_HOST`, `BUS_PORT`, `BUS_PASSWORD`, `BUS_DB`).
    pub bus: BusConfig,
    /// Health/metrics listener port (`HTTP_PORT`).
    pub http_port: u16,
    /// gRPC bind address (`GRPC_ADDR`).
    pub grpc_addr: String,
}

impl AppConfig {
    /// Load from the process environment, `.env` included.
    pub fn from_env() -> AppConfig {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup; what the tests use.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppConfig {
        let (ttl_lo, ttl_hi) = CacheConfig::TTL_RANGE_SECONDS;
        let (sweep_lo, sweep_hi) = CacheConfig::SWEEP_RANGE_SECONDS;
        let (keys_lo, keys_hi) = CacheConfig::MAX_KEYS_RANGE;

        let cache = CacheConfig::new(
            numeric(&lookup, "CACHE_TTL_SECONDS", 300, ttl_lo, ttl_hi),
            numeric(&lookup, "CACHE_CHECK_PERIOD_SECONDS", 60, sweep_lo, sweep_hi),
            numeric(&lookup, "CACHE_MAX_KEYS", 10_000, keys_lo as u64, keys_hi as u64) as usize,
        );

        let bus = BusConfig {
            host: lookup("BUS_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: numeric(&lookup, "BUS_PORT", 6379, 1, u16::MAX as u64) as u16,
            password: lookup("BUS_PASSWORD").filter(|p| !p.is_empty()),
            db: numeric(&lookup, "BUS_DB", 0, 0, 15) as i64,
        };

        AppConfig {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost/condeval".to_string()),
            cache,
            bus,
            http_port: numeric(&lookup, "HTTP_PORT", 3001, 1, u16::MAX as u64) as u16,
            grpc_addr: lookup("GRPC_ADDR").unwrap_or_else(|| "0.0.0.0:50051".to_string()),
        }
    }
}

/// Parse a numeric option, falling back to `default` on anything
/// unparseable and clamping into `[lo, hi]`. Both degradations warn.
fn numeric(lookup: impl Fn(&str) -> Option<String>, key: &str, default: u64, lo: u64, hi: u64) -> u64 {
    let Some(raw) = lookup(key) else {
        return default;
    };
    let parsed = match raw.trim().parse::<u64>() {
        Ok(parsed) => parsed,
        Err(_) => {
            tracing::warn!(key, value = %raw, default, "ignoring non-numeric configuration value");
            return default;
        }
    };
    let clamped = parsed.clamp(lo, hi);
    if clamped != parsed {
        tracing::warn!(key, value = parsed, clamped, "configuration value out of range, clamped");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn config_with(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_with(&[]);
        assert_eq!(config.cache.default_ttl, Duration::from_secs(300));
        assert_eq!(config.cache.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.cache.max_keys, 10_000);
        assert_eq!(config.bus.host, "localhost");
        assert_eq!(config.bus.port, 6379);
        assert_eq!(config.bus.password, None);
        assert_eq!(config.bus.db, 0);
        assert_eq!(config.http_port, 3001);
        assert_eq!(config.grpc_addr, "0.0.0.0:50051");
    }

    #[test]
    fn numeric_values_are_parsed_and_clamped() {
        let config = config_with(&[
            ("CACHE_TTL_SECONDS", "900"),
            ("CACHE_CHECK_PERIOD_SECONDS", "5"),
            ("CACHE_MAX_KEYS", "99999999"),
        ]);
        assert_eq!(config.cache.default_ttl, Duration::from_secs(900));
        // Below the floor: clamped up.
        assert_eq!(config.cache.sweep_interval, Duration::from_secs(10));
        // Above the ceiling: clamped down.
        assert_eq!(config.cache.max_keys, 1_000_000);
    }

    #[test]
    fn garbage_numerics_fall_back_to_defaults() {
        let config = config_with(&[
            ("CACHE_TTL_SECONDS", "five minutes"),
            ("CACHE_MAX_KEYS", "-3"),
            ("BUS_PORT", "not-a-port"),
        ]);
        assert_eq!(config.cache.default_ttl, Duration::from_secs(300));
        assert_eq!(config.cache.max_keys, 10_000);
        assert_eq!(config.bus.port, 6379);
    }

    #[test]
    fn empty_bus_password_means_no_password() {
        let config = config_with(&[("BUS_PASSWORD", "")]);
        assert_eq!(config.bus.password, None);
        let config = config_with(&[("BUS_PASSWORD", "secret")]);
        assert_eq!(config.bus.password.as_deref(), Some("secret"));
    }
}
