use crate::store::DEFAULT_CAPACITY;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_QUERY_LIMIT: usize = 50;
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 30;

/// Runtime settings, read from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub http_addr: String,
    pub store_capacity: usize,
    pub default_query_limit: usize,
    pub report_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            store_capacity: DEFAULT_CAPACITY,
            default_query_limit: DEFAULT_QUERY_LIMIT,
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unset, blank or unparsable
    /// values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let http_addr = lookup("HTTP_ADDR")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.http_addr);
        let store_capacity =
            parse_or(&lookup, "STORE_CAPACITY", defaults.store_capacity).max(1);
        let default_query_limit =
            parse_or(&lookup, "DEFAULT_QUERY_LIMIT", defaults.default_query_limit).max(1);
        let report_secs =
            parse_or(&lookup, "REPORT_INTERVAL_SECS", DEFAULT_REPORT_INTERVAL_SECS).max(1);

        Self {
            http_addr,
            store_capacity,
            default_query_limit,
            report_interval: Duration::from_secs(report_secs),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{}={:?} is not valid, using {}", key, raw, default);
            default
        }),
        _ => default,
    }
}
