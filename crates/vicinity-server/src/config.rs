use std::net::SocketAddr;
use std::str::FromStr;

use vicinity_core::EngineConfig;

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Webhook receiving notification requests. Notifications are only
    /// logged when unset.
    pub notify_url: Option<String>,
    /// Start tracking as soon as the server is up.
    pub autostart: bool,
    /// Fixes accepted per client IP per second.
    pub fix_rate_limit_per_sec: u32,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a
    /// variable if set.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = lookup("VICINITY_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("VICINITY_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let notify_url = match lookup("VICINITY_NOTIFY_URL") {
            Some(url) if url.trim().is_empty() => None,
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => Some(url),
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "VICINITY_NOTIFY_URL",
                    "must be an http:// or https:// URL",
                ))
            }
            None => None,
        };

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            exit_margin_meters: parse_var(
                &lookup,
                "VICINITY_EXIT_MARGIN_METERS",
                defaults.exit_margin_meters,
            )?,
            dedupe_cooldown_secs: parse_var(
                &lookup,
                "VICINITY_DEDUPE_COOLDOWN_SECS",
                defaults.dedupe_cooldown_secs,
            )?,
            rate_limit_per_minute: parse_var(
                &lookup,
                "VICINITY_RATE_LIMIT_PER_MINUTE",
                defaults.rate_limit_per_minute,
            )?,
            min_fix_interval_secs: parse_var(
                &lookup,
                "VICINITY_MIN_FIX_INTERVAL_SECS",
                defaults.min_fix_interval_secs,
            )?,
            min_displacement_meters: parse_var(
                &lookup,
                "VICINITY_MIN_DISPLACEMENT_METERS",
                defaults.min_displacement_meters,
            )?,
            watchdog_timeout_secs: parse_var(
                &lookup,
                "VICINITY_WATCHDOG_TIMEOUT_SECS",
                defaults.watchdog_timeout_secs,
            )?,
            suppress_low_confidence: parse_var(
                &lookup,
                "VICINITY_SUPPRESS_LOW_CONFIDENCE",
                defaults.suppress_low_confidence,
            )?,
            ..defaults
        };

        if !engine.exit_margin_meters.is_finite() || engine.exit_margin_meters < 0.0 {
            return Err(ConfigError::Invalid(
                "VICINITY_EXIT_MARGIN_METERS",
                "must be a non-negative number",
            ));
        }
        if engine.rate_limit_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "VICINITY_RATE_LIMIT_PER_MINUTE",
                "must be at least 1",
            ));
        }

        Ok(Config {
            listen_addr,
            notify_url,
            autostart: parse_var(&lookup, "VICINITY_AUTOSTART", false)?,
            fix_rate_limit_per_sec: parse_var(&lookup, "VICINITY_FIX_RATE_LIMIT_PER_SEC", 5)?,
            engine,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, "could not be parsed")),
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
