/// Process configuration, captured once at startup from the environment.
///
/// Unlike the teacher's TOML-file config, this gateway has no config file:
/// every recognized value is an environment variable (spec section 6). All
/// fields are immutable after construction and shared via `Arc<Config>`.
use std::time::Duration;

use crate::errors::GatewayError;

const DEFAULT_ADDR: &str = "0.0.0.0:0";
const DEFAULT_DIAL_RETRY: u32 = 1;
const DEFAULT_DIAL_TIMEOUT_SECS: f64 = 3.0;
const DEFAULT_BUFF_SIZE: usize = 8 * 1024;
const MIN_BUFF_SIZE: usize = 1024;
const MIN_DIAL_RETRY: u32 = 1;

#[derive(Debug, Clone)]
pub struct Config {
    /// Key material for token decryption. At least one byte.
    pub secret: Vec<u8>,
    /// Address the listener binds.
    pub bind_addr: String,
    /// Whether to enable SO_REUSEPORT-style binding.
    pub reuse_port: bool,
    /// Max dial attempts per connection. At least 1.
    pub dial_retry: u32,
    /// Per-attempt dial deadline.
    pub dial_timeout: Duration,
    /// Size of each pooled relay buffer. At least 1 KiB.
    pub buffer_size: usize,
    /// Optional diagnostics endpoint bind address (outside the core).
    pub pprof_addr: Option<String>,
}

impl Config {
    /// Load configuration from the process environment. Fatal (returns
    /// `GatewayError::Config`) on a missing/empty secret or an unparsable
    /// numeric value; values below their documented lower bound are
    /// clamped up rather than rejected.
    pub fn from_env() -> Result<Self, GatewayError> {
        let secret = read_secret()?;
        let bind_addr = std::env::var("GW_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let reuse_port = read_bool_env("GW_REUSE_PORT");

        let dial_retry = read_numeric_env("GW_DIAL_RETRY", DEFAULT_DIAL_RETRY)?
            .max(MIN_DIAL_RETRY);

        let dial_timeout_secs = read_numeric_env("GW_DIAL_TIMEOUT", DEFAULT_DIAL_TIMEOUT_SECS)?;
        let dial_timeout = Duration::from_secs_f64(dial_timeout_secs.max(0.0));

        let buffer_size = read_numeric_env("GW_BUFF_SIZE", DEFAULT_BUFF_SIZE)?
            .max(MIN_BUFF_SIZE);

        let pprof_addr = std::env::var("GW_PPROF_ADDR").ok().filter(|s| !s.is_empty());

        Ok(Config {
            secret,
            bind_addr,
            reuse_port,
            dial_retry,
            dial_timeout,
            buffer_size,
            pprof_addr,
        })
    }
}

fn read_secret() -> Result<Vec<u8>, GatewayError> {
    match std::env::var("GW_SECRET") {
        Ok(s) if !s.is_empty() => Ok(s.into_bytes()),
        Ok(_) => Err(GatewayError::Config("GW_SECRET must not be empty".into())),
        Err(_) => Err(GatewayError::Config("GW_SECRET is required".into())),
    }
}

fn read_bool_env(name: &str) -> bool {
    match std::env::var(name) {
        Ok(s) => matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => false,
    }
}

/// Parse a numeric env var, falling back to `default` when the variable is
/// absent. Returns a config error when the variable is present but
/// unparsable — a typo in an explicit override should fail loudly, not
/// silently fall back.
trait EnvNumeric: Sized {
    fn parse_env(s: &str) -> Option<Self>;
}

impl EnvNumeric for u32 {
    fn parse_env(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl EnvNumeric for usize {
    fn parse_env(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl EnvNumeric for f64 {
    fn parse_env(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

fn read_numeric_env<T: EnvNumeric>(name: &str, default: T) -> Result<T, GatewayError> {
    match std::env::var(name) {
        Ok(s) => T::parse_env(&s)
            .ok_or_else(|| GatewayError::Config(format!("{} is not a valid number: {:?}", name, s))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch
    // them so they don't stomp on each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "GW_SECRET",
            "GW_ADDR",
            "GW_REUSE_PORT",
            "GW_DIAL_RETRY",
            "GW_DIAL_TIMEOUT",
            "GW_BUFF_SIZE",
            "GW_PPROF_ADDR",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn missing_secret_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GW_SECRET", "s3cr3t");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_ADDR);
        assert!(!cfg.reuse_port);
        assert_eq!(cfg.dial_retry, DEFAULT_DIAL_RETRY);
        assert_eq!(cfg.buffer_size, DEFAULT_BUFF_SIZE);
        assert_eq!(cfg.pprof_addr, None);
        clear_env();
    }

    #[test]
    fn values_below_bound_are_clamped() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GW_SECRET", "s3cr3t");
        std::env::set_var("GW_DIAL_RETRY", "0");
        std::env::set_var("GW_BUFF_SIZE", "16");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.dial_retry, MIN_DIAL_RETRY);
        assert_eq!(cfg.buffer_size, MIN_BUFF_SIZE);
        clear_env();
    }

    #[test]
    fn unparsable_numeric_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GW_SECRET", "s3cr3t");
        std::env::set_var("GW_DIAL_RETRY", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
        clear_env();
    }

    #[test]
    fn reuse_port_truthy_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GW_SECRET", "s3cr3t");
        for val in ["1", "true", "TRUE", "yes", "Yes"] {
            std::env::set_var("GW_REUSE_PORT", val);
            let cfg = Config::from_env().unwrap();
            assert!(cfg.reuse_port, "expected {:?} to be truthy", val);
        }
        std::env::set_var("GW_REUSE_PORT", "0");
        assert!(!Config::from_env().unwrap().reuse_port);
        clear_env();
    }
}
