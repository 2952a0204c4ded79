//! Server configuration
//!
//! Bind address and system name come from the command line, the heartbeat
//! period from `HEARTBEAT_INTERVAL_SECS`. Everything has a default.

use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default system name written into every header
pub const DEFAULT_SYSTEM: &str = "WebServer";

/// Env var overriding the heartbeat period, in whole seconds
pub const HEARTBEAT_ENV: &str = "HEARTBEAT_INTERVAL_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
    pub version: String,
    pub system: String,
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            system: DEFAULT_SYSTEM.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl ServerConfig {
    /// Load from process arguments (`[addr] [system]`) and environment
    pub fn from_env() -> Result<Self, AppError> {
        let args: Vec<String> = env::args().skip(1).collect();
        let heartbeat = env::var(HEARTBEAT_ENV).ok();
        Self::from_parts(&args, heartbeat.as_deref())
    }

    fn from_parts(args: &[String], heartbeat: Option<&str>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(addr) = args.first() {
            config.addr = addr.clone();
        }
        if let Some(system) = args.get(1) {
            config.system = system.clone();
        }
        if let Some(raw) = heartbeat {
            config.heartbeat_interval = parse_interval(raw)?;
        }

        Ok(config)
    }
}

fn parse_interval(raw: &str) -> Result<Duration, AppError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(AppError::Config(format!("{} must be positive", HEARTBEAT_ENV))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(AppError::Config(format!(
            "{} is not a number of seconds: {:?}",
            HEARTBEAT_ENV, raw
        ))),
    }
}
