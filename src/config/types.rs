//! Core configuration types.
//! - Config holds runtime settings with platform-aware defaults.
//! - LogLevel and WalkMode parse from the names used in config.xml and on the CLI.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::paths;
use crate::lock::{
    DEFAULT_LEASE, DEFAULT_LOCK_ATTEMPTS, DEFAULT_LOCK_RETRY_DELAY, DEFAULT_REAP_INTERVAL,
    LeaseSettings,
};
use crate::policy::ErrorPolicy;
use crate::walk::{DEFAULT_WALK_HOST, DEFAULT_WALK_PORT, DEFAULT_WALK_TIMEOUT, WalkStrategy, Walker};

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Informational output (default)
    #[default]
    Normal,
    /// More info (like verbose)
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// How directory walks enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    Native,
    Loopback,
}

impl WalkMode {
    pub fn platform_default() -> Self {
        if cfg!(target_os = "android") { WalkMode::Loopback } else { WalkMode::Native }
    }
}

impl fmt::Display for WalkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WalkMode::Native => "native",
            WalkMode::Loopback => "loopback",
        })
    }
}

impl FromStr for WalkMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(WalkMode::Native),
            "loopback" | "helper" => Ok(WalkMode::Loopback),
            other => Err(format!("invalid walk mode: '{other}'")),
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Cross-process lease duration
    pub lease: Duration,
    /// How often expired leases are reaped
    pub reap_interval: Duration,
    /// Total advisory lock attempts
    pub lock_attempts: u32,
    pub lock_retry_delay: Duration,
    pub error_policy: ErrorPolicy,
    pub walk: WalkMode,
    pub walk_host: String,
    pub walk_port: u16,
    pub walk_timeout: Duration,
    /// Console verbosity
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lease: DEFAULT_LEASE,
            reap_interval: DEFAULT_REAP_INTERVAL,
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
            lock_retry_delay: DEFAULT_LOCK_RETRY_DELAY,
            error_policy: ErrorPolicy::platform_default(),
            walk: WalkMode::platform_default(),
            walk_host: DEFAULT_WALK_HOST.to_string(),
            walk_port: DEFAULT_WALK_PORT,
            walk_timeout: DEFAULT_WALK_TIMEOUT,
            log_level: LogLevel::Normal,
            log_file: paths::default_log_path(),
        }
    }
}

impl Config {
    pub fn lease_settings(&self) -> LeaseSettings {
        LeaseSettings {
            lease: self.lease,
            reap_interval: self.reap_interval,
            attempts: self.lock_attempts,
            retry_delay: self.lock_retry_delay,
        }
    }

    pub fn walk_strategy(&self) -> WalkStrategy {
        match self.walk {
            WalkMode::Native => WalkStrategy::Native,
            WalkMode::Loopback => WalkStrategy::Loopback {
                host: self.walk_host.clone(),
                port: self.walk_port,
                timeout: self.walk_timeout,
            },
        }
    }

    pub fn walker(&self) -> Walker {
        Walker::new(self.walk_strategy())
    }
}
