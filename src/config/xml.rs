//! XML configuration support.
//! - Loads settings from config.xml (quick_xml + serde).
//! - Renders a Config back to the same format (used by `print-config`).
//!
//! Unknown elements are rejected so a misspelt setting never silently falls back
//! to its default. Every value is trimmed before parsing.

use anyhow::{Context, Result, anyhow};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::paths::config_path;
use super::types::{Config, LogLevel, WalkMode};
use crate::policy::ErrorPolicy;

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    lease_seconds: Option<String>,
    reap_interval_seconds: Option<String>,
    lock_attempts: Option<String>,
    lock_retry_delay_ms: Option<String>,
    error_policy: Option<String>,
    walk: Option<String>,
    walk_host: Option<String>,
    walk_port: Option<String>,
    walk_timeout_seconds: Option<String>,
    log_level: Option<String>,
    log_file: Option<String>,
}

/// Trimmed, non-empty value of an optional element.
fn value(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_field<T>(name: &str, raw: &Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value(raw)
        .map(|s| s.parse::<T>().map_err(|e| anyhow!("<{name}>: invalid value '{s}': {e}")))
        .transpose()
}

// Map XmlConfig -> Config; absent elements keep their defaults.
fn xml_to_config(parsed: XmlConfig) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(secs) = parse_field::<u64>("lease_seconds", &parsed.lease_seconds)? {
        cfg.lease = Duration::from_secs(secs);
    }
    if let Some(secs) = parse_field::<u64>("reap_interval_seconds", &parsed.reap_interval_seconds)? {
        cfg.reap_interval = Duration::from_secs(secs);
    }
    if let Some(n) = parse_field::<u32>("lock_attempts", &parsed.lock_attempts)? {
        cfg.lock_attempts = n;
    }
    if let Some(ms) = parse_field::<u64>("lock_retry_delay_ms", &parsed.lock_retry_delay_ms)? {
        cfg.lock_retry_delay = Duration::from_millis(ms);
    }
    if let Some(policy) = parse_field::<ErrorPolicy>("error_policy", &parsed.error_policy)? {
        cfg.error_policy = policy;
    }
    if let Some(mode) = parse_field::<WalkMode>("walk", &parsed.walk)? {
        cfg.walk = mode;
    }
    if let Some(host) = value(&parsed.walk_host) {
        cfg.walk_host = host.to_string();
    }
    if let Some(port) = parse_field::<u16>("walk_port", &parsed.walk_port)? {
        cfg.walk_port = port;
    }
    if let Some(secs) = parse_field::<u64>("walk_timeout_seconds", &parsed.walk_timeout_seconds)? {
        cfg.walk_timeout = Duration::from_secs(secs);
    }
    if let Some(level) = parse_field::<LogLevel>("log_level", &parsed.log_level)? {
        cfg.log_level = level;
    }
    if let Some(file) = value(&parsed.log_file) {
        cfg.log_file = Some(PathBuf::from(file));
    }

    Ok(cfg)
}

/// Parse config XML text.
pub fn parse_config_xml(contents: &str) -> Result<Config> {
    let parsed: XmlConfig = from_xml_str(contents).context("parse config xml")?;
    xml_to_config(parsed)
}

/// Load a Config from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    parse_config_xml(&contents).with_context(|| format!("load config '{}'", path.display()))
}

/// Load from `FILEGATE_CONFIG` or the platform default path, then validate.
/// A missing file yields the defaults.
pub fn load_config() -> Result<Config> {
    let cfg = match config_path() {
        Some(path) if path.is_file() => {
            info!(path = %path.display(), "loading config");
            load_config_from_xml_path(&path)?
        }
        Some(path) => {
            debug!(path = %path.display(), "no config file; using defaults");
            Config::default()
        }
        None => {
            debug!("no config directory on this platform; using defaults");
            Config::default()
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Render `cfg` as config.xml text that `parse_config_xml` reads back.
pub fn render_config_xml(cfg: &Config) -> String {
    let log_file = cfg
        .log_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    format!(
        "<!--\n  filegate configuration (XML)\n\n    error_policy  -> propagate | terminate\n    walk          -> native | loopback\n    log_level     -> quiet | normal | info | debug\n-->\n<config>\n  <lease_seconds>{}</lease_seconds>\n  <reap_interval_seconds>{}</reap_interval_seconds>\n  <lock_attempts>{}</lock_attempts>\n  <lock_retry_delay_ms>{}</lock_retry_delay_ms>\n  <error_policy>{}</error_policy>\n  <walk>{}</walk>\n  <walk_host>{}</walk_host>\n  <walk_port>{}</walk_port>\n  <walk_timeout_seconds>{}</walk_timeout_seconds>\n  <log_level>{}</log_level>\n  <log_file>{}</log_file>\n</config>\n",
        cfg.lease.as_secs(),
        cfg.reap_interval.as_secs(),
        cfg.lock_attempts,
        cfg.lock_retry_delay.as_millis(),
        cfg.error_policy,
        cfg.walk,
        cfg.walk_host,
        cfg.walk_port,
        cfg.walk_timeout.as_secs(),
        cfg.log_level,
        log_file,
    )
}
