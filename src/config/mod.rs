//! Config module.
//! Provides configuration types, default paths, XML loading, and validation.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

pub use paths::{CONFIG_ENV, config_path, default_config_path, default_log_path, path_has_symlink_ancestor};
pub use types::{Config, LogLevel, WalkMode};
pub use xml::{load_config, load_config_from_xml_path, parse_config_xml, render_config_xml};
