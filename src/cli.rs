//! CLI definition and parsing.
//!
//! Notes:
//! - Global flags may appear before or after the subcommand.
//! - --debug is a shorthand for --log-level debug.

use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use filegate::{Config, ErrorPolicy, LogLevel};

/// Diagnostic front end for the filegate library.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Serialized, lock-guarded file operations")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs in structured JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Also append logs to this file.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Exit with a dedicated code when a file is busy or access is denied.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Route reads and writes through cross-process leases.
    #[arg(long, global = true)]
    pub cross_process: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print a file's contents to stdout.
    Read {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
    /// Replace a file's contents with stdin.
    Write {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
    /// Copy a file, or merge a directory tree into DEST.
    Copy {
        #[arg(value_hint = ValueHint::AnyPath)]
        src: PathBuf,
        #[arg(value_hint = ValueHint::AnyPath)]
        dest: PathBuf,
        /// Mirror access/modification times onto the copies.
        #[arg(long)]
        preserve_times: bool,
    },
    /// Move SRC to DEST; a directory onto an existing directory is merged.
    Move {
        #[arg(value_hint = ValueHint::AnyPath)]
        src: PathBuf,
        #[arg(value_hint = ValueHint::AnyPath)]
        dest: PathBuf,
    },
    /// Remove a file or directory tree. Missing paths are not an error.
    Remove {
        #[arg(value_hint = ValueHint::AnyPath)]
        path: PathBuf,
    },
    /// Print `true` or `false`.
    Exists {
        #[arg(value_hint = ValueHint::AnyPath)]
        path: PathBuf,
    },
    /// List a directory tree.
    Walk {
        #[arg(value_hint = ValueHint::DirPath)]
        root: PathBuf,
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,
    },
    /// Take a cross-process lease on PATH and hold it until Ctrl-C.
    Hold {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
    /// Print the effective configuration as XML and where it was loaded from.
    PrintConfig,
}

impl Args {
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Some(file) = &self.log_file {
            cfg.log_file = Some(file.clone());
        }
        if self.strict {
            cfg.error_policy = ErrorPolicy::terminate();
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
