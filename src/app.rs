//! Application orchestrator.
//! Loads config, applies CLI overrides, initializes logging, installs the Ctrl-C
//! handler and dispatches the subcommand.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use filegate::config::{config_path, load_config, render_config_xml};
use filegate::output as out;
use filegate::{
    Config, CrossProcessLocks, FileEntry, GuardedFs, PathLockTable, WalkControl, shutdown,
};

use crate::cli::{Args, Command};
use crate::logging::init_tracing;

const HOLD_POLL: Duration = Duration::from_millis(100);

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    let mut cfg = load_config()?;
    args.apply_overrides(&mut cfg);
    cfg.validate()?;

    if let Command::PrintConfig = args.command {
        match config_path() {
            Some(p) if p.is_file() => out::print_info(&format!("Loaded from {}", p.display())),
            Some(p) => out::print_info(&format!("No file at {}; showing defaults", p.display())),
            None => out::print_info("No config location on this platform; showing defaults"),
        }
        out::print_user(render_config_xml(&cfg).trim_end());
        return Ok(());
    }

    let guard = init_tracing(cfg.log_level, cfg.log_file.as_deref(), args.json)?;

    // Dropping the guard on interrupt flushes the file appender.
    let guard_slot = Arc::new(Mutex::new(guard));
    {
        let guard_slot = Arc::clone(&guard_slot);
        ctrlc::set_handler(move || {
            shutdown::request();
            out::print_warn("Received interrupt; shutting down...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        })
        .context("install Ctrl-C handler")?;
    }

    debug!(?args, "starting filegate");
    let result = dispatch(&args, &cfg);

    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }
    result
}

fn dispatch(args: &Args, cfg: &Config) -> Result<()> {
    let mut files = GuardedFs::new(PathLockTable::global()).with_policy(cfg.error_policy);
    if args.cross_process {
        let locks = CrossProcessLocks::new(cfg.lease_settings()).context("start lease reaper")?;
        files = files.with_cross_process(Arc::new(locks));
    }

    match &args.command {
        Command::Read { path } => {
            let data = files.read_file(path)?;
            io::stdout().lock().write_all(&data).context("write to stdout")?;
        }
        Command::Write { path } => {
            let mut stdin = io::stdin().lock();
            let n = files.write_from_reader(path, &mut stdin)?;
            info!(path = %path.display(), bytes = n, "wrote file");
        }
        Command::Copy { src, dest, preserve_times } => {
            let n = if *preserve_times {
                files.copy_preserving_times(src, dest)?
            } else {
                files.copy(src, dest)?
            };
            info!(src = %src.display(), dest = %dest.display(), bytes = n, "copied");
        }
        Command::Move { src, dest } => {
            files.rename(src, dest)?;
            info!(src = %src.display(), dest = %dest.display(), "moved");
        }
        Command::Remove { path } => files.remove(path)?,
        Command::Exists { path } => out::print_user(&files.exists(path)?.to_string()),
        Command::Walk { root, max_depth } => {
            let mut walker = cfg.walker();
            if let Some(depth) = max_depth {
                walker = walker.with_max_depth(*depth);
            }
            let outcome = walker.walk(root, |entry| {
                out::print_user(&format_entry(entry));
                Ok(if shutdown::is_requested() { WalkControl::Stop } else { WalkControl::Continue })
            })?;
            info!(root = %root.display(), visited = outcome.visited, source = ?outcome.source, "walk finished");
        }
        Command::Hold { path } => hold(cfg, path)?,
        Command::PrintConfig => {}
    }
    Ok(())
}

/// Keep a lease on `path`, renewing at half-lease, until Ctrl-C.
fn hold(cfg: &Config, path: &Path) -> Result<()> {
    let locks = CrossProcessLocks::new(cfg.lease_settings()).context("start lease reaper")?;
    let lease = locks.acquire(path)?;
    out::print_success(&format!("Holding lock on {}; press Ctrl-C to release", lease.key));

    let renew_every = cfg.lease / 2;
    let mut last_renew = Instant::now();
    while !shutdown::is_requested() {
        std::thread::sleep(HOLD_POLL);
        if last_renew.elapsed() >= renew_every {
            locks.acquire(path)?;
            last_renew = Instant::now();
            debug!(path = %path.display(), "lease renewed");
        }
    }

    locks.release(path)?;
    locks.shutdown();
    out::print_info(&format!("Released {}", path.display()));
    Ok(())
}

fn format_entry(entry: &FileEntry) -> String {
    let kind = if entry.is_dir { 'd' } else { '-' };
    format!("{kind} {:04o} {:>12} {}", entry.mode(), entry.size, entry.path.display())
}

