//! Command handlers for the `nethook` binary.
//!
//! This module contains the command-line definition and one submodule per
//! subcommand, plus the set-up they share: building an in-memory host from
//! the configuration and opening its subscribers.

pub mod check;
pub mod replay;
pub mod trace;

use crate::error::Result;
use crate::network::core::MemoryHost;
use crate::network::processing::Session;
use crate::network::NetHook;
use crate::settings::{Config, SubscriberConfig};
use clap::{Parser, Subcommand};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "nethook", version, about = "Divert, inspect and reinject packets")]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a configuration and show what it would install
    Check(check::CheckArgs),
    /// Replay a packet trace through configured subscribers
    Replay(replay::ReplayArgs),
}

impl Command {
    pub fn config_path(&self) -> Option<&Path> {
        match self {
            Self::Check(args) => args.config.as_deref(),
            Self::Replay(args) => args.config.as_deref(),
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Check(args) => check::run(args),
        Command::Replay(args) => replay::run(args),
    }
}

/// Loads and validates the configuration at `path` or the default location.
pub fn load_config(path: Option<&Path>) -> Result<(PathBuf, Config)> {
    let path = Config::resolve_path(path)?;
    let config = Config::load(&path)?;
    config.validate()?;
    Ok((path, config))
}

/// Builds an in-memory host exposing the configured interfaces.
pub fn build_host(config: &Config) -> Arc<MemoryHost> {
    let host = Arc::new(MemoryHost::new());
    for iface in &config.interfaces {
        host.add_device(&iface.name, iface.mac);
    }
    host
}

/// Opens a session for `sub` and installs its filter and writer.
pub fn open_subscriber(hook: &NetHook, sub: &SubscriberConfig) -> Result<Session> {
    let session = hook.open_session();
    session.set_filter(&sub.filter.to_descriptor()?)?;
    if let Some(writer) = sub.writer.as_ref().and_then(|w| w.to_descriptor()) {
        session.set_write_mode(&writer)?;
    }
    debug!("Subscriber '{}' opened as {}", sub.name, session.id());
    Ok(session)
}
