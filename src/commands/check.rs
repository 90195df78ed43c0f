//! `nethook check`: validate a configuration against an in-memory host.

use crate::commands::{build_host, load_config, open_subscriber};
use crate::error::Result;
use crate::network::core::PacketHost;
use crate::network::filter::Filter;
use crate::network::NetHook;
use clap::Args;
use log::info;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let (path, config) = load_config(args.config.as_deref())?;
    info!("Checking {}", path.display());

    let host = build_host(&config);
    let hook = NetHook::new(host.clone());

    println!("{} interfaces", config.interfaces.len());
    for iface in &config.interfaces {
        println!("  {} {}", iface.name, iface.mac);
    }

    println!("{} subscribers", config.subscribers.len());
    let mut sessions = Vec::with_capacity(config.subscribers.len());
    for sub in &config.subscribers {
        let session = open_subscriber(&hook, sub)?;
        let filter = Filter::resolve(&sub.filter.to_descriptor()?, |n| host.device_by_name(n))?;
        let writer = sub
            .writer
            .as_ref()
            .and_then(|w| w.to_descriptor())
            .map(|w| format!("{} via {}", w.mode, w.dest_dev))
            .unwrap_or_else(|| "read only".to_string());
        println!("  {} {}: {} -> {}", session.id(), sub.name, filter, writer);
        sessions.push(session);
    }

    let points: Vec<String> = hook.active_points().iter().map(|p| p.to_string()).collect();
    println!("active points: {}", points.join(", "));

    drop(sessions);
    hook.deactivate_all();
    Ok(())
}
