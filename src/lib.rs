//! # nethook - packet interception and reinjection
//!
//! nethook diverts packets from a host forwarding engine to subscribers,
//! lets them read each packet, and puts whatever they write back into the
//! stack or onto an interface.
//!
//! ## Features
//!
//! * Interception at the five IPv4 hook points
//! * First-match filters on interface, protocol, addresses and ports
//! * Blocking per-subscriber reads with cancellation
//! * Reinjection to the stack, directly to a driver, or through the
//!   outbound queue
//! * Loop prevention for packets reinjected into the stack
//!
//! ## Architecture
//!
//! The engine ([`NetHook`]) talks to the host through the
//! [`PacketHost`](network::core::PacketHost) trait. [`MemoryHost`](network::core::MemoryHost)
//! implements it in memory and backs the `nethook` command-line tool.
//!
//! ## Quick Start
//!
//! ```rust
//! use nethook::prelude::*;
//! use std::sync::Arc;
//!
//! let host = Arc::new(MemoryHost::new());
//! host.add_device("eth0", "02:00:00:00:00:01".parse().unwrap());
//!
//! let hook = NetHook::new(host);
//! let session = hook.open_session();
//! session
//!     .set_filter(&FilterDescriptor::at(InterceptionPoint::PostRouting).dport(80))
//!     .unwrap();
//! ```

/// Command-line subcommands
pub mod commands;
/// Centralized error handling
pub mod error;
/// Packet interception and reinjection
pub mod network;
/// Prelude for convenient imports
pub mod prelude;
/// Configuration file and option types
pub mod settings;
/// Shared utility functions
pub mod utils;

// Re-export commonly used types
pub use error::{NetHookError, Result};
pub use network::NetHook;
