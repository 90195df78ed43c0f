//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types and traits from the crate,
//! allowing users to import everything they need with a single use statement:
//!
//! ```rust
//! use nethook::prelude::*;
//! ```

// Error handling
pub use crate::error::{NetHookError, Result};

// Engine
pub use crate::network::NetHook;

// Network core
pub use crate::network::core::{DeviceRef, MacAddr, MemoryHost, NetDevice, PacketBuf, PacketHost};

// Filters
pub use crate::network::filter::{FilterDescriptor, InterceptionPoint, SubscriberId};

// Sessions and reinjection
pub use crate::network::processing::{
    ControlRequest, Interrupter, Session, StatsSnapshot, Verdict, WriteMode, WriterDescriptor,
};

// Settings
pub use crate::settings::{Config, ConfigBuilder, FilterOptions, WriterOptions};
