//! Network module for packet interception and reinjection.
//!
//! This module contains the packet and device model, the filter registry,
//! and the engine that diverts matching packets to subscribers and puts
//! their output back on the wire.

pub mod core;
pub mod engine;
pub mod filter;
pub mod processing;

pub use engine::NetHook;
