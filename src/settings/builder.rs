//! Configuration builder.
//!
//! This module provides a fluent builder API for constructing a `Config`
//! in code.
//!
//! # Example
//!
//! ```rust
//! use nethook::prelude::*;
//!
//! let config = ConfigBuilder::new()
//!     .interface("eth0", "02:00:00:00:00:01".parse().unwrap())
//!     .subscriber("web", InterceptionPoint::PostRouting)
//!     .dport(80)
//!     .writer("eth0", WriteMode::ToStack)
//!     .build();
//! assert!(config.validate().is_ok());
//! ```

use crate::network::core::MacAddr;
use crate::network::filter::InterceptionPoint;
use crate::network::processing::WriteMode;
use crate::settings::config::{Config, InterfaceConfig, SubscriberConfig};
use crate::settings::filter::FilterOptions;
use crate::settings::writer::WriterOptions;
use std::net::Ipv4Addr;

/// Builder for constructing `Config`.
///
/// Filter and writer setters apply to the most recently added subscriber
/// and do nothing before the first one.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = Some(level.into());
        self
    }

    pub fn interface(mut self, name: impl Into<String>, mac: MacAddr) -> Self {
        self.config.interfaces.push(InterfaceConfig {
            name: name.into(),
            mac,
        });
        self
    }

    /// Adds a subscriber intercepting at `point` with no other criteria.
    pub fn subscriber(mut self, name: impl Into<String>, point: InterceptionPoint) -> Self {
        self.config.subscribers.push(SubscriberConfig {
            name: name.into(),
            filter: FilterOptions {
                point: Some(point),
                ..Default::default()
            },
            writer: None,
        });
        self
    }

    fn filter(mut self, f: impl FnOnce(&mut FilterOptions)) -> Self {
        if let Some(sub) = self.config.subscribers.last_mut() {
            f(&mut sub.filter);
        }
        self
    }

    pub fn priority(self, priority: i32) -> Self {
        self.filter(|o| o.priority = priority)
    }

    pub fn proto(self, proto: u8) -> Self {
        self.filter(|o| o.proto = Some(proto))
    }

    pub fn in_dev(self, name: &str) -> Self {
        self.filter(|o| o.in_dev = Some(name.to_string()))
    }

    pub fn out_dev(self, name: &str) -> Self {
        self.filter(|o| o.out_dev = Some(name.to_string()))
    }

    pub fn saddr(self, addr: Ipv4Addr) -> Self {
        self.filter(|o| o.saddr = Some(addr))
    }

    pub fn daddr(self, addr: Ipv4Addr) -> Self {
        self.filter(|o| o.daddr = Some(addr))
    }

    pub fn sport(self, port: u16) -> Self {
        self.filter(|o| o.sport = Some(port))
    }

    pub fn dport(self, port: u16) -> Self {
        self.filter(|o| o.dport = Some(port))
    }

    /// Gives the last subscriber a writer.
    pub fn writer(mut self, dest_dev: &str, mode: WriteMode) -> Self {
        if let Some(sub) = self.config.subscribers.last_mut() {
            sub.writer = Some(WriterOptions {
                dest_dev: Some(dest_dev.to_string()),
                mode,
            });
        }
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
