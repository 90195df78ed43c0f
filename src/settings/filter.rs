use crate::error::{NetHookError, Result};
use crate::network::filter::{FilterDescriptor, InterceptionPoint};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

#[derive(Parser, Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Interception point: pre_routing, local_in, forward, local_out, post_routing or 0-4
    #[arg(long = "filter-point", id = "filter-point")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<InterceptionPoint>,

    /// Hook priority, used when the point is first activated
    #[arg(long = "filter-priority", id = "filter-priority", default_value_t = 0)]
    #[serde(default)]
    pub priority: i32,

    /// IP protocol number to match
    #[arg(long = "filter-proto", id = "filter-proto")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<u8>,

    /// Incoming interface name to match
    #[arg(long = "filter-in", id = "filter-in")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_dev: Option<String>,

    /// Outgoing interface name to match
    #[arg(long = "filter-out", id = "filter-out")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dev: Option<String>,

    #[arg(long = "filter-saddr", id = "filter-saddr")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saddr: Option<Ipv4Addr>,

    #[arg(long = "filter-daddr", id = "filter-daddr")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daddr: Option<Ipv4Addr>,

    #[arg(long = "filter-sport", id = "filter-sport")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport: Option<u16>,

    #[arg(long = "filter-dport", id = "filter-dport")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dport: Option<u16>,
}

impl FilterOptions {
    /// Converts to a descriptor; the point is mandatory.
    pub fn to_descriptor(&self) -> Result<FilterDescriptor> {
        let point = self
            .point
            .ok_or_else(|| NetHookError::config("filter has no interception point"))?;
        Ok(FilterDescriptor {
            hooknum: point.into(),
            priority: self.priority,
            proto: self.proto,
            in_dev: self.in_dev.clone(),
            out_dev: self.out_dev.clone(),
            saddr: self.saddr,
            daddr: self.daddr,
            sport: self.sport,
            dport: self.dport,
        })
    }

    /// Interface names this filter refers to.
    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.in_dev.iter().chain(self.out_dev.iter()).map(String::as_str)
    }
}
