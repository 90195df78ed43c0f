//! Interception points along the IPv4 forwarding path.

use crate::error::NetHookError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of interception points.
pub const NUM_POINTS: usize = 5;

/// A location in the forwarding path where packets can be diverted.
///
/// Discriminants match the classic netfilter IPv4 hook numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptionPoint {
    /// After sanity checks, before routing
    PreRouting = 0,
    /// After routing, for packets addressed to this host
    LocalIn = 1,
    /// After routing, for packets passing through
    Forward = 2,
    /// Locally generated, before routing
    LocalOut = 3,
    /// Just before the packet leaves on an interface
    PostRouting = 4,
}

impl InterceptionPoint {
    pub const ALL: [InterceptionPoint; NUM_POINTS] = [
        Self::PreRouting,
        Self::LocalIn,
        Self::Forward,
        Self::LocalOut,
        Self::PostRouting,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PreRouting => "pre_routing",
            Self::LocalIn => "local_in",
            Self::Forward => "forward",
            Self::LocalOut => "local_out",
            Self::PostRouting => "post_routing",
        }
    }
}

impl TryFrom<i32> for InterceptionPoint {
    type Error = NetHookError;

    fn try_from(hooknum: i32) -> Result<Self, Self::Error> {
        usize::try_from(hooknum)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(NetHookError::InvalidPoint(hooknum))
    }
}

impl From<InterceptionPoint> for i32 {
    fn from(point: InterceptionPoint) -> Self {
        point as i32
    }
}

impl fmt::Display for InterceptionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InterceptionPoint {
    type Err = NetHookError;

    /// Accepts a point name (`post_routing`, `POST-ROUTING`, `postrouting`)
    /// or its hook number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(hooknum) = s.trim().parse::<i32>() {
            return Self::try_from(hooknum);
        }

        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        Self::ALL
            .into_iter()
            .find(|p| p.name().replace('_', "") == normalized)
            .ok_or_else(|| NetHookError::config(format!("unknown interception point '{}'", s)))
    }
}
