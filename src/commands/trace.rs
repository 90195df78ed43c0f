//! Packet trace files replayed through the engine.
//!
//! A trace is a JSON array of records:
//!
//! ```json
//! [{"point": "post_routing", "out_dev": "eth0", "data": "RQAAKAAA..."}]
//! ```
//!
//! `data` is base64 and starts at the network header, as packets appear at
//! an interception point.

use crate::error::{NetHookError, Result};
use crate::network::core::{MacAddr, PacketBuf, PacketHost};
use crate::network::filter::InterceptionPoint;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceRecord {
    pub point: InterceptionPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_dev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dev: Option<String>,
    /// Next hop already resolved by the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighbour: Option<MacAddr>,
    pub data: String,
}

impl TraceRecord {
    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| NetHookError::config(format!("bad trace data: {}", e)))
    }

    /// Builds the packet as the host would hand it to the callback. The
    /// packet belongs to the outgoing interface if there is one.
    pub fn to_packet(&self, host: &dyn PacketHost) -> Result<PacketBuf> {
        let mut packet = PacketBuf::from_network(&self.decode()?)?;
        let dev_name = self.out_dev.as_ref().or(self.in_dev.as_ref());
        if let Some(name) = dev_name {
            let dev = host.device_by_name(name).ok_or_else(|| {
                NetHookError::config(format!("trace refers to unknown interface '{}'", name))
            })?;
            packet.set_dev(dev);
        }
        if let Some(neighbour) = self.neighbour {
            packet.set_neighbour(neighbour);
        }
        Ok(packet)
    }
}

pub fn load_trace(path: &Path) -> Result<Vec<TraceRecord>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
