//! Core network functionality.
//!
//! Packet buffers, header views, interface identities and the contract with
//! the host forwarding engine.

pub mod device;
pub mod headers;
pub mod host;
pub mod memory_host;
pub mod packet;

// Re-export commonly used types
pub use device::{DeviceRef, MacAddr, NetDevice};
pub use headers::{EthHeader, PacketHeaders, PacketType, ETH_HLEN};
pub use host::PacketHost;
pub use memory_host::{CapturePath, Captured, MemoryHost};
pub use packet::PacketBuf;
