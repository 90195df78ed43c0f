//! Packet processing: interception, queuing, reinjection and sessions.

pub mod interceptor;
pub mod loop_guard;
pub mod queue;
pub mod reinject;
pub mod session;
pub mod stats;

pub use interceptor::Verdict;
pub use queue::Interrupter;
pub use reinject::{WriteMode, WriterConfig, WriterDescriptor};
pub use session::{ControlRequest, Session};
pub use stats::{InterceptStats, StatsSnapshot};
