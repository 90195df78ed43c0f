//! Filters and the subscriber registry they are matched through.

pub mod descriptor;
pub mod point;
pub mod registry;

pub use descriptor::{Filter, FilterDescriptor, MatchMask};
pub use point::{InterceptionPoint, NUM_POINTS};
pub use registry::{FilterRegistry, SubscriberContext, SubscriberHandle, SubscriberId};
