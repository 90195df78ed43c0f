//! Settings module for the interception engine and the `nethook` tool.
//!
//! This module contains the configuration file structure and the
//! command-line/serde option types that convert into filter and writer
//! descriptors.
//!
//! # Example
//!
//! ```rust
//! use nethook::settings::ConfigBuilder;
//! use nethook::network::filter::InterceptionPoint;
//!
//! let config = ConfigBuilder::new()
//!     .subscriber("all", InterceptionPoint::Forward)
//!     .build();
//! ```

pub mod builder;
pub mod config;
pub mod filter;
pub mod writer;

// Re-export commonly used types
pub use builder::ConfigBuilder;
pub use config::{Config, InterfaceConfig, SubscriberConfig};
pub use filter::FilterOptions;
pub use writer::WriterOptions;
