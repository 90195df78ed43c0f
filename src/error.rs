use thiserror::Error;

use crate::network::filter::SubscriberId;

#[derive(Debug, Error)]
pub enum NetHookError {
    /// Filter names an interception point outside the supported set
    #[error("Invalid interception point: {0}")]
    InvalidPoint(i32),

    /// Reinjection requested for a subscriber without a writer
    #[error("Subscriber {0} has no write mode configured")]
    NotConfigured(SubscriberId),

    /// Writer destination did not resolve to a live interface
    #[error("Interface resolution failed: {0}")]
    ResolutionFailed(String),

    /// Session I/O issued before the matching control operation
    #[error("Bad session state: {0}")]
    BadState(&'static str),

    /// Read buffer cannot hold the queued packet, which has been discarded
    #[error("Buffer too small: packet is {needed} bytes, buffer holds {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Blocking read cancelled before a packet arrived
    #[error("Interrupted while waiting for a packet")]
    Interrupted,

    /// Allocation failure on the write path
    #[error("Out of memory allocating {0}")]
    OutOfMemory(&'static str),

    /// Written frame is too short to carry a link-layer header
    #[error("Frame of {0} bytes is shorter than a link-layer header")]
    FrameTooShort(usize),

    /// Interface transmit slot or queue is busy
    #[error("Device {0} is busy")]
    DeviceBusy(String),

    /// Interface is not accepting packets
    #[error("Device {0} is down")]
    DeviceDown(String),

    /// The host refused to install a hook
    #[error("Failed to register hook at {point}: {reason}")]
    HookRegistration { point: String, reason: String },

    /// Control operation on a session that is no longer registered
    #[error("Unknown session {0}")]
    UnknownSession(SubscriberId),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON trace or statistics encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenient Result type alias using `NetHookError`.
pub type Result<T> = std::result::Result<T, NetHookError>;

const EINVAL: i32 = 22;
const EBADF: i32 = 9;
const ENOMEM: i32 = 12;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;
const ENETDOWN: i32 = 100;
const EFAULT: i32 = 14;
const EIO: i32 = 5;
const ERESTARTSYS: i32 = 512;

impl NetHookError {
    /// Creates a configuration error with a descriptive message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the errno a character-device front end would report for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidPoint(_) | Self::BufferTooSmall { .. } | Self::FrameTooShort(_) => EINVAL,
            Self::Config(_) | Self::Json(_) => EINVAL,
            Self::NotConfigured(_) | Self::BadState(_) | Self::UnknownSession(_) => EBADF,
            Self::ResolutionFailed(_) => ENODEV,
            Self::Interrupted => ERESTARTSYS,
            Self::OutOfMemory(_) => ENOMEM,
            Self::DeviceBusy(_) => EBUSY,
            Self::DeviceDown(_) => ENETDOWN,
            Self::HookRegistration { .. } => EFAULT,
            Self::Io(_) => EIO,
        }
    }

    /// Whether retrying the same call may succeed without reconfiguration.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Interrupted | Self::OutOfMemory(_) | Self::DeviceBusy(_)
        )
    }
}
