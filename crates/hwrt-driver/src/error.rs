//! Error types for runtime operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, HwrtError>;

/// Errors that can occur while driving the hardware units
#[derive(Debug, Error)]
pub enum HwrtError {
    /// A device file could not be opened
    #[error("[{subsystem}] cannot open {path}: {source}")]
    DeviceOpen {
        /// Subsystem that needed the device
        subsystem: &'static str,
        /// Path that was attempted
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The OSIF register bank could not be mapped
    #[error("[osif] failed to map register bank: {reason}")]
    MapFailed {
        /// Reason for failure
        reason: String,
    },

    /// Channel index outside the discovered unit range
    #[error("Channel index {index} out of range (have {count} units)")]
    ChannelOutOfRange {
        /// Requested index
        index: usize,
        /// Number of units discovered at init
        count: usize,
    },

    /// Unit index outside the discovered unit range
    #[error("[proc-control] unit {index} out of range (have {count} units)")]
    UnitOutOfRange {
        /// Requested unit
        index: usize,
        /// Number of units discovered at init
        count: usize,
    },

    /// Register access outside a mapped window
    #[error("Register access out of bounds: offset={offset:#x}, limit={limit:#x}")]
    RegisterOutOfBounds {
        /// Byte offset requested
        offset: usize,
        /// Size of the region
        limit: usize,
    },

    /// A process-control or interrupt-wait call failed
    #[error("[proc-control] {op} failed: {reason}")]
    Control {
        /// Operation name
        op: &'static str,
        /// Reason for failure
        reason: String,
    },

    /// Partial reconfiguration failed
    #[error("[xdevcfg] reconfiguration failed: {reason}")]
    Reconfiguration {
        /// Reason for failure
        reason: String,
    },

    /// Operation not available on this platform
    #[error("{feature} is not implemented on {arch}")]
    Unimplemented {
        /// Missing feature
        feature: &'static str,
        /// Platform the runtime was configured for
        arch: String,
    },

    /// Runtime is in the wrong lifecycle state
    #[error("Runtime in invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// Configuration value could not be parsed
    #[error("Invalid configuration {key}={value}: {reason}")]
    InvalidConfig {
        /// Environment key
        key: &'static str,
        /// Offending value
        value: String,
        /// Reason for rejection
        reason: String,
    },

    /// I/O error during device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl HwrtError {
    /// Create a device open error
    pub fn device_open(
        subsystem: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::DeviceOpen {
            subsystem,
            path: path.into(),
            source,
        }
    }

    /// Create a map failed error
    pub fn map_failed(reason: impl Into<String>) -> Self {
        Self::MapFailed {
            reason: reason.into(),
        }
    }

    /// Create a control failure
    pub fn control(op: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Control {
            op,
            reason: reason.to_string(),
        }
    }

    /// Create a reconfiguration failure
    pub fn reconfiguration(reason: impl Into<String>) -> Self {
        Self::Reconfiguration {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }
}
