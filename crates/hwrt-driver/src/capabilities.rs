//! Platform capability set
//!
//! The two architecture-dependent behaviors of the runtime, partial
//! reconfiguration and host cache flushing, are resolved once when the
//! runtime is configured. Components ask the capability set instead of
//! branching on the build target.

use crate::error::{HwrtError, Result};

/// Host platform the fabric is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// ARM host with the `xdevcfg` device configuration interface
    Zynq,
    /// Soft-core host with a data cache in front of shared memory
    Microblaze,
    /// Anything else: no reconfiguration, coherent memory
    Generic,
}

impl Architecture {
    /// Parse an architecture name (`zynq`, `microblaze`, `generic`)
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "zynq" | "arm" => Ok(Self::Zynq),
            "microblaze" | "mb" => Ok(Self::Microblaze),
            "generic" | "none" => Ok(Self::Generic),
            other => Err(HwrtError::InvalidConfig {
                key: "HWRT_ARCH",
                value: other.to_string(),
                reason: "expected zynq, microblaze or generic".into(),
            }),
        }
    }

    /// Architecture implied by the build target
    pub fn from_target() -> Self {
        match std::env::consts::ARCH {
            "arm" => Self::Zynq,
            _ => Self::Generic,
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zynq => write!(f, "zynq"),
            Self::Microblaze => write!(f, "microblaze"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// Features available on the configured platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Platform the set was derived from
    pub arch: Architecture,
    /// Partial bitstreams can be loaded at runtime
    pub partial_reconfig: bool,
    /// A host cache sits between the CPU and shared memory
    pub cache_flush: bool,
}

impl Capabilities {
    /// Capability set of an architecture
    pub const fn for_arch(arch: Architecture) -> Self {
        match arch {
            Architecture::Zynq => Self {
                arch,
                partial_reconfig: true,
                cache_flush: false,
            },
            Architecture::Microblaze => Self {
                arch,
                partial_reconfig: false,
                cache_flush: true,
            },
            Architecture::Generic => Self {
                arch,
                partial_reconfig: false,
                cache_flush: false,
            },
        }
    }
}
