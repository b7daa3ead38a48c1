//! Runtime configuration
//!
//! Board constants with environment overrides. Everything a runtime needs to
//! find its devices lives here; nothing below this module hardcodes a path.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HWRT_PROC_CONTROL_DEV` | `/dev/reconos-proc-control` |
//! | `HWRT_OSIF_INTC_DEV` | `/dev/reconos-osif-intc` |
//! | `HWRT_MEM_DEV` | `/dev/mem` |
//! | `HWRT_OSIF_BASE` | `0x75a00000` |
//! | `HWRT_ARCH` | from build target |

use crate::capabilities::{Architecture, Capabilities};
use crate::error::{HwrtError, Result};
use hwrt_chip::{bank, osif, xdevcfg};
use std::path::PathBuf;

/// Default process-control device
pub const PROC_CONTROL_DEV: &str = "/dev/reconos-proc-control";
/// Default interrupt-wait device
pub const OSIF_INTC_DEV: &str = "/dev/reconos-osif-intc";
/// Default physical memory device
pub const MEM_DEV: &str = "/dev/mem";

/// Files of the partial reconfiguration handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XdevcfgPaths {
    /// Mode flag file
    pub is_partial: PathBuf,
    /// Image sink
    pub device: PathBuf,
    /// Completion indicator
    pub prog_done: PathBuf,
}

impl Default for XdevcfgPaths {
    fn default() -> Self {
        Self {
            is_partial: PathBuf::from(xdevcfg::IS_PARTIAL_PATH),
            device: PathBuf::from(xdevcfg::DEVICE_PATH),
            prog_done: PathBuf::from(xdevcfg::PROG_DONE_PATH),
        }
    }
}

/// Configuration consumed by [`crate::Runtime::init`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Process-control device
    pub proc_control_dev: PathBuf,
    /// Interrupt-wait device
    pub osif_intc_dev: PathBuf,
    /// Physical memory device used to map the OSIF bank
    pub mem_dev: PathBuf,
    /// Physical base of the OSIF bank
    pub osif_base: u64,
    /// Bytes mapped at `osif_base`
    pub osif_map_size: usize,
    /// Reconfiguration files
    pub xdevcfg: XdevcfgPaths,
    /// Host platform
    pub arch: Architecture,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            proc_control_dev: PathBuf::from(PROC_CONTROL_DEV),
            osif_intc_dev: PathBuf::from(OSIF_INTC_DEV),
            mem_dev: PathBuf::from(MEM_DEV),
            osif_base: bank::BASE_ADDR,
            osif_map_size: bank::MAP_SIZE,
            xdevcfg: XdevcfgPaths::default(),
            arch: Architecture::from_target(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults with `HWRT_*` environment overrides applied
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if an override cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides taken from `lookup`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if an override cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup("HWRT_PROC_CONTROL_DEV") {
            config.proc_control_dev = PathBuf::from(path);
        }
        if let Some(path) = lookup("HWRT_OSIF_INTC_DEV") {
            config.osif_intc_dev = PathBuf::from(path);
        }
        if let Some(path) = lookup("HWRT_MEM_DEV") {
            config.mem_dev = PathBuf::from(path);
        }
        if let Some(base) = lookup("HWRT_OSIF_BASE") {
            config.osif_base = parse_addr("HWRT_OSIF_BASE", &base)?;
        }
        if let Some(arch) = lookup("HWRT_ARCH") {
            config.arch = Architecture::parse(&arch)?;
        }

        tracing::debug!("Runtime config: {config:?}");
        Ok(config)
    }

    /// Capability set of the configured platform
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities::for_arch(self.arch)
    }

    /// Number of unit windows the mapping can hold
    pub const fn max_units(&self) -> usize {
        self.osif_map_size / osif::WINDOW_SIZE
    }
}

fn parse_addr(key: &'static str, value: &str) -> Result<u64> {
    let trimmed = value.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|e| HwrtError::InvalidConfig {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
