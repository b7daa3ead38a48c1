//! Partial reconfiguration manager
//!
//! Loads a partial bitstream through the device configuration interface:
//!
//! ```text
//! lock ─▶ mode flag '1' ─▶ write image ─▶ poll prog_done until '1' ─▶ unlock
//! ```
//!
//! The configuration port is a device-wide resource, so one load runs at a
//! time. The completion poll has no timeout: the fabric either finishes or
//! the process is killed.

use crate::capabilities::Capabilities;
use crate::config::XdevcfgPaths;
use crate::error::{HwrtError, Result};
use bytes::Bytes;
use hwrt_chip::xdevcfg;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Polls between scheduler yields while waiting for `prog_done`
const POLL_YIELD_INTERVAL: u64 = 1024;

/// One configuration session at a time, across every [`Reconfigurator`]
static RECONFIG_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Partial bitstream image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitstream {
    name: String,
    data: Bytes,
}

impl Bitstream {
    /// Wrap raw image bytes
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Wrap an image held as 32-bit configuration words
    pub fn from_words(name: impl Into<String>, words: &[u32]) -> Self {
        Self::from_bytes(name, Bytes::copy_from_slice(bytemuck::cast_slice(words)))
    }

    /// Read an image file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        tracing::debug!("Read bitstream {} ({} bytes)", path.display(), data.len());
        Ok(Self::from_bytes(path.display().to_string(), data))
    }

    /// Image name (file path or caller label)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw image
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Image size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The three steps of the configuration handshake
pub trait ConfigPort: Debug + Send + Sync {
    /// Select partial-image mode
    ///
    /// # Errors
    ///
    /// Returns an error if the mode control cannot be written.
    fn set_partial(&self) -> Result<()>;

    /// Hand the whole image to the configuration device
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened or written.
    fn write_image(&self, image: &[u8]) -> Result<()>;

    /// Whether programming has completed
    ///
    /// # Errors
    ///
    /// Returns an error if the completion indicator cannot be read.
    fn poll_done(&self) -> Result<bool>;
}

impl<T: ConfigPort + ?Sized> ConfigPort for std::sync::Arc<T> {
    fn set_partial(&self) -> Result<()> {
        (**self).set_partial()
    }

    fn write_image(&self, image: &[u8]) -> Result<()> {
        (**self).write_image(image)
    }

    fn poll_done(&self) -> Result<bool> {
        (**self).poll_done()
    }
}

/// `xdevcfg` sysfs/devfs implementation of [`ConfigPort`]
#[derive(Debug, Clone)]
pub struct XdevcfgPort {
    paths: XdevcfgPaths,
}

impl XdevcfgPort {
    /// Port over the given files
    pub const fn new(paths: XdevcfgPaths) -> Self {
        Self { paths }
    }

    fn write_file(path: &Path, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| HwrtError::device_open("xdevcfg", path, e))?;
        file.write_all(data).map_err(|e| {
            HwrtError::reconfiguration(format!("write to {} failed: {e}", path.display()))
        })
    }
}

impl ConfigPort for XdevcfgPort {
    fn set_partial(&self) -> Result<()> {
        Self::write_file(&self.paths.is_partial, &[xdevcfg::PARTIAL_FLAG])
    }

    fn write_image(&self, image: &[u8]) -> Result<()> {
        Self::write_file(&self.paths.device, image)
    }

    fn poll_done(&self) -> Result<bool> {
        let contents = std::fs::read(&self.paths.prog_done)
            .map_err(|e| HwrtError::device_open("xdevcfg", &self.paths.prog_done, e))?;
        Ok(xdevcfg::is_done(&contents))
    }
}

/// Serializes partial bitstream loads
#[derive(Debug)]
pub struct Reconfigurator {
    port: Box<dyn ConfigPort>,
    caps: Capabilities,
}

impl Reconfigurator {
    /// Manager over a configuration port
    pub fn new(port: Box<dyn ConfigPort>, caps: Capabilities) -> Self {
        Self {
            port,
            caps,
        }
    }

    /// Whether the platform supports runtime reconfiguration
    pub const fn is_supported(&self) -> bool {
        self.caps.partial_reconfig
    }

    /// Program a partial bitstream, blocking until the fabric reports done
    ///
    /// Only one load runs at a time in the whole process, whichever manager
    /// issues it; concurrent callers queue on the lock.
    ///
    /// # Errors
    ///
    /// Returns `Unimplemented` without touching the port when the platform
    /// cannot reconfigure, `Reconfiguration` for an empty image, and any
    /// port error. There is no partial success.
    pub fn load(&self, bitstream: &Bitstream) -> Result<()> {
        if !self.caps.partial_reconfig {
            return Err(HwrtError::Unimplemented {
                feature: "partial reconfiguration",
                arch: self.caps.arch.to_string(),
            });
        }
        if bitstream.is_empty() {
            return Err(HwrtError::reconfiguration(format!(
                "bitstream {} is empty",
                bitstream.name()
            )));
        }

        let _session = RECONFIG_LOCK.lock();
        let start = Instant::now();

        tracing::info!(
            "[xdevcfg] programming {} ({} bytes)",
            bitstream.name(),
            bitstream.len()
        );

        self.port.set_partial()?;
        self.port.write_image(bitstream.as_bytes())?;

        let mut polls: u64 = 0;
        while !self.port.poll_done()? {
            polls += 1;
            if polls % POLL_YIELD_INTERVAL == 0 {
                std::thread::yield_now();
            }
        }

        tracing::info!(
            "[xdevcfg] {} programmed in {:?} ({polls} polls)",
            bitstream.name(),
            start.elapsed()
        );
        Ok(())
    }
}
