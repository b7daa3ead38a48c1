//! Device file handles
//!
//! Opening goes through `std::fs::OpenOptions` with `rustix::fs::OFlags`
//! supplying the Linux-specific flags (`O_SYNC` for `/dev/mem`).

use rustix::fs::OFlags;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use crate::error::{HwrtError, Result};

/// Open device file, read/write
#[derive(Debug)]
pub struct DeviceFile {
    subsystem: &'static str,
    path: PathBuf,
    file: File,
}

impl DeviceFile {
    /// Open a device read/write
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpen` naming `subsystem` if the file cannot be opened.
    pub fn open(subsystem: &'static str, path: &Path) -> Result<Self> {
        Self::open_with(subsystem, path, OFlags::empty())
    }

    /// Open a device read/write with synchronous I/O
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpen` naming `subsystem` if the file cannot be opened.
    pub fn open_sync(subsystem: &'static str, path: &Path) -> Result<Self> {
        Self::open_with(subsystem, path, OFlags::SYNC)
    }

    fn open_with(subsystem: &'static str, path: &Path, flags: OFlags) -> Result<Self> {
        tracing::debug!("[{subsystem}] opening {}", path.display());

        // OFlags bits are small positive values and always fit an i32.
        #[allow(clippy::cast_possible_wrap)]
        let custom = flags.bits() as i32;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(custom)
            .open(path)
            .map_err(|e| HwrtError::device_open(subsystem, path, e))?;

        tracing::info!("[{subsystem}] opened {}", path.display());

        Ok(Self {
            subsystem,
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path the device was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subsystem that owns the handle
    pub const fn subsystem(&self) -> &'static str {
        self.subsystem
    }
}

impl AsFd for DeviceFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for DeviceFile {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Drop for DeviceFile {
    fn drop(&mut self) {
        tracing::debug!("[{}] closing {}", self.subsystem, self.path.display());
    }
}
