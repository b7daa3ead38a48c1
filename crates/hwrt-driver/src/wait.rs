//! Interrupt wait primitive
//!
//! The receive side of every OSIF channel can raise an interrupt while its
//! FIFO holds data. A reader with nothing to read parks in the kernel until
//! that happens instead of spinning.

use crate::device::DeviceFile;
use crate::error::{HwrtError, Result};
use hwrt_chip::control::OSIF_INTC_WAIT;
use std::fmt::Debug;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Blocks the calling thread until a unit's receive FIFO signals data
pub trait InterruptWait: Debug + Send + Sync {
    /// Sleep until unit `index` raises its receive interrupt
    ///
    /// May return spuriously; callers recheck the FIFO status.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait itself fails (device gone).
    fn wait(&self, index: usize) -> Result<()>;
}

/// `/dev/reconos-osif-intc` interrupt controller device
#[derive(Debug)]
pub struct OsifIntc {
    dev: DeviceFile,
}

impl OsifIntc {
    /// Open the interrupt-wait device
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpen` if the device is missing or inaccessible.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            dev: DeviceFile::open("osif-intc", path)?,
        })
    }
}

impl InterruptWait for OsifIntc {
    fn wait(&self, index: usize) -> Result<()> {
        let mut unit = libc::c_int::try_from(index)
            .map_err(|_| HwrtError::control("osif_intc_wait", format!("index {index} too large")))?;

        tracing::trace!("[osif-intc] waiting on unit {index}");

        // SAFETY: OSIF_INTC_WAIT ioctl necessary - kernel sleeps until the
        // unit's interrupt fires. Invariants: (1) fd valid for the lifetime of
        // self.dev; (2) argument is a pointer to a live c_int the kernel only
        // reads; (3) code encodes _IOW with sizeof(int).
        let ret = unsafe {
            libc::ioctl(
                self.dev.as_raw_fd(),
                OSIF_INTC_WAIT as _,
                &raw mut unit,
            )
        };

        if ret < 0 {
            let err = std::io::Error::last_os_error();
            // A signal wakes the sleeper early; the caller rechecks the FIFO.
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(HwrtError::control("osif_intc_wait", err));
        }
        Ok(())
    }
}
