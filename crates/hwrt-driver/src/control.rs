//! Process-control interface
//!
//! One handle per process routes typed queries and commands to the
//! process-control device: unit discovery, reset, translation statistics and
//! fault handling. The device is assumed to execute each call atomically, so
//! no host-side lock is taken.

use crate::capabilities::Capabilities;
use crate::device::DeviceFile;
use crate::error::{HwrtError, Result};
use hwrt_chip::control::{ArgKind, ControlOp};
use std::fmt::Debug;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Raw control-plane call, one per [`ControlOp`]
///
/// `arg` carries the unit index for [`ArgKind::Unit`] operations and is
/// ignored otherwise. The return value is what the device wrote back for
/// [`ArgKind::Out`] operations, `0` for the rest.
pub trait ControlPlane: Debug + Send + Sync {
    /// Issue one operation
    ///
    /// # Errors
    ///
    /// Returns `Control` if the device rejects the call.
    fn call(&self, op: ControlOp, arg: u32) -> Result<u32>;
}

impl<T: ControlPlane + ?Sized> ControlPlane for std::sync::Arc<T> {
    fn call(&self, op: ControlOp, arg: u32) -> Result<u32> {
        (**self).call(op, arg)
    }
}

/// `/dev/reconos-proc-control` ioctl device
#[derive(Debug)]
pub struct ProcControlDevice {
    dev: DeviceFile,
}

impl ProcControlDevice {
    /// Open the process-control device
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpen` if the device is missing or inaccessible.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            dev: DeviceFile::open("proc-control", path)?,
        })
    }
}

impl ControlPlane for ProcControlDevice {
    fn call(&self, op: ControlOp, arg: u32) -> Result<u32> {
        let fd = self.dev.as_raw_fd();
        let mut data: u32 = arg;

        // SAFETY: process-control ioctls necessary - the kernel driver owns the
        // hardware registers. Invariants: (1) fd valid for the lifetime of
        // self.dev; (2) for ArgKind::None the argument is NULL and the kernel
        // does not dereference it; (3) otherwise it points to a live u32
        // matching the 4-byte size encoded in the request code.
        let ret = unsafe {
            match op.arg() {
                ArgKind::None => libc::ioctl(fd, op.code() as _, std::ptr::null_mut::<libc::c_void>()),
                ArgKind::Out | ArgKind::Unit => libc::ioctl(fd, op.code() as _, &raw mut data),
            }
        };

        if ret < 0 {
            return Err(HwrtError::control(op.name(), std::io::Error::last_os_error()));
        }

        Ok(match op.arg() {
            ArgKind::Out => data,
            ArgKind::None | ArgKind::Unit => 0,
        })
    }
}

/// Typed process-control operations
#[derive(Debug)]
pub struct ProcControl {
    plane: Box<dyn ControlPlane>,
    caps: Capabilities,
    units: Option<usize>,
}

impl ProcControl {
    /// Wrap a control plane
    pub fn new(plane: Box<dyn ControlPlane>, caps: Capabilities) -> Self {
        Self {
            plane,
            caps,
            units: None,
        }
    }

    fn call(&self, op: ControlOp, arg: u32) -> Result<u32> {
        let value = self.plane.call(op, arg)?;
        tracing::debug!("[proc-control] {op}({arg}) -> {value:#x}");
        Ok(value)
    }

    /// Number of hardware units reported by the device
    ///
    /// # Errors
    ///
    /// Returns `Control` if the query fails.
    pub fn get_unit_count(&self) -> Result<usize> {
        Ok(self.call(ControlOp::GetUnitCount, 0)? as usize)
    }

    /// Query the unit count and bound later per-unit calls by it
    ///
    /// # Errors
    ///
    /// Returns `Control` if the query fails.
    pub fn discover_units(&mut self) -> Result<usize> {
        let count = self.get_unit_count()?;
        self.units = Some(count);
        Ok(count)
    }

    /// Unit count learned at initialization, if any
    pub const fn units(&self) -> Option<usize> {
        self.units
    }

    /// Memory-translation hits
    ///
    /// # Errors
    ///
    /// Returns `Control` if the query fails.
    pub fn get_translation_hits(&self) -> Result<u32> {
        self.call(ControlOp::GetTlbHits, 0)
    }

    /// Memory-translation misses
    ///
    /// # Errors
    ///
    /// Returns `Control` if the query fails.
    pub fn get_translation_misses(&self) -> Result<u32> {
        self.call(ControlOp::GetTlbMisses, 0)
    }

    /// Address of the last translation fault
    ///
    /// # Errors
    ///
    /// Returns `Control` if the query fails.
    pub fn get_fault_address(&self) -> Result<u32> {
        self.call(ControlOp::GetFaultAddr, 0)
    }

    /// Acknowledge the pending translation fault
    ///
    /// # Errors
    ///
    /// Returns `Control` if the command fails.
    pub fn clear_fault(&self) -> Result<()> {
        self.call(ControlOp::ClearPageFault, 0).map(drop)
    }

    /// Register the current address-translation root with the hardware
    ///
    /// # Errors
    ///
    /// Returns `Control` if the command fails.
    pub fn set_page_table_base(&self) -> Result<()> {
        self.call(ControlOp::SetPgdAddr, 0).map(drop)
    }

    /// Reset every unit and every FIFO state machine
    ///
    /// Goes through [`crate::Runtime::system_reset`] once channels exist.
    ///
    /// # Errors
    ///
    /// Returns `Control` if the command fails.
    pub(crate) fn system_reset(&self) -> Result<()> {
        tracing::info!("[proc-control] system reset");
        self.call(ControlOp::SysReset, 0).map(drop)
    }

    /// Assert (`true`) or release (`false`) reset of one unit
    ///
    /// Releasing reset is what lets a freshly configured unit start.
    ///
    /// # Errors
    ///
    /// Returns `UnitOutOfRange` if `index` exceeds the discovered unit
    /// count, `Control` if the command fails.
    pub fn set_unit_reset(&self, index: usize, asserted: bool) -> Result<()> {
        if let Some(count) = self.units {
            if index >= count {
                return Err(HwrtError::UnitOutOfRange { index, count });
            }
        }
        let unit = u32::try_from(index)
            .map_err(|_| HwrtError::control("set_unit_reset", format!("index {index} too large")))?;

        let op = if asserted {
            ControlOp::SetUnitReset
        } else {
            ControlOp::ClearUnitReset
        };
        tracing::info!(
            "[proc-control] unit {index} reset {}",
            if asserted { "asserted" } else { "released" }
        );
        self.call(op, unit).map(drop)
    }

    /// Flush the host cache, on platforms that have one
    ///
    /// Skipped without touching the device elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `Control` if the command fails.
    pub fn cache_flush(&self) -> Result<()> {
        if !self.caps.cache_flush {
            tracing::trace!("[proc-control] cache flush skipped on {}", self.caps.arch);
            return Ok(());
        }
        self.call(ControlOp::CacheFlush, 0).map(drop)
    }

    /// Capability set this handle was built with
    pub const fn capabilities(&self) -> &Capabilities {
        &self.caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Architecture;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Mutex<Vec<(ControlOp, u32)>>,
    }

    impl ControlPlane for Recorder {
        fn call(&self, op: ControlOp, arg: u32) -> Result<u32> {
            self.calls.lock().push((op, arg));
            Ok(match op {
                ControlOp::GetUnitCount => 3,
                ControlOp::GetFaultAddr => 0xBAD0_0000,
                _ => 0,
            })
        }
    }

    fn control(arch: Architecture) -> (ProcControl, std::sync::Arc<Recorder>) {
        let rec = std::sync::Arc::new(Recorder::default());
        let ctl = ProcControl::new(Box::new(std::sync::Arc::clone(&rec)), Capabilities::for_arch(arch));
        (ctl, rec)
    }

    #[test]
    fn unit_reset_routes_by_direction() {
        let (ctl, rec) = control(Architecture::Generic);
        ctl.set_unit_reset(2, true).unwrap();
        ctl.set_unit_reset(2, false).unwrap();
        assert_eq!(
            *rec.calls.lock(),
            vec![(ControlOp::SetUnitReset, 2), (ControlOp::ClearUnitReset, 2)]
        );
    }

    #[test]
    fn unit_reset_bounded_after_discovery() {
        let (mut ctl, rec) = control(Architecture::Generic);
        assert_eq!(ctl.discover_units().unwrap(), 3);
        assert_eq!(ctl.units(), Some(3));
        let err = ctl.set_unit_reset(3, false).unwrap_err();
        assert!(matches!(err, HwrtError::UnitOutOfRange { index: 3, count: 3 }));
        assert_eq!(rec.calls.lock().len(), 1);
    }

    #[test]
    fn cache_flush_only_where_supported() {
        let (ctl, rec) = control(Architecture::Zynq);
        ctl.cache_flush().unwrap();
        assert!(rec.calls.lock().is_empty());

        let (ctl, rec) = control(Architecture::Microblaze);
        ctl.cache_flush().unwrap();
        assert_eq!(*rec.calls.lock(), vec![(ControlOp::CacheFlush, 0)]);
    }

    #[test]
    fn queries_return_device_values() {
        let (ctl, _rec) = control(Architecture::Generic);
        assert_eq!(ctl.get_unit_count().unwrap(), 3);
        assert_eq!(ctl.get_fault_address().unwrap(), 0xBAD0_0000);
        assert_eq!(ctl.get_translation_hits().unwrap(), 0);
    }

    #[test]
    fn missing_device_is_reported() {
        let err = ProcControlDevice::open(Path::new("/nonexistent/proc-control")).unwrap_err();
        assert!(err.to_string().starts_with("[proc-control]"));
    }
}
