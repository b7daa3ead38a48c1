//! Memory-mapped OSIF register bank
//!
//! The FIFO registers of every unit live in one physical window mapped from
//! `/dev/mem`. All access goes through [`RegisterBank`] (bounds-checked,
//! volatile) and per-unit [`RegisterWindow`] views; nothing outside this
//! module touches the raw mapping.

// Hardware register access requires exact type casts for mmap APIs
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_ptr_alignment)]

use crate::device::DeviceFile;
use crate::error::{HwrtError, Result};
use hwrt_chip::osif::{OsifReg, WINDOW_SIZE};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fmt::Debug;
use std::os::unix::io::AsFd;
use std::ptr::NonNull;
use std::sync::Arc;

/// A block of 32-bit registers addressed by byte offset
///
/// Implemented by [`MappedRegion`] for real hardware and by the simulated
/// board in [`crate::sim`].
pub trait RegisterBank: Debug + Send + Sync {
    /// Size of the bank in bytes
    fn size(&self) -> usize;

    /// Read the register at `offset`
    ///
    /// # Errors
    ///
    /// Returns `RegisterOutOfBounds` if `offset + 4` exceeds the bank.
    fn read32(&self, offset: usize) -> Result<u32>;

    /// Write the register at `offset`
    ///
    /// # Errors
    ///
    /// Returns `RegisterOutOfBounds` if `offset + 4` exceeds the bank.
    fn write32(&self, offset: usize, value: u32) -> Result<()>;
}

/// Check a 32-bit access against a bank size
pub(crate) fn check_bounds(offset: usize, size: usize) -> Result<()> {
    if offset % 4 != 0 || offset.checked_add(4).is_none_or(|end| end > size) {
        return Err(HwrtError::RegisterOutOfBounds {
            offset,
            limit: size,
        });
    }
    Ok(())
}

/// Physical memory mapped through `/dev/mem`
pub struct MappedRegion {
    ptr: NonNull<u8>,
    size: usize,
    phys_base: u64,
    _mem: DeviceFile,
}

impl Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("size", &self.size)
            .field("phys_base", &format_args!("{:#x}", self.phys_base))
            .finish()
    }
}

// SAFETY: Send - the region owns its mapping; mmap'd memory is process-wide,
// so moving the handle between threads does not invalidate it.
unsafe impl Send for MappedRegion {}

// SAFETY: Sync - every access is a bounds-checked volatile read or write of a
// single aligned u32. Callers coordinate which registers they touch (one
// channel per window), the hardware serializes the rest.
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Map `size` bytes of physical memory at `phys_base`
    ///
    /// # Errors
    ///
    /// Returns `MapFailed` if `size` is zero, `phys_base` is not page aligned
    /// or `mmap` fails.
    pub fn map(mem: DeviceFile, phys_base: u64, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(HwrtError::map_failed("mapping size is 0"));
        }
        if phys_base % 4096 != 0 {
            return Err(HwrtError::map_failed(format!(
                "base {phys_base:#x} is not page aligned"
            )));
        }

        tracing::debug!(
            "Mapping {size:#x} bytes at {phys_base:#x} via {}",
            mem.path().display()
        );

        // SAFETY: mmap necessary for MMIO - maps the register bank into the
        // process. Invariants: (1) fd valid, owned by `mem` which we keep for
        // the lifetime of the mapping; (2) size non-zero, offset page aligned
        // (checked above); (3) MAP_SHARED so writes reach the device;
        // (4) rustix returns Err instead of MAP_FAILED.
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                mem.as_fd(),
                phys_base,
            )
        }
        .map_err(|e| HwrtError::map_failed(format!("mmap failed: {e}")))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| HwrtError::map_failed("mmap returned null"))?;

        tracing::info!("Mapped OSIF bank {phys_base:#x} ({size:#x} bytes) at {ptr:p}");

        Ok(Self {
            ptr,
            size,
            phys_base,
            _mem: mem,
        })
    }

    /// Physical base address
    pub const fn phys_base(&self) -> u64 {
        self.phys_base
    }
}

impl RegisterBank for MappedRegion {
    fn size(&self) -> usize {
        self.size
    }

    fn read32(&self, offset: usize) -> Result<u32> {
        check_bounds(offset, self.size)?;
        // SAFETY: read_volatile necessary for MMIO - hardware changes values
        // and reads have side effects (RECV pops). Invariants: (1) ptr from
        // mmap, valid for self.size; (2) offset + 4 <= size and 4-aligned
        // (checked); (3) mapping is page aligned so the u32 is aligned.
        Ok(unsafe { std::ptr::read_volatile(self.ptr.as_ptr().add(offset).cast::<u32>()) })
    }

    fn write32(&self, offset: usize, value: u32) -> Result<()> {
        check_bounds(offset, self.size)?;
        // SAFETY: write_volatile necessary for MMIO - writes push into the
        // hardware FIFO. Same invariants as read32.
        unsafe {
            std::ptr::write_volatile(self.ptr.as_ptr().add(offset).cast::<u32>(), value);
        }
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: munmap of exactly the range mmap returned; Drop runs once and
        // no RegisterWindow outlives the Arc holding this region.
        unsafe {
            let _ = munmap(self.ptr.as_ptr().cast(), self.size);
        }
        tracing::debug!("Unmapped OSIF bank {:#x}", self.phys_base);
    }
}

/// Fixed-size view of one unit's four FIFO registers
#[derive(Debug, Clone)]
pub struct RegisterWindow {
    bank: Arc<dyn RegisterBank>,
    base: usize,
}

impl RegisterWindow {
    /// View `WINDOW_SIZE` bytes of `bank` starting at `base`
    ///
    /// # Errors
    ///
    /// Returns `RegisterOutOfBounds` if the window does not fit in the bank.
    pub fn new(bank: Arc<dyn RegisterBank>, base: usize) -> Result<Self> {
        let limit = bank.size();
        if base.checked_add(WINDOW_SIZE).is_none_or(|end| end > limit) {
            return Err(HwrtError::RegisterOutOfBounds {
                offset: base,
                limit,
            });
        }
        Ok(Self { bank, base })
    }

    /// Byte offset of the window inside the bank
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Read one register
    ///
    /// # Errors
    ///
    /// Propagates bank errors.
    pub fn read(&self, reg: OsifReg) -> Result<u32> {
        self.bank.read32(self.base + reg.offset())
    }

    /// Write one register
    ///
    /// # Errors
    ///
    /// Propagates bank errors.
    pub fn write(&self, reg: OsifReg, value: u32) -> Result<()> {
        self.bank.write32(self.base + reg.offset(), value)
    }
}
