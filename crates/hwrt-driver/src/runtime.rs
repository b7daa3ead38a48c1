//! Runtime context and initialization sequence
//!
//! [`Runtime`] owns everything that used to be process-wide state: the
//! process-control handle, the unit count, the channel table and the
//! reconfiguration manager. It is built exactly once per process by
//! [`Runtime::init`]:
//!
//! ```text
//! open proc-control ─▶ open osif-intc ─▶ system reset ─▶ unit count
//!        ─▶ map OSIF bank ─▶ one channel per unit
//! ```
//!
//! Any failing step aborts initialization; the process-wide state stays
//! `Initializing` and a second attempt is refused.

use crate::capabilities::Capabilities;
use crate::channel::OsifChannel;
use crate::config::RuntimeConfig;
use crate::control::{ControlPlane, ProcControl, ProcControlDevice};
use crate::device::DeviceFile;
use crate::error::{HwrtError, Result};
use crate::mmio::{MappedRegion, RegisterBank, RegisterWindow};
use crate::reconfig::{Bitstream, ConfigPort, Reconfigurator, XdevcfgPort};
use crate::wait::{InterruptWait, OsifIntc};
use hwrt_chip::{bank, osif};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of the hardware runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InitState {
    /// [`Runtime::init`] has not been called
    Uninitialized = 0,
    /// Initialization started (or failed part-way)
    Initializing = 1,
    /// Devices open, channels allocated
    Ready = 2,
}

impl InitState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            _ => Self::Ready,
        }
    }
}

static INIT_STATE: AtomicU8 = AtomicU8::new(InitState::Uninitialized as u8);

/// Current state of the process-wide hardware runtime
pub fn init_state() -> InitState {
    InitState::from_u8(INIT_STATE.load(Ordering::Acquire))
}

/// Devices a runtime is assembled from
///
/// [`Runtime::init`] opens the real ones; [`crate::sim::SimBoard`] supplies
/// simulated ones.
#[derive(Debug)]
pub struct RuntimeParts {
    /// Process-control plane
    pub control: Box<dyn ControlPlane>,
    /// Interrupt wait primitive shared by all channels
    pub intc: Arc<dyn InterruptWait>,
    /// OSIF register bank
    pub bank: Arc<dyn RegisterBank>,
    /// Partial reconfiguration port
    pub config_port: Box<dyn ConfigPort>,
    /// Platform capabilities
    pub caps: Capabilities,
}

/// Snapshot of the process-control counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Hardware units
    pub units: usize,
    /// Memory-translation hits
    pub translation_hits: u32,
    /// Memory-translation misses
    pub translation_misses: u32,
    /// Last translation fault address (0 when none pending)
    pub fault_address: u32,
}

/// Initialized hardware runtime
#[derive(Debug)]
pub struct Runtime {
    caps: Capabilities,
    control: ProcControl,
    channels: Vec<OsifChannel>,
    reconfig: Reconfigurator,
}

impl Runtime {
    /// Bring up the hardware runtime
    ///
    /// Must be called once per process, before any channel or reset
    /// operation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if initialization was already attempted, and
    /// the error of the first failing step otherwise. Errors name the
    /// subsystem involved.
    pub fn init(config: &RuntimeConfig) -> Result<Self> {
        if let Err(prev) = INIT_STATE.compare_exchange(
            InitState::Uninitialized as u8,
            InitState::Initializing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(HwrtError::invalid_state(format!(
                "init already attempted ({:?})",
                InitState::from_u8(prev)
            )));
        }

        tracing::info!("Initializing hardware runtime ({})", config.arch);
        let caps = config.capabilities();

        let control = ProcControlDevice::open(&config.proc_control_dev)?;
        let intc = OsifIntc::open(&config.osif_intc_dev)?;

        let mut control = ProcControl::new(Box::new(control), caps);
        let units = Self::reset_and_discover(&mut control)?;

        let mem = DeviceFile::open_sync("osif", &config.mem_dev)?;
        let bank = MappedRegion::map(mem, config.osif_base, config.osif_map_size)?;

        let runtime = Self::assemble(
            control,
            Arc::new(intc),
            Arc::new(bank),
            Box::new(XdevcfgPort::new(config.xdevcfg.clone())),
            caps,
            units,
        )?;

        INIT_STATE.store(InitState::Ready as u8, Ordering::Release);
        Ok(runtime)
    }

    /// Run the initialization sequence over caller-supplied devices
    ///
    /// Does not touch the process-wide [`init_state`]; used for simulated
    /// boards.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step.
    pub fn from_parts(parts: RuntimeParts) -> Result<Self> {
        let RuntimeParts {
            control,
            intc,
            bank,
            config_port,
            caps,
        } = parts;

        let mut control = ProcControl::new(control, caps);
        let units = Self::reset_and_discover(&mut control)?;
        Self::assemble(control, intc, bank, config_port, caps, units)
    }

    fn reset_and_discover(control: &mut ProcControl) -> Result<usize> {
        control.system_reset()?;
        let units = control.discover_units()?;
        tracing::info!("Found {units} hardware units");
        Ok(units)
    }

    fn assemble(
        control: ProcControl,
        intc: Arc<dyn InterruptWait>,
        bank: Arc<dyn RegisterBank>,
        config_port: Box<dyn ConfigPort>,
        caps: Capabilities,
        units: usize,
    ) -> Result<Self> {
        let needed = units * osif::WINDOW_SIZE;
        if needed > bank.size() {
            return Err(HwrtError::map_failed(format!(
                "{units} units need {needed:#x} bytes, bank has {:#x}",
                bank.size()
            )));
        }

        let channels = (0..units)
            .map(|index| {
                let regs = RegisterWindow::new(Arc::clone(&bank), bank::window_offset(index))?;
                Ok(OsifChannel::new(index, regs, Arc::clone(&intc)))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Runtime ready: {units} channels, {caps:?}");

        Ok(Self {
            caps,
            control,
            channels,
            reconfig: Reconfigurator::new(config_port, caps),
        })
    }

    /// Number of hardware units
    pub fn unit_count(&self) -> usize {
        self.channels.len()
    }

    /// Channel of unit `index`
    ///
    /// Binding only: channels are allocated at init.
    ///
    /// # Errors
    ///
    /// Returns `ChannelOutOfRange` if `index >= unit_count()`.
    pub fn open(&self, index: usize) -> Result<&OsifChannel> {
        tracing::debug!("[osif-{index}] opening ...");
        self.channels
            .get(index)
            .ok_or(HwrtError::ChannelOutOfRange {
                index,
                count: self.channels.len(),
            })
    }

    /// All channels, by index
    pub fn channels(&self) -> &[OsifChannel] {
        &self.channels
    }

    /// Process-control handle
    pub const fn control(&self) -> &ProcControl {
        &self.control
    }

    /// Reconfiguration manager
    pub const fn reconfigurator(&self) -> &Reconfigurator {
        &self.reconfig
    }

    /// Platform capabilities
    pub const fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Reset every unit and FIFO, leaving all units held in reset
    ///
    /// Cached FIFO counts of every channel are discarded, so the next read
    /// consults the status register again.
    ///
    /// # Errors
    ///
    /// Returns `Control` if the reset call fails.
    pub fn system_reset(&self) -> Result<()> {
        self.control.system_reset()?;
        for ch in &self.channels {
            ch.invalidate();
        }
        Ok(())
    }

        /// Program a partial bitstream
    ///
    /// # Errors
    ///
    /// See [`Reconfigurator::load`].
    pub fn load_bitstream(&self, bitstream: &Bitstream) -> Result<()> {
        self.reconfig.load(bitstream)
    }

    /// Assert or release reset of one unit
    ///
    /// # Errors
    ///
    /// Returns `UnitOutOfRange` for unknown units, `Control` on failure.
    pub fn set_unit_reset(&self, index: usize, asserted: bool) -> Result<()> {
        self.control.set_unit_reset(index, asserted)
    }

    /// Snapshot of translation and fault counters
    ///
    /// # Errors
    ///
    /// Returns `Control` if a query fails.
    pub fn stats(&self) -> Result<RuntimeStats> {
        Ok(RuntimeStats {
            units: self.unit_count(),
            translation_hits: self.control.get_translation_hits()?,
            translation_misses: self.control.get_translation_misses()?,
            fault_address: self.control.get_fault_address()?,
        })
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        tracing::info!("Releasing {} channels", self.channels.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Architecture;
    use crate::sim::{SimBoard, SimOsif};
    use hwrt_chip::control::ControlOp;

    #[test]
    fn init_resets_before_counting_units() {
        let board = SimBoard::new(4);
        let rt = board.runtime(Architecture::Generic).unwrap();
        assert_eq!(rt.unit_count(), 4);
        assert_eq!(rt.control().units(), Some(4));
        assert_eq!(
            board.control().calls(),
            vec![(ControlOp::SysReset, 0), (ControlOp::GetUnitCount, 0)]
        );
    }

    #[test]
    fn channels_map_consecutive_windows() {
        let board = SimBoard::new(3);
        let rt = board.runtime(Architecture::Generic).unwrap();
        for (i, ch) in rt.channels().iter().enumerate() {
            assert_eq!(ch.index(), i);
        }
    }

    #[test]
    fn bank_too_small_for_units() {
        let board = SimBoard::new(4);
        let parts = RuntimeParts {
            control: Box::new(Arc::clone(board.control())),
            intc: Arc::clone(board.osif()) as Arc<dyn InterruptWait>,
            bank: Arc::new(SimOsif::new(2, 8)),
            config_port: Box::new(Arc::clone(board.port())),
            caps: Capabilities::for_arch(Architecture::Generic),
        };
        let err = Runtime::from_parts(parts).unwrap_err();
        assert!(matches!(err, HwrtError::MapFailed { .. }));
    }

    #[test]
    fn stats_snapshot() {
        let board = SimBoard::new(2);
        let rt = board.runtime(Architecture::Generic).unwrap();
        board.control().set_translation_stats(10, 3);
        board.control().raise_fault(0x1000_2000);

        let stats = rt.stats().unwrap();
        assert_eq!(
            stats,
            RuntimeStats {
                units: 2,
                translation_hits: 10,
                translation_misses: 3,
                fault_address: 0x1000_2000,
            }
        );

        rt.control().clear_fault().unwrap();
        assert_eq!(rt.stats().unwrap().fault_address, 0);
    }

    #[test]
    fn unit_reset_out_of_range() {
        let board = SimBoard::new(2);
        let rt = board.runtime(Architecture::Generic).unwrap();
        let err = rt.set_unit_reset(2, false).unwrap_err();
        assert!(matches!(err, HwrtError::UnitOutOfRange { index: 2, count: 2 }));
        rt.set_unit_reset(1, false).unwrap();
        assert!(!board.control().in_reset(1));
    }
}
