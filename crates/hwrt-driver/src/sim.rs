//! Simulated board
//!
//! A software stand-in for the fabric so the runtime can be exercised without
//! hardware:
//!
//! - [`SimOsif`] : FIFO register bank plus a level-triggered interrupt wait
//!   (a waiter wakes as soon as its unit's receive FIFO is non-empty)
//! - [`SimControl`] : process-control plane recording every call
//! - [`SimConfigPort`] : configuration port recording the handshake
//! - [`SimBoard`] : all three wired together, producing a [`Runtime`]
//!
//! The `hw_*` methods act as the hardware side of each FIFO.

use crate::capabilities::{Architecture, Capabilities};
use crate::control::ControlPlane;
use crate::error::{HwrtError, Result};
use crate::mmio::{check_bounds, RegisterBank};
use crate::reconfig::ConfigPort;
use crate::runtime::{Runtime, RuntimeParts};
use crate::wait::InterruptWait;
use hwrt_chip::control::ControlOp;
use hwrt_chip::osif::{self, OsifReg, WINDOW_SIZE};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

/// Default depth of each simulated FIFO
pub const DEFAULT_FIFO_DEPTH: usize = 128;

#[derive(Debug)]
struct SimFifo {
    to_sw: VecDeque<u32>,
    to_hw: VecDeque<u32>,
    recv_depth: usize,
    send_depth: usize,
    waiters: usize,
}

impl SimFifo {
    fn new(depth: usize) -> Self {
        Self {
            to_sw: VecDeque::new(),
            to_hw: VecDeque::new(),
            recv_depth: depth,
            send_depth: depth,
            waiters: 0,
        }
    }

    fn send_remaining(&self) -> usize {
        self.send_depth.saturating_sub(self.to_hw.len())
    }
}

/// Simulated OSIF register bank and interrupt controller
#[derive(Debug)]
pub struct SimOsif {
    fifos: Mutex<Vec<SimFifo>>,
    changed: Condvar,
    status_reads: Vec<AtomicU64>,
}

impl SimOsif {
    /// Bank with `units` windows and FIFOs of `depth` words each way
    pub fn new(units: usize, depth: usize) -> Self {
        Self {
            fifos: Mutex::new((0..units).map(|_| SimFifo::new(depth)).collect()),
            changed: Condvar::new(),
            status_reads: (0..units).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Number of unit windows
    pub fn units(&self) -> usize {
        self.status_reads.len()
    }

    /// Hardware pushes a word towards software; `false` if the FIFO is full
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a simulated unit.
    pub fn hw_push(&self, index: usize, word: u32) -> bool {
        let mut fifos = self.fifos.lock();
        let fifo = &mut fifos[index];
        if fifo.to_sw.len() >= fifo.recv_depth {
            return false;
        }
        fifo.to_sw.push_back(word);
        drop(fifos);
        self.changed.notify_all();
        true
    }

    /// Hardware pops the next word software sent, blocking until one arrives
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a simulated unit.
    pub fn hw_recv(&self, index: usize) -> u32 {
        let mut fifos = self.fifos.lock();
        loop {
            if let Some(word) = fifos[index].to_hw.pop_front() {
                drop(fifos);
                self.changed.notify_all();
                return word;
            }
            self.changed.wait(&mut fifos);
        }
    }

    /// Hardware pops the next word software sent, if any
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a simulated unit.
    pub fn hw_try_recv(&self, index: usize) -> Option<u32> {
        let word = self.fifos.lock()[index].to_hw.pop_front();
        if word.is_some() {
            self.changed.notify_all();
        }
        word
    }

    /// Change how many words the sw → hw FIFO accepts (0 = permanently full)
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a simulated unit.
    pub fn set_send_depth(&self, index: usize, depth: usize) {
        self.fifos.lock()[index].send_depth = depth;
        self.changed.notify_all();
    }

    /// Threads currently parked in [`InterruptWait::wait`] for `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a simulated unit.
    pub fn waiters(&self, index: usize) -> usize {
        self.fifos.lock()[index].waiters
    }

    /// Status register reads observed for `index` (both directions)
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a simulated unit.
    pub fn status_reads(&self, index: usize) -> u64 {
        self.status_reads[index].load(Ordering::Relaxed)
    }

    /// Drop every queued word, as a system reset does
    pub fn clear(&self) {
        for fifo in self.fifos.lock().iter_mut() {
            fifo.to_sw.clear();
            fifo.to_hw.clear();
        }
        self.changed.notify_all();
    }

    fn locate(&self, offset: usize) -> Result<(usize, OsifReg)> {
        check_bounds(offset, self.size())?;
        let reg = OsifReg::from_offset(offset % WINDOW_SIZE).ok_or(HwrtError::RegisterOutOfBounds {
            offset,
            limit: self.size(),
        })?;
        Ok((offset / WINDOW_SIZE, reg))
    }
}

impl RegisterBank for SimOsif {
    fn size(&self) -> usize {
        self.units() * WINDOW_SIZE
    }

    fn read32(&self, offset: usize) -> Result<u32> {
        let (index, reg) = self.locate(offset)?;
        let mut fifos = self.fifos.lock();
        let fifo = &mut fifos[index];
        let value = match reg {
            OsifReg::Recv => {
                let word = fifo.to_sw.pop_front().unwrap_or(0);
                drop(fifos);
                self.changed.notify_all();
                return Ok(word);
            }
            OsifReg::Send => 0,
            OsifReg::RecvStatus => {
                self.status_reads[index].fetch_add(1, Ordering::Relaxed);
                osif::encode_recv_status(fifo.to_sw.len())
            }
            OsifReg::SendStatus => {
                self.status_reads[index].fetch_add(1, Ordering::Relaxed);
                osif::encode_send_status(fifo.send_remaining())
            }
        };
        Ok(value)
    }

    fn write32(&self, offset: usize, value: u32) -> Result<()> {
        let (index, reg) = self.locate(offset)?;
        if reg != OsifReg::Send {
            return Ok(());
        }
        let mut fifos = self.fifos.lock();
        let fifo = &mut fifos[index];
        if fifo.send_remaining() == 0 {
            tracing::warn!("[sim] unit {index}: word {value:#x} written to full FIFO, dropped");
            return Ok(());
        }
        fifo.to_hw.push_back(value);
        drop(fifos);
        self.changed.notify_all();
        Ok(())
    }
}

impl InterruptWait for SimOsif {
    fn wait(&self, index: usize) -> Result<()> {
        let mut fifos = self.fifos.lock();
        if index >= fifos.len() {
            return Err(HwrtError::control("osif_intc_wait", format!("no unit {index}")));
        }
        fifos[index].waiters += 1;
        while fifos[index].to_sw.is_empty() {
            self.changed.wait(&mut fifos);
        }
        fifos[index].waiters -= 1;
        Ok(())
    }
}

#[derive(Debug)]
struct SimControlState {
    held: Vec<bool>,
    tlb_hits: u32,
    tlb_misses: u32,
    fault_addr: u32,
    calls: Vec<(ControlOp, u32)>,
}

/// Simulated process-control plane
#[derive(Debug)]
pub struct SimControl {
    osif: Arc<SimOsif>,
    state: Mutex<SimControlState>,
}

impl SimControl {
    /// Control plane for the units of `osif`; all units start held in reset
    pub fn new(osif: Arc<SimOsif>) -> Self {
        let units = osif.units();
        Self {
            osif,
            state: Mutex::new(SimControlState {
                held: vec![true; units],
                tlb_hits: 0,
                tlb_misses: 0,
                fault_addr: 0,
                calls: Vec::new(),
            }),
        }
    }

    /// Every call issued so far, in order
    pub fn calls(&self) -> Vec<(ControlOp, u32)> {
        self.state.lock().calls.clone()
    }

    /// Whether a unit is held in reset
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a simulated unit.
    pub fn in_reset(&self, index: usize) -> bool {
        self.state.lock().held[index]
    }

    /// Record a translation fault at `addr`
    pub fn raise_fault(&self, addr: u32) {
        self.state.lock().fault_addr = addr;
    }

    /// Set the translation counters
    pub fn set_translation_stats(&self, hits: u32, misses: u32) {
        let mut state = self.state.lock();
        state.tlb_hits = hits;
        state.tlb_misses = misses;
    }
}

impl ControlPlane for SimControl {
    fn call(&self, op: ControlOp, arg: u32) -> Result<u32> {
        let mut state = self.state.lock();
        state.calls.push((op, arg));
        let value = match op {
            ControlOp::GetUnitCount => u32::try_from(state.held.len())
                .map_err(|_| HwrtError::control(op.name(), "too many units"))?,
            ControlOp::GetTlbHits => state.tlb_hits,
            ControlOp::GetTlbMisses => state.tlb_misses,
            ControlOp::GetFaultAddr => state.fault_addr,
            ControlOp::ClearPageFault => {
                state.fault_addr = 0;
                0
            }
            ControlOp::SysReset => {
                state.held.iter_mut().for_each(|h| *h = true);
                state.tlb_hits = 0;
                state.tlb_misses = 0;
                state.fault_addr = 0;
                self.osif.clear();
                0
            }
            ControlOp::SetUnitReset | ControlOp::ClearUnitReset => {
                let held = op == ControlOp::SetUnitReset;
                let slot = state
                    .held
                    .get_mut(arg as usize)
                    .ok_or_else(|| HwrtError::control(op.name(), format!("no unit {arg}")))?;
                *slot = held;
                0
            }
            ControlOp::SetPgdAddr | ControlOp::CacheFlush => 0,
        };
        Ok(value)
    }
}

/// One step of the configuration handshake as seen by [`SimConfigPort`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEvent {
    /// Partial mode selected
    SetPartial,
    /// Image of this many bytes written
    Image(usize),
    /// Completion polled, with the answer given
    Poll(bool),
}

#[derive(Debug, Default)]
struct PortState {
    events: Vec<(ThreadId, PortEvent)>,
    polls_left: usize,
    active: usize,
    max_active: usize,
}

/// Simulated configuration port
#[derive(Debug)]
pub struct SimConfigPort {
    polls_until_done: usize,
    step_delay: Duration,
    state: Mutex<PortState>,
}

impl SimConfigPort {
    /// Port that reports done after `polls_until_done` negative polls
    pub fn new(polls_until_done: usize) -> Self {
        Self {
            polls_until_done,
            step_delay: Duration::ZERO,
            state: Mutex::new(PortState::default()),
        }
    }

    /// Sleep this long inside every step, widening race windows
    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Every step so far, tagged with the calling thread
    pub fn events(&self) -> Vec<(ThreadId, PortEvent)> {
        self.state.lock().events.clone()
    }

    /// Most sessions ever observed between mode select and completion
    pub fn max_concurrent(&self) -> usize {
        self.state.lock().max_active
    }

    fn record(&self, event: PortEvent) {
        self.state
            .lock()
            .events
            .push((std::thread::current().id(), event));
        if !self.step_delay.is_zero() {
            std::thread::sleep(self.step_delay);
        }
    }
}

impl ConfigPort for SimConfigPort {
    fn set_partial(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.polls_left = self.polls_until_done;
            state.active += 1;
            state.max_active = state.max_active.max(state.active);
        }
        self.record(PortEvent::SetPartial);
        Ok(())
    }

    fn write_image(&self, image: &[u8]) -> Result<()> {
        self.record(PortEvent::Image(image.len()));
        Ok(())
    }

    fn poll_done(&self) -> Result<bool> {
        let done = {
            let mut state = self.state.lock();
            if state.polls_left == 0 {
                state.active = state.active.saturating_sub(1);
                true
            } else {
                state.polls_left -= 1;
                false
            }
        };
        self.record(PortEvent::Poll(done));
        Ok(done)
    }
}

/// Simulated fabric: OSIF bank, control plane and configuration port
#[derive(Debug, Clone)]
pub struct SimBoard {
    osif: Arc<SimOsif>,
    control: Arc<SimControl>,
    port: Arc<SimConfigPort>,
}

impl SimBoard {
    /// Board with `units` hardware units and default FIFO depth
    pub fn new(units: usize) -> Self {
        Self::with_depth(units, DEFAULT_FIFO_DEPTH)
    }

    /// Board with `units` hardware units and FIFOs of `depth` words
    pub fn with_depth(units: usize, depth: usize) -> Self {
        let osif = Arc::new(SimOsif::new(units, depth));
        let control = Arc::new(SimControl::new(Arc::clone(&osif)));
        Self {
            osif,
            control,
            port: Arc::new(SimConfigPort::new(2)),
        }
    }

    /// FIFO bank (hardware side helpers)
    pub fn osif(&self) -> &Arc<SimOsif> {
        &self.osif
    }

    /// Control plane recorder
    pub fn control(&self) -> &Arc<SimControl> {
        &self.control
    }

    /// Configuration port recorder
    pub fn port(&self) -> &Arc<SimConfigPort> {
        &self.port
    }

    /// Bring up a runtime on this board
    ///
    /// # Errors
    ///
    /// Propagates initialization errors.
    pub fn runtime(&self, arch: Architecture) -> Result<Runtime> {
        Runtime::from_parts(RuntimeParts {
            control: Box::new(Arc::clone(&self.control)),
            intc: Arc::clone(&self.osif) as Arc<dyn InterruptWait>,
            bank: Arc::clone(&self.osif) as Arc<dyn RegisterBank>,
            config_port: Box::new(Arc::clone(&self.port)),
            caps: Capabilities::for_arch(arch),
        })
    }

    /// Spawn a hardware unit that answers every word `w` with `f(w)`
    ///
    /// The unit runs until the process exits.
    pub fn spawn_unit(
        &self,
        index: usize,
        f: impl Fn(u32) -> u32 + Send + 'static,
    ) -> std::thread::JoinHandle<()> {
        let osif = Arc::clone(&self.osif);
        std::thread::spawn(move || loop {
            let word = osif.hw_recv(index);
            while !osif.hw_push(index, f(word)) {
                std::thread::yield_now();
            }
        })
    }
}
