//! Hardware threads
//!
//! A hardware thread is a unit brought out of reset with a known page-table
//! base, optionally after its slot has been reprogrammed.

use crate::channel::OsifChannel;
use crate::error::Result;
use crate::reconfig::Bitstream;
use crate::runtime::Runtime;

/// Running hardware thread bound to one slot
#[derive(Debug)]
pub struct HwThread<'rt> {
    runtime: &'rt Runtime,
    slot: usize,
}

impl<'rt> HwThread<'rt> {
    /// Start the unit in `slot`
    ///
    /// Holds the unit in reset, programs `bitstream` if given, registers the
    /// page-table base, then releases reset.
    ///
    /// # Errors
    ///
    /// Returns `ChannelOutOfRange` for unknown slots, and any control or
    /// reconfiguration error. The unit stays in reset on failure.
    pub fn create(runtime: &'rt Runtime, slot: usize, bitstream: Option<&Bitstream>) -> Result<Self> {
        runtime.open(slot)?;
        runtime.set_unit_reset(slot, true)?;

        if let Some(bitstream) = bitstream {
            runtime.load_bitstream(bitstream)?;
        }

        runtime.control().set_page_table_base()?;
        runtime.set_unit_reset(slot, false)?;

        tracing::info!("[hwt-{slot}] started");
        Ok(Self { runtime, slot })
    }

    /// Slot index
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Channel of this thread's slot
    ///
    /// # Errors
    ///
    /// Never fails for a created thread.
    pub fn channel(&self) -> Result<&'rt OsifChannel> {
        self.runtime.open(self.slot)
    }

    /// Send one word to the thread
    ///
    /// # Errors
    ///
    /// Propagates channel errors.
    pub fn send(&self, word: u32) -> Result<()> {
        self.channel()?.write(word)
    }

    /// Receive one word from the thread
    ///
    /// # Errors
    ///
    /// Propagates channel errors.
    pub fn recv(&self) -> Result<u32> {
        self.channel()?.read()
    }

    /// Put the unit back into reset
    ///
    /// # Errors
    ///
    /// Returns `Control` if the reset call fails.
    pub fn halt(self) -> Result<()> {
        tracing::info!("[hwt-{}] halting", self.slot);
        self.runtime.set_unit_reset(self.slot, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Architecture;
    use crate::error::HwrtError;
    use crate::sim::{PortEvent, SimBoard};
    use hwrt_chip::control::ControlOp;

    #[test]
    fn create_sequence_without_bitstream() {
        let board = SimBoard::new(2);
        let rt = board.runtime(Architecture::Generic).unwrap();

        let hwt = HwThread::create(&rt, 1, None).unwrap();
        assert_eq!(hwt.slot(), 1);
        assert!(!board.control().in_reset(1));
        assert!(board.control().in_reset(0));

        let calls = board.control().calls();
        assert_eq!(
            &calls[2..],
            &[
                (ControlOp::SetUnitReset, 1),
                (ControlOp::SetPgdAddr, 0),
                (ControlOp::ClearUnitReset, 1),
            ]
        );
        assert!(board.port().events().is_empty());

        hwt.halt().unwrap();
        assert!(board.control().in_reset(1));
    }

    #[test]
    fn create_loads_bitstream_on_zynq() {
        let board = SimBoard::new(1);
        let rt = board.runtime(Architecture::Zynq).unwrap();
        let bit = Bitstream::from_bytes("sort", vec![0u8; 16]);

        HwThread::create(&rt, 0, Some(&bit)).unwrap();

        let events: Vec<PortEvent> = board.port().events().into_iter().map(|(_, e)| e).collect();
        assert_eq!(events[0], PortEvent::SetPartial);
        assert_eq!(events[1], PortEvent::Image(16));
        assert_eq!(events.last(), Some(&PortEvent::Poll(true)));
    }

    #[test]
    fn failed_load_keeps_unit_in_reset() {
        let board = SimBoard::new(1);
        let rt = board.runtime(Architecture::Microblaze).unwrap();
        let bit = Bitstream::from_bytes("sort", vec![0u8; 16]);

        let err = HwThread::create(&rt, 0, Some(&bit)).unwrap_err();
        assert!(matches!(err, HwrtError::Unimplemented { .. }));
        assert!(board.control().in_reset(0));
    }

    #[test]
    fn unknown_slot() {
        let board = SimBoard::new(1);
        let rt = board.runtime(Architecture::Generic).unwrap();
        let err = HwThread::create(&rt, 3, None).unwrap_err();
        assert!(matches!(err, HwrtError::ChannelOutOfRange { index: 3, count: 1 }));
    }

    #[test]
    fn echo_through_thread() {
        let board = SimBoard::new(1);
        let rt = board.runtime(Architecture::Generic).unwrap();
        let hwt = HwThread::create(&rt, 0, None).unwrap();
        board.spawn_unit(0, |w| w ^ 0xFFFF_0000);

        hwt.send(0x0000_1234).unwrap();
        assert_eq!(hwt.recv().unwrap(), 0xFFFF_1234);
    }
}
