//! OSIF FIFO channel
//!
//! One channel per hardware unit. The two directions behave differently on
//! purpose:
//!
//! - **read** (hw → sw) parks the caller on the interrupt wait primitive
//!   while the receive FIFO is empty.
//! - **write** (sw → hw) spins on the send status register; there is no
//!   send-side interrupt and the hardware is expected to drain promptly.
//!
//! Words are delivered in FIFO order per direction. Channels share the
//! register mapping but only ever touch their own window.

use crate::error::Result;
use crate::mmio::RegisterWindow;
use crate::wait::InterruptWait;
use hwrt_chip::osif::{self, OsifReg};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Channel to one hardware unit
#[derive(Debug)]
pub struct OsifChannel {
    index: usize,
    regs: RegisterWindow,
    intc: Arc<dyn InterruptWait>,
    /// Words known to be readable; held for the whole read so readers queue.
    fill: Mutex<u32>,
    /// Free slots last seen; held for the whole write so writers queue.
    remaining: Mutex<u32>,
    /// Set by a fabric reset; `fill` no longer describes the FIFO.
    fill_stale: AtomicBool,
}

impl OsifChannel {
    pub(crate) fn new(index: usize, regs: RegisterWindow, intc: Arc<dyn InterruptWait>) -> Self {
        Self {
            index,
            regs,
            intc,
            fill: Mutex::new(0),
            remaining: Mutex::new(0),
            fill_stale: AtomicBool::new(false),
        }
    }

    /// Unit index
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Drop cached FIFO counts after the fabric was reset
    pub(crate) fn invalidate(&self) {
        self.fill_stale.store(true, Ordering::Release);
        tracing::debug!("[osif-{}] cached counts invalidated", self.index);
    }

    fn hw2sw_fill(&self) -> Result<u32> {
        Ok(osif::decode_fill(self.regs.read(OsifReg::RecvStatus)?))
    }

    fn sw2hw_remaining(&self) -> Result<u32> {
        Ok(osif::decode_remaining(self.regs.read(OsifReg::SendStatus)?))
    }

    /// Receive one word, sleeping until the unit sends one
    ///
    /// # Errors
    ///
    /// Returns an error if a register access or the interrupt wait fails.
    pub fn read(&self) -> Result<u32> {
        let mut fill = self.fill.lock();

        if self.fill_stale.swap(false, Ordering::AcqRel) {
            *fill = 0;
        }

        if *fill == 0 {
            tracing::debug!("[osif-{}] reading, waiting for data ...", self.index);

            *fill = self.hw2sw_fill()?;
            while *fill == 0 {
                self.intc.wait(self.index)?;
                *fill = self.hw2sw_fill()?;
            }
        }

        let word = self.regs.read(OsifReg::Recv)?;
        *fill -= 1;

        tracing::debug!("[osif-{}] read {word:#x}", self.index);
        Ok(word)
    }

    /// Send one word, spinning while the send FIFO is full
    ///
    /// # Errors
    ///
    /// Returns an error if a register access fails.
    pub fn write(&self, word: u32) -> Result<()> {
        let mut remaining = self.remaining.lock();

        tracing::debug!("[osif-{}] writing {word:#x} ...", self.index);

        loop {
            *remaining = self.sw2hw_remaining()?;
            if *remaining > 0 {
                break;
            }
            std::hint::spin_loop();
        }

        self.regs.write(OsifReg::Send, word)?;
        *remaining -= 1;

        tracing::debug!("[osif-{}] write finished", self.index);
        Ok(())
    }

    /// Release the channel
    ///
    /// Channels live as long as the runtime; this only marks the end of use.
    pub fn close(&self) {
        tracing::debug!("[osif-{}] closing", self.index);
    }
}

#[cfg(test)]
mod tests {
    use crate::capabilities::Architecture;
    use crate::error::HwrtError;
    use crate::sim::SimBoard;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn open_is_bounded_by_unit_count() {
        let board = SimBoard::new(3);
        let rt = board.runtime(Architecture::Generic).unwrap();
        for i in 0..3 {
            assert_eq!(rt.open(i).unwrap().index(), i);
        }
        for i in [3, 4, 100, usize::MAX] {
            let err = rt.open(i).unwrap_err();
            assert!(matches!(err, HwrtError::ChannelOutOfRange { count: 3, .. }));
        }
    }

    #[test]
    fn words_arrive_in_order() {
        let board = SimBoard::new(1);
        let rt = board.runtime(Architecture::Generic).unwrap();
        let ch = rt.open(0).unwrap();

        for w in [10, 20, 30, 40] {
            ch.write(w).unwrap();
        }
        let sent: Vec<u32> = std::iter::from_fn(|| board.osif().hw_try_recv(0)).collect();
        assert_eq!(sent, vec![10, 20, 30, 40]);

        for w in sent {
            board.osif().hw_push(0, w);
        }
        let got: Vec<u32> = (0..4).map(|_| ch.read().unwrap()).collect();
        assert_eq!(got, vec![10, 20, 30, 40]);
    }

    #[test]
    fn read_sleeps_until_data_arrives() {
        let board = SimBoard::new(2);
        let rt = Arc::new(board.runtime(Architecture::Generic).unwrap());

        let reader = {
            let rt = Arc::clone(&rt);
            std::thread::spawn(move || rt.open(1).unwrap().read().unwrap())
        };

        // Reader must park on the interrupt, not spin on the status register.
        while board.osif().waiters(1) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        let reads_while_parked = board.osif().status_reads(1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(board.osif().status_reads(1), reads_while_parked);
        assert!(!reader.is_finished());

        board.osif().hw_push(1, 0xCAFE);
        assert_eq!(reader.join().unwrap(), 0xCAFE);
    }

    #[test]
    fn cached_fill_skips_status_reads() {
        let board = SimBoard::new(1);
        let rt = board.runtime(Architecture::Generic).unwrap();
        let ch = rt.open(0).unwrap();
        for w in 0..3 {
            board.osif().hw_push(0, w);
        }
        let before = board.osif().status_reads(0);
        assert_eq!(ch.read().unwrap(), 0);
        assert_eq!(ch.read().unwrap(), 1);
        assert_eq!(ch.read().unwrap(), 2);
        assert_eq!(board.osif().status_reads(0) - before, 1);
    }

    #[test]
    fn reset_discards_cached_fill() {
        let board = SimBoard::new(1);
        let rt = Arc::new(board.runtime(Architecture::Generic).unwrap());
        for w in [1, 2, 3] {
            board.osif().hw_push(0, w);
        }
        assert_eq!(rt.open(0).unwrap().read().unwrap(), 1);

        rt.system_reset().unwrap();

        let reader = {
            let rt = Arc::clone(&rt);
            std::thread::spawn(move || rt.open(0).unwrap().read().unwrap())
        };
        while board.osif().waiters(0) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!reader.is_finished());

        board.osif().hw_push(0, 0x99);
        assert_eq!(reader.join().unwrap(), 0x99);
    }

    #[test]
    fn write_spins_while_full() {
        let board = SimBoard::with_depth(1, 4);
        board.osif().set_send_depth(0, 0);
        let rt = Arc::new(board.runtime(Architecture::Generic).unwrap());

        let writer = {
            let rt = Arc::clone(&rt);
            std::thread::spawn(move || rt.open(0).unwrap().write(0x55).unwrap())
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!writer.is_finished());
        assert_eq!(board.osif().hw_try_recv(0), None);
        // Busy-wait: the status register keeps being polled, no interrupt park.
        assert!(board.osif().status_reads(0) > 1);
        assert_eq!(board.osif().waiters(0), 0);

        board.osif().set_send_depth(0, 4);
        writer.join().unwrap();
        assert_eq!(board.osif().hw_try_recv(0), Some(0x55));
    }

    #[test]
    fn channels_are_independent() {
        let board = SimBoard::new(2);
        let rt = board.runtime(Architecture::Generic).unwrap();
        rt.open(0).unwrap().write(1).unwrap();
        rt.open(1).unwrap().write(2).unwrap();
        assert_eq!(board.osif().hw_try_recv(1), Some(2));
        assert_eq!(board.osif().hw_try_recv(0), Some(1));
    }
}
