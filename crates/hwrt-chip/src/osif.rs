//! OSIF FIFO register window.
//!
//! Every hardware unit exposes four 32-bit registers, one after another:
//!
//! ```text
//! offset  register        direction   meaning
//! ──────  ──────────────  ─────────   ────────────────────────────────────
//!  0x0    RECV            hw → sw     pop one word from the receive FIFO
//!  0x4    SEND            sw → hw     push one word into the send FIFO
//!  0x8    RECV_STATUS     read-only   bit 31 empty, bits 15:0 fill - 1
//!  0xC    SEND_STATUS     read-only   bit 31 full,  bits 15:0 remaining - 1
//! ```
//!
//! The count fields are biased by one: a non-empty FIFO holding a single
//! word reports `0` in bits 15:0.

/// Size in bytes of one unit's register window.
pub const WINDOW_SIZE: usize = 0x10;

/// Receive-status bit set while the hw → sw FIFO is empty.
pub const RECV_STATUS_EMPTY: u32 = 1 << 31;
/// Send-status bit set while the sw → hw FIFO is full.
pub const SEND_STATUS_FULL: u32 = 1 << 31;

/// Fill field of the receive-status register.
pub const RECV_STATUS_FILL_MASK: u32 = 0xFFFF;
/// Remaining-capacity field of the send-status register.
pub const SEND_STATUS_REM_MASK: u32 = 0xFFFF;

/// Largest count the biased 16-bit fields can express.
pub const MAX_COUNT: u32 = RECV_STATUS_FILL_MASK + 1;

/// One of the four registers of a unit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsifReg {
    /// Receive data (hw → sw).
    Recv,
    /// Send data (sw → hw).
    Send,
    /// Receive FIFO status.
    RecvStatus,
    /// Send FIFO status.
    SendStatus,
}

impl OsifReg {
    /// All registers in window order.
    pub const ALL: [Self; 4] = [Self::Recv, Self::Send, Self::RecvStatus, Self::SendStatus];

    /// Byte offset inside the unit window.
    pub const fn offset(self) -> usize {
        match self {
            Self::Recv => 0x0,
            Self::Send => 0x4,
            Self::RecvStatus => 0x8,
            Self::SendStatus => 0xC,
        }
    }

    /// Register at a byte offset inside the window, if any.
    pub const fn from_offset(offset: usize) -> Option<Self> {
        match offset {
            0x0 => Some(Self::Recv),
            0x4 => Some(Self::Send),
            0x8 => Some(Self::RecvStatus),
            0xC => Some(Self::SendStatus),
            _ => None,
        }
    }
}

/// Number of words ready to be read, decoded from `RECV_STATUS`.
pub const fn decode_fill(status: u32) -> u32 {
    if status & RECV_STATUS_EMPTY != 0 {
        0
    } else {
        (status & RECV_STATUS_FILL_MASK) + 1
    }
}

/// Number of free slots for writing, decoded from `SEND_STATUS`.
pub const fn decode_remaining(status: u32) -> u32 {
    if status & SEND_STATUS_FULL != 0 {
        0
    } else {
        (status & SEND_STATUS_REM_MASK) + 1
    }
}

/// `RECV_STATUS` value a FIFO holding `fill` words presents.
///
/// Counts above [`MAX_COUNT`] saturate.
pub const fn encode_recv_status(fill: usize) -> u32 {
    encode_biased(fill, RECV_STATUS_EMPTY, RECV_STATUS_FILL_MASK)
}

/// `SEND_STATUS` value a FIFO with `remaining` free slots presents.
///
/// Counts above [`MAX_COUNT`] saturate.
pub const fn encode_send_status(remaining: usize) -> u32 {
    encode_biased(remaining, SEND_STATUS_FULL, SEND_STATUS_REM_MASK)
}

#[allow(clippy::cast_possible_truncation)]
const fn encode_biased(count: usize, zero_flag: u32, mask: u32) -> u32 {
    if count == 0 {
        zero_flag
    } else if count > MAX_COUNT as usize {
        mask
    } else {
        (count as u32 - 1) & mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_fill_the_window() {
        for reg in OsifReg::ALL {
            assert!(reg.offset() + 4 <= WINDOW_SIZE);
            assert_eq!(OsifReg::from_offset(reg.offset()), Some(reg));
        }
        assert_eq!(OsifReg::from_offset(0x2), None);
        assert_eq!(OsifReg::from_offset(WINDOW_SIZE), None);
    }

    #[test]
    fn empty_flag_wins_over_count() {
        assert_eq!(decode_fill(RECV_STATUS_EMPTY), 0);
        assert_eq!(decode_fill(RECV_STATUS_EMPTY | 0x0042), 0);
        assert_eq!(decode_remaining(SEND_STATUS_FULL | 0xFFFF), 0);
    }

    #[test]
    fn counts_are_biased_by_one() {
        assert_eq!(decode_fill(0x0000), 1);
        assert_eq!(decode_fill(0x0007), 8);
        assert_eq!(decode_remaining(0x0000), 1);
        assert_eq!(decode_remaining(0x00FF), 256);
    }

    #[test]
    fn bits_outside_the_field_are_ignored() {
        assert_eq!(decode_fill(0x1234_0003), 4);
        assert_eq!(decode_remaining(0x7FFF_0000), 1);
    }

    #[test]
    fn full_field_decodes_to_max_count() {
        // Field boundary: 0xFFFF means 65536 words, not zero.
        assert_eq!(decode_fill(RECV_STATUS_FILL_MASK), MAX_COUNT);
        assert_eq!(decode_remaining(SEND_STATUS_REM_MASK), MAX_COUNT);
    }

    #[test]
    fn encoding_matches_decoding() {
        for n in [0usize, 1, 2, 17, 0xFFFF, 0x1_0000] {
            assert_eq!(decode_fill(encode_recv_status(n)) as usize, n);
            assert_eq!(decode_remaining(encode_send_status(n)) as usize, n);
        }
        assert_eq!(decode_fill(encode_recv_status(0x2_0000)), MAX_COUNT);
    }
}
