//! Physical placement of the OSIF FIFO register bank.
//!
//! ```text
//! 0x75A0_0000  ┌──────────────────────┐  unit 0 window (16 B)
//! 0x75A0_0010  ├──────────────────────┤  unit 1 window
//!     ...      │         ...          │
//! 0x75A0_FFF0  └──────────────────────┘  unit 4095 window
//! ```
//!
//! The whole bank is mapped once, through `/dev/mem`, as a single
//! 64 KB region. Each hardware unit owns one [`crate::osif::WINDOW_SIZE`]
//! slice of it.

use crate::osif::WINDOW_SIZE;

/// Physical base address of the register bank.
pub const BASE_ADDR: u64 = 0x75A0_0000;

/// Size of the mapping established at initialization.
pub const MAP_SIZE: usize = 0x1_0000;

/// Upper bound on units addressable through one mapping.
pub const MAX_UNITS: usize = MAP_SIZE / WINDOW_SIZE;

/// Byte offset of a unit's window inside the bank.
pub const fn window_offset(index: usize) -> usize {
    index * WINDOW_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_tile_the_mapping() {
        assert_eq!(window_offset(0), 0);
        assert_eq!(window_offset(1), 0x10);
        assert_eq!(window_offset(MAX_UNITS - 1) + WINDOW_SIZE, MAP_SIZE);
    }

    #[test]
    fn base_is_page_aligned() {
        assert_eq!(BASE_ADDR % 4096, 0);
    }
}
