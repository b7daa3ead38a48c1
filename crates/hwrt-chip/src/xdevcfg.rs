//! Partial reconfiguration through the Zynq device configuration interface.
//!
//! The `xdevcfg` driver programs the fabric from whatever is written to its
//! character device. Before a partial image the mode file must be set, and
//! afterwards `prog_done` flips to `'1'` once the fabric accepted the image.
//!
//! ```text
//! echo -n 1 > /sys/class/xdevcfg/xdevcfg/device/is_partial_bitstream
//! cat image.bin > /dev/xdevcfg
//! until [ "$(cat /sys/class/xdevcfg/xdevcfg/device/prog_done)" = 1 ]; do :; done
//! ```

/// Mode file: `'1'` selects partial images.
pub const IS_PARTIAL_PATH: &str = "/sys/class/xdevcfg/xdevcfg/device/is_partial_bitstream";

/// Character device accepting the raw image.
pub const DEVICE_PATH: &str = "/dev/xdevcfg";

/// Completion file: reads `'1'` once programming finished.
pub const PROG_DONE_PATH: &str = "/sys/class/xdevcfg/xdevcfg/device/prog_done";

/// Byte written to the mode file to select partial programming.
pub const PARTIAL_FLAG: u8 = b'1';

/// First byte of `prog_done` when programming has finished.
pub const DONE_FLAG: u8 = b'1';

/// Whether the contents of `prog_done` report completion.
pub fn is_done(contents: &[u8]) -> bool {
    contents.first() == Some(&DONE_FLAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_flag_parsing() {
        assert!(is_done(b"1\n"));
        assert!(is_done(b"1"));
        assert!(!is_done(b"0\n"));
        assert!(!is_done(b""));
    }
}
