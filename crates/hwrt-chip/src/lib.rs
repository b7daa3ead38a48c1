//! Silicon model of the OSIF hardware/software interface.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the fabric as seen from the host: the FIFO register bank,
//! status-word decoding, process-control ioctl codes and the sysfs/devfs
//! paths of the partial reconfiguration interface.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`bank`] | Physical placement of the OSIF register bank |
//! | [`osif`] | Per-unit register window layout and status decoding |
//! | [`control`] | Process-control device operations and ioctl codes |
//! | [`xdevcfg`] | Partial reconfiguration device paths and handshake bytes |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bank;
pub mod control;
pub mod osif;
pub mod xdevcfg;
