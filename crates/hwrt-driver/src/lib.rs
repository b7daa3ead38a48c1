//! Userspace control layer for reconfigurable hardware units.
//!
//! Software threads talk to hardware units through per-unit OSIF FIFOs,
//! manage units through the process-control device, and reprogram slots
//! through the xdevcfg partial reconfiguration interface.
//!
//! # Layers
//!
//! ```text
//! Runtime ─┬─ OsifChannel[i] ── RegisterWindow ── MappedRegion (/dev/mem)
//!          │                 └─ OsifIntc        (/dev/reconos-osif-intc)
//!          ├─ ProcControl    ── ProcControlDevice (/dev/reconos-proc-control)
//!          └─ Reconfigurator ── XdevcfgPort       (/dev/xdevcfg + sysfs flags)
//! ```
//!
//! Every device sits behind a trait ([`RegisterBank`], [`InterruptWait`],
//! [`ControlPlane`], [`ConfigPort`]); [`sim::SimBoard`] implements them all in
//! software.
//!
//! # Quick start
//!
//! ```no_run
//! use hwrt_driver::{Runtime, RuntimeConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rt = Runtime::init(&RuntimeConfig::from_env()?)?;
//! println!("{} hardware units", rt.unit_count());
//!
//! rt.set_unit_reset(0, false)?;
//! let ch = rt.open(0)?;
//! ch.write(0x1234)?;
//! let reply = ch.read()?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod capabilities;
mod channel;
mod config;
mod control;
mod device;
mod error;
mod hwt;
pub mod mmio;
mod reconfig;
mod runtime;
pub mod sim;
mod wait;

/// Register, ioctl and sysfs constants (re-exported from hwrt-chip).
pub mod chip {
    pub use hwrt_chip::bank::{window_offset, BASE_ADDR, MAP_SIZE, MAX_UNITS};
    pub use hwrt_chip::control::{ArgKind, ControlOp, OSIF_INTC_WAIT};
    pub use hwrt_chip::osif::{OsifReg, WINDOW_SIZE};
}

pub use capabilities::{Architecture, Capabilities};
pub use channel::OsifChannel;
pub use config::{RuntimeConfig, XdevcfgPaths};
pub use control::{ControlPlane, ProcControl, ProcControlDevice};
pub use device::DeviceFile;
pub use error::{HwrtError, Result};
pub use hwt::HwThread;
pub use mmio::{MappedRegion, RegisterBank, RegisterWindow};
pub use reconfig::{Bitstream, ConfigPort, Reconfigurator, XdevcfgPort};
pub use runtime::{init_state, InitState, Runtime, RuntimeParts, RuntimeStats};
pub use wait::{InterruptWait, OsifIntc};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Architecture, Bitstream, Capabilities, HwThread, HwrtError, OsifChannel, Result,
        Runtime, RuntimeConfig,
    };
}
