//! Process-control device operations.
//!
//! The kernel driver behind `/dev/reconos-proc-control` exposes one ioctl per
//! operation. Codes follow the standard Linux `_IO`/`_IOR`/`_IOW` encoding
//! under the driver's magic byte:
//!
//! ```text
//! bits 31:30  direction (0 none, 1 write, 2 read)
//! bits 29:16  argument size
//! bits 15:8   magic
//! bits  7:0   number
//! ```

/// Magic byte of the process-control and interrupt-wait drivers.
pub const IOC_MAGIC: u8 = b'k';

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// Size of the `int`/`uint32_t` argument every data-carrying ioctl uses.
const ARG_SIZE: u32 = 4;

const fn ioc(dir: u32, nr: u8, size: u32) -> u32 {
    (dir << 30) | (size << 16) | ((IOC_MAGIC as u32) << 8) | nr as u32
}

/// How an operation uses its ioctl argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// No argument (`NULL`).
    None,
    /// Kernel writes a 32-bit result back.
    Out,
    /// Kernel reads a unit index.
    Unit,
}

/// One process-control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    /// Number of hardware units in the current design.
    GetUnitCount,
    /// Memory-translation hits since reset.
    GetTlbHits,
    /// Memory-translation misses since reset.
    GetTlbMisses,
    /// Virtual address of the last translation fault.
    GetFaultAddr,
    /// Acknowledge a translation fault and let the unit continue.
    ClearPageFault,
    /// Register the caller's page-table root with the translation unit.
    SetPgdAddr,
    /// Reset every unit and every FIFO state machine.
    SysReset,
    /// Hold one unit in reset.
    SetUnitReset,
    /// Release one unit from reset.
    ClearUnitReset,
    /// Flush the host cache in front of shared memory.
    CacheFlush,
}

impl ControlOp {
    /// Every operation, in driver numbering order.
    pub const ALL: [Self; 10] = [
        Self::GetUnitCount,
        Self::GetTlbHits,
        Self::GetTlbMisses,
        Self::GetFaultAddr,
        Self::ClearPageFault,
        Self::SetPgdAddr,
        Self::SysReset,
        Self::SetUnitReset,
        Self::ClearUnitReset,
        Self::CacheFlush,
    ];

    /// Argument convention.
    pub const fn arg(self) -> ArgKind {
        match self {
            Self::GetUnitCount | Self::GetTlbHits | Self::GetTlbMisses | Self::GetFaultAddr => {
                ArgKind::Out
            }
            Self::SetUnitReset | Self::ClearUnitReset => ArgKind::Unit,
            Self::ClearPageFault | Self::SetPgdAddr | Self::SysReset | Self::CacheFlush => {
                ArgKind::None
            }
        }
    }

    /// Driver-side operation number.
    pub const fn number(self) -> u8 {
        match self {
            Self::GetUnitCount => 0,
            Self::GetTlbHits => 1,
            Self::GetTlbMisses => 2,
            Self::GetFaultAddr => 3,
            Self::ClearPageFault => 4,
            Self::SetPgdAddr => 5,
            Self::SysReset => 6,
            Self::SetUnitReset => 7,
            Self::ClearUnitReset => 8,
            Self::CacheFlush => 9,
        }
    }

    /// Full ioctl request code.
    pub const fn code(self) -> u32 {
        match self.arg() {
            ArgKind::None => ioc(IOC_NONE, self.number(), 0),
            ArgKind::Out => ioc(IOC_READ, self.number(), ARG_SIZE),
            ArgKind::Unit => ioc(IOC_WRITE, self.number(), ARG_SIZE),
        }
    }

    /// Short name used in logs and error messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetUnitCount => "get_unit_count",
            Self::GetTlbHits => "get_tlb_hits",
            Self::GetTlbMisses => "get_tlb_misses",
            Self::GetFaultAddr => "get_fault_addr",
            Self::ClearPageFault => "clear_page_fault",
            Self::SetPgdAddr => "set_pgd_addr",
            Self::SysReset => "sys_reset",
            Self::SetUnitReset => "set_unit_reset",
            Self::ClearUnitReset => "clear_unit_reset",
            Self::CacheFlush => "cache_flush",
        }
    }
}

impl std::fmt::Display for ControlOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Interrupt-wait ioctl: blocks until the given unit's receive FIFO has data.
///
/// Argument is the unit index (`int`), read by the kernel.
pub const OSIF_INTC_WAIT: u32 = ioc(IOC_WRITE, 0x10, ARG_SIZE);
