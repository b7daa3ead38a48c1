//! `hwrt` : command-line interface for the hardware runtime.
//!
//! ```text
//! USAGE:
//!   hwrt info                        Unit count, capabilities, counters
//!   hwrt reset                       Reset the whole fabric
//!   hwrt reset --unit N [--release]  Assert (or release) reset of one unit
//!   hwrt fault [--clear]             Show (or clear) the pending page fault
//!   hwrt load <bitstream>            Program a partial bitstream
//!   hwrt flush                       Flush the host cache (Microblaze only)
//! ```
//!
//! Device paths and platform come from the `HWRT_*` environment variables.
//! Only a bare `reset` runs the full init sequence; the other commands talk to
//! the devices directly so counters and running units are left alone.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hwrt_driver::{
    Bitstream, ProcControl, ProcControlDevice, Reconfigurator, Runtime, RuntimeConfig,
    XdevcfgPort,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hwrt", about = "Reconfigurable hardware runtime CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print unit count, platform capabilities and translation counters.
    Info,
    /// Reset the fabric, or a single unit with --unit.
    Reset {
        /// Unit index.
        #[arg(long)]
        unit: Option<usize>,
        /// Release the unit from reset instead of asserting it.
        #[arg(long, requires = "unit")]
        release: bool,
    },
    /// Show the last translation fault address.
    Fault {
        /// Clear the pending fault afterwards.
        #[arg(long)]
        clear: bool,
    },
    /// Program a partial bitstream (Zynq only).
    Load {
        /// Bitstream file.
        bitstream: PathBuf,
    },
    /// Flush the host data cache (Microblaze only; no-op elsewhere).
    Flush,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = RuntimeConfig::from_env().context("reading HWRT_* configuration")?;

    match cli.command {
        Cmd::Info => {
            let control = open_control(&config)?;
            cmd_info(&control, &config)?;
        }
        Cmd::Reset {
            unit: Some(index),
            release,
        } => {
            let mut control = open_control(&config)?;
            control.discover_units()?;
            cmd_unit_reset(&control, index, release)?;
        }
        Cmd::Reset { unit: None, .. } => {
            let rt = Runtime::init(&config).context("initializing hardware runtime")?;
            rt.system_reset()?;
            println!("Fabric reset ({} units held)", rt.unit_count());
        }
        Cmd::Fault { clear } => {
            let control = open_control(&config)?;
            cmd_fault(&control, clear)?;
        }
        Cmd::Load { bitstream } => cmd_load(&config, &bitstream)?,
        Cmd::Flush => {
            let control = open_control(&config)?;
            cmd_flush(&control)?;
        }
    }

    Ok(())
}

/// Process-control handle without the init sequence (no fabric reset)
fn open_control(config: &RuntimeConfig) -> Result<ProcControl> {
    let dev = ProcControlDevice::open(&config.proc_control_dev)?;
    Ok(ProcControl::new(Box::new(dev), config.capabilities()))
}

fn cmd_info(control: &ProcControl, config: &RuntimeConfig) -> Result<()> {
    let caps = control.capabilities();

    println!("Platform     : {}", caps.arch);
    println!("Units        : {}", control.get_unit_count()?);
    println!(
        "OSIF bank    : {:#x} ({:#x} bytes via {})",
        config.osif_base,
        config.osif_map_size,
        config.mem_dev.display()
    );
    println!("Partial reconfig : {}", yes_no(caps.partial_reconfig));
    println!("Cache flush      : {}", yes_no(caps.cache_flush));
    println!();
    println!("TLB hits     : {}", control.get_translation_hits()?);
    println!("TLB misses   : {}", control.get_translation_misses()?);
    match control.get_fault_address()? {
        0 => println!("Page fault   : none"),
        addr => println!("Page fault   : {addr:#010x}"),
    }

    Ok(())
}

fn cmd_unit_reset(control: &ProcControl, index: usize, release: bool) -> Result<()> {
    control.set_unit_reset(index, !release)?;
    let action = if release { "released from" } else { "held in" };
    println!("Unit {index} {action} reset");
    Ok(())
}

/// Report the pending fault; returns the address read before any clear
fn cmd_fault(control: &ProcControl, clear: bool) -> Result<u32> {
    let addr = control.get_fault_address()?;
    if addr == 0 {
        println!("No pending page fault");
    } else {
        println!("Page fault at {addr:#010x}");
    }
    if clear {
        control.clear_fault()?;
        println!("Cleared.");
    }
    Ok(addr)
}

fn cmd_load(config: &RuntimeConfig, path: &std::path::Path) -> Result<()> {
    let reconfig = Reconfigurator::new(
        Box::new(XdevcfgPort::new(config.xdevcfg.clone())),
        config.capabilities(),
    );
    let bitstream = Bitstream::from_file(path)?;
    println!("Programming {} ({} bytes) ...", bitstream.name(), bitstream.len());
    reconfig.load(&bitstream)?;
    println!("Done.");
    Ok(())
}

fn cmd_flush(control: &ProcControl) -> Result<()> {
    let caps = control.capabilities();
    if !caps.cache_flush {
        println!("No cache flush on {}; nothing to do", caps.arch);
        return Ok(());
    }
    control.cache_flush()?;
    println!("Cache flushed.");
    Ok(())
}

const fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}
