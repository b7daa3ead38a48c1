//! Hardware validation tests
//!
//! Run on the target board with the reconos kernel modules loaded:
//! `cargo test -p hwrt-driver -- --ignored`

use hwrt_driver::{Runtime, RuntimeConfig};

fn runtime() -> Runtime {
    let config = RuntimeConfig::from_env().expect("config");
    Runtime::init(&config).expect("Runtime init")
}

#[test]
#[ignore] // Requires hardware
fn test_init_and_stats() {
    let rt = runtime();
    let stats = rt.stats().expect("stats");
    println!("Units: {}", stats.units);
    println!("  TLB hits: {}", stats.translation_hits);
    println!("  TLB misses: {}", stats.translation_misses);
    println!("  Fault address: {:#x}", stats.fault_address);
    assert!(stats.units > 0);
}

#[test]
#[ignore] // Requires hardware
fn test_unit_reset_cycle() {
    let rt = runtime();
    for ch in rt.channels() {
        rt.set_unit_reset(ch.index(), true).expect("assert reset");
        rt.set_unit_reset(ch.index(), false).expect("release reset");
        println!("osif-{}: reset cycled", ch.index());
    }
    assert!(rt.set_unit_reset(rt.unit_count(), true).is_err());
}
