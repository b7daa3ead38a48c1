//! Runtime tests against the simulated board
//!
//! Exercises the full path (init sequence, channels, unit reset, partial
//! reconfiguration) without hardware.

use hwrt_driver::chip::ControlOp;
use hwrt_driver::sim::{PortEvent, SimBoard};
use hwrt_driver::{Architecture, Bitstream, HwThread, HwrtError};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

#[test]
fn echo_round_trip_after_reset_release() {
    let board = SimBoard::new(2);
    let rt = board.runtime(Architecture::Zynq).expect("runtime");
    assert_eq!(rt.unit_count(), 2);
    assert!(board.control().in_reset(0));

    rt.system_reset().unwrap();
    rt.set_unit_reset(0, false).unwrap();
    assert!(!board.control().in_reset(0));

    let ch = rt.open(0).unwrap();
    ch.write(0x1234).unwrap();
    board.spawn_unit(0, |w| w + 1);
    assert_eq!(ch.read().unwrap(), 0x1235);
}

#[test]
fn open_beyond_unit_count() {
    let board = SimBoard::new(2);
    let rt = board.runtime(Architecture::Generic).unwrap();
    let err = rt.open(2).unwrap_err();
    assert!(matches!(err, HwrtError::ChannelOutOfRange { index: 2, count: 2 }));
}

#[test]
fn many_words_keep_order_per_channel() {
    let board = SimBoard::with_depth(3, 8);
    let rt = Arc::new(board.runtime(Architecture::Generic).unwrap());
    for unit in 0..3 {
        let offset = u32::try_from(unit).unwrap() * 1_000_000;
        board.spawn_unit(unit, move |w| w + offset);
    }

    let handles: Vec<_> = (0..3)
        .map(|unit| {
            let rt = Arc::clone(&rt);
            thread::spawn(move || {
                let ch = rt.open(unit).unwrap();
                let offset = u32::try_from(unit).unwrap() * 1_000_000;
                for w in 0..500u32 {
                    ch.write(w).unwrap();
                    assert_eq!(ch.read().unwrap(), w + offset);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn pipelined_writes_exceeding_fifo_depth() {
    let board = SimBoard::with_depth(1, 4);
    let rt = Arc::new(board.runtime(Architecture::Generic).unwrap());
    board.spawn_unit(0, |w| !w);

    let writer = {
        let rt = Arc::clone(&rt);
        thread::spawn(move || {
            let ch = rt.open(0).unwrap();
            for w in 0..64u32 {
                ch.write(w).unwrap();
            }
        })
    };

    let ch = rt.open(0).unwrap();
    let replies: Vec<u32> = (0..64).map(|_| ch.read().unwrap()).collect();
    writer.join().unwrap();

    let expected: Vec<u32> = (0..64u32).map(|w| !w).collect();
    assert_eq!(replies, expected);
}

#[test]
fn concurrent_hw_thread_creation_serializes_loads() {
    let board = SimBoard::new(4);
    let rt = Arc::new(board.runtime(Architecture::Zynq).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|slot| {
            let rt = Arc::clone(&rt);
            thread::spawn(move || {
                let bit = Bitstream::from_words(format!("slot{slot}"), &[0xAA99_5566; 64]);
                HwThread::create(&rt, slot, Some(&bit)).map(|t| t.slot())
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap().unwrap();
    }

    assert_eq!(board.port().max_concurrent(), 1);
    for slot in 0..4 {
        assert!(!board.control().in_reset(slot));
    }

    // Each session is SetPartial, Image, Poll..., Poll(true) from one thread
    let events = board.port().events();
    let mut sessions: HashMap<thread::ThreadId, usize> = HashMap::new();
    let mut current = None;
    for (tid, event) in events {
        match event {
            PortEvent::SetPartial => {
                assert!(current.is_none());
                current = Some(tid);
                *sessions.entry(tid).or_default() += 1;
            }
            PortEvent::Image(len) => {
                assert_eq!(current, Some(tid));
                assert_eq!(len, 256);
            }
            PortEvent::Poll(done) => {
                assert_eq!(current, Some(tid));
                if done {
                    current = None;
                }
            }
        }
    }
    assert_eq!(sessions.len(), 4);
    assert!(sessions.values().all(|&n| n == 1));
}

#[test]
fn cache_flush_only_on_microblaze() {
    let board = SimBoard::new(1);
    let rt = board.runtime(Architecture::Zynq).unwrap();
    rt.control().cache_flush().unwrap();
    assert!(!board.control().calls().iter().any(|(op, _)| *op == ControlOp::CacheFlush));

    let board = SimBoard::new(1);
    let rt = board.runtime(Architecture::Microblaze).unwrap();
    rt.control().cache_flush().unwrap();
    assert!(board.control().calls().iter().any(|(op, _)| *op == ControlOp::CacheFlush));
}

#[test]
fn reconfiguration_rejected_off_zynq() {
    let board = SimBoard::new(1);
    let rt = board.runtime(Architecture::Generic).unwrap();
    let err = rt
        .load_bitstream(&Bitstream::from_bytes("x", vec![1u8; 8]))
        .unwrap_err();
    assert!(matches!(err, HwrtError::Unimplemented { .. }));
    assert!(board.port().events().is_empty());
}
