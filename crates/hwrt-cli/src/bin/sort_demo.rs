//! Sort demo: sorts a buffer with a mix of software and hardware threads.
//!
//! ```text
//! sort_demo <num_hw_threads> <num_sw_threads> <num_of_blocks>
//! ```
//!
//! The buffer is `num_of_blocks * 2048` descending words. Block jobs go into a
//! shared mailbox; software threads sort a block in place, hardware delegate
//! threads stream it through their unit's channel and read the sorted block
//! back. Once every block is acknowledged the blocks are merged bottom-up and
//! checked against a reference sort.
//!
//! Hardware protocol per job: `len`, `len` data words out; `len` sorted words
//! back. The word `0xFFFF_FFFF` in place of `len` stops the unit.
//!
//! With `HWRT_SIM=1` the hardware units are simulated in software.

use anyhow::{bail, Context, Result};
use hwrt_driver::sim::SimBoard;
use hwrt_driver::{Architecture, HwThread, Runtime, RuntimeConfig};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const BLOCK_SIZE: usize = 2048;

/// Job word that stops a worker
const STOP: u32 = u32::MAX;

const MAX_REPORTED_MISMATCHES: usize = 10;

const USAGE: &str = "
Sort demo
---------

Sorts a buffer full of data with a variable number of sw and hw threads.

Usage:
    sort_demo <num_hw_threads> <num_sw_threads> <num_of_blocks>

    <num_hw_threads> - Number of hardware threads to create. The maximum number is
                       limited by the hardware design.
    <num_sw_threads> - Number of software threads to create.
    <num_of_blocks>  - Number of blocks to create and sort. This must be a multiple of 2.

Set HWRT_SIM=1 to run the hardware threads on a simulated board.
";

/// `print!` followed by a flush, so progress dots show up as they happen
macro_rules! progress {
    ($($arg:tt)*) => {
        emit(&mut std::io::stdout(), format_args!($($arg)*))
    };
}

/// Write and flush; progress output is best effort
fn emit(out: &mut impl Write, args: std::fmt::Arguments<'_>) {
    if let Err(e) = out.write_fmt(args).and_then(|()| out.flush()) {
        tracing::debug!("progress output failed: {e}");
    }
}

/// Blocking multi-producer multi-consumer queue
struct Mailbox<T> {
    queue: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Mailbox<T> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    fn put(&self, item: T) {
        self.queue.lock().push_back(item);
        self.ready.notify_one();
    }

    fn get(&self) -> T {
        let mut queue = self.queue.lock();
        loop {
            if let Some(item) = queue.pop_front() {
                return item;
            }
            self.ready.wait(&mut queue);
        }
    }
}

struct Args {
    hw_threads: usize,
    sw_threads: usize,
    blocks: usize,
}

impl Args {
    /// `None` means print usage and exit cleanly
    fn parse(args: &[String]) -> Option<Self> {
        let [_, hw, sw, blocks] = args else {
            return None;
        };
        let parsed = Self {
            hw_threads: hw.parse().ok()?,
            sw_threads: sw.parse().ok()?,
            blocks: blocks.parse().ok()?,
        };
        if parsed.blocks % 2 != 0 {
            return None;
        }
        if parsed.blocks > 0 && parsed.hw_threads + parsed.sw_threads == 0 {
            return None;
        }
        Some(parsed)
    }
}

/// Shared state of one sort run
struct Jobs {
    queue: Mailbox<u32>,
    acks: Mailbox<Result<u32>>,
    blocks: Vec<Mutex<Vec<u32>>>,
}

impl Jobs {
    fn new(blocks: Vec<Vec<u32>>) -> Self {
        Self {
            queue: Mailbox::new(),
            acks: Mailbox::new(),
            blocks: blocks.into_iter().map(Mutex::new).collect(),
        }
    }

    fn block(&self, job: u32) -> &Mutex<Vec<u32>> {
        &self.blocks[job as usize]
    }
}

fn sw_worker(jobs: &Jobs) {
    loop {
        let job = jobs.queue.get();
        if job == STOP {
            break;
        }
        jobs.block(job).lock().sort_unstable();
        jobs.acks.put(Ok(job));
    }
}

fn hw_delegate(hwt: &HwThread<'_>, jobs: &Jobs) {
    loop {
        let job = jobs.queue.get();
        if job == STOP {
            if let Err(e) = hwt.send(STOP) {
                tracing::warn!("[hwt-{}] stop not delivered: {e}", hwt.slot());
            }
            break;
        }
        let result = sort_on_unit(hwt, &mut jobs.block(job).lock()).map(|()| job);
        let failed = result.is_err();
        jobs.acks.put(result);
        if failed {
            break;
        }
    }
}

fn sort_on_unit(hwt: &HwThread<'_>, block: &mut [u32]) -> Result<()> {
    hwt.send(u32::try_from(block.len())?)?;
    for &word in block.iter() {
        hwt.send(word)?;
    }
    for word in block.iter_mut() {
        *word = hwt.recv()?;
    }
    Ok(())
}

/// Hardware side of a simulated sort unit
fn spawn_sim_sorter(board: &SimBoard, index: usize) {
    let osif = Arc::clone(board.osif());
    std::thread::spawn(move || loop {
        let len = osif.hw_recv(index);
        if len == STOP {
            break;
        }
        let mut block: Vec<u32> = (0..len).map(|_| osif.hw_recv(index)).collect();
        block.sort_unstable();
        for word in block {
            while !osif.hw_push(index, word) {
                std::thread::yield_now();
            }
        }
    });
}

/// Merge `block`-sized sorted runs of `data` bottom-up
fn merge_blocks(data: &mut [u32], block: usize) {
    let n = data.len();
    let mut tmp = Vec::with_capacity(n);
    let mut width = block.max(1);
    while width < n {
        for start in (0..n).step_by(2 * width) {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            if mid < end {
                merge_runs(&mut data[start..end], mid - start, &mut tmp);
            }
        }
        width *= 2;
    }
}

/// Merge the sorted halves `run[..split]` and `run[split..]` in place
fn merge_runs(run: &mut [u32], split: usize, tmp: &mut Vec<u32>) {
    tmp.clear();
    tmp.extend_from_slice(&run[..split]);

    let (mut l, mut r, mut out) = (0, split, 0);
    while l < tmp.len() {
        if r < run.len() && run[r] < tmp[l] {
            run[out] = run[r];
            r += 1;
        } else {
            run[out] = tmp[l];
            l += 1;
        }
        out += 1;
    }
}

/// Indices where `data` differs from `expected`
fn mismatches(data: &[u32], expected: &[u32]) -> Vec<usize> {
    data.iter()
        .zip(expected)
        .enumerate()
        .filter_map(|(i, (a, b))| (a != b).then_some(i))
        .collect()
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn sim_requested() -> bool {
    std::env::var("HWRT_SIM").is_ok_and(|v| v == "1")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let Some(args) = Args::parse(&argv) else {
        println!("{USAGE}");
        return Ok(());
    };

    let board = sim_requested().then(|| SimBoard::new(args.hw_threads));
    let runtime = if args.hw_threads > 0 {
        let rt = match &board {
            Some(board) => {
                for unit in 0..args.hw_threads {
                    spawn_sim_sorter(board, unit);
                }
                board.runtime(Architecture::from_target())?
            }
            None => Runtime::init(&RuntimeConfig::from_env()?)
                .context("initializing hardware runtime")?,
        };
        Some(rt)
    } else {
        None
    };

    progress!("creating {} hw-threads:", args.hw_threads);
    let mut hwts = Vec::with_capacity(args.hw_threads);
    if let Some(rt) = &runtime {
        for slot in 0..args.hw_threads {
            progress!(" {slot}");
            hwts.push(HwThread::create(rt, slot, None)?);
        }
    }
    println!();

    let start = Instant::now();
    println!("generating data ...");
    let count = args.blocks * BLOCK_SIZE;
    let total = u32::try_from(count).context("buffer too large")?;
    let data: Vec<u32> = (0..total).rev().collect();
    let mut reference = data.clone();
    let blocks: Vec<Vec<u32>> = data.chunks(BLOCK_SIZE).map(<[u32]>::to_vec).collect();
    let t_gen = start.elapsed();

    let num_jobs = u32::try_from(args.blocks)?;
    let jobs = Jobs::new(blocks);
    let mut failure = None;
    let mut t_sort = Duration::ZERO;

    std::thread::scope(|s| {
        println!("creating {} sw-threads", args.sw_threads);
        for _ in 0..args.sw_threads {
            s.spawn(|| sw_worker(&jobs));
        }
        for hwt in &hwts {
            let jobs = &jobs;
            s.spawn(move || hw_delegate(hwt, jobs));
        }

        progress!("putting {} blocks into job queue: ", args.blocks);
        for job in 0..num_jobs {
            jobs.queue.put(job);
            progress!(".");
        }
        println!();

        let start = Instant::now();
        progress!("waiting for {} acknowledgements: ", args.blocks);
        for _ in 0..args.blocks {
            match jobs.acks.get() {
                Ok(_) => progress!("."),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        println!();
        t_sort = start.elapsed();

        for _ in 0..args.sw_threads + hwts.len() {
            jobs.queue.put(STOP);
        }
    });

    if let Some(e) = failure {
        return Err(e.context("hardware sort failed"));
    }

    let mut data: Vec<u32> = jobs.blocks.into_iter().flat_map(Mutex::into_inner).collect();

    let start = Instant::now();
    println!("merging sorted data slices ...");
    merge_blocks(&mut data, BLOCK_SIZE);
    let t_merge = start.elapsed();

    let start = Instant::now();
    println!("checking sorted data ...");
    reference.sort_unstable();
    let bad = mismatches(&data, &reference);
    for &i in bad.iter().take(MAX_REPORTED_MISMATCHES) {
        println!("expected {:#010x} but found {:#010x} at {i}", reference[i], data[i]);
    }
    let t_check = start.elapsed();

    for hwt in hwts {
        hwt.halt()?;
    }

    println!(
        "Running times (size: {count} words, {} hw-threads, {} sw-threads):",
        args.hw_threads, args.sw_threads
    );
    println!("  Generate data: {:.3} ms", ms(t_gen));
    println!("  Sort data    : {:.3} ms", ms(t_sort));
    println!("  Merge data   : {:.3} ms", ms(t_merge));
    println!("  Check data   : {:.3} ms", ms(t_check));
    println!("Total computation time (sort & merge): {:.3} ms", ms(t_sort + t_merge));

    if !bad.is_empty() {
        bail!("{} words out of place", bad.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn args_require_three_values() {
        assert!(Args::parse(&argv(&["sort_demo", "1", "1"])).is_none());
        assert!(Args::parse(&argv(&["sort_demo", "1", "1", "2", "3"])).is_none());
        let args = Args::parse(&argv(&["sort_demo", "2", "1", "8"])).unwrap();
        assert_eq!((args.hw_threads, args.sw_threads, args.blocks), (2, 1, 8));
    }

    #[test]
    fn odd_block_count_rejected() {
        assert!(Args::parse(&argv(&["sort_demo", "0", "2", "3"])).is_none());
    }

    #[test]
    fn blocks_without_workers_rejected() {
        assert!(Args::parse(&argv(&["sort_demo", "0", "0", "2"])).is_none());
        assert!(Args::parse(&argv(&["sort_demo", "0", "0", "0"])).is_some());
    }

    #[derive(Default)]
    struct Console {
        written: Vec<u8>,
        flushed: Vec<usize>,
    }

    impl Write for Console {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.push(self.written.len());
            Ok(())
        }
    }

    #[test]
    fn progress_is_flushed_per_call() {
        let mut console = Console::default();
        emit(&mut console, format_args!("waiting: "));
        emit(&mut console, format_args!("."));
        emit(&mut console, format_args!("{}", '.'));
        assert_eq!(console.written, b"waiting: ..");
        assert_eq!(console.flushed, vec![9, 10, 11]);
    }

    #[test]
    fn mailbox_is_fifo_across_threads() {
        let mbox = Arc::new(Mailbox::new());
        let producer = {
            let mbox = Arc::clone(&mbox);
            std::thread::spawn(move || (0..100u32).for_each(|i| mbox.put(i)))
        };
        let got: Vec<u32> = (0..100).map(|_| mbox.get()).collect();
        producer.join().unwrap();
        assert_eq!(got, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn merge_of_sorted_blocks() {
        let mut data: Vec<u32> = (0..24u32).rev().collect();
        for chunk in data.chunks_mut(4) {
            chunk.sort_unstable();
        }
        merge_blocks(&mut data, 4);
        assert_eq!(data, (0..24).collect::<Vec<_>>());
    }

    #[test]
    fn merge_with_ragged_tail() {
        // 3 blocks of 4: the last pass merges 8 with a short 4
        let mut data = vec![5, 9, 10, 11, 0, 2, 4, 6, 1, 3, 7, 8];
        merge_blocks(&mut data, 4);
        assert_eq!(data, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn mismatch_positions() {
        assert_eq!(mismatches(&[1, 2, 3], &[1, 5, 3]), vec![1]);
        assert!(mismatches(&[1, 2], &[1, 2]).is_empty());
    }

    #[test]
    fn software_and_simulated_hardware_sort_together() {
        let board = SimBoard::with_depth(2, 16);
        for unit in 0..2 {
            spawn_sim_sorter(&board, unit);
        }
        let rt = board.runtime(Architecture::Generic).unwrap();
        let hwts: Vec<_> = (0..2).map(|i| HwThread::create(&rt, i, None).unwrap()).collect();

        let blocks: Vec<Vec<u32>> = (0..6u32)
            .map(|b| (0..64u32).rev().map(|w| w * 7 + b).collect())
            .collect();
        let jobs = Jobs::new(blocks);

        std::thread::scope(|s| {
            s.spawn(|| sw_worker(&jobs));
            for hwt in &hwts {
                let jobs = &jobs;
                s.spawn(move || hw_delegate(hwt, jobs));
            }
            for job in 0..6 {
                jobs.queue.put(job);
            }
            for _ in 0..6 {
                jobs.acks.get().unwrap();
            }
            for _ in 0..3 {
                jobs.queue.put(STOP);
            }
        });

        for block in &jobs.blocks {
            let block = block.lock();
            assert!(block.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
