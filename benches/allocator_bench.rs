//! Page-pool allocator benchmarks
//!
//! Measures the hot paths of a frame loop:
//! - Bump allocation from the current page
//! - Page rotation with and without reuse
//! - Mixed random sizes
//! - Oversized allocation and deferred release
//! - Contended allocation from several threads
//!
//! Run with: `cargo bench --bench allocator_bench`

use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pageforge::allocator::DynamicBufferAllocator;
use pageforge::backend::HostRegionFactory;
use pageforge::fence::FenceTimeline;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Benchmark Harness
// ============================================================================

struct Benchmark {
    name: String,
    iterations: usize,
    warmup_iterations: usize,
}

impl Benchmark {
    fn new(name: &str, iterations: usize) -> Self {
        Benchmark {
            name: name.to_string(),
            iterations,
            warmup_iterations: iterations.min(5),
        }
    }

    fn run<F, R>(&self, mut f: F) -> BenchmarkResult
    where
        F: FnMut() -> R,
    {
        for _ in 0..self.warmup_iterations {
            black_box(f());
        }

        let durations = (0..self.iterations)
            .map(|_| {
                let start = Instant::now();
                black_box(f());
                start.elapsed()
            })
            .collect();

        BenchmarkResult {
            name: self.name.clone(),
            durations,
        }
    }
}

struct BenchmarkResult {
    name: String,
    durations: Vec<Duration>,
}

impl BenchmarkResult {
    fn report(&self, ops_per_iteration: usize) {
        let mut sorted = self.durations.clone();
        sorted.sort();
        let total: Duration = sorted.iter().sum();
        let avg = total / sorted.len().max(1) as u32;
        let p50 = sorted[sorted.len() / 2];
        let p99 = sorted[(sorted.len() * 99) / 100];
        let per_op_ns = avg.as_nanos() as f64 / ops_per_iteration.max(1) as f64;

        println!("\n=== {} ===", self.name);
        println!("Iterations: {}", sorted.len());
        println!("Average: {:?} ({:.1} ns/op)", avg, per_op_ns);
        println!("P50:     {:?}", p50);
        println!("P99:     {:?}", p99);
    }
}

fn pool(page_size: u64) -> (DynamicBufferAllocator<HostRegionFactory>, Arc<FenceTimeline>) {
    let fence = Arc::new(FenceTimeline::new());
    let allocator = DynamicBufferAllocator::new(HostRegionFactory::new(), fence.clone());
    allocator
        .initialize(page_size)
        .expect("benchmark pool failed to initialize");
    (allocator, fence)
}

// ============================================================================
// Benchmarks
// ============================================================================

/// Small constant-buffer sized allocations that never leave one frame
fn benchmark_bump_allocation() {
    const PER_FRAME: usize = 1000;
    println!("\n[Bump Allocation]");

    let (allocator, fence) = pool(2 * 1024 * 1024);
    let result = Benchmark::new("allocate 256B x 1000", 100).run(|| {
        for _ in 0..PER_FRAME {
            black_box(allocator.allocate(256, 256).expect("allocate"));
        }
        let marker = fence.next_marker();
        allocator.cleanup(marker).expect("cleanup");
        fence.signal(marker);
    });
    result.report(PER_FRAME);
}

/// Frames that fill several pages, with the GPU lagging behind
fn benchmark_frame_loop(lag: u64) {
    const PER_FRAME: usize = 512;
    println!("\n[Frame Loop, GPU lag {}]", lag);

    let (allocator, fence) = pool(64 * 1024);
    let payload = vec![0x5Au8; 1024];
    let name = format!("upload 1KB x {} (lag {})", PER_FRAME, lag);
    let result = Benchmark::new(&name, 200).run(|| {
        for _ in 0..PER_FRAME {
            black_box(allocator.upload(&payload, 256).expect("upload"));
        }
        let marker = fence.next_marker();
        allocator.cleanup(marker).expect("cleanup");
        if marker > lag {
            fence.signal(marker - lag);
        }
    });
    result.report(PER_FRAME);

    let stats = allocator.stats().expect("stats");
    println!(
        "  Pages: {} created, {} reused ({:.1}% reuse)",
        stats.counters.pages_created,
        stats.counters.pages_reused,
        stats.reuse_ratio() * 100.0
    );
}

/// Random sizes and alignments, a few of them oversized
fn benchmark_mixed_sizes() {
    const PER_FRAME: usize = 256;
    println!("\n[Mixed Sizes]");

    let (allocator, fence) = pool(64 * 1024);
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let requests: Vec<(u64, u64)> = (0..PER_FRAME)
        .map(|_| (rng.gen_range(1..=80 * 1024u64), 1u64 << rng.gen_range(0..9u32)))
        .collect();

    let result = Benchmark::new("allocate mixed x 256", 100).run(|| {
        for &(size, alignment) in &requests {
            black_box(allocator.allocate(size, alignment).expect("allocate"));
        }
        let marker = fence.next_marker();
        allocator.cleanup(marker).expect("cleanup");
        if marker > 1 {
            fence.signal(marker - 1);
        }
    });
    result.report(PER_FRAME);

    let stats = allocator.stats().expect("stats");
    println!(
        "  Oversized: {} of {} allocations",
        stats.counters.oversized_allocations,
        stats.counters.oversized_allocations + stats.counters.paged_allocations
    );
}

/// Requests larger than a page, released one marker later
fn benchmark_oversized() {
    const PER_FRAME: usize = 16;
    println!("\n[Oversized Allocation]");

    let (allocator, fence) = pool(64 * 1024);
    let result = Benchmark::new("allocate 256KB x 16", 100).run(|| {
        for _ in 0..PER_FRAME {
            black_box(allocator.allocate(256 * 1024, 256).expect("allocate"));
        }
        let marker = fence.next_marker();
        allocator.cleanup(marker).expect("cleanup");
        fence.signal(marker);
    });
    result.report(PER_FRAME);
}

/// Several threads sharing one pool
fn benchmark_contended(threads: usize) {
    const PER_THREAD: usize = 1000;
    println!("\n[Contended Allocation, {} threads]", threads);

    let (allocator, fence) = pool(2 * 1024 * 1024);
    let allocator = Arc::new(allocator);
    let name = format!("allocate 128B x {} per thread", PER_THREAD);
    let result = Benchmark::new(&name, 20).run(|| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        black_box(allocator.allocate(128, 64).expect("allocate"));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }
        let marker = fence.next_marker();
        allocator.cleanup(marker).expect("cleanup");
        fence.signal(marker);
    });
    result.report(PER_THREAD * threads);
}

fn main() {
    println!("====================================");
    println!("PageForge Allocator Benchmark Suite");
    println!("====================================");

    benchmark_bump_allocation();
    benchmark_frame_loop(0);
    benchmark_frame_loop(2);
    benchmark_mixed_sizes();
    benchmark_oversized();
    benchmark_contended(1);
    benchmark_contended(4);

    println!("\n====================================");
    println!("Benchmarks complete");
    println!("====================================");
}
