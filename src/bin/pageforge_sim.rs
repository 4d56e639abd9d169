//! Frame-loop simulator for the page-pool allocator
//!
//! Drives a `DynamicBufferAllocator` over host-backed regions the way a
//! renderer would: a burst of uploads per frame, one cleanup per frame, and a
//! fence that lags a configurable number of frames behind the CPU.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use pageforge::allocator::{AllocatorConfig, DynamicBufferAllocator, PagePreset};
use pageforge::backend::HostRegionFactory;
use pageforge::fence::FenceTimeline;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "pageforge-sim", version)]
#[command(about = "Simulate per-frame GPU uploads against the page pool", long_about = None)]
struct Cli {
    /// Number of frames to simulate
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Frames the GPU runs behind the CPU
    #[arg(long, default_value_t = 2)]
    lag: u64,

    /// Uploads issued per frame
    #[arg(long, default_value_t = 64)]
    uploads: u64,

    /// Largest regular upload in bytes
    #[arg(long, default_value_t = 4096)]
    max_upload: u64,

    /// Issue one upload larger than a page every N frames (0 disables)
    #[arg(long, default_value_t = 0)]
    oversized_every: u64,

    /// Page size preset
    #[arg(long, value_enum, default_value_t = Preset::Medium)]
    preset: Preset,

    /// Explicit page size in bytes, overrides --preset
    #[arg(long)]
    page_size: Option<u64>,

    /// Pages created before the first frame
    #[arg(long, default_value_t = 1)]
    warm_pages: usize,

    /// Cap on live backing memory in bytes
    #[arg(long)]
    budget: Option<u64>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Small,
    Medium,
    Large,
}

impl From<Preset> for PagePreset {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Small => PagePreset::Small,
            Preset::Medium => PagePreset::Medium,
            Preset::Large => PagePreset::Large,
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    frames: u64,
    lag: u64,
    peak_pages: usize,
    peak_live_bytes: u64,
    stats: pageforge::AllocatorStats,
}

fn main() -> anyhow::Result<()> {
    pageforge::init_logging_default();
    let cli = Cli::parse();

    let mut config = AllocatorConfig::from_preset(cli.preset.into()).with_warm_pages(cli.warm_pages);
    if let Some(page_size) = cli.page_size {
        config = config.with_page_size(page_size);
    }

    let factory = match cli.budget {
        Some(budget) => HostRegionFactory::new().with_budget(budget),
        None => HostRegionFactory::new(),
    };
    let ledger = factory.ledger();
    let fence = Arc::new(FenceTimeline::new());
    let allocator = DynamicBufferAllocator::new(factory, fence.clone());
    allocator
        .initialize_with_config(&config)
        .context("failed to initialize allocator")?;

    let payload = vec![0xA5u8; cli.max_upload.max(1) as usize];
    let mut peak_pages = 0;
    let mut peak_live_bytes = 0;

    for frame in 0..cli.frames {
        for i in 0..cli.uploads {
            let len = upload_len(frame, i, cli.max_upload);
            allocator
                .upload(&payload[..len], 0)
                .with_context(|| format!("frame {}: upload {} of {} bytes", frame, i, len))?;
        }

        if cli.oversized_every > 0 && frame % cli.oversized_every == 0 {
            allocator
                .allocate_default(config.page_size + 1)
                .with_context(|| format!("frame {}: oversized allocation", frame))?;
        }

        let marker = fence.next_marker();
        allocator
            .cleanup(marker)
            .with_context(|| format!("frame {}: cleanup", frame))?;

        // The GPU finishes frame N once the CPU has submitted frame N + lag
        if marker > cli.lag {
            fence.signal(marker - cli.lag);
        }

        peak_pages = peak_pages.max(allocator.stats()?.total_pages);
        peak_live_bytes = peak_live_bytes.max(ledger.live_bytes());
    }

    let report = Report {
        frames: cli.frames,
        lag: cli.lag,
        peak_pages,
        peak_live_bytes,
        stats: allocator.stats()?,
    };
    allocator.shutdown();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Deterministic spread of upload sizes in `1..=max_upload`
fn upload_len(frame: u64, index: u64, max_upload: u64) -> usize {
    let max = max_upload.max(1);
    let mixed = frame.wrapping_mul(31).wrapping_add(index.wrapping_mul(17)) % max;
    (mixed + 1) as usize
}

fn print_report(report: &Report) {
    let stats = &report.stats;
    let counters = &stats.counters;
    println!("PageForge simulation: {} frames, GPU lag {}", report.frames, report.lag);
    println!("  Page size:          {} KB", stats.page_size / 1024);
    println!("  Peak pages:         {}", report.peak_pages);
    println!("  Peak live memory:   {} KB", report.peak_live_bytes / 1024);
    println!("  Paged allocations:  {}", counters.paged_allocations);
    println!("  Oversized:          {}", counters.oversized_allocations);
    println!("  Bytes allocated:    {}", counters.bytes_allocated);
    println!("  Page rotations:     {}", counters.page_rotations);
    println!("  Pages created:      {}", counters.pages_created);
    println!("  Pages reused:       {}", counters.pages_reused);
    println!("  Reuse ratio:        {:.2}", stats.reuse_ratio());
}
