//! Profile a small workload and print the resulting report

use fluentai_profiler::prelude::*;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::system();

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let profiler = Profiler::builder().sampling_frequency(500).build()?;

    println!("=== Single Calls ===");
    for n in [10_000u64, 100_000, 1_000_000] {
        let result = profiler.profile_function("sum_squares", || {
            Ok::<_, String>((0..n).map(|i| i * i).sum::<u64>())
        });
        println!(
            "sum_squares({}) took {:?}, cpu {:?}%",
            n, result.total_time, result.cpu_percent
        );
    }

    let result = profiler.profile_function("word_counts", || {
        let text = "the quick brown fox jumps over the lazy dog ".repeat(10_000);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in text.split_whitespace() {
            *counts.entry(word).or_default() += 1;
        }
        Ok::<_, String>(counts.len())
    });
    println!(
        "word_counts used {:?} bytes (peak {:?})",
        result.memory_usage, result.memory_peak
    );

    let failed = profiler.profile_function("parse_config", || "port=abc".parse::<u32>());
    println!("parse_config failed: {:?}", failed.error());

    println!("\n=== Sessions ===");
    {
        let _scope = profiler.profile_scope("startup");
        thread::sleep(Duration::from_millis(20));
    }
    profiler.start_profile("background");

    println!("\n=== Optimization ===");
    let optimized = profiler.optimize_function("slow_path", || {
        thread::sleep(Duration::from_millis(150));
        Ok::<_, String>(())
    });
    println!("rating: {}", optimized.performance_rating);
    for hint in &optimized.suggestions {
        println!("  - {}", hint);
    }

    println!("\n=== Report ===");
    let report = profiler.get_profiling_report();
    println!("{}", serde_json::to_string_pretty(&report)?);

    let path = std::env::temp_dir().join("fluentai_profile_report.json");
    profiler.export_report(&path)?;
    println!("\nReport written to {}", path.display());

    profiler.stop_profile("background");
    Ok(())
}
