//! Worker pool sizing
//!
//! Metadata scanning is dominated by file I/O and decode stalls, so the scan pool
//! is wider than the core count: five workers per logical CPU, capped at 32.

use anyhow::Result;

/// Hard upper bound on scan workers.
pub const MAX_SCAN_WORKERS: usize = 32;

/// Workers per logical CPU for I/O-bound scans.
pub const WORKERS_PER_CPU: usize = 5;

/// min(32, 5 × available parallelism). Not user-configurable.
pub fn scan_pool_size() -> usize {
    pool_size_for(num_cpus::get())
}

fn pool_size_for(cpus: usize) -> usize {
    (cpus.max(1) * WORKERS_PER_CPU).min(MAX_SCAN_WORKERS)
}

/// Builds a named rayon pool, falling back to 2 threads if the requested size
/// cannot be spawned.
pub fn build_pool(threads: usize, name: &'static str) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |i| format!("{}-{}", name, i))
        .build()
        .or_else(|e| {
            tracing::warn!(threads, error = %e, "Thread pool creation failed, retrying with 2 threads");
            rayon::ThreadPoolBuilder::new()
                .num_threads(2)
                .thread_name(move |i| format!("{}-{}", name, i))
                .build()
        })
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))
}
