use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Buffer pool counters, if active.
#[derive(Clone)]
pub enum Metrics {
    /// Counters are collected.
    Active(Arc<ActiveMetrics>),
    /// Counting is compiled down to nothing.
    Inactive,
}

impl Metrics {
    /// Returns the Metrics object, active or not based on the specified input.
    pub fn new(metrics: bool) -> Self {
        if metrics {
            Metrics::Active(Arc::new(ActiveMetrics {
                fetches: AtomicU64::new(0),
                fetch_misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }))
        } else {
            Metrics::Inactive
        }
    }

    pub(crate) fn record_fetch(&self, miss: bool) {
        if let Metrics::Active(metrics) = self {
            metrics.fetches.fetch_add(1, Ordering::Relaxed);
            if miss {
                metrics.fetch_misses.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_eviction(&self) {
        if let Metrics::Active(metrics) = self {
            metrics.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Print collected counters to stdout.
    pub fn print(&self) {
        match self {
            Metrics::Active(metrics) => {
                println!("metrics");

                let fetches = metrics.fetches.load(Ordering::Relaxed);
                println!("  page fetches      {}", fetches);

                if fetches != 0 {
                    let misses = metrics.fetch_misses.load(Ordering::Relaxed);
                    let percentage_misses = (misses as f64 / fetches as f64) * 100.0;
                    println!("  pool misses       {}  [ {:.2}% ] ", misses, percentage_misses);
                }

                println!(
                    "  evictions         {}",
                    metrics.evictions.load(Ordering::Relaxed)
                );
            }
            Metrics::Inactive => {
                println!("Metrics collection was not activated")
            }
        }
    }
}

/// Active counters collected by the buffer pool.
pub struct ActiveMetrics {
    /// Every fetch through the pool, hit or miss.
    fetches: AtomicU64,
    /// The fetches that had to go to disk.
    fetch_misses: AtomicU64,
    /// Frames written back or rebound to make room.
    evictions: AtomicU64,
}
