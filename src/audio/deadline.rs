// Deadline monitor - Time spent per block against the block period
//
// Audio thread records, control thread reads. Counters are atomics shared
// between clones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Block-time statistics for the transport engine
#[derive(Debug, Clone)]
pub struct DeadlineMonitor {
    total_process_ns: Arc<AtomicU64>,
    total_budget_ns: Arc<AtomicU64>,
    worst_process_ns: Arc<AtomicU64>,
    blocks: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,
    sample_rate: f64,
}

impl DeadlineMonitor {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            total_process_ns: Arc::new(AtomicU64::new(0)),
            total_budget_ns: Arc::new(AtomicU64::new(0)),
            worst_process_ns: Arc::new(AtomicU64::new(0)),
            blocks: Arc::new(AtomicU64::new(0)),
            overruns: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Call at the start of a block
    #[inline]
    pub fn start(&self) -> Instant {
        Instant::now()
    }

    /// Call at the end of a block; returns true if the block overran its period
    #[inline]
    pub fn finish(&self, started: Instant, frames: usize) -> bool {
        let elapsed_ns = started.elapsed().as_nanos() as u64;
        let budget_ns = self.budget_ns(frames);

        self.total_process_ns.fetch_add(elapsed_ns, Ordering::Relaxed);
        self.total_budget_ns.fetch_add(budget_ns, Ordering::Relaxed);
        self.worst_process_ns.fetch_max(elapsed_ns, Ordering::Relaxed);
        self.blocks.fetch_add(1, Ordering::Relaxed);

        let overrun = elapsed_ns > budget_ns;
        if overrun {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        overrun
    }

    /// Real-time period of a block of `frames` frames
    pub fn budget_ns(&self, frames: usize) -> u64 {
        (frames as f64 / self.sample_rate * 1_000_000_000.0) as u64
    }

    /// Average share of the block period spent processing, in percent
    pub fn load_percentage(&self) -> f32 {
        let total_process = self.total_process_ns.load(Ordering::Relaxed);
        let total_budget = self.total_budget_ns.load(Ordering::Relaxed);

        if total_budget == 0 {
            return 0.0;
        }

        (total_process as f64 / total_budget as f64 * 100.0) as f32
    }

    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Blocks that took longer than their period
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn worst_block_ns(&self) -> u64 {
        self.worst_process_ns.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total_process_ns.store(0, Ordering::Relaxed);
        self.total_budget_ns.store(0, Ordering::Relaxed);
        self.worst_process_ns.store(0, Ordering::Relaxed);
        self.blocks.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
    }

    /// Load level for display
    pub fn load_level(&self) -> DeadlineLoad {
        let load = self.load_percentage();

        if load < 50.0 {
            DeadlineLoad::Low
        } else if load < 75.0 {
            DeadlineLoad::Medium
        } else {
            DeadlineLoad::High
        }
    }
}

/// Load level (for UI display)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineLoad {
    Low,    // < 50%
    Medium, // 50-75%
    High,   // > 75%
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_monitor_creation() {
        let monitor = DeadlineMonitor::new(48000.0);
        assert_eq!(monitor.load_percentage(), 0.0);
        assert_eq!(monitor.blocks(), 0);
        assert_eq!(monitor.load_level(), DeadlineLoad::Low);
    }

    #[test]
    fn test_budget() {
        let monitor = DeadlineMonitor::new(48000.0);
        // 480 frames at 48kHz = 10ms
        assert_eq!(monitor.budget_ns(480), 10_000_000);
    }

    #[test]
    fn test_overrun_detected() {
        let monitor = DeadlineMonitor::new(48000.0);

        // A 1-frame block has a ~20µs budget
        let start = monitor.start();
        thread::sleep(Duration::from_millis(2));
        assert!(monitor.finish(start, 1));

        assert_eq!(monitor.overruns(), 1);
        assert!(monitor.worst_block_ns() >= 2_000_000);
        assert!(monitor.load_percentage() > 100.0);
    }

    #[test]
    fn test_clones_share_counters_and_reset() {
        let monitor = DeadlineMonitor::new(48000.0);
        let reader = monitor.clone();

        let start = monitor.start();
        monitor.finish(start, 48000);
        assert_eq!(reader.blocks(), 1);

        reader.reset();
        assert_eq!(monitor.blocks(), 0);
        assert_eq!(monitor.overruns(), 0);
    }
}
