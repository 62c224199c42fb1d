//! Rolling query-latency window and the approximation-level controller it
//! drives.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::config::MAX_APPROXIMATION_LEVEL;

/// Bounded window of recent latencies, in milliseconds.
pub struct LatencyMonitor {
    window: usize,
    samples: Mutex<VecDeque<f64>>,
}

impl LatencyMonitor {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        LatencyMonitor {
            window,
            samples: Mutex::new(VecDeque::with_capacity(window)),
        }
    }

    pub fn record(&self, latency_ms: f64) {
        let mut samples = self.samples.lock();
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mean of the window, 0 when empty.
    pub fn average(&self) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Nearest-rank percentile (`pct` in 0..=100), 0 when empty.
    pub fn percentile(&self, pct: f64) -> f64 {
        let mut sorted: Vec<f64> = self.samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return 0.0;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = ((pct.clamp(0.0, 100.0) / 100.0) * sorted.len() as f64).ceil() as usize;
        sorted[rank.clamp(1, sorted.len()) - 1]
    }

    pub fn p95(&self) -> f64 {
        self.percentile(95.0)
    }
}

/// Current approximation level, raised when the rolling average latency
/// exceeds `threshold * budget` and relaxed toward the default once it falls
/// below half of that.
pub struct LevelController {
    default_level: u8,
    current: AtomicU8,
    threshold: f64,
}

impl LevelController {
    pub fn new(default_level: u8, threshold: f64) -> Self {
        let default_level = default_level.clamp(1, MAX_APPROXIMATION_LEVEL);
        LevelController {
            default_level,
            current: AtomicU8::new(default_level),
            threshold,
        }
    }

    pub fn current(&self) -> u8 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn default_level(&self) -> u8 {
        self.default_level
    }

    /// Re-evaluate the level against the monitor. Returns the new level.
    pub fn adjust(&self, monitor: &LatencyMonitor, budget_ms: f64) -> u8 {
        let average = monitor.average();
        let limit = self.threshold * budget_ms;
        let current = self.current();

        let next = if average > limit && current < MAX_APPROXIMATION_LEVEL {
            current + 1
        } else if average < limit * 0.5 && current > self.default_level {
            current - 1
        } else {
            current
        };

        if next != current
            && self
                .current
                .compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            log::info!(
                "approximation level {} -> {} (avg latency {:.1}ms, limit {:.1}ms)",
                current,
                next,
                average,
                limit
            );
        }
        self.current()
    }

    pub fn reset(&self) {
        self.current.store(self.default_level, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_bounded() {
        let monitor = LatencyMonitor::new(3);
        for ms in [100.0, 1.0, 2.0, 3.0] {
            monitor.record(ms);
        }
        assert_eq!(monitor.len(), 3);
        assert!((monitor.average() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn p95_nearest_rank() {
        let monitor = LatencyMonitor::new(100);
        for i in 1..=100 {
            monitor.record(i as f64);
        }
        assert_eq!(monitor.p95(), 95.0);
        assert_eq!(monitor.percentile(100.0), 100.0);
        assert_eq!(LatencyMonitor::new(4).p95(), 0.0);
    }

    #[test]
    fn controller_raises_then_relaxes() {
        let monitor = LatencyMonitor::new(2);
        let controller = LevelController::new(1, 0.8);

        monitor.record(90.0);
        monitor.record(90.0);
        assert_eq!(controller.adjust(&monitor, 100.0), 2);
        assert_eq!(controller.adjust(&monitor, 100.0), 3);
        assert_eq!(controller.adjust(&monitor, 100.0), 3);

        monitor.record(1.0);
        monitor.record(1.0);
        assert_eq!(controller.adjust(&monitor, 100.0), 2);
        assert_eq!(controller.adjust(&monitor, 100.0), 1);
        assert_eq!(controller.adjust(&monitor, 100.0), 1);
    }
}
