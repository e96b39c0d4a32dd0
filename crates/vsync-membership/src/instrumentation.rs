//! Counters for the membership protocol.
//!
//! ```ignore
//! use vsync_membership::instrumentation::METRICS;
//!
//! METRICS.increment_polls();
//! let snapshot = METRICS.snapshot();
//! ```
//!
//! Counters are process-wide and only ever increase. Gauges track the most
//! recently installed epoch and its size.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Metrics
// ============================================================================

/// Process-wide membership metrics.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free membership counters and gauges.
#[derive(Debug)]
pub struct Metrics {
    // === Counters ===
    /// Poll cycles run by view managers.
    polls_total: AtomicU64,
    /// Failures reported by local failure detectors.
    suspicions_total: AtomicU64,
    /// Suspicions adopted from other rows.
    suspicions_adopted_total: AtomicU64,
    /// Changes appended to the local change log.
    proposals_total: AtomicU64,
    /// Leader promotions (`is_new_leader` returning true).
    promotions_total: AtomicU64,
    /// Transport wedges.
    wedges_total: AtomicU64,
    /// Views installed.
    views_installed_total: AtomicU64,
    /// Polls that detected a minority partition.
    partitions_total: AtomicU64,

    // === Gauges ===
    /// Epoch of the last installed view.
    current_epoch: AtomicU64,
    /// Member count of the last installed view.
    current_members: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates a zeroed instance. Const so it can back a static.
    pub const fn new() -> Self {
        Self {
            polls_total: AtomicU64::new(0),
            suspicions_total: AtomicU64::new(0),
            suspicions_adopted_total: AtomicU64::new(0),
            proposals_total: AtomicU64::new(0),
            promotions_total: AtomicU64::new(0),
            wedges_total: AtomicU64::new(0),
            views_installed_total: AtomicU64::new(0),
            partitions_total: AtomicU64::new(0),
            current_epoch: AtomicU64::new(0),
            current_members: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // Counters
    // ========================================================================

    pub fn increment_polls(&self) {
        self.polls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_suspicions(&self) {
        self.suspicions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_suspicions_adopted(&self, count: u64) {
        self.suspicions_adopted_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_proposals(&self, count: u64) {
        self.proposals_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_promotions(&self) {
        self.promotions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_wedges(&self) {
        self.wedges_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_partitions(&self) {
        self.partitions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an installed view and updates the gauges.
    pub fn record_view_installed(&self, epoch: u64, members: usize) {
        self.views_installed_total.fetch_add(1, Ordering::Relaxed);
        self.current_epoch.store(epoch, Ordering::Relaxed);
        self.current_members
            .store(members as u64, Ordering::Relaxed);
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Renders the counters in Prometheus exposition format.
    pub fn export_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut output = String::new();
        let counters = [
            ("vsync_polls_total", "Poll cycles run", s.polls_total),
            ("vsync_suspicions_total", "Locally detected failures", s.suspicions_total),
            ("vsync_suspicions_adopted_total", "Suspicions adopted from peers", s.suspicions_adopted_total),
            ("vsync_proposals_total", "Changes proposed", s.proposals_total),
            ("vsync_promotions_total", "Leader promotions", s.promotions_total),
            ("vsync_wedges_total", "Epochs wedged", s.wedges_total),
            ("vsync_views_installed_total", "Views installed", s.views_installed_total),
            ("vsync_partitions_total", "Minority partitions detected", s.partitions_total),
        ];
        for (name, help, value) in counters {
            let _ = write!(
                output,
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            );
        }
        let gauges = [
            ("vsync_epoch", "Epoch of the installed view", s.current_epoch),
            ("vsync_members", "Members in the installed view", s.current_members),
        ];
        for (name, help, value) in gauges {
            let _ = write!(
                output,
                "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n"
            );
        }
        output
    }

    /// Returns a point-in-time copy of every metric.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls_total: self.polls_total.load(Ordering::Relaxed),
            suspicions_total: self.suspicions_total.load(Ordering::Relaxed),
            suspicions_adopted_total: self.suspicions_adopted_total.load(Ordering::Relaxed),
            proposals_total: self.proposals_total.load(Ordering::Relaxed),
            promotions_total: self.promotions_total.load(Ordering::Relaxed),
            wedges_total: self.wedges_total.load(Ordering::Relaxed),
            views_installed_total: self.views_installed_total.load(Ordering::Relaxed),
            partitions_total: self.partitions_total.load(Ordering::Relaxed),
            current_epoch: self.current_epoch.load(Ordering::Relaxed),
            current_members: self.current_members.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`Metrics`] at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub polls_total: u64,
    pub suspicions_total: u64,
    pub suspicions_adopted_total: u64,
    pub proposals_total: u64,
    pub promotions_total: u64,
    pub wedges_total: u64,
    pub views_installed_total: u64,
    pub partitions_total: u64,
    pub current_epoch: u64,
    pub current_members: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.increment_polls();
        metrics.increment_polls();
        metrics.add_proposals(3);
        metrics.record_view_installed(4, 5);

        let s = metrics.snapshot();
        assert_eq!(s.polls_total, 2);
        assert_eq!(s.proposals_total, 3);
        assert_eq!(s.views_installed_total, 1);
        assert_eq!(s.current_epoch, 4);
        assert_eq!(s.current_members, 5);
    }

    #[test]
    fn prometheus_export_lists_every_metric() {
        let metrics = Metrics::new();
        metrics.increment_wedges();
        let text = metrics.export_prometheus();
        assert!(text.contains("vsync_wedges_total 1\n"));
        assert!(text.contains("# TYPE vsync_epoch gauge"));
        assert_eq!(text.matches("# HELP").count(), 10);
    }
}
