//! Cache pressure observation
//!
//! Storage monitors poll the handle cache to decide whether to warn the user
//! about memory or disk pressure. They only observe: capacity stays under the
//! control of whoever owns the cache.

use tracing::{debug, warn};

use crate::allocator::HandleAllocator;
use crate::handle_cache::{CacheStats, ResourceHandleCache};

/// Pressure level indicating cache health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CachePressure {
    /// Usage is low (< 50% utilization)
    Low,
    /// Usage is moderate (50-75% utilization)
    Moderate,
    /// Usage is high (75-90% utilization)
    High,
    /// Usage is critical (>= 90% utilization)
    Critical,
}

impl CachePressure {
    /// Get the pressure level from a utilization ratio (0.0 to 1.0)
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization < 0.5 {
            CachePressure::Low
        } else if utilization < 0.75 {
            CachePressure::Moderate
        } else if utilization < 0.90 {
            CachePressure::High
        } else {
            CachePressure::Critical
        }
    }

    /// Returns true if the level warrants attention (High or Critical)
    pub fn is_elevated(&self) -> bool {
        matches!(self, CachePressure::High | CachePressure::Critical)
    }
}

/// One observation of the handle cache
#[derive(Debug, Clone, Copy)]
pub struct PressureReport {
    /// Live handles
    pub live_handles: usize,
    /// Live handle ceiling
    pub max_capacity: usize,
    /// Bytes retained by cached payloads
    pub payload_bytes: usize,
    /// Soft payload budget in bytes
    pub size_budget: usize,
    /// Pressure from live handle count alone
    pub handle_pressure: CachePressure,
    /// Pressure from retained bytes alone
    pub budget_pressure: CachePressure,
}

impl PressureReport {
    /// Build a report from cache statistics
    pub fn from_stats(stats: &CacheStats) -> Self {
        Self {
            live_handles: stats.entry_count,
            max_capacity: stats.max_capacity,
            payload_bytes: stats.payload_bytes,
            size_budget: stats.size_budget,
            handle_pressure: CachePressure::from_utilization(stats.capacity_utilization()),
            budget_pressure: CachePressure::from_utilization(stats.budget_utilization()),
        }
    }

    /// The worse of handle and budget pressure
    pub fn pressure(&self) -> CachePressure {
        self.handle_pressure.max(self.budget_pressure)
    }

    /// True when retained payloads exceed the soft budget
    pub fn over_budget(&self) -> bool {
        self.size_budget > 0 && self.payload_bytes > self.size_budget
    }
}

/// Read-only observer of a handle cache.
///
/// Remembers the last reported level so repeated polls only log on change.
///
/// # Example
///
/// ```
/// use frameflow_cache::{BlobUrlRegistry, CacheMonitor, CachePressure, ResourceHandleCache};
///
/// let cache = ResourceHandleCache::with_capacity(BlobUrlRegistry::new(), 50).unwrap();
/// let mut monitor = CacheMonitor::new();
///
/// let report = monitor.observe(&cache);
/// assert_eq!(report.pressure(), CachePressure::Low);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheMonitor {
    last_pressure: Option<CachePressure>,
}

impl CacheMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a pressure reading of `cache`
    pub fn observe<A: HandleAllocator>(
        &mut self,
        cache: &ResourceHandleCache<A>,
    ) -> PressureReport {
        let report = PressureReport::from_stats(&cache.stats());
        let pressure = report.pressure();

        if self.last_pressure != Some(pressure) {
            if report.over_budget() {
                warn!(
                    payload_bytes = report.payload_bytes,
                    size_budget = report.size_budget,
                    live = report.live_handles,
                    "handle cache payloads exceed soft budget"
                );
            } else {
                debug!(
                    ?pressure,
                    live = report.live_handles,
                    capacity = report.max_capacity,
                    "handle cache pressure changed"
                );
            }
            self.last_pressure = Some(pressure);
        }

        report
    }

    /// Level reported by the most recent observation
    pub fn last_pressure(&self) -> Option<CachePressure> {
        self.last_pressure
    }
}
