//! Counters for the expensive operations the engine promises to do at most once.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Engine counters (thread-safe, cheap to clone).
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Function executions that reached a module runtime
    pub runtime_executions: Arc<AtomicU64>,
    /// Calls answered from the call cache
    pub call_cache_hits: Arc<AtomicU64>,
    /// Merged schemas built for a dependency set
    pub schema_merges: Arc<AtomicU64>,
    /// Module definitions loaded through the describe call
    pub module_loads: Arc<AtomicU64>,
}

impl EngineMetrics {
    pub fn record_runtime_execution(&self) {
        self.runtime_executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_cache_hit(&self) {
        self.call_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_schema_merge(&self) {
        self.schema_merges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_module_load(&self) {
        self.module_loads.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runtime_executions: self.runtime_executions.load(Ordering::Relaxed),
            call_cache_hits: self.call_cache_hits.load(Ordering::Relaxed),
            schema_merges: self.schema_merges.load(Ordering::Relaxed),
            module_loads: self.module_loads.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.runtime_executions.store(0, Ordering::Relaxed);
        self.call_cache_hits.store(0, Ordering::Relaxed);
        self.schema_merges.store(0, Ordering::Relaxed);
        self.module_loads.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of metrics (for reporting).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub runtime_executions: u64,
    pub call_cache_hits: u64,
    pub schema_merges: u64,
    pub module_loads: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = EngineMetrics::default();
        let clone = metrics.clone();
        clone.record_runtime_execution();
        clone.record_runtime_execution();
        metrics.record_call_cache_hit();

        let snap = metrics.snapshot();
        assert_eq!(snap.runtime_executions, 2);
        assert_eq!(snap.call_cache_hits, 1);
        assert_eq!(snap.schema_merges, 0);

        metrics.reset();
        assert_eq!(clone.snapshot(), MetricsSnapshot::default());
    }
}
