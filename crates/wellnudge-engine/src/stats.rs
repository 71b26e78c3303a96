//! Generation counters, labelled by slot type and outcome.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The LLM reply parsed into messages.
    Success,
    /// The reply was unusable and a template was used.
    Fallback,
    /// Generation faulted before a reply was available.
    Error,
}

#[derive(Debug, Default)]
struct Counters {
    success: AtomicU64,
    fallback: AtomicU64,
    error: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub success: u64,
    pub fallback: u64,
    pub error: u64,
}

/// Per-slot-type generation counters.
#[derive(Debug, Default)]
pub struct GenerationStats {
    by_type: Mutex<BTreeMap<String, Arc<Counters>>>,
}

impl GenerationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, slot_type: &str, outcome: Outcome) {
        let counters = {
            let Ok(mut map) = self.by_type.lock() else {
                return;
            };
            map.entry(slot_type.to_string()).or_default().clone()
        };
        let counter = match outcome {
            Outcome::Success => &counters.success,
            Outcome::Fallback => &counters.fallback,
            Outcome::Error => &counters.error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BTreeMap<String, CounterSnapshot> {
        let Ok(map) = self.by_type.lock() else {
            return BTreeMap::new();
        };
        map.iter()
            .map(|(k, c)| {
                (
                    k.clone(),
                    CounterSnapshot {
                        success: c.success.load(Ordering::Relaxed),
                        fallback: c.fallback.load(Ordering::Relaxed),
                        error: c.error.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }

    pub fn get(&self, slot_type: &str) -> CounterSnapshot {
        self.snapshot().remove(slot_type).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_type() {
        let stats = GenerationStats::new();
        stats.record("break", Outcome::Success);
        stats.record("break", Outcome::Fallback);
        stats.record("hydration", Outcome::Error);
        assert_eq!(
            stats.get("break"),
            CounterSnapshot { success: 1, fallback: 1, error: 0 }
        );
        assert_eq!(stats.get("hydration").error, 1);
        assert_eq!(stats.get("posture"), CounterSnapshot::default());
        assert_eq!(stats.snapshot().len(), 2);
    }
}
