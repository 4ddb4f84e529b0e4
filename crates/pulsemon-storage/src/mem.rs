//! In-memory backend guarded by a single whole-store lock.
//!
//! One mutex over the whole map keeps `increment`'s read-modify-write
//! atomic by construction. Per-key locks were considered and rejected: a
//! lock-creation race would need a second lock anyway, and metric sets are
//! small enough that contention on the store lock is not a concern. If
//! finer granularity is ever needed, shard by hash of the id into a fixed
//! number of independently locked partitions.

use crate::error::{Result, StorageError};
use crate::MetricStore;
use pulsemon_common::metric::{Metric, MetricKind, MetricQuery};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// The value half of a stored entry. Structurally ties each kind to the
/// one value representation it may carry.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StoredValue {
    Counter(i64),
    Gauge(f64),
}

impl StoredValue {
    fn kind(self) -> MetricKind {
        match self {
            StoredValue::Counter(_) => MetricKind::Counter,
            StoredValue::Gauge(_) => MetricKind::Gauge,
        }
    }

    fn to_metric(self, id: &str) -> Metric {
        match self {
            StoredValue::Counter(delta) => Metric::counter(id, delta),
            StoredValue::Gauge(reading) => Metric::gauge(id, reading),
        }
    }

    fn from_metric(metric: &Metric) -> Result<Self> {
        let missing = || StorageError::MissingValue {
            id: metric.id.clone(),
        };
        match metric.kind {
            MetricKind::Counter => metric.delta.map(StoredValue::Counter).ok_or_else(missing),
            MetricKind::Gauge => metric.reading.map(StoredValue::Gauge).ok_or_else(missing),
        }
    }
}

/// Single-lock in-memory metric store.
///
/// `BTreeMap` keeps entries ordered by id, which makes `list` deterministic
/// without a sort on every call.
pub struct MemStorage {
    metrics: Mutex<BTreeMap<String, StoredValue>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(BTreeMap::new()),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredValue>> {
        // A poisoned lock means a panic mid-mutation in another thread;
        // the map itself is still structurally valid, so keep serving.
        self.metrics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricStore for MemStorage {
    fn put(&self, metric: &Metric) -> Result<()> {
        let value = StoredValue::from_metric(metric)?;
        let mut map = self.locked();
        if let Some(existing) = map.get(&metric.id) {
            if existing.kind() != metric.kind {
                return Err(StorageError::TypeConflict {
                    id: metric.id.clone(),
                    requested: metric.kind,
                    stored: existing.kind(),
                });
            }
        }
        map.insert(metric.id.clone(), value);
        Ok(())
    }

    fn extract(&self, query: &MetricQuery) -> Result<Metric> {
        let map = self.locked();
        let stored = map.get(&query.id).ok_or_else(|| StorageError::NotFound {
            id: query.id.clone(),
        })?;
        if stored.kind() != query.kind {
            return Err(StorageError::TypeConflict {
                id: query.id.clone(),
                requested: query.kind,
                stored: stored.kind(),
            });
        }
        Ok(stored.to_metric(&query.id))
    }

    fn increment(&self, query: &MetricQuery, amount: i64) -> Result<()> {
        if query.kind != MetricKind::Counter {
            return Err(StorageError::InvalidOperation {
                id: query.id.clone(),
                kind: query.kind,
            });
        }
        let mut map = self.locked();
        match map.get_mut(&query.id) {
            None => Err(StorageError::NotFound {
                id: query.id.clone(),
            }),
            Some(StoredValue::Counter(delta)) => {
                *delta += amount;
                Ok(())
            }
            Some(stored) => Err(StorageError::TypeConflict {
                id: query.id.clone(),
                requested: MetricKind::Counter,
                stored: stored.kind(),
            }),
        }
    }

    fn list(&self) -> Result<Vec<Metric>> {
        let map = self.locked();
        Ok(map.iter().map(|(id, v)| v.to_metric(id)).collect())
    }

    fn bulk_put(&self, metrics: &[Metric]) -> Result<()> {
        let mut map = self.locked();
        for metric in metrics {
            let value = StoredValue::from_metric(metric)?;
            map.insert(metric.id.clone(), value);
        }
        Ok(())
    }

    fn bulk_update(&self, counters: &[Metric], gauges: &[Metric]) -> Result<()> {
        // Pre-aggregate same-id counter deltas so each id is accumulated
        // against the store exactly once per batch.
        let mut summed: HashMap<&str, i64> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for counter in counters {
            let delta = counter.delta.ok_or_else(|| StorageError::MissingValue {
                id: counter.id.clone(),
            })?;
            summed
                .entry(counter.id.as_str())
                .and_modify(|sum| *sum += delta)
                .or_insert_with(|| {
                    order.push(counter.id.as_str());
                    delta
                });
        }

        let mut map = self.locked();

        // Reject kind conflicts before touching anything so a failed batch
        // leaves the store unchanged, mirroring the transactional backend.
        let check = |map: &BTreeMap<String, StoredValue>,
                     id: &str,
                     requested: MetricKind|
         -> Result<()> {
            if let Some(stored) = map.get(id) {
                if stored.kind() != requested {
                    return Err(StorageError::TypeConflict {
                        id: id.to_string(),
                        requested,
                        stored: stored.kind(),
                    });
                }
            }
            Ok(())
        };
        for id in &order {
            check(&map, id, MetricKind::Counter)?;
        }
        for gauge in gauges {
            if gauge.reading.is_none() {
                return Err(StorageError::MissingValue {
                    id: gauge.id.clone(),
                });
            }
            check(&map, &gauge.id, MetricKind::Gauge)?;
        }

        for id in order {
            let sum = summed[id];
            match map.get_mut(id) {
                Some(StoredValue::Counter(delta)) => *delta += sum,
                _ => {
                    map.insert(id.to_string(), StoredValue::Counter(sum));
                }
            }
        }

        // Gauges overwrite; on duplicate ids the last one in batch order
        // wins, which is the documented batch contract.
        for gauge in gauges {
            if let Some(reading) = gauge.reading {
                map.insert(gauge.id.clone(), StoredValue::Gauge(reading));
            }
        }
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}
