//! Authoritative latest-value storage for metrics.
//!
//! The store enforces the two structural invariants of the data model: a
//! metric's kind never changes after creation, and counters accumulate
//! while gauges overwrite. Two interchangeable backends are provided:
//! [`mem::MemStorage`] (a single-lock in-memory map) and
//! [`sqlite::SqliteStorage`] (transactional SQLite for durable setups).
//! [`snapshot`] adds full-state dump/restore for crash recovery.

pub mod error;
pub mod mem;
pub mod snapshot;
pub mod sqlite;


use error::Result;
use pulsemon_common::metric::{Metric, MetricQuery};

/// Key-value store of metrics keyed by id.
///
/// All methods take `&self`; implementations provide their own interior
/// locking or transactions. Callers always receive independent copies,
/// never references into the store.
pub trait MetricStore: Send + Sync {
    /// Stores the metric as-is if the id is unseen, or overwrites a
    /// same-kind entry. Fails with `TypeConflict` when the id exists with
    /// a different kind.
    fn put(&self, metric: &Metric) -> Result<()>;

    /// Returns the stored metric for the query's id. Fails with `NotFound`
    /// when absent and `TypeConflict` when the stored kind differs from
    /// the requested one.
    fn extract(&self, query: &MetricQuery) -> Result<Metric>;

    /// Adds `amount` to an existing counter's delta, atomically with the
    /// read. Fails with `InvalidOperation` for non-counter queries and
    /// `NotFound` when the metric does not exist yet; first writes go
    /// through `put` explicitly, increments are never upserts.
    fn increment(&self, query: &MetricQuery, amount: i64) -> Result<()>;

    /// All stored metrics, ordered by id for reproducible listings.
    fn list(&self) -> Result<Vec<Metric>>;

    /// Unconditional overwrite of each metric, bypassing type-conflict
    /// checks. Used only to replay a trusted snapshot.
    fn bulk_put(&self, metrics: &[Metric]) -> Result<()>;

    /// Applies one batch: counter deltas with the same id are pre-summed
    /// and accumulated once against the stored value, gauge readings
    /// overwrite (last one in batch order wins on duplicates).
    fn bulk_update(&self, counters: &[Metric], gauges: &[Metric]) -> Result<()>;

    /// Liveness check against the backing medium.
    fn ping(&self) -> Result<()>;
}
