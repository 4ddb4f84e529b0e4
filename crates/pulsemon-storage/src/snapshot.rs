//! Full-state snapshots for crash recovery.
//!
//! A snapshot is the complete metric list serialized as JSON and written
//! over the sink in one piece. Restore reads the whole file back; an empty
//! or absent file is a valid "nothing to restore" state. Restored metrics
//! are replayed through `bulk_put`, which trusts the snapshot and skips
//! type-conflict checks.

use crate::error::Result;
use pulsemon_common::metric::Metric;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Sink for periodic or synchronous state dumps.
///
/// `close` must not return before every in-flight `dump` has completed, so
/// shutdown never truncates a snapshot mid-write.
pub trait Dumper: Send + Sync {
    fn dump(&self, metrics: &[Metric]) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// Dumper that overwrites a single file on every call.
///
/// An in-flight counter is taken at the very start of `dump`, before the
/// snapshot is even serialized, and `close` waits until it reaches zero.
/// Writes happen while holding the counter lock, so timer-triggered and
/// request-triggered dumps never interleave their bytes.
pub struct FileDumper {
    path: PathBuf,
    in_flight: Mutex<usize>,
    drained: Condvar,
}

impl FileDumper {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    fn counter(&self) -> MutexGuard<'_, usize> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, metrics: &[Metric]) -> Result<()> {
        let serialized = serde_json::to_vec(metrics)?;
        let _guard = self.counter();
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }
}

impl Dumper for FileDumper {
    fn dump(&self, metrics: &[Metric]) -> Result<()> {
        // register before serializing, so a `close` racing this call
        // already sees it as in flight
        *self.counter() += 1;
        let result = self.write(metrics);
        let mut in_flight = self.counter();
        *in_flight -= 1;
        if *in_flight == 0 {
            self.drained.notify_all();
        }
        result
    }

    fn close(&self) -> Result<()> {
        let mut in_flight = self.counter();
        while *in_flight > 0 {
            in_flight = self
                .drained
                .wait(in_flight)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }
}

/// Dumper used when durability is disabled.
pub struct NoopDumper;

impl Dumper for NoopDumper {
    fn dump(&self, _metrics: &[Metric]) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Reads a snapshot back from disk. An absent or empty file yields an
/// empty list.
pub fn restore(path: &Path) -> Result<Vec<Metric>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    if data.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(&data)?)
}
