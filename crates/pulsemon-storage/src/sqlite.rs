//! Durable SQLite backend.
//!
//! Equivalent semantics to [`crate::mem::MemStorage`], with atomicity
//! provided by backend transactions instead of the store lock:
//! `increment`, `bulk_put`, and `bulk_update` each run inside one
//! transaction and roll back on any failure.

use crate::error::{Result, StorageError};
use crate::MetricStore;
use pulsemon_common::metric::{Metric, MetricKind, MetricQuery};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS metric (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                delta INTEGER,
                reading REAL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// A kind column holding neither 'counter' nor 'gauge' means a corrupt row;
// surface it as a conversion failure instead of panicking.
fn parse_kind(raw: &str) -> Result<MetricKind> {
    raw.parse().map_err(|_: String| {
        StorageError::Sqlite(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown metric kind '{raw}'").into(),
        ))
    })
}

fn row_to_metric(id: &str, kind: MetricKind, delta: Option<i64>, reading: Option<f64>) -> Metric {
    Metric {
        id: id.to_string(),
        kind,
        delta,
        reading,
        signature: None,
    }
}

fn fetch(conn: &Connection, id: &str) -> Result<Option<Metric>> {
    let row = conn
        .query_row(
            "SELECT kind, delta, reading FROM metric WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            },
        )
        .optional()?;
    match row {
        None => Ok(None),
        Some((kind_raw, delta, reading)) => {
            let kind = parse_kind(&kind_raw)?;
            Ok(Some(row_to_metric(id, kind, delta, reading)))
        }
    }
}

fn upsert(conn: &Connection, metric: &Metric) -> Result<()> {
    match metric.kind {
        MetricKind::Counter => {
            let delta = metric.delta.ok_or_else(|| StorageError::MissingValue {
                id: metric.id.clone(),
            })?;
            conn.execute(
                "INSERT INTO metric (id, kind, delta, reading)
                 VALUES (?1, 'counter', ?2, NULL)
                 ON CONFLICT (id) DO UPDATE SET kind = 'counter', delta = excluded.delta, reading = NULL",
                params![metric.id, delta],
            )?;
        }
        MetricKind::Gauge => {
            let reading = metric.reading.ok_or_else(|| StorageError::MissingValue {
                id: metric.id.clone(),
            })?;
            conn.execute(
                "INSERT INTO metric (id, kind, delta, reading)
                 VALUES (?1, 'gauge', NULL, ?2)
                 ON CONFLICT (id) DO UPDATE SET kind = 'gauge', delta = NULL, reading = excluded.reading",
                params![metric.id, reading],
            )?;
        }
    }
    Ok(())
}

fn check_kind(conn: &Connection, id: &str, requested: MetricKind) -> Result<Option<MetricKind>> {
    match fetch(conn, id)? {
        None => Ok(None),
        Some(existing) if existing.kind == requested => Ok(Some(existing.kind)),
        Some(existing) => Err(StorageError::TypeConflict {
            id: id.to_string(),
            requested,
            stored: existing.kind,
        }),
    }
}

impl MetricStore for SqliteStorage {
    fn put(&self, metric: &Metric) -> Result<()> {
        let conn = self.locked();
        check_kind(&conn, &metric.id, metric.kind)?;
        upsert(&conn, metric)
    }

    fn extract(&self, query: &MetricQuery) -> Result<Metric> {
        let conn = self.locked();
        let metric = fetch(&conn, &query.id)?.ok_or_else(|| StorageError::NotFound {
            id: query.id.clone(),
        })?;
        if metric.kind != query.kind {
            return Err(StorageError::TypeConflict {
                id: query.id.clone(),
                requested: query.kind,
                stored: metric.kind,
            });
        }
        Ok(metric)
    }

    fn increment(&self, query: &MetricQuery, amount: i64) -> Result<()> {
        if query.kind != MetricKind::Counter {
            return Err(StorageError::InvalidOperation {
                id: query.id.clone(),
                kind: query.kind,
            });
        }
        let mut conn = self.locked();
        let tx = conn.transaction()?;
        match check_kind(&tx, &query.id, MetricKind::Counter)? {
            None => {
                return Err(StorageError::NotFound {
                    id: query.id.clone(),
                })
            }
            Some(_) => {
                tx.execute(
                    "UPDATE metric SET delta = delta + ?2 WHERE id = ?1",
                    params![query.id, amount],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<Metric>> {
        let conn = self.locked();
        let mut stmt =
            conn.prepare_cached("SELECT id, kind, delta, reading FROM metric ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
            ))
        })?;
        let mut metrics = Vec::new();
        for row in rows {
            let (id, kind_raw, delta, reading) = row?;
            let kind = parse_kind(&kind_raw)?;
            metrics.push(row_to_metric(&id, kind, delta, reading));
        }
        Ok(metrics)
    }

    fn bulk_put(&self, metrics: &[Metric]) -> Result<()> {
        let mut conn = self.locked();
        let tx = conn.transaction()?;
        for metric in metrics {
            upsert(&tx, metric)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn bulk_update(&self, counters: &[Metric], gauges: &[Metric]) -> Result<()> {
        // Same batch-internal pre-aggregation as the in-memory backend.
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

        let mut conn = self.locked();
        let tx = conn.transaction()?;
        for id in order {
            let sum = summed[id];
            match check_kind(&tx, id, MetricKind::Counter)? {
                None => upsert(&tx, &Metric::counter(id, sum))?,
                Some(_) => {
                    tx.execute(
                        "UPDATE metric SET delta = delta + ?2 WHERE id = ?1",
                        params![id, sum],
                    )?;
                }
            }
        }
        for gauge in gauges {
            let reading = gauge.reading.ok_or_else(|| StorageError::MissingValue {
                id: gauge.id.clone(),
            })?;
            check_kind(&tx, &gauge.id, MetricKind::Gauge)?;
            upsert(&tx, &Metric::gauge(gauge.id.clone(), reading))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        let conn = self.locked();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}
