//! The synchronization application: validation, signing policy, storage
//! dispatch, and snapshot triggering. Transport frontends (gRPC, HTTP) are
//! thin adapters over this type.

use crate::error::ServiceError;
use pulsemon_common::metric::{Metric, MetricKind, MetricQuery};
use pulsemon_common::signer;
use pulsemon_storage::error::StorageError;
use pulsemon_storage::snapshot::{Dumper, NoopDumper};
use pulsemon_storage::MetricStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct SyncApp {
    store: Arc<dyn MetricStore>,
    dumper: Arc<dyn Dumper>,
    key: String,
    sync_dump: bool,
    dump_failures: AtomicU64,
}

impl SyncApp {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self {
            store,
            dumper: Arc::new(NoopDumper),
            key: String::new(),
            sync_dump: false,
            dump_failures: AtomicU64::new(0),
        }
    }

    pub fn with_dumper(mut self, dumper: Arc<dyn Dumper>) -> Self {
        self.dumper = dumper;
        self
    }

    /// An empty key disables signing and verification end-to-end.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Synchronous durability: snapshot after every mutating call instead
    /// of on a timer.
    pub fn with_sync_dump(mut self, sync_dump: bool) -> Self {
        self.sync_dump = sync_dump;
        self
    }

    /// Periodic durability: snapshot on a fixed interval in a background
    /// task. Failures are logged and counted, never fatal to traffic.
    pub fn spawn_dump_loop(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let app = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            // the first tick completes immediately; skip it so the loop
            // dumps one interval after startup
            tick.tick().await;
            loop {
                tick.tick().await;
                app.safe_dump();
            }
        })
    }

    fn validate(&self, metric: &Metric) -> Result<(), ServiceError> {
        if metric.id.is_empty() {
            return Err(ServiceError::validation("empty metric id"));
        }
        if !metric.has_value() {
            return Err(ServiceError::validation("missing value"));
        }
        if !self.key.is_empty() && !signer::verify(metric, &self.key)? {
            return Err(ServiceError::validation("signature mismatch"));
        }
        Ok(())
    }

    fn sign_outgoing(&self, metric: &mut Metric) -> Result<(), ServiceError> {
        if !self.key.is_empty() {
            signer::sign(metric, &self.key)?;
        }
        Ok(())
    }

    /// Applies one metric and returns the signed post-update stored value.
    ///
    /// Counters route through `increment`, falling back to `put` when the
    /// id has never been seen; gauges overwrite through `put`. Validation
    /// happens strictly before any write.
    pub fn update_single(&self, metric: Metric) -> Result<Metric, ServiceError> {
        self.validate(&metric)?;

        match metric.kind {
            MetricKind::Counter => {
                let delta = metric.delta.unwrap_or_default();
                match self.store.increment(&metric.query(), delta) {
                    Err(StorageError::NotFound { .. }) => self.store.put(&metric)?,
                    other => other?,
                }
            }
            MetricKind::Gauge => self.store.put(&metric)?,
        }

        if self.sync_dump {
            self.safe_dump();
        }

        let mut stored = self.store.extract(&metric.query())?;
        self.sign_outgoing(&mut stored)?;
        Ok(stored)
    }

    /// Applies a batch atomically: every item is validated (value present,
    /// signature correct) before any storage mutation; the first invalid
    /// item rejects the whole batch. Returns the signed post-update list.
    pub fn update_batch(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>, ServiceError> {
        let mut counters = Vec::new();
        let mut gauges = Vec::new();
        for metric in metrics {
            self.validate(&metric)?;
            match metric.kind {
                MetricKind::Counter => counters.push(metric),
                MetricKind::Gauge => gauges.push(metric),
            }
        }

        self.store.bulk_update(&counters, &gauges)?;

        if self.sync_dump {
            self.safe_dump();
        }

        self.retrieve_all()
    }

    pub fn retrieve(&self, query: &MetricQuery) -> Result<Metric, ServiceError> {
        let mut stored = self.store.extract(query)?;
        self.sign_outgoing(&mut stored)?;
        Ok(stored)
    }

    pub fn retrieve_all(&self) -> Result<Vec<Metric>, ServiceError> {
        let mut metrics = self.store.list()?;
        for metric in &mut metrics {
            self.sign_outgoing(metric)?;
        }
        Ok(metrics)
    }

    pub fn health_check(&self) -> Result<(), ServiceError> {
        self.store.ping()?;
        Ok(())
    }

    /// Snapshots the full store state, logging instead of failing: a
    /// missed snapshot must never take down serving traffic.
    pub fn safe_dump(&self) {
        let metrics = match self.store.list() {
            Ok(metrics) => metrics,
            Err(e) => {
                self.dump_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Could not list storage for snapshot");
                return;
            }
        };
        if let Err(e) = self.dumper.dump(&metrics) {
            self.dump_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "Could not write snapshot");
        }
    }

    /// Number of snapshot attempts that failed since startup.
    pub fn dump_failures(&self) -> u64 {
        self.dump_failures.load(Ordering::Relaxed)
    }

    /// Drains in-flight snapshot writes. Called once during shutdown.
    pub fn close(&self) -> Result<(), ServiceError> {
        self.dumper.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsemon_storage::mem::MemStorage;
    use pulsemon_storage::snapshot::{restore, FileDumper};

    fn app() -> SyncApp {
        SyncApp::new(Arc::new(MemStorage::new()))
    }

    fn signed_app() -> SyncApp {
        app().with_key("secret")
    }

    #[test]
    fn counter_first_write_falls_back_to_put() {
        let app = app();
        let stored = app.update_single(Metric::counter("requests", 5)).unwrap();
        assert_eq!(stored.delta, Some(5));
    }

    #[test]
    fn counter_updates_accumulate() {
        let app = app();
        app.update_single(Metric::counter("requests", 5)).unwrap();
        let stored = app.update_single(Metric::counter("requests", 7)).unwrap();
        assert_eq!(stored.delta, Some(12));
    }

    #[test]
    fn gauge_updates_overwrite() {
        let app = app();
        app.update_single(Metric::gauge("cpu_load", 1.0)).unwrap();
        let stored = app.update_single(Metric::gauge("cpu_load", 0.25)).unwrap();
        assert_eq!(stored.reading, Some(0.25));
    }

    #[test]
    fn empty_id_is_a_validation_error() {
        let app = app();
        let err = app.update_single(Metric::counter("", 1)).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg == "empty metric id"));

        let err = app
            .update_batch(vec![Metric::gauge("", 1.0)])
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn value_less_update_is_a_validation_error() {
        let app = app();
        let mut metric = Metric::counter("requests", 0);
        metric.delta = None;
        let err = app.update_single(metric).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg == "missing value"));
    }

    #[test]
    fn unsigned_update_is_rejected_when_key_is_configured() {
        let app = signed_app();
        let err = app.update_single(Metric::counter("requests", 5)).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg == "signature mismatch"));
    }

    #[test]
    fn signed_update_verifies_and_returns_resigned_value() {
        let app = signed_app();
        let mut metric = Metric::counter("requests", 5);
        signer::sign(&mut metric, "secret").unwrap();
        app.update_single(metric).unwrap();

        let mut metric = Metric::counter("requests", 7);
        signer::sign(&mut metric, "secret").unwrap();
        let stored = app.update_single(metric).unwrap();

        // the response carries a signature over the accumulated value,
        // not an echo of the request's
        assert_eq!(stored.delta, Some(12));
        assert!(signer::verify(&stored, "secret").unwrap());
    }

    #[test]
    fn tampered_signature_is_rejected_before_any_write() {
        let app = signed_app();
        let mut metric = Metric::counter("requests", 5);
        signer::sign(&mut metric, "secret").unwrap();
        metric.delta = Some(50);
        let err = app.update_single(metric).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(matches!(
            app.retrieve(&MetricQuery::counter("requests")).unwrap_err(),
            ServiceError::Storage(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn batch_applies_counters_and_gauges_and_returns_full_list() {
        let app = app();
        app.update_single(Metric::counter("requests", 10)).unwrap();
        let listed = app
            .update_batch(vec![
                Metric::counter("requests", 5),
                Metric::counter("requests", 7),
                Metric::gauge("cpu_load", 0.5),
            ])
            .unwrap();

        let ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["cpu_load", "requests"]);
        assert_eq!(listed[1].delta, Some(22));
    }

    #[test]
    fn batch_with_one_invalid_item_applies_nothing() {
        let app = signed_app();
        let mut good = Metric::gauge("cpu_load", 0.5);
        signer::sign(&mut good, "secret").unwrap();
        let bad = Metric::gauge("mem_free", 1.0); // unsigned

        let err = app.update_batch(vec![good, bad]).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(app.retrieve_all().unwrap().is_empty());
    }

    #[test]
    fn retrieve_signs_results_when_enabled() {
        let app = signed_app();
        let mut metric = Metric::gauge("cpu_load", 0.5);
        signer::sign(&mut metric, "secret").unwrap();
        app.update_single(metric).unwrap();

        let stored = app.retrieve(&MetricQuery::gauge("cpu_load")).unwrap();
        assert!(signer::verify(&stored, "secret").unwrap());

        let listed = app.retrieve_all().unwrap();
        assert!(listed.iter().all(|m| m.signature.is_some()));
    }

    #[test]
    fn sync_mode_snapshots_after_every_mutation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let app = app()
            .with_dumper(Arc::new(FileDumper::new(&path)))
            .with_sync_dump(true);

        app.update_single(Metric::counter("requests", 3)).unwrap();
        let snapshot = restore(&path).unwrap();
        assert_eq!(snapshot, vec![Metric::counter("requests", 3)]);

        app.update_batch(vec![Metric::gauge("cpu_load", 1.0)]).unwrap();
        let snapshot = restore(&path).unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn failed_snapshots_are_counted_not_fatal() {
        struct FailingDumper;
        impl Dumper for FailingDumper {
            fn dump(&self, _: &[Metric]) -> pulsemon_storage::error::Result<()> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "sink unwritable").into())
            }
            fn close(&self) -> pulsemon_storage::error::Result<()> {
                Ok(())
            }
        }

        let app = app()
            .with_dumper(Arc::new(FailingDumper))
            .with_sync_dump(true);
        let stored = app.update_single(Metric::counter("requests", 1)).unwrap();
        assert_eq!(stored.delta, Some(1));
        assert_eq!(app.dump_failures(), 1);
    }
}
