//! Ships polled samples to the synchronization server.
//!
//! The transport is a trait so the reporter logic stays testable without a
//! live server. Batch submission is negotiated once per process: the first
//! `BatchUnsupported` answer permanently switches the reporter to per-metric
//! submission, starting with the very call that got the answer.

use async_trait::async_trait;
use pulsemon_common::metric::{Metric, MetricKind};
use pulsemon_common::proto::metric_sync_client::MetricSyncClient;
use pulsemon_common::proto::{MetricList, MetricValue};
use pulsemon_common::signer::{self, SignError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tonic::transport::Channel;
use tonic::{Code, Status};

#[derive(Debug, Error)]
pub enum TransportError {
    /// The server has no batch path. Distinct from a batch that failed.
    #[error("batch submission not supported by the server")]
    BatchUnsupported,
    #[error("server rejected the submission: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Signing(#[from] SignError),
}

#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn submit_single(&self, metric: Metric) -> Result<Metric, TransportError>;
    async fn submit_batch(&self, metrics: Vec<Metric>) -> Result<(), TransportError>;
}

pub struct Reporter<T> {
    transport: Arc<T>,
    key: String,
    batch_capable: AtomicBool,
}

impl<T: SyncTransport + 'static> Reporter<T> {
    pub fn new(transport: T, key: impl Into<String>) -> Self {
        Self {
            transport: Arc::new(transport),
            key: key.into(),
            batch_capable: AtomicBool::new(true),
        }
    }

    pub fn batch_capable(&self) -> bool {
        self.batch_capable.load(Ordering::Relaxed)
    }

    /// Delivers one sample, preferring the batch path while the server
    /// supports it. Per-metric fallback sends run concurrently; the first
    /// error is returned after every send has completed.
    pub async fn report_all(&self, mut metrics: Vec<Metric>) -> Result<(), TransportError> {
        if metrics.is_empty() {
            return Ok(());
        }

        if !self.key.is_empty() {
            for metric in &mut metrics {
                signer::sign(metric, &self.key)?;
            }
        }

        let report_id = uuid::Uuid::new_v4();
        let started = Instant::now();
        let count = metrics.len();

        if self.batch_capable.load(Ordering::Relaxed) {
            match self.transport.submit_batch(metrics.clone()).await {
                Ok(()) => {
                    tracing::debug!(
                        %report_id,
                        count,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Batch reported"
                    );
                    return Ok(());
                }
                Err(TransportError::BatchUnsupported) => {
                    tracing::info!(%report_id, "Server has no batch path, switching to per-metric submission");
                    self.batch_capable.store(false, Ordering::Relaxed);
                }
                Err(e) => return Err(e),
            }
        }

        let mut sends = tokio::task::JoinSet::new();
        for metric in metrics {
            let transport = Arc::clone(&self.transport);
            sends.spawn(async move { transport.submit_single(metric).await });
        }

        let mut first_error = None;
        while let Some(joined) = sends.join_next().await {
            let result = match joined {
                Ok(result) => result.map(|_| ()),
                Err(e) => Err(TransportError::Unavailable(e.to_string())),
            };
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::debug!(
                    %report_id,
                    count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Metrics reported individually"
                );
                Ok(())
            }
        }
    }
}

pub struct GrpcTransport {
    client: MetricSyncClient<Channel>,
}

impl GrpcTransport {
    pub async fn connect(endpoint: String) -> Result<Self, TransportError> {
        let client = MetricSyncClient::connect(endpoint)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

fn to_proto(metric: Metric) -> MetricValue {
    MetricValue {
        id: metric.id,
        kind: metric.kind.to_string(),
        delta: metric.delta,
        reading: metric.reading,
        signature: metric.signature.unwrap_or_default(),
    }
}

fn from_proto(value: MetricValue) -> Result<Metric, TransportError> {
    let kind: MetricKind = value
        .kind
        .parse()
        .map_err(|e: String| TransportError::Rejected(e))?;
    Ok(Metric {
        id: value.id,
        kind,
        delta: value.delta,
        reading: value.reading,
        signature: (!value.signature.is_empty()).then_some(value.signature),
    })
}

fn from_status(status: Status) -> TransportError {
    match status.code() {
        Code::Unimplemented => TransportError::BatchUnsupported,
        Code::Unavailable => TransportError::Unavailable(status.message().to_string()),
        code => TransportError::Rejected(format!("{code:?}: {}", status.message())),
    }
}

#[async_trait]
impl SyncTransport for GrpcTransport {
    async fn submit_single(&self, metric: Metric) -> Result<Metric, TransportError> {
        // tonic clients clone cheaply; each call gets its own handle
        let mut client = self.client.clone();
        let response = client
            .update_value(to_proto(metric))
            .await
            .map_err(from_status)?;
        from_proto(response.into_inner())
    }

    async fn submit_batch(&self, metrics: Vec<Metric>) -> Result<(), TransportError> {
        let mut client = self.client.clone();
        client
            .update_values(MetricList {
                metrics: metrics.into_iter().map(to_proto).collect(),
            })
            .await
            .map_err(from_status)?;
        Ok(())
    }
}
