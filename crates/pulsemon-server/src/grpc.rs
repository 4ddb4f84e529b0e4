//! gRPC frontend for the synchronization service.
//!
//! A batch-capable client probing this server distinguishes "batch path
//! absent" from "batch failed" by the `Unimplemented` status code; every
//! application error keeps its own distinct code (see
//! [`crate::error::ServiceError::grpc_status`]).

use crate::app::SyncApp;
use crate::error::ServiceError;
use pulsemon_common::metric::{Metric, MetricKind, MetricQuery};
use pulsemon_common::proto::metric_sync_server::MetricSync;
use pulsemon_common::proto::{Empty, MetricList, MetricRequest, MetricValue};
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct MetricSyncImpl {
    app: Arc<SyncApp>,
}

impl MetricSyncImpl {
    pub fn new(app: Arc<SyncApp>) -> Self {
        Self { app }
    }
}

fn parse_kind(raw: &str) -> Result<MetricKind, Status> {
    raw.parse()
        .map_err(|e: String| ServiceError::validation(e).grpc_status())
}

fn from_proto(value: MetricValue) -> Result<Metric, Status> {
    let kind = parse_kind(&value.kind)?;
    Ok(Metric {
        id: value.id,
        kind,
        delta: value.delta,
        reading: value.reading,
        signature: (!value.signature.is_empty()).then_some(value.signature),
    })
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

#[tonic::async_trait]
impl MetricSync for MetricSyncImpl {
    async fn update_value(
        &self,
        request: Request<MetricValue>,
    ) -> Result<Response<MetricValue>, Status> {
        let metric = from_proto(request.into_inner())?;
        let stored = self
            .app
            .update_single(metric)
            .map_err(|e| e.grpc_status())?;
        Ok(Response::new(to_proto(stored)))
    }

    async fn update_values(
        &self,
        request: Request<MetricList>,
    ) -> Result<Response<MetricList>, Status> {
        let metrics = request
            .into_inner()
            .metrics
            .into_iter()
            .map(from_proto)
            .collect::<Result<Vec<_>, _>>()?;
        let listed = self
            .app
            .update_batch(metrics)
            .map_err(|e| e.grpc_status())?;
        Ok(Response::new(MetricList {
            metrics: listed.into_iter().map(to_proto).collect(),
        }))
    }

    async fn retrieve_value(
        &self,
        request: Request<MetricRequest>,
    ) -> Result<Response<MetricValue>, Status> {
        let req = request.into_inner();
        let query = MetricQuery {
            id: req.id,
            kind: parse_kind(&req.kind)?,
        };
        let stored = self.app.retrieve(&query).map_err(|e| e.grpc_status())?;
        Ok(Response::new(to_proto(stored)))
    }

    async fn list_values(&self, _request: Request<Empty>) -> Result<Response<MetricList>, Status> {
        let listed = self.app.retrieve_all().map_err(|e| e.grpc_status())?;
        Ok(Response::new(MetricList {
            metrics: listed.into_iter().map(to_proto).collect(),
        }))
    }

    async fn ping(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.app.health_check().map_err(|e| e.grpc_status())?;
        Ok(Response::new(Empty {}))
    }
}
