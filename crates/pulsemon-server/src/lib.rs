//! Server-side synchronization service: the application core mediating all
//! client interaction with the metric store, plus its gRPC and HTTP
//! frontends.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod grpc;
pub mod logging;
