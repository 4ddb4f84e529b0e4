//! Host metric sampling for the pulsemon agent.
//!
//! Each [`Collector`] implementation gathers one category of system gauges
//! (CPU, memory, load). The [`poller::Poller`] drives them on a schedule
//! and maintains the agent's own bookkeeping metrics on top.

pub mod cpu;
pub mod load;
pub mod memory;
pub mod poller;

use anyhow::Result;
use pulsemon_common::metric::Metric;

/// A system metric collector running on the agent host.
///
/// Implementations are registered with the poller and called once per poll
/// cycle. A transient failure in one collector is logged and skipped; it
/// never poisons the rest of the sample.
pub trait Collector: Send + Sync {
    /// Collector name (e.g. `"cpu"`), used for logging.
    fn name(&self) -> &str;

    /// Collects the current gauge values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<Vec<Metric>>;
}
