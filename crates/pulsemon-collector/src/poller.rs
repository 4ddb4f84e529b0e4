//! The poller produces successive metric snapshots of the local host.
//!
//! It keeps its working state in a [`MemStorage`] so the sample obeys the
//! same accumulation rules as the server side: `PollCount` is a counter
//! incremented once per poll, every sampled value is a gauge, and
//! `RandomValue` changes on each cycle as a liveness marker.

use crate::Collector;
use anyhow::Result;
use pulsemon_common::metric::{Metric, MetricQuery};
use pulsemon_storage::mem::MemStorage;
use pulsemon_storage::MetricStore;
use rand::Rng;

const POLL_COUNT: &str = "PollCount";
const RANDOM_VALUE: &str = "RandomValue";

pub struct Poller {
    store: MemStorage,
    collectors: Vec<Box<dyn Collector>>,
    start: i64,
}

impl Poller {
    /// Creates a poller with the `PollCount` counter seeded at `start`.
    pub fn new(collectors: Vec<Box<dyn Collector>>, start: i64) -> Result<Self> {
        let store = MemStorage::new();
        store.put(&Metric::counter(POLL_COUNT, start))?;
        Ok(Self {
            store,
            collectors,
            start,
        })
    }

    /// Runs one poll cycle and returns the full current sample.
    pub fn poll(&mut self) -> Result<Vec<Metric>> {
        self.store.increment(&MetricQuery::counter(POLL_COUNT), 1)?;
        self.store.put(&Metric::gauge(
            RANDOM_VALUE,
            rand::thread_rng().gen::<f64>(),
        ))?;

        for collector in &mut self.collectors {
            match collector.collect() {
                Ok(metrics) => {
                    for metric in &metrics {
                        self.store.put(metric)?;
                    }
                }
                Err(e) => {
                    tracing::warn!(collector = collector.name(), error = %e, "Collection failed")
                }
            }
        }

        Ok(self.store.list()?)
    }

    /// Resets the poll counter to its baseline. Called only after a report
    /// has been delivered, so counter baselines never move on a failed send.
    pub fn reset(&self) -> Result<()> {
        self.store.put(&Metric::counter(POLL_COUNT, self.start))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticCollector;

    impl Collector for StaticCollector {
        fn name(&self) -> &str {
            "static"
        }

        fn collect(&mut self) -> Result<Vec<Metric>> {
            Ok(vec![Metric::gauge("StaticValue", 1.0)])
        }
    }

    struct FailingCollector;

    impl Collector for FailingCollector {
        fn name(&self) -> &str {
            "failing"
        }

        fn collect(&mut self) -> Result<Vec<Metric>> {
            anyhow::bail!("probe unavailable")
        }
    }

    fn find<'a>(metrics: &'a [Metric], id: &str) -> &'a Metric {
        metrics.iter().find(|m| m.id == id).unwrap()
    }

    #[test]
    fn poll_count_accumulates_across_cycles() {
        let mut poller = Poller::new(vec![Box::new(StaticCollector)], 0).unwrap();
        poller.poll().unwrap();
        let sample = poller.poll().unwrap();
        assert_eq!(find(&sample, "PollCount").delta, Some(2));
        assert_eq!(find(&sample, "StaticValue").reading, Some(1.0));
        assert!(find(&sample, "RandomValue").reading.is_some());
    }

    #[test]
    fn reset_restores_the_counter_baseline() {
        let mut poller = Poller::new(vec![], 0).unwrap();
        poller.poll().unwrap();
        poller.poll().unwrap();
        poller.reset().unwrap();
        let sample = poller.poll().unwrap();
        assert_eq!(find(&sample, "PollCount").delta, Some(1));
    }

    #[test]
    fn failing_collector_does_not_poison_the_sample() {
        let mut poller = Poller::new(
            vec![Box::new(FailingCollector), Box::new(StaticCollector)],
            0,
        )
        .unwrap();
        let sample = poller.poll().unwrap();
        assert_eq!(find(&sample, "StaticValue").reading, Some(1.0));
    }
}
