mod config;
mod reporter;

use anyhow::Result;
use pulsemon_collector::cpu::CpuCollector;
use pulsemon_collector::load::LoadCollector;
use pulsemon_collector::memory::MemoryCollector;
use pulsemon_collector::poller::Poller;
use pulsemon_collector::Collector;
use pulsemon_common::metric::Metric;
use reporter::{GrpcTransport, Reporter};
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulsemon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());
    let config = config::AgentConfig::load(&config_path)?;

    tracing::info!(
        server = %config.server_endpoint,
        poll_interval_secs = config.poll_interval_secs,
        report_interval_secs = config.report_interval_secs,
        signing = !config.key.is_empty(),
        "pulsemon-agent starting"
    );

    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(CpuCollector::new()),
        Box::new(MemoryCollector::new()),
        Box::new(LoadCollector::new()),
    ];
    let mut poller = Poller::new(collectors, 0)?;

    let transport = GrpcTransport::connect(config.grpc_endpoint()).await?;
    let reporter = Reporter::new(transport, config.key.clone());

    let mut poll_tick = interval(Duration::from_secs(config.poll_interval_secs));
    let mut report_tick = interval(Duration::from_secs(config.report_interval_secs));
    let mut last_sample: Vec<Metric> = Vec::new();

    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                match poller.poll() {
                    Ok(sample) => {
                        tracing::debug!(count = sample.len(), "Polled host metrics");
                        last_sample = sample;
                    }
                    Err(e) => tracing::warn!(error = %e, "Poll cycle failed"),
                }
            }
            _ = report_tick.tick() => {
                match reporter.report_all(last_sample.clone()).await {
                    Ok(()) => {
                        // the counter baseline moves only once its deltas
                        // have actually been delivered
                        if let Err(e) = poller.reset() {
                            tracing::warn!(error = %e, "Could not reset the poll counter");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Report failed, deltas carry over"),
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutting down gracefully");
                break;
            }
        }
    }

    Ok(())
}
