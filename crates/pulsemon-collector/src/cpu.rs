use crate::Collector;
use anyhow::Result;
use pulsemon_common::metric::Metric;
use sysinfo::System;

pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system.refresh_cpu_all();
        let mut metrics = Vec::new();

        metrics.push(Metric::gauge(
            "CpuUtilization",
            f64::from(self.system.global_cpu_usage()),
        ));

        for (i, cpu) in self.system.cpus().iter().enumerate() {
            metrics.push(Metric::gauge(
                format!("CpuUtilization{}", i + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }

        Ok(metrics)
    }
}
