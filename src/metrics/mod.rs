use prometheus::{
    Encoder, GaugeVec, Gauge, CounterVec, Counter, Opts, Registry, TextEncoder,
    register_gauge_vec_with_registry, register_counter_vec_with_registry,
    register_gauge_with_registry, register_counter_with_registry,
};
use lazy_static::lazy_static;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;

use crate::models::{Alert, TickObservations};

pub struct MetricsRegistry {
    registry: Registry,

    // Gauge metrics
    pub service_up: GaugeVec,
    pub service_cpu_percent: GaugeVec,
    pub service_memory_percent: GaugeVec,
    pub service_memory_bytes: GaugeVec,
    pub endpoint_up: Gauge,
    pub endpoint_latency_seconds: Gauge,
    pub log_matches: GaugeVec,
    pub tick_duration_seconds: Gauge,

    // Counter metrics
    pub ticks_total: Counter,
    pub tick_overruns_total: Counter,
    pub alerts_total: CounterVec,
    pub collector_errors_total: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace("health_monitor")
                .const_label("hostname", hostname.as_str())
        };
        let registry = Registry::new();

        // 监控进程自身的 CPU、内存、fd
        #[cfg(target_os = "linux")]
        if let Err(e) = registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self())) {
            log::warn!("Failed to register process collector: {}", e);
        }

        // Gauge metrics
        let service_up = register_gauge_vec_with_registry!(
            opts("service_up", "Service has a matching process (1) or not (0)"),
            &["service"],
            registry
        ).unwrap();

        let service_cpu_percent = register_gauge_vec_with_registry!(
            opts("service_cpu_percent", "CPU usage of the service main process"),
            &["service"],
            registry
        ).unwrap();

        let service_memory_percent = register_gauge_vec_with_registry!(
            opts("service_memory_percent", "Resident memory of the service main process, percent of total"),
            &["service"],
            registry
        ).unwrap();

        let service_memory_bytes = register_gauge_vec_with_registry!(
            opts("service_memory_bytes", "Resident memory of the service main process in bytes"),
            &["service"],
            registry
        ).unwrap();

        let endpoint_up = register_gauge_with_registry!(
            opts("endpoint_up", "Health endpoint responded with 2xx/3xx (1) or not (0)"),
            registry
        ).unwrap();

        let endpoint_latency_seconds = register_gauge_with_registry!(
            opts("endpoint_latency_seconds", "Latency of the last successful health probe"),
            registry
        ).unwrap();

        let log_matches = register_gauge_vec_with_registry!(
            opts("log_matches", "Error lines found in the tail window of a log file"),
            &["file"],
            registry
        ).unwrap();

        let tick_duration_seconds = register_gauge_with_registry!(
            opts("tick_duration_seconds", "Wall time of the last tick"),
            registry
        ).unwrap();

        // Counter metrics
        let ticks_total = register_counter_with_registry!(
            opts("ticks_total", "Completed monitor ticks"),
            registry
        ).unwrap();

        let tick_overruns_total = register_counter_with_registry!(
            opts("tick_overruns_total", "Ticks that exceeded the tick budget"),
            registry
        ).unwrap();

        let alerts_total = register_counter_vec_with_registry!(
            opts("alerts_total", "Alerts emitted by kind"),
            &["kind"],
            registry
        ).unwrap();

        let collector_errors_total = register_counter_vec_with_registry!(
            opts("collector_errors_total", "Collector failures by collector"),
            &["collector"],
            registry
        ).unwrap();

        Self {
            registry,
            service_up,
            service_cpu_percent,
            service_memory_percent,
            service_memory_bytes,
            endpoint_up,
            endpoint_latency_seconds,
            log_matches,
            tick_duration_seconds,
            ticks_total,
            tick_overruns_total,
            alerts_total,
            collector_errors_total,
        }
    }

    /// 记录一次 tick 的观测与告警
    pub fn observe_tick(
        &self,
        observations: &TickObservations,
        alerts: &[Alert],
        log_files: &[std::path::PathBuf],
        elapsed: Duration,
        overrun: bool,
    ) {
        if let Some(processes) = &observations.processes {
            for observation in processes {
                let labels = &[observation.service.as_str()];
                self.service_up
                    .with_label_values(labels)
                    .set(if observation.is_running() { 1.0 } else { 0.0 });

                match &observation.sample {
                    Some(sample) => {
                        self.service_cpu_percent.with_label_values(labels).set(sample.cpu_percent as f64);
                        self.service_memory_percent.with_label_values(labels).set(sample.mem_percent as f64);
                        self.service_memory_bytes.with_label_values(labels).set(sample.memory_bytes as f64);
                    }
                    None => {
                        // 服务宕机时不保留旧值
                        let _ = self.service_cpu_percent.remove_label_values(labels);
                        let _ = self.service_memory_percent.remove_label_values(labels);
                        let _ = self.service_memory_bytes.remove_label_values(labels);
                    }
                }
            }
        }

        if let Some(status) = &observations.endpoint {
            match status {
                crate::models::EndpointStatus::Responding { latency_ms } => {
                    self.endpoint_up.set(1.0);
                    self.endpoint_latency_seconds.set(latency_ms / 1000.0);
                }
                _ => self.endpoint_up.set(0.0),
            }
        }

        if let Some(matches) = &observations.log_matches {
            for file in log_files {
                let count = matches.iter().filter(|m| &m.file == file).count();
                let file_label = file.display().to_string();
                self.log_matches.with_label_values(&[file_label.as_str()]).set(count as f64);
            }
        }

        for alert in alerts {
            self.alerts_total.with_label_values(&[alert.kind()]).inc();
        }

        self.ticks_total.inc();
        self.tick_duration_seconds.set(elapsed.as_secs_f64());
        if overrun {
            self.tick_overruns_total.inc();
        }
    }

    pub fn collector_error(&self, collector: &str) {
        self.collector_errors_total.with_label_values(&[collector]).inc();
    }

    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// 以 node_exporter textfile 的方式写出：先写临时文件再 rename
    pub fn write_textfile(&self, path: &Path) -> anyhow::Result<()> {
        let text = self.render().map_err(|e| anyhow::anyhow!("Failed to render metrics: {}", e))?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref METRICS: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}
