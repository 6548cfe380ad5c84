use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::config::MonitorConfig;
use crate::error::{CollectorError, ConfigError};
use crate::metrics::METRICS;
use crate::models::{Alert, AlertRecord, TickObservations};
use crate::services::{evaluate, EndpointProbe, LogScanner, ProcessSampler};
use crate::sink::AlertSink;

/// 监控循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Sampling,
    Stopped,
}

/// 一次完成的 tick 的结果
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub alerts: Vec<Alert>,
    pub elapsed: Duration,
    pub overrun: bool,
}

/// 三个采集器，启动时根据配置构建一次
pub struct Collectors {
    sampler: Arc<ProcessSampler>,
    probe: EndpointProbe,
    scanner: Arc<LogScanner>,
}

impl Collectors {
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            sampler: Arc::new(ProcessSampler::new(&config.services)?),
            probe: EndpointProbe::new(&config.endpoint_url, config.endpoint_timeout())?,
            scanner: Arc::new(LogScanner::new(&config.error_patterns, config.log_tail_lines)?),
        })
    }

    /// 并发运行所有采集器
    ///
    /// 失败或超过 `collectorTimeoutSeconds` 的采集器结果记为缺席。
    pub async fn collect(&self, config: &MonitorConfig) -> TickObservations {
        let limit = config.collector_timeout();

        let sampler = Arc::clone(&self.sampler);
        let processes = run_blocking("process", limit, move || sampler.sample());

        let scanner = Arc::clone(&self.scanner);
        let files = config.log_files.clone();
        let logs = run_blocking("logs", limit, move || Ok(scanner.scan_all(&files)));

        let (processes, endpoint, logs) = tokio::join!(processes, self.probe.probe(), logs);

        TickObservations {
            processes: collected("process", processes),
            endpoint: Some(endpoint),
            log_matches: collected("logs", logs).map(|(matches, errors)| {
                for e in errors {
                    report_collector_error("logs", &e);
                }
                matches
            }),
        }
    }
}

async fn run_blocking<T, F>(collector: &'static str, limit: Duration, f: F) -> Result<T, CollectorError>
where
    F: FnOnce() -> Result<T, CollectorError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Err(_) => Err(CollectorError::Timeout { collector, after: limit }),
        Ok(Err(join_error)) => Err(CollectorError::Task {
            collector,
            message: join_error.to_string(),
        }),
        Ok(Ok(result)) => result,
    }
}

fn collected<T>(collector: &str, result: Result<T, CollectorError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            report_collector_error(collector, &e);
            None
        }
    }
}

fn report_collector_error(collector: &str, err: &CollectorError) {
    warn!("⚠️  {} collector: {}", collector, err);
    METRICS.collector_error(collector);
}

fn deliver<S: AlertSink>(sink: &mut S, tick: u64, at: DateTime<Utc>, alerts: &[Alert]) -> std::io::Result<()> {
    sink.begin_tick(tick, at)?;
    for alert in alerts {
        sink.emit(&AlertRecord::new(tick, at, alert.clone()))?;
    }
    sink.end_tick(tick, alerts.len())
}

pub struct MonitorLoop<S: AlertSink> {
    config: Arc<MonitorConfig>,
    collectors: Collectors,
    sink: S,
    shutdown: broadcast::Receiver<()>,
    tick: u64,
    state: LoopState,
}

impl<S: AlertSink> MonitorLoop<S> {
    /// `shutdown` 收到消息或发送端被丢弃时循环停止
    pub fn new(config: MonitorConfig, sink: S, shutdown: broadcast::Receiver<()>) -> Result<Self, ConfigError> {
        let collectors = Collectors::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            collectors,
            sink,
            shutdown,
            tick: 0,
            state: LoopState::Idle,
        })
    }

    /// 已完成的 tick 数
    #[cfg(test)]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// 执行一个 tick
    ///
    /// 采集完成前收到关闭信号时返回 `None`，该 tick 不会向 sink 输出任何内容。
    pub async fn run_tick(&mut self) -> Option<TickReport> {
        let tick = self.tick + 1;
        let started = Instant::now();
        let at = Utc::now();
        self.state = LoopState::Sampling;
        debug!("Tick #{} started", tick);

        let observations = tokio::select! {
            biased;
            _ = self.shutdown.recv() => {
                info!("Shutdown during tick #{}, discarding in-flight collectors", tick);
                self.state = LoopState::Stopped;
                return None;
            }
            observations = self.collectors.collect(&self.config) => observations,
        };

        let alerts = evaluate(&observations, &self.config);
        let elapsed = started.elapsed();
        let budget = self.config.tick_budget();
        let overrun = elapsed > budget;
        if overrun {
            warn!("TickOverrun: tick #{} took {:?} (budget {:?})", tick, elapsed, budget);
        }

        self.emit(tick, at, &alerts);
        METRICS.observe_tick(&observations, &alerts, &self.config.log_files, elapsed, overrun);
        if let Some(path) = &self.config.metrics_file {
            if let Err(e) = METRICS.write_textfile(path) {
                error!("Failed to write metrics file {}: {}", path.display(), e);
            }
        }

        self.tick = tick;
        self.state = LoopState::Idle;
        debug!("Tick #{} finished in {:?} with {} alert(s)", tick, elapsed, alerts.len());

        Some(TickReport {
            tick,
            alerts,
            elapsed,
            overrun,
        })
    }

    fn emit(&mut self, tick: u64, at: DateTime<Utc>, alerts: &[Alert]) {
        if let Err(e) = deliver(&mut self.sink, tick, at, alerts) {
            error!("❌ Failed to deliver alerts for tick #{}: {}", tick, e);
        }
    }

    /// 按固定间隔运行直到关闭，错过的 tick 直接跳过
    pub async fn run(mut self) -> u64 {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "🚀 Monitoring {} service(s), endpoint {}, {} log file(s) every {:?}",
            self.config.services.len(),
            self.config.endpoint_url,
            self.config.log_files.len(),
            self.config.tick_interval()
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.recv() => break,
                _ = interval.tick() => {}
            }

            self.run_tick().await;
            if self.state == LoopState::Stopped {
                break;
            }
        }

        self.state = LoopState::Stopped;
        info!("Monitor stopped after {} tick(s)", self.tick);
        self.tick
    }
}
