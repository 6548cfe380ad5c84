use crate::config::MonitorConfig;
use crate::models::{Alert, TickObservations};

/// `ErrorLogBurst` 携带的匹配行数
pub const BURST_SAMPLE_LINES: usize = 3;

/// 根据一次 tick 的观测结果生成告警
///
/// 不保存跨 tick 状态，持续的异常每个 tick 都会告警。比较是严格大于，等于阈值不告警。
pub fn evaluate(observations: &TickObservations, config: &MonitorConfig) -> Vec<Alert> {
    let mut alerts = Vec::new();

    // 进程告警，按配置中的服务顺序
    if let Some(processes) = &observations.processes {
        for spec in &config.services {
            let Some(observation) = processes.iter().find(|o| o.service == spec.name) else {
                continue;
            };

            let Some(sample) = &observation.sample else {
                alerts.push(Alert::ProcessDown {
                    service: spec.name.clone(),
                    process_match: spec.process_match.clone(),
                });
                continue;
            };

            if sample.mem_percent > spec.memory_threshold_percent {
                alerts.push(Alert::MemorySpike {
                    service: spec.name.clone(),
                    pid: sample.pid,
                    percent: sample.mem_percent,
                    threshold: spec.memory_threshold_percent,
                    memory_bytes: sample.memory_bytes,
                });
            }

            if let Some(cpu_threshold) = spec.cpu_threshold_percent {
                if sample.cpu_percent > cpu_threshold {
                    alerts.push(Alert::CpuSpike {
                        service: spec.name.clone(),
                        pid: sample.pid,
                        percent: sample.cpu_percent,
                        threshold: cpu_threshold,
                    });
                }
            }
        }
    }

    // 端点告警
    if let Some(status) = &observations.endpoint {
        if !status.is_responding() {
            alerts.push(Alert::EndpointDown {
                url: config.endpoint_url.clone(),
                status: status.clone(),
            });
        }
    }

    // 日志告警，每个文件最多一条
    if let Some(matches) = &observations.log_matches {
        for file in &config.log_files {
            let lines: Vec<&str> = matches
                .iter()
                .filter(|m| &m.file == file)
                .map(|m| m.line_text.as_str())
                .collect();

            if !lines.is_empty() && lines.len() >= config.error_burst_threshold {
                let skip = lines.len().saturating_sub(BURST_SAMPLE_LINES);
                alerts.push(Alert::ErrorLogBurst {
                    file: file.clone(),
                    count: lines.len(),
                    sample_lines: lines[skip..].iter().map(|l| l.to_string()).collect(),
                });
            }
        }
    }

    alerts
}
