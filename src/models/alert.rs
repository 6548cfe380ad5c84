use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::models::EndpointStatus;

/// 一次检测到的异常状况
///
/// 每个告警都携带触发它的观测值，可以独立验证。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    MemorySpike {
        service: String,
        pid: i32,
        percent: f32,
        threshold: f32,
        memory_bytes: u64,
    },
    CpuSpike {
        service: String,
        pid: i32,
        percent: f32,
        threshold: f32,
    },
    ProcessDown {
        service: String,
        process_match: String,
    },
    EndpointDown {
        url: String,
        status: EndpointStatus,
    },
    ErrorLogBurst {
        file: PathBuf,
        count: usize,
        sample_lines: Vec<String>,
    },
}

impl Alert {
    pub fn kind(&self) -> &'static str {
        match self {
            Alert::MemorySpike { .. } => "memory_spike",
            Alert::CpuSpike { .. } => "cpu_spike",
            Alert::ProcessDown { .. } => "process_down",
            Alert::EndpointDown { .. } => "endpoint_down",
            Alert::ErrorLogBurst { .. } => "error_log_burst",
        }
    }

    /// 告警对象：服务名、日志文件或 URL
    pub fn subject(&self) -> String {
        match self {
            Alert::MemorySpike { service, .. }
            | Alert::CpuSpike { service, .. }
            | Alert::ProcessDown { service, .. } => service.clone(),
            Alert::EndpointDown { url, .. } => url.clone(),
            Alert::ErrorLogBurst { file, .. } => file.display().to_string(),
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Alert::MemorySpike { pid, percent, threshold, memory_bytes, .. } => format!(
                "memory {:.2}% exceeds threshold {:.2}% (pid {}, rss {} MiB)",
                percent,
                threshold,
                pid,
                memory_bytes / (1024 * 1024)
            ),
            Alert::CpuSpike { pid, percent, threshold, .. } => format!(
                "cpu {:.2}% exceeds threshold {:.2}% (pid {})",
                percent, threshold, pid
            ),
            Alert::ProcessDown { process_match, .. } => {
                format!("no process matching '{}'", process_match)
            }
            Alert::EndpointDown { status, .. } => format!("endpoint {}", status),
            Alert::ErrorLogBurst { count, sample_lines, .. } => {
                let mut detail = format!("{} error line(s) in tail window", count);
                if let Some(last) = sample_lines.last() {
                    detail.push_str(&format!(", latest: {}", last));
                }
                detail
            }
        }
    }
}

/// 交给 Sink 的告警记录
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub detail: String,
    #[serde(flatten)]
    pub alert: Alert,
}

impl AlertRecord {
    pub fn new(tick: u64, timestamp: DateTime<Utc>, alert: Alert) -> Self {
        Self {
            tick,
            timestamp,
            subject: alert.subject(),
            detail: alert.detail(),
            alert,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.alert.kind()
    }
}
