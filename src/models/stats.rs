use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSample {
    pub service_name: String,

    pub pid: i32,

    pub parent_pid: Option<i32>,

    /// CPU 使用率 (百分比，0-100)
    pub cpu_percent: f32,

    /// 内存使用率 (百分比，0-100)
    pub mem_percent: f32,

    /// 常驻内存 (字节)
    pub memory_bytes: u64,

    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
impl ProcessSample {
    pub fn new(service_name: &str, pid: i32, cpu_percent: f32, mem_percent: f32) -> Self {
        Self {
            service_name: service_name.to_string(),
            pid,
            parent_pid: None,
            cpu_percent,
            mem_percent,
            memory_bytes: 0,
            observed_at: Utc::now(),
        }
    }
}
