use serde::{Deserialize, Serialize};
use crate::models::stats::ProcessSample;

/// 进程匹配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// 命令行中某个 token（或其 basename）与模式完全相等
    #[default]
    Token,
    /// 命令行或 argv[0] 的 basename 以模式开头
    Prefix,
    /// 正则匹配整条命令行
    Regex,
}

/// 被监控服务的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// 服务名称（唯一标识符）
    pub name: String,
    /// 用于匹配进程的命令行模式
    pub process_match: String,
    #[serde(default)]
    pub match_strategy: MatchStrategy,
    /// 内存告警阈值 (占总内存百分比)
    pub memory_threshold_percent: f32,
    /// CPU 告警阈值，未设置则不检查
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_threshold_percent: Option<f32>,
}

impl ServiceSpec {
    pub fn new(name: &str, process_match: &str, memory_threshold_percent: f32) -> Self {
        Self {
            name: name.to_string(),
            process_match: process_match.to_string(),
            match_strategy: MatchStrategy::Token,
            memory_threshold_percent,
            cpu_threshold_percent: None,
        }
    }

    #[cfg(test)]
    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.match_strategy = strategy;
        self
    }
}

/// 单个服务在一次 tick 中的观测结果
#[derive(Debug, Clone)]
pub struct ServiceObservation {
    pub service: String,
    /// 主进程采样，None 表示没有匹配的进程（服务宕机）
    pub sample: Option<ProcessSample>,
    /// 匹配到的进程总数
    pub match_count: usize,
}

impl ServiceObservation {
    #[cfg(test)]
    pub fn down(service: &str) -> Self {
        Self {
            service: service.to_string(),
            sample: None,
            match_count: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.sample.is_some()
    }
}
