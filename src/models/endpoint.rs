use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// 健康检查端点的探测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EndpointStatus {
    /// 2xx/3xx 且在超时内返回
    Responding { latency_ms: f64 },
    /// 超过探测超时
    Timeout,
    /// 连接级失败（DNS、拒绝连接、重置）
    Unreachable { reason: String },
    /// 服务端返回 4xx/5xx
    BadStatus { code: u16 },
}

impl EndpointStatus {
    pub fn responding(latency: Duration) -> Self {
        EndpointStatus::Responding {
            latency_ms: latency.as_secs_f64() * 1000.0,
        }
    }

    pub fn is_responding(&self) -> bool {
        matches!(self, EndpointStatus::Responding { .. })
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointStatus::Responding { latency_ms } => write!(f, "responding in {:.1}ms", latency_ms),
            EndpointStatus::Timeout => write!(f, "timed out"),
            EndpointStatus::Unreachable { reason } => write!(f, "unreachable ({})", reason),
            EndpointStatus::BadStatus { code } => write!(f, "returned HTTP {}", code),
        }
    }
}
