pub mod alert;
pub mod endpoint;
pub mod log_match;
pub mod process;
pub mod stats;

pub use alert::{Alert, AlertRecord};
pub use endpoint::EndpointStatus;
pub use log_match::LogMatch;
pub use process::{MatchStrategy, ServiceObservation, ServiceSpec};
pub use stats::ProcessSample;

/// 一次 tick 中三个采集器的结果
///
/// `None` 表示该采集器本次失败或超时，评估器不会基于它产生告警。
#[derive(Debug, Clone, Default)]
pub struct TickObservations {
    pub processes: Option<Vec<ServiceObservation>>,
    pub endpoint: Option<EndpointStatus>,
    pub log_matches: Option<Vec<LogMatch>>,
}
