use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// 日志中命中错误模式的一行
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMatch {
    pub file: PathBuf,
    pub line_text: String,
    /// 该行命中的所有模式
    pub matched_patterns: Vec<String>,
    pub observed_at: DateTime<Utc>,
}
