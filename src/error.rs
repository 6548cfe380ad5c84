use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 单个采集器在一次 tick 内的失败，记录日志后继续运行
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("process table query failed: {0}")]
    ProcessTable(String),

    #[error("failed to read log file {path}: {source}")]
    LogRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{collector} collector timed out after {after:?}")]
    Timeout {
        collector: &'static str,
        after: Duration,
    },

    /// 上一次采样仍未结束（例如卡在 D 状态进程的 /proc 读取上）
    #[error("{collector} collector is still busy with a previous sample")]
    Busy { collector: &'static str },

    #[error("{collector} collector task failed: {message}")]
    Task {
        collector: &'static str,
        message: String,
    },
}

impl CollectorError {
    pub fn process_table<S: Into<String>>(msg: S) -> Self {
        CollectorError::ProcessTable(msg.into())
    }
}

/// 启动阶段的配置错误，进程不会进入监控循环
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TOML in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid value for `{field}`: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
