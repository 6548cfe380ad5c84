use clap::Parser;
use std::path::PathBuf;

use crate::config::{CliOverrides, OutputFormat};

/// Health Monitor - 服务进程、健康检查端点与日志错误监控
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// TOML 配置文件
    #[arg(short, long, env = "HEALTH_MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// tick 间隔（秒）
    #[arg(short, long, env = "HEALTH_MONITOR_INTERVAL")]
    pub interval: Option<f64>,

    /// 健康检查 URL
    #[arg(short, long, env = "HEALTH_MONITOR_ENDPOINT")]
    pub endpoint: Option<String>,

    /// 探测超时（秒）
    #[arg(long, env = "HEALTH_MONITOR_ENDPOINT_TIMEOUT")]
    pub endpoint_timeout: Option<f64>,

    /// 要扫描的日志文件，可重复；指定后替换配置中的列表
    #[arg(short = 'l', long = "log-file")]
    pub log_files: Vec<PathBuf>,

    /// 每个日志文件扫描的尾部行数
    #[arg(short = 'n', long, env = "HEALTH_MONITOR_TAIL_LINES")]
    pub tail_lines: Option<usize>,

    /// 告警输出格式
    #[arg(short, long, value_enum, env = "HEALTH_MONITOR_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Prometheus textfile 输出路径
    #[arg(long, env = "HEALTH_MONITOR_METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,

    /// 只执行一次 tick 后退出
    #[arg(long)]
    pub once: bool,
}

impl CommandArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            tick_interval_seconds: self.interval,
            endpoint_url: self.endpoint.clone(),
            endpoint_timeout_seconds: self.endpoint_timeout,
            log_files: self.log_files.clone(),
            log_tail_lines: self.tail_lines,
            output: self.format,
            metrics_file: self.metrics_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let args = CommandArgs::try_parse_from([
            "health-monitor",
            "--interval",
            "5",
            "-l",
            "/var/log/a.log",
            "-l",
            "/var/log/b.log",
            "--format",
            "json",
            "--once",
        ])
        .unwrap();

        let overrides = args.overrides();
        assert_eq!(overrides.tick_interval_seconds, Some(5.0));
        assert_eq!(overrides.log_files.len(), 2);
        assert_eq!(overrides.output, Some(OutputFormat::Json));
        assert!(args.once);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(CommandArgs::try_parse_from(["health-monitor", "--format", "xml"]).is_err());
    }
}
