use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::ServiceSpec;
use crate::services::{LogScanner, ProcessMatcher};

pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:5001/api/health";
pub const MAX_TAIL_LINES: usize = 10_000;
/// 时间类配置项的取值范围（秒）
pub const MIN_SECONDS: f64 = 0.001;
pub const MAX_SECONDS: f64 = 86_400.0;

/// 告警输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// 每个 tick 一个横幅，每条告警一行
    #[default]
    Text,
    /// 每条告警一行 JSON
    Json,
}

/// 监控配置：编译期默认值 → TOML 文件 → 环境变量/命令行参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
    pub tick_interval_seconds: f64,
    /// 单个 tick 的耗时上限，默认等于 tick 间隔
    pub tick_budget_seconds: Option<f64>,
    #[serde(rename = "endpointURL", alias = "endpointUrl")]
    pub endpoint_url: String,
    pub endpoint_timeout_seconds: f64,
    pub collector_timeout_seconds: f64,
    pub log_files: Vec<PathBuf>,
    pub log_tail_lines: usize,
    pub error_patterns: Vec<String>,
    pub error_burst_threshold: usize,
    pub services: Vec<ServiceSpec>,
    pub output: OutputFormat,
    pub metrics_file: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 2.0,
            tick_budget_seconds: None,
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            endpoint_timeout_seconds: 2.0,
            collector_timeout_seconds: 2.0,
            log_files: vec![
                PathBuf::from("/tmp/app.log"),
                PathBuf::from("/tmp/app_errors.log"),
            ],
            log_tail_lines: 5,
            error_patterns: ["error", "exception", "traceback", "500", "failed", "timeout"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            error_burst_threshold: 1,
            services: vec![
                ServiceSpec::new("primary-api", "app.py", 15.0),
                ServiceSpec::new("model-server", "model-server", 25.0),
            ],
            output: OutputFormat::Text,
            metrics_file: None,
        }
    }
}

/// 命令行/环境变量覆盖项，优先级最高
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub tick_interval_seconds: Option<f64>,
    pub endpoint_url: Option<String>,
    pub endpoint_timeout_seconds: Option<f64>,
    pub log_files: Vec<PathBuf>,
    pub log_tail_lines: Option<usize>,
    pub output: Option<OutputFormat>,
    pub metrics_file: Option<PathBuf>,
}

impl MonitorConfig {
    /// 加载配置并校验
    pub fn load(path: Option<&Path>, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    #[cfg(test)]
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn apply_overrides(&mut self, cli: &CliOverrides) {
        if let Some(interval) = cli.tick_interval_seconds {
            self.tick_interval_seconds = interval;
        }
        if let Some(ref url) = cli.endpoint_url {
            self.endpoint_url = url.clone();
        }
        if let Some(timeout) = cli.endpoint_timeout_seconds {
            self.endpoint_timeout_seconds = timeout;
        }
        if !cli.log_files.is_empty() {
            self.log_files = cli.log_files.clone();
        }
        if let Some(lines) = cli.log_tail_lines {
            self.log_tail_lines = lines;
        }
        if let Some(output) = cli.output {
            self.output = output;
        }
        if let Some(ref path) = cli.metrics_file {
            self.metrics_file = Some(path.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_seconds("tickIntervalSeconds", self.tick_interval_seconds)?;
        if let Some(budget) = self.tick_budget_seconds {
            check_seconds("tickBudgetSeconds", budget)?;
        }
        check_seconds("endpointTimeoutSeconds", self.endpoint_timeout_seconds)?;
        check_seconds("collectorTimeoutSeconds", self.collector_timeout_seconds)?;

        let url = reqwest::Url::parse(&self.endpoint_url)
            .map_err(|e| ConfigError::invalid("endpointURL", format!("{}: {}", self.endpoint_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::invalid(
                "endpointURL",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if self.log_tail_lines == 0 || self.log_tail_lines > MAX_TAIL_LINES {
            return Err(ConfigError::invalid(
                "logTailLines",
                format!("must be between 1 and {}", MAX_TAIL_LINES),
            ));
        }
        if self.error_burst_threshold == 0 {
            return Err(ConfigError::invalid("errorBurstThreshold", "must be at least 1"));
        }
        LogScanner::new(&self.error_patterns, self.log_tail_lines)?;

        let mut seen = std::collections::HashSet::new();
        for (i, service) in self.services.iter().enumerate() {
            if service.name.trim().is_empty() {
                return Err(ConfigError::invalid(format!("services[{}].name", i), "must not be empty"));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::invalid(
                    format!("services[{}].name", i),
                    format!("duplicate service '{}'", service.name),
                ));
            }
            check_percent(
                &format!("services[{}].memoryThresholdPercent", i),
                service.memory_threshold_percent,
            )?;
            if let Some(cpu) = service.cpu_threshold_percent {
                // 多核进程的 CPU 使用率可以超过 100%
                if !cpu.is_finite() || cpu < 0.0 {
                    return Err(ConfigError::invalid(
                        format!("services[{}].cpuThresholdPercent", i),
                        "must be a non-negative number",
                    ));
                }
            }
            ProcessMatcher::new(service)?;
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval_seconds)
    }

    pub fn tick_budget(&self) -> Duration {
        Duration::from_secs_f64(self.tick_budget_seconds.unwrap_or(self.tick_interval_seconds))
    }

    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.endpoint_timeout_seconds)
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.collector_timeout_seconds)
    }

    #[cfg(test)]
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }
}

fn check_seconds(field: &str, value: f64) -> Result<(), ConfigError> {
    let duration = Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::invalid(field, "must be a positive number of seconds"))?;
    if duration < Duration::from_secs_f64(MIN_SECONDS) || duration > Duration::from_secs_f64(MAX_SECONDS) {
        return Err(ConfigError::invalid(
            field,
            format!("must be between {} and {} seconds", MIN_SECONDS, MAX_SECONDS),
        ));
    }
    Ok(())
}

fn check_percent(field: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::invalid(field, "must be between 0 and 100"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchStrategy;
    use std::io::Write;

    #[test]
    fn test_defaults_match_shipped_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(2));
        assert_eq!(config.tick_budget(), Duration::from_secs(2));
        assert_eq!(config.endpoint_url, "http://localhost:5001/api/health");
        assert_eq!(config.endpoint_timeout(), Duration::from_secs(2));
        assert_eq!(config.log_tail_lines, 5);
        assert_eq!(config.log_files.len(), 2);
        assert_eq!(config.error_patterns.len(), 6);
        assert_eq!(config.service("primary-api").unwrap().memory_threshold_percent, 15.0);
        assert_eq!(config.service("model-server").unwrap().memory_threshold_percent, 25.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = MonitorConfig::from_toml(
            r#"
            tickIntervalSeconds = 5
            endpointURL = "http://127.0.0.1:8080/healthz"
            logTailLines = 20
            output = "json"

            [[services]]
            name = "api"
            processMatch = "gunicorn"
            memoryThresholdPercent = 10.0
            cpuThresholdPercent = 80.0

            [[services]]
            name = "worker"
            processMatch = "^python .*worker\\.py"
            matchStrategy = "regex"
            memoryThresholdPercent = 30.0
            "#,
        )
        .unwrap();

        assert_eq!(config.tick_interval(), Duration::from_secs(5));
        assert_eq!(config.endpoint_url, "http://127.0.0.1:8080/healthz");
        assert_eq!(config.log_tail_lines, 20);
        assert_eq!(config.output, OutputFormat::Json);
        // 未写出的键保留默认值
        assert_eq!(config.endpoint_timeout_seconds, 2.0);
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].match_strategy, MatchStrategy::Token);
        assert_eq!(config.services[0].cpu_threshold_percent, Some(80.0));
        assert_eq!(config.services[1].match_strategy, MatchStrategy::Regex);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides_take_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tickIntervalSeconds = 10\nlogTailLines = 50").unwrap();

        let overrides = CliOverrides {
            tick_interval_seconds: Some(1.0),
            log_files: vec![PathBuf::from("/var/log/app.log")],
            ..Default::default()
        };
        let config = MonitorConfig::load(Some(file.path()), &overrides).unwrap();

        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.log_tail_lines, 50);
        assert_eq!(config.log_files, vec![PathBuf::from("/var/log/app.log")]);
    }

    #[test]
    fn test_missing_config_file_is_read_error() {
        let err = MonitorConfig::load(Some(Path::new("/nonexistent/monitor.toml")), &CliOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = MonitorConfig::from_toml("tickIntervalSeconds = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut config = MonitorConfig::default();
        config.endpoint_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { ref field, .. }) if field == "endpointURL"));

        let mut config = MonitorConfig::default();
        config.endpoint_url = "ftp://localhost/health".to_string();
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.tick_interval_seconds = 0.0;
        assert!(config.validate().is_err());

        // 超出 Duration 可表示范围，或四舍五入后为 0
        for seconds in [1e20, 1e-12, f64::NAN, -1.0, MAX_SECONDS + 1.0] {
            let mut config = MonitorConfig::default();
            config.tick_interval_seconds = seconds;
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { ref field, .. }) if field == "tickIntervalSeconds"),
                "accepted tickIntervalSeconds = {}",
                seconds
            );
        }

        let mut config = MonitorConfig::default();
        config.endpoint_timeout_seconds = 1e20;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.tick_budget_seconds = Some(1e-12);
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.tick_interval_seconds = MAX_SECONDS;
        config.collector_timeout_seconds = MIN_SECONDS;
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_secs(86_400));

        let mut config = MonitorConfig::default();
        config.services[0].memory_threshold_percent = 150.0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.services[1].name = "primary-api".to_string();
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.services[0] = ServiceSpec::new("api", "([unclosed", 10.0).with_strategy(MatchStrategy::Regex);
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.log_tail_lines = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.error_patterns.clear();
        assert!(config.validate().is_err());
    }
}
