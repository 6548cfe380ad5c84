use regex::Regex;

use crate::error::ConfigError;
use crate::models::{MatchStrategy, ServiceSpec};

/// 查看、编辑或搜索文件的常见命令，它们的参数里出现服务名不代表服务在运行
const INSPECTOR_COMMANDS: &[&str] = &[
    "vi", "vim", "nvim", "view", "nano", "emacs", "less", "more", "cat", "head", "tail", "grep", "egrep",
    "fgrep", "rg", "pgrep", "pkill", "man", "watch", "strace", "gdb",
];

/// 编译后的进程匹配规则
#[derive(Debug, Clone)]
pub enum ProcessMatcher {
    Token(String),
    Prefix(String),
    Regex(Regex),
}

impl ProcessMatcher {
    pub fn new(spec: &ServiceSpec) -> Result<Self, ConfigError> {
        let pattern = spec.process_match.trim();
        if pattern.is_empty() {
            return Err(ConfigError::invalid(
                format!("services.{}.processMatch", spec.name),
                "must not be empty",
            ));
        }

        Ok(match spec.match_strategy {
            MatchStrategy::Token => ProcessMatcher::Token(pattern.to_string()),
            MatchStrategy::Prefix => ProcessMatcher::Prefix(pattern.to_string()),
            MatchStrategy::Regex => {
                let regex = Regex::new(pattern).map_err(|e| {
                    ConfigError::invalid(format!("services.{}.processMatch", spec.name), e.to_string())
                })?;
                ProcessMatcher::Regex(regex)
            }
        })
    }

    /// `cmd` 为 argv，`name` 为内核给出的进程名
    pub fn is_match(&self, cmd: &[String], name: &str) -> bool {
        match self {
            ProcessMatcher::Token(pattern) => {
                if name == pattern {
                    return true;
                }
                if let Some(argv0) = cmd.first().and_then(|arg| arg.split_whitespace().next()) {
                    let program = basename(argv0);
                    if program != pattern && INSPECTOR_COMMANDS.contains(&program) {
                        return false;
                    }
                }
                cmd.iter()
                    .flat_map(|arg| arg.split_whitespace())
                    .any(|token| token == pattern || basename(token) == pattern)
            }
            ProcessMatcher::Prefix(pattern) => {
                let joined = cmd.join(" ");
                joined.starts_with(pattern.as_str())
                    || cmd.first().is_some_and(|argv0| basename(argv0).starts_with(pattern.as_str()))
            }
            ProcessMatcher::Regex(regex) => regex.is_match(&cmd.join(" ")),
        }
    }
}

fn basename(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

/// 多个进程匹配时选出主进程
///
/// 对于多进程应用（如 gunicorn worker），返回主进程：
///
/// 策略优先级：
/// 1. PPID = 1 的进程（systemd 直接启动）
/// 2. PPID 不在匹配列表中的进程（父进程，非子进程）
/// 3. 最小 PID（通常是最早创建的主进程）
///
/// `candidates` 为 (pid, ppid) 列表
pub fn select_main_process(candidates: &[(i32, Option<i32>)]) -> Option<i32> {
    if candidates.len() <= 1 {
        return candidates.first().map(|(pid, _)| *pid);
    }

    let mut sorted = candidates.to_vec();
    sorted.sort_by_key(|(pid, _)| *pid);

    if let Some((pid, _)) = sorted.iter().find(|(_, ppid)| *ppid == Some(1)) {
        log::debug!("Found main process (PPID=1): PID {}", pid);
        return Some(*pid);
    }

    let matching_pids: Vec<i32> = sorted.iter().map(|(pid, _)| *pid).collect();
    for (pid, ppid) in &sorted {
        if let Some(parent_pid) = ppid {
            if !matching_pids.contains(parent_pid) {
                log::debug!("Found main process (parent not in group): PID {} (PPID={})", pid, parent_pid);
                return Some(*pid);
            }
        }
    }

    let min_pid = matching_pids.first().copied();
    log::debug!("Found main process (min PID fallback): PID {:?} from {} matches",
                min_pid, candidates.len());
    min_pid
}
