use chrono::Utc;
use regex::RegexSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{CollectorError, ConfigError};
use crate::models::LogMatch;

const CHUNK_SIZE: u64 = 8 * 1024;
/// 单个文件最多从尾部读取的字节数
const MAX_TAIL_BYTES: u64 = 1024 * 1024;

/// 读取日志最后 N 行并匹配错误关键字（大小写不敏感）
///
/// 每个 tick 都重新从文件尾读取，不保存偏移量，日志轮转或截断无需特殊处理。
pub struct LogScanner {
    patterns: Vec<String>,
    set: RegexSet,
    tail_lines: usize,
}

impl LogScanner {
    pub fn new(patterns: &[String], tail_lines: usize) -> Result<Self, ConfigError> {
        let patterns: Vec<String> = patterns
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if patterns.is_empty() {
            return Err(ConfigError::invalid("errorPatterns", "at least one pattern is required"));
        }

        let set = RegexSet::new(patterns.iter().map(|p| format!("(?i){}", regex::escape(p))))
            .map_err(|e| ConfigError::invalid("errorPatterns", e.to_string()))?;

        Ok(Self {
            patterns,
            set,
            tail_lines,
        })
    }

    /// 文件不存在时返回空结果
    pub fn scan(&self, path: &Path) -> Result<Vec<LogMatch>, CollectorError> {
        let lines = match read_tail_lines(path, self.tail_lines) {
            Ok(lines) => lines,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("Log file {} not present, skipping", path.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(CollectorError::LogRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let observed_at = Utc::now();
        let matches = lines
            .into_iter()
            .filter_map(|line| {
                let matched: Vec<String> = self
                    .set
                    .matches(&line)
                    .into_iter()
                    .map(|i| self.patterns[i].clone())
                    .collect();
                if matched.is_empty() {
                    None
                } else {
                    Some(LogMatch {
                        file: path.to_path_buf(),
                        line_text: line,
                        matched_patterns: matched,
                        observed_at,
                    })
                }
            })
            .collect();

        Ok(matches)
    }

    /// 扫描多个文件，单个文件失败不影响其他文件
    pub fn scan_all(&self, paths: &[PathBuf]) -> (Vec<LogMatch>, Vec<CollectorError>) {
        let mut matches = Vec::new();
        let mut errors = Vec::new();
        for path in paths {
            match self.scan(path) {
                Ok(found) => matches.extend(found),
                Err(e) => errors.push(e),
            }
        }
        (matches, errors)
    }
}

/// 从文件尾部按块向前读取，直到凑够 `n` 行
fn read_tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    let mut pos = len;
    let mut buf: Vec<u8> = Vec::new();

    while pos > 0 && len - pos < MAX_TAIL_BYTES && complete_lines(&buf) < n {
        let read = CHUNK_SIZE.min(pos);
        pos -= read;
        file.seek(SeekFrom::Start(pos))?;

        let mut chunk = vec![0u8; read as usize];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n);
    Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
}

/// 不计末尾换行符的换行数，即缓冲区内可确认完整的尾部行数
fn complete_lines(buf: &[u8]) -> usize {
    let body = buf.strip_suffix(b"\n").unwrap_or(buf);
    body.iter().filter(|&&b| b == b'\n').count()
}
