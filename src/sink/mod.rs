use chrono::{DateTime, SecondsFormat, Utc};
use std::io::{self, Write};

use crate::config::OutputFormat;
use crate::models::AlertRecord;

/// 告警输出
///
/// 监控循环只负责交付记录，去重与升级由下游处理。
pub trait AlertSink: Send {
    fn begin_tick(&mut self, _tick: u64, _at: DateTime<Utc>) -> io::Result<()> {
        Ok(())
    }

    fn emit(&mut self, record: &AlertRecord) -> io::Result<()>;

    fn end_tick(&mut self, _tick: u64, _alert_count: usize) -> io::Result<()> {
        Ok(())
    }
}

/// 以文本或 JSON 行写到 stdout（或任意 writer）
pub struct ConsoleSink<W: Write + Send> {
    writer: W,
    format: OutputFormat,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> AlertSink for ConsoleSink<W> {
    fn begin_tick(&mut self, tick: u64, at: DateTime<Utc>) -> io::Result<()> {
        if self.format == OutputFormat::Text {
            writeln!(
                self.writer,
                "═══ tick #{} · {} ═══",
                tick,
                at.to_rfc3339_opts(SecondsFormat::Secs, true)
            )?;
        }
        Ok(())
    }

    fn emit(&mut self, record: &AlertRecord) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(
                self.writer,
                "[{}] {} {}: {}",
                record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                record.kind().to_uppercase(),
                record.subject,
                record.detail
            )?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.writer, record)?;
                self.writer.write_all(b"\n")?;
            }
        }
        self.writer.flush()
    }

    fn end_tick(&mut self, _tick: u64, alert_count: usize) -> io::Result<()> {
        if self.format == OutputFormat::Text && alert_count == 0 {
            writeln!(self.writer, "✓ all checks passing")?;
        }
        self.writer.flush()
    }
}
