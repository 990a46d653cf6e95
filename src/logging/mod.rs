//! 日志系统.
//!
//! 双输出:
//! - console: 彩色, 默认 warn 级别
//! - file: 无色, 默认 info 级别, `SWDEC_LOG` 环境变量可覆盖
//!
//! 解码库通过 `log` 门面记录日志, 经 tracing 的 log 桥接进入同一个订阅器.
//! 日志文件为 `{directory}/{file_prefix}.{YYYY-MM-DD}.log`, 午夜切换到新文件;
//! 后台维护任务压缩历史文件并删除超过保留天数的文件.

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

mod task;

/// 文件日志级别的环境变量覆盖
pub const LOG_ENV: &str = "SWDEC_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_prefix: String,
    /// `EnvFilter` 语法, 如 "warn" 或 "swdec_codec=debug"
    pub console_level: String,
    pub file_level: String,
    pub retention_days: i64,
    pub compress_history: bool,
    pub cleanup_interval_seconds: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".into(),
            file_prefix: "swdec".into(),
            console_level: "warn".into(),
            file_level: "info".into(),
            retention_days: 30,
            compress_history: true,
            cleanup_interval_seconds: 3600,
        }
    }
}

impl LoggingConfig {
    /// 默认配置, 日志写入 `directory`
    pub fn with_directory(directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.console_level)
            .with_context(|| format!("无效的控制台日志级别: {}", self.console_level))?;
        EnvFilter::try_new(&self.file_level)
            .with_context(|| format!("无效的文件日志级别: {}", self.file_level))?;
        if self.file_prefix.is_empty() || self.file_prefix.contains(['/', '\\']) {
            bail!("无效的日志文件前缀: {:?}", self.file_prefix);
        }
        if self.retention_days < 0 {
            bail!("日志保留天数不能为负: {}", self.retention_days);
        }
        if self.cleanup_interval_seconds == 0 {
            bail!("日志清理间隔必须大于 0");
        }
        Ok(())
    }
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化全局日志, 每个进程只能成功调用一次
///
/// 在 tokio 运行时内调用时启动后台维护任务; 否则只在此时执行一次清理.
pub fn init(config: LoggingConfig) -> Result<()> {
    config.validate()?;
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("创建日志目录失败, path={}", config.directory))?;

    let rotate_requested = Arc::new(AtomicBool::new(false));
    let file_appender = CurrentFileWriter::new(
        Path::new(&config.directory),
        &config.file_prefix,
        Arc::clone(&rotate_requested),
    )?;

    let console_filter = EnvFilter::new(&config.console_level);
    let file_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&config.file_level));

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .event_format(ConsoleFormatter)
        .with_filter(console_filter);

    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("日志系统已经初始化")?;
    LOG_GUARD.set(guard).ok();

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => task::spawn_log_maintenance_task(&handle, config, rotate_requested),
        Err(_) => {
            task::run_maintenance_once(&config);
            tracing::debug!("没有 tokio 运行时, 日志维护只在启动时执行一次");
        }
    }
    Ok(())
}

/// 写入当天日志文件, 收到切换请求后重新打开
struct CurrentFileWriter {
    directory: PathBuf,
    prefix: String,
    rotate_requested: Arc<AtomicBool>,
    file: File,
}

impl CurrentFileWriter {
    fn new(directory: &Path, prefix: &str, rotate_requested: Arc<AtomicBool>) -> Result<Self> {
        let today = Local::now().date_naive();
        let file = open_append_file(&build_current_log_path(directory, prefix, today))?;
        Ok(Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
            rotate_requested,
            file,
        })
    }

    fn reopen_current_file(&mut self) -> std::io::Result<()> {
        let today = Local::now().date_naive();
        let path = build_current_log_path(&self.directory, &self.prefix, today);
        self.file = open_append_file(&path).map_err(std::io::Error::other)?;
        Ok(())
    }
}

impl Write for CurrentFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.rotate_requested.swap(false, Ordering::AcqRel) {
            self.reopen_current_file()?;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn open_append_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("打开日志文件失败, path={}", path.display()))
}

/// 某天的日志文件路径
pub fn build_current_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}.log", prefix, date.format("%Y-%m-%d")))
}

fn write_timestamp(writer: &mut Writer<'_>) -> std::fmt::Result {
    let now = Local::now();
    write!(
        writer,
        "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] ",
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.timestamp_subsec_millis()
    )
}

/// Console 格式: 彩色级别, 带 target
struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write_timestamp(&mut writer)?;
        let color = match *meta.level() {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        };
        write!(
            writer,
            "{}{:5}\x1b[0m {} > ",
            color,
            meta.level().to_string(),
            meta.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// 文件格式: 无色
struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        write_timestamp(&mut writer)?;
        write!(writer, "{:5} > ", event.metadata().level().to_string())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_current_log_path() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 6).unwrap();
        let path = build_current_log_path(Path::new("logs"), "swdec", date);
        assert_eq!(path, PathBuf::from("logs/swdec.2026-02-06.log"));
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{"directory": "/tmp/x", "file_level": "debug"}"#).unwrap();
        assert_eq!(config.file_prefix, "swdec");
        assert_eq!(config.file_level, "debug");
        assert!(config.validate().is_ok());

        let mut bad = LoggingConfig::with_directory("logs");
        bad.retention_days = -1;
        assert!(bad.validate().is_err());
        let mut bad = LoggingConfig::default();
        bad.file_prefix = "a/b".into();
        assert!(bad.validate().is_err());
        let mut bad = LoggingConfig::default();
        bad.console_level = "swdec=verbose".into();
        assert!(bad.validate().is_err());
    }
}
