//! Logging Module
//!
//! 一个进程一个 tracing registry，两个输出层：
//! - 文件层：`{log_dir}/{program}.log.<日期>`，按天轮转，无颜色，带线程 id 和行号
//! - stderr 层：带颜色，只显示 `stderr_level` 及以上
//!
//! 文件写入走非阻塞 worker，[`LoggingGuard`] 存活期间有效。
//!
//! ```no_run
//! use tool_utils::logging::{init_logging, LogConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let logging = init_logging("img-info", LogConfig::default())?;
//! tracing::info!(files = 12, "Scan started");
//! logging.flush();
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::external::ExternalCommandResult;

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 默认系统临时目录
    pub dir: PathBuf,
    /// 同一程序保留的日志文件数
    pub max_files: usize,
    pub level: Level,
    pub stderr_level: Level,
    /// `level` 只作用于这些 target；为空时作用于全部
    pub targets: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            max_files: 3,
            level: Level::INFO,
            stderr_level: Level::WARN,
            targets: Vec::new(),
        }
    }
}

impl LogConfig {
    pub fn with_log_dir<P: AsRef<Path>>(self, dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ..self
        }
    }

    pub fn with_max_files(self, max_files: usize) -> Self {
        Self { max_files, ..self }
    }

    pub fn with_level(self, level: Level) -> Self {
        Self { level, ..self }
    }

    pub fn with_stderr_level(self, stderr_level: Level) -> Self {
        Self {
            stderr_level,
            ..self
        }
    }

    pub fn with_targets(self, targets: &[&str]) -> Self {
        Self {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            ..self
        }
    }

    /// `EnvFilter` directives, e.g. `img_info=debug,tool_utils=debug`.
    fn directives(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        match self.targets.as_slice() {
            [] => level,
            targets => targets
                .iter()
                .map(|t| format!("{}={}", t, level))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// 持有非阻塞写入器的 worker；drop 时把剩余日志写盘。
#[must_use = "dropping the guard immediately stops file logging"]
pub struct LoggingGuard {
    _worker: WorkerGuard,
    dir: PathBuf,
}

impl LoggingGuard {
    pub fn flush(self) {
        tracing::debug!(log_dir = %self.dir.display(), "Flushing log file");
    }
}

/// 安装全局 subscriber。`RUST_LOG` 优先于 `config.level`。
///
/// 每个进程只能调用一次，第二次返回错误。
pub fn init_logging(program_name: &str, config: LogConfig) -> Result<LoggingGuard> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("Failed to create log directory {}", config.dir.display()))?;

    let prefix = format!("{}.log", program_name);
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&prefix)
        .build(&config.dir)
        .with_context(|| format!("Failed to open log file in {}", config.dir.display()))?;
    let (file_writer, worker) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directives()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(LevelFilter::from_level(config.stderr_level)),
        )
        .try_init()
        .context("Logging system already initialized")?;

    let pruned = prune_logs(&config.dir, &prefix, config.max_files);
    tracing::info!(
        program = program_name,
        log_dir = %config.dir.display(),
        level = %config.level,
        pruned,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _worker: worker,
        dir: config.dir,
    })
}

/// Deletes all but the `keep` newest files starting with `prefix`.
/// Returns how many were removed; listing problems are logged and ignored.
fn prune_logs(dir: &Path, prefix: &str, keep: usize) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot list log directory");
            return 0;
        }
    };

    let mut logs: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .filter_map(|e| {
            let meta = e.metadata().ok().filter(|m| m.is_file())?;
            Some((meta.modified().ok()?, e.path()))
        })
        .collect();
    if logs.len() <= keep {
        return 0;
    }

    logs.sort_by(|a, b| b.0.cmp(&a.0));
    logs.into_iter()
        .skip(keep)
        .filter(|(_, path)| match std::fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot remove old log");
                false
            }
        })
        .count()
}

/// 外部工具调用一条日志。失败只记 warn：调用方通常还有回退路径。
pub fn log_external_tool(tool: &str, command_line: &str, result: &ExternalCommandResult) {
    let secs = result.duration.as_secs_f64();
    if result.success() {
        tracing::info!(tool, command = %command_line, duration_secs = secs, "External tool finished");
        if !result.stdout.is_empty() {
            tracing::debug!(tool, stdout = %result.stdout, "External tool output");
        }
    } else if result.timed_out {
        tracing::warn!(tool, command = %command_line, duration_secs = secs, "External tool timed out");
    } else {
        tracing::warn!(
            tool,
            command = %command_line,
            exit_code = ?result.exit_code,
            stderr = %result.stderr.trim(),
            duration_secs = secs,
            "External tool failed"
        );
    }
}
