//! External process execution with a hard timeout
//!
//! stdout 和 stderr 各由一个独立线程消耗，防止管道缓冲区写满导致子进程阻塞；
//! 主线程轮询 `try_wait`，超时后 kill 并回收子进程。

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::logging::log_external_tool;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 外部命令执行结果
#[derive(Debug)]
pub struct ExternalCommandResult {
    /// 退出状态码（被信号终止或超时被 kill 时为 None）
    pub exit_code: Option<i32>,
    /// 标准输出
    pub stdout: String,
    /// 标准错误
    pub stderr: String,
    /// 执行时长
    pub duration: Duration,
    /// 是否因超时被终止
    pub timed_out: bool,
}

impl ExternalCommandResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// 执行外部命令，超过 `timeout` 则终止
///
/// 只有进程无法启动时才返回 `Err`；非零退出码和超时都体现在结果中，
/// 由调用方决定如何处理。
pub fn run_with_timeout<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    timeout: Duration,
) -> Result<ExternalCommandResult> {
    let tool_name = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());
    let command_line = std::iter::once(tool_name.clone())
        .chain(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ");

    info!(
        tool = %tool_name,
        command = %command_line,
        timeout_secs = timeout.as_secs_f64(),
        "Executing external command"
    );

    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program.display()))?;

    let stdout_thread = drain(child.stdout.take());
    let stderr_thread = drain(child.stderr.take());

    let mut timed_out = false;
    let status = loop {
        match child
            .try_wait()
            .with_context(|| format!("Failed to poll {}", tool_name))?
        {
            Some(status) => break Some(status),
            None if start.elapsed() >= timeout => {
                timed_out = true;
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };
    let duration = start.elapsed();

    let stdout = join_drain(stdout_thread);
    let mut stderr = join_drain(stderr_thread);
    if timed_out {
        debug!(tool = %tool_name, "External command timed out, killed");
        stderr.push_str(&format!("\n[killed after {:.1}s timeout]", timeout.as_secs_f64()));
    }

    let result = ExternalCommandResult {
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        duration,
        timed_out,
    };
    log_external_tool(&tool_name, &command_line, &result);
    Ok(result)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// 按顺序在 PATH 中查找第一个可用的工具
pub fn find_tool(candidates: &[&str]) -> Option<PathBuf> {
    candidates.iter().find_map(|name| which::which(name).ok())
}
