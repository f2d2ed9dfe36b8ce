//! Report Module
//!
//! 批处理结束后的终端输出：一行汇总 + 失败列表，以及逐项结果日志。

use crate::batch::BatchResult;
use crate::progress::format_duration;
use console::style;
use std::fmt::Display;
use std::time::Duration;

const RULE: &str = "────────────────────────────────────────────────────────────";

/// Renders the one-line tally, e.g.
/// `Rename: 3 succeeded, 1 failed, 0 skipped of 4 (75.0%) in 120ms`.
pub fn summary_line(result: &BatchResult, duration: Duration, operation_name: &str) -> String {
    format!(
        "{}: {} succeeded, {} failed, {} skipped of {} ({:.1}%) in {}",
        operation_name,
        result.succeeded,
        result.failed,
        result.skipped,
        result.total,
        result.success_rate(),
        format_duration(duration)
    )
}

pub fn print_summary_report(result: &BatchResult, duration: Duration, operation_name: &str) {
    let line = summary_line(result, duration, operation_name);
    println!();
    println!("{}", style(RULE).dim());
    if result.failed == 0 {
        println!("📊 {}", style(line).green());
    } else {
        println!("📊 {}", style(line).yellow());
    }

    if !result.errors.is_empty() {
        println!("{}", style("❌ 失败项:").red().bold());
        for (path, error) in &result.errors {
            println!("   {} → {}", path.display(), error);
        }
    }
    println!("{}", style(RULE).dim());
}

/// Prints one line per outcome under a heading. Empty logs print nothing.
pub fn print_outcome_log<T: Display>(title: &str, outcomes: &[T]) {
    if outcomes.is_empty() {
        return;
    }
    println!();
    println!("{}", style(format!("📋 {} ({})", title, outcomes.len())).cyan().bold());
    for outcome in outcomes {
        println!("   {}", outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_summary_line() {
        let mut result = BatchResult::new();
        result.success();
        result.success();
        result.success();
        result.fail(PathBuf::from("broken.png"), "cannot decode".into());

        assert_eq!(
            summary_line(&result, Duration::from_millis(120), "Rename"),
            "Rename: 3 succeeded, 1 failed, 0 skipped of 4 (75.0%) in 120ms"
        );
        print_summary_report(&result, Duration::from_secs(2), "Rename");
    }

    #[test]
    fn test_empty_outputs_do_not_panic() {
        print_summary_report(&BatchResult::new(), Duration::ZERO, "Scan");
        print_outcome_log("转换日志", &["✅ 成功: 'a.png' -> 'a.jpg' (numeric)"]);
        print_outcome_log::<String>("Nothing", &[]);
    }
}
