use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use img_info::export::{default_report_path, write_json};
use img_info::{
    plan_renames, CancelFlag, ColorEngine, ExportFormat, GlobalArgs, Session, Settings, Snapshot,
    TargetMode,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tool_utils::{
    create_progress_bar, init_logging, print_outcome_log, print_summary_report, BatchResult,
    LogConfig,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "img-info")]
#[command(
    version,
    about = "Image metadata scanner: physical size, DPI, colour mode, renaming and RGB/CMYK conversion",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a folder and print one line per image
    Scan {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Print the records as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Scan a folder and write a CSV or JSON report
    Export {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Report path (default: <DIR>/<dir name>_报告.csv)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,
    },

    /// Rename images to <name>_<W>x<H>cm.<ext> by physical size
    Rename {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Only print what would be renamed
        #[arg(long, conflicts_with = "yes")]
        dry_run: bool,
    },

    /// Convert images to RGB or CMYK into <DIR>/<MODE>_Converted
    Convert {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Target colour mode: rgb or cmyk
        #[arg(long = "to", value_name = "MODE")]
        target: TargetMode,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_cli(&cli.global)?;

    let mut log_config = LogConfig::default()
        .with_level(settings.log_level())
        .with_stderr_level(settings.stderr_level())
        .with_targets(&["img_info", "tool_utils"]);
    if let Some(dir) = &settings.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    let logging = init_logging("img-info", log_config)?;
    info!(version = env!("CARGO_PKG_VERSION"), "img-info started");

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            warn!(error = %e, "Ctrl-C handler not installed");
        }
    }

    let session = Session::new();
    let result = match cli.command {
        Commands::Scan { dir, json } => run_scan(&session, &settings, &dir, json, &cancel),
        Commands::Export {
            dir,
            output,
            format,
        } => run_export(&session, &settings, &dir, output, format, &cancel),
        Commands::Rename { dir, yes, dry_run } => {
            run_rename(&session, &settings, &dir, yes, dry_run, &cancel)
        }
        Commands::Convert { dir, target, yes } => {
            run_convert(&session, &settings, &dir, target, yes, &cancel)
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %format!("{:#}", e), "img-info failed");
    }
    logging.flush();
    result
}

/// Scans `dir` behind a progress bar and prints the "no images" notice.
fn scan(
    session: &Session,
    settings: &Settings,
    dir: &Path,
    cancel: &CancelFlag,
) -> anyhow::Result<Arc<Snapshot>> {
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }
    let bar = create_progress_bar(0, "Scanning", settings.quiet);
    let snapshot = session
        .scan(dir, &bar, Some(cancel))
        .with_context(|| format!("scanning {}", dir.display()))?;
    if snapshot.records.is_empty() {
        println!("{}", style("⚠️  未找到支持的图片 (jpg, jpeg, png, bmp, gif, tiff, tif)").yellow());
    }
    Ok(snapshot)
}

fn scan_result(snapshot: &Snapshot) -> BatchResult {
    let mut result = BatchResult::new();
    for record in snapshot.records.values() {
        match record.error() {
            None => result.success(),
            Some(e) => result.fail(record.source_path.clone(), e.to_string()),
        }
    }
    result
}

fn run_scan(
    session: &Session,
    settings: &Settings,
    dir: &Path,
    json: bool,
    cancel: &CancelFlag,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let snapshot = scan(session, settings, dir, cancel)?;

    if json {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        write_json(&mut out, &snapshot.directory, &snapshot.records)?;
        writeln!(out)?;
        return Ok(());
    }

    if !snapshot.records.is_empty() {
        println!(
            "{}",
            style(format!(
                "{:<40} {:>12} {:>16} {:>10} {:>6} {:>12}",
                "文件名", "像素尺寸", "物理尺寸(cm)", "DPI", "模式", "大小"
            ))
            .bold()
        );
    }
    for (name, record) in &snapshot.records {
        match record.details() {
            Some(d) => println!(
                "{:<40} {:>12} {:>16} {:>10} {:>6} {:>12}",
                name,
                d.pixel_size.to_string(),
                d.physical_size.to_string(),
                d.dpi.to_string(),
                d.color_mode.as_str(),
                img_info::format_file_size(Some(d.file_size_bytes)),
            ),
            None => println!(
                "{:<40} {}",
                name,
                style(format!("无法读取: {}", record.error().unwrap_or_default())).red()
            ),
        }
    }

    if !settings.quiet {
        print_summary_report(&scan_result(&snapshot), start.elapsed(), "Scan");
    }
    Ok(())
}

fn run_export(
    session: &Session,
    settings: &Settings,
    dir: &Path,
    output: Option<PathBuf>,
    format: ExportFormat,
    cancel: &CancelFlag,
) -> anyhow::Result<()> {
    scan(session, settings, dir, cancel)?;
    let path = output.unwrap_or_else(|| default_report_path(dir, format));
    let bar = create_progress_bar(0, "Exporting", settings.quiet);
    session.export(&path, format, &bar)?;
    println!("✅ 成功导出到: {}", path.display());
    Ok(())
}

fn run_rename(
    session: &Session,
    settings: &Settings,
    dir: &Path,
    yes: bool,
    dry_run: bool,
    cancel: &CancelFlag,
) -> anyhow::Result<()> {
    let snapshot = scan(session, settings, dir, cancel)?;
    let plan = plan_renames(&snapshot.directory, &snapshot.records)?;
    if plan.is_empty() {
        println!("未找到可重命名的有效图片。");
        return Ok(());
    }

    println!("{}", style("📋 重命名计划").cyan().bold());
    for item in &plan {
        println!("   '{}' -> '{}'", item.from, item.to);
    }
    if dry_run {
        return Ok(());
    }
    if !yes
        && !confirm(&format!(
            "此操作将重命名 {} 个文件，无法撤销，是否继续？",
            plan.len()
        ))?
    {
        println!("已取消。");
        return Ok(());
    }
    if interrupted(cancel) {
        println!("已取消。");
        return Ok(());
    }

    let start = Instant::now();
    let bar = create_progress_bar(0, "Renaming", settings.quiet);
    let report = session.rename(&bar, Some(cancel))?;
    print_outcome_log("重命名日志", &report.outcomes);
    print_summary_report(&report.batch_result(), start.elapsed(), "Rename");
    Ok(())
}

fn run_convert(
    session: &Session,
    settings: &Settings,
    dir: &Path,
    target: TargetMode,
    yes: bool,
    cancel: &CancelFlag,
) -> anyhow::Result<()> {
    let snapshot = scan(session, settings, dir, cancel)?;
    if snapshot.records.values().all(|r| !r.is_ok()) {
        println!("没有可转换的图片。");
        return Ok(());
    }

    let destination = img_info::destination_dir(&snapshot.directory, target);
    if !yes
        && !confirm(&format!(
            "图片将转换为 {} 并保存在新子文件夹: '{}'\n原始文件不会被修改，是否继续？",
            target,
            destination.display()
        ))?
    {
        println!("已取消。");
        return Ok(());
    }
    if interrupted(cancel) {
        println!("已取消。");
        return Ok(());
    }

    let engine = ColorEngine::from_settings(settings);
    info!(strategies = ?engine.strategy_names(), "Colour engine ready");

    let start = Instant::now();
    let bar = create_progress_bar(0, "Converting", settings.quiet);
    let report = session.convert(target, &engine, &bar, Some(cancel))?;
    print_outcome_log("转换日志", &report.outcomes);
    print_summary_report(
        &report.batch_result(),
        start.elapsed(),
        &format!("Convert to {}", target),
    );
    println!("📁 输出目录: {}", report.destination.display());
    Ok(())
}

/// Ctrl-C at the confirmation prompt does not stop `read_line`; honour it here
/// instead of starting a batch whose items would all be skipped.
fn interrupted(cancel: &CancelFlag) -> bool {
    if cancel.is_cancelled() {
        warn!("Interrupted before the batch started");
        return true;
    }
    false
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
