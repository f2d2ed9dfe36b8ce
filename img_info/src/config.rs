//! Runtime configuration
//!
//! Precedence: command-line flags, then `IMG_INFO_*` environment variables,
//! then built-in defaults. The scan pool size is deliberately absent: it is
//! always derived from the CPU count.

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

use crate::color::DEFAULT_MAGICK_TIMEOUT;
use crate::error::{ImgInfoError, Result};

pub const ENV_MAGICK: &str = "IMG_INFO_MAGICK";
pub const ENV_CMYK_PROFILE: &str = "IMG_INFO_CMYK_PROFILE";
pub const ENV_MAGICK_TIMEOUT: &str = "IMG_INFO_MAGICK_TIMEOUT_SECS";

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// No progress bars, only warnings and the final summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory for the rolling log file (default: system temp dir)
    #[arg(long, value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// ImageMagick executable used for CMYK conversion
    #[arg(long, value_name = "PATH", global = true)]
    pub magick: Option<PathBuf>,

    /// CMYK ICC profile used when ImageMagick is unavailable
    #[arg(long, value_name = "FILE", global = true)]
    pub cmyk_profile: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` means look up `magick` / `convert` on PATH.
    pub magick: Option<PathBuf>,
    pub magick_timeout: Duration,
    /// `None` means search the system ICC directories.
    pub cmyk_profile: Option<PathBuf>,
    pub quiet: bool,
    pub verbose: u8,
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            magick: None,
            magick_timeout: DEFAULT_MAGICK_TIMEOUT,
            cmyk_profile: None,
            quiet: false,
            verbose: 0,
            log_dir: None,
        }
    }
}

impl Settings {
    pub fn from_cli(args: &GlobalArgs) -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_env_with(|key| std::env::var(key).ok())?;

        settings.quiet = args.quiet;
        settings.verbose = args.verbose;
        if args.log_dir.is_some() {
            settings.log_dir = args.log_dir.clone();
        }
        if args.magick.is_some() {
            settings.magick = args.magick.clone();
        }
        if args.cmyk_profile.is_some() {
            settings.cmyk_profile = args.cmyk_profile.clone();
        }
        Ok(settings)
    }

    /// Applies `IMG_INFO_*` overrides read through `lookup`. Empty values
    /// count as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(magick) = get(ENV_MAGICK) {
            self.magick = Some(PathBuf::from(magick));
        }
        if let Some(profile) = get(ENV_CMYK_PROFILE) {
            self.cmyk_profile = Some(PathBuf::from(profile));
        }
        if let Some(secs) = get(ENV_MAGICK_TIMEOUT) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ImgInfoError::Config(format!("{} must be a whole number of seconds, got {:?}", ENV_MAGICK_TIMEOUT, secs))
            })?;
            if secs == 0 {
                return Err(ImgInfoError::Config(format!("{} must be positive", ENV_MAGICK_TIMEOUT)));
            }
            self.magick_timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Level for the log file.
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 | 1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Level mirrored to stderr.
    pub fn stderr_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}
