//! Shared Utilities for the img-info tool
//!
//! This crate carries the plumbing that has no image semantics of its own:
//! - Logging setup with an explicit lifecycle guard
//! - External process execution with a hard timeout
//! - Progress bars and summary reports
//! - Batch bookkeeping and candidate file collection
//! - Worker pool sizing

pub mod batch;
pub mod common_utils;
pub mod external;
pub mod logging;
pub mod progress;
pub mod report;
pub mod thread_manager;

pub use batch::*;
pub use common_utils::{get_extension_lowercase, has_extension, is_hidden_file, split_file_name};
pub use external::{find_tool, run_with_timeout, ExternalCommandResult};
pub use logging::{init_logging, LogConfig, LoggingGuard};
pub use progress::{create_progress_bar, format_duration};
pub use report::*;
pub use thread_manager::{build_pool, scan_pool_size};
