//! Shared utilities for the retune432 tools
//!
//! - Error types and the `Result` alias
//! - Logging setup (rolling file + stderr)
//! - External process execution without pipe deadlocks
//! - FFmpeg / FFprobe discovery
//! - Directory walking and batch bookkeeping
//! - Progress bar and summary report

pub mod batch;
pub mod common_utils;
pub mod errors;
pub mod ffmpeg_process;
pub mod logging;
pub mod progress;
pub mod report;
pub mod tools;

pub use batch::{walk_files, BatchResult};
pub use common_utils::{
    compute_relative_path, ensure_dir_exists, ensure_parent_dir_exists, get_extension_lowercase,
    has_extension, safe_path_arg,
};
pub use errors::{Result, RetuneError};
pub use ffmpeg_process::{
    clean_ffmpeg_diagnostic, format_command, CommandRunner, SystemRunner, ToolOutput,
};
pub use progress::{create_progress_bar, format_bytes, format_duration, is_quiet_mode, set_quiet_mode};
pub use report::{print_summary_report, render_summary_report};
pub use tools::{default_search_roots, resolve_tools, ToolPaths};
