//! External tool execution
//!
//! FFmpeg writes its banner, stream listing and errors to stderr, which can
//! easily exceed the OS pipe buffer (~64KB). Reading stdout to the end while
//! stderr sits undrained deadlocks both processes, so stderr is consumed on
//! its own thread and both streams are fully captured before the exit status
//! is inspected.
//!
//! The [`CommandRunner`] trait is the seam between the conversion logic and
//! the real binaries; tests substitute scripted runners.

use anyhow::{Context, Result};
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::logging::log_external_tool;

/// Captured result of one external tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an external program to completion and captures its output.
///
/// An `Err` means the program could not be started at all (missing binary,
/// permission problem). A program that starts and exits non-zero is an `Ok`
/// with a failing [`ToolOutput`]; callers judge it by exit code and stderr.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput> {
        let command_str = format_command(program, args);
        debug!(command = %command_str, "Spawning external tool");

        let start = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn: {}", command_str))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr of {}", command_str))?;

        let stderr_thread = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = BufReader::new(stderr).read_to_end(&mut buf);
            buf
        });

        let mut stdout_buf = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            BufReader::new(stdout)
                .read_to_end(&mut stdout_buf)
                .with_context(|| format!("Failed to read stdout of {}", command_str))?;
        }

        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for {}", command_str))?;
        let stderr_buf = stderr_thread.join().unwrap_or_default();

        let output = ToolOutput {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            duration: start.elapsed(),
        };

        let tool_name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        log_external_tool(
            &tool_name,
            &arg_refs,
            &output.stderr,
            output.exit_code,
            output.duration,
        );

        Ok(output)
    }
}

pub fn format_command(program: &Path, args: &[String]) -> String {
    let mut s = program.display().to_string();
    for arg in args {
        s.push(' ');
        if arg.contains(' ') {
            s.push('"');
            s.push_str(arg);
            s.push('"');
        } else {
            s.push_str(arg);
        }
    }
    s
}

/// Number of meaningful stderr lines kept for users and logs.
pub const DIAGNOSTIC_TAIL_LINES: usize = 15;

pub const NO_DIAGNOSTIC: &str = "(no ffmpeg stderr captured)";

const BENIGN_WARNINGS: &[&str] = &["Incorrect BOM value", "Error reading comment frame, skipped"];

fn is_boilerplate_line(line: &str) -> bool {
    let trimmed = line.trim_start();

    if trimmed.starts_with("ffmpeg version")
        || trimmed.starts_with("ffprobe version")
        || trimmed.starts_with("built with")
        || trimmed.starts_with("configuration:")
        || trimmed.starts_with("--")
    {
        return true;
    }

    // "  libavcodec     60. 31.102 / 60. 31.102"
    let is_library_listing = (trimmed.starts_with("libav")
        || trimmed.starts_with("libsw")
        || trimmed.starts_with("libpostproc"))
        && trimmed.contains(" / ");
    if is_library_listing {
        return true;
    }

    BENIGN_WARNINGS.iter().any(|w| trimmed.starts_with(w))
}

/// Drops banner/build/library lines and known benign warnings, keeping the
/// last [`DIAGNOSTIC_TAIL_LINES`] meaningful lines.
pub fn clean_ffmpeg_diagnostic(raw: &str) -> String {
    let meaningful: Vec<&str> = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !is_boilerplate_line(line))
        .collect();

    if meaningful.is_empty() {
        return NO_DIAGNOSTIC.to_string();
    }

    let start = meaningful.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    meaningful[start..].join("\n")
}
