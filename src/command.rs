//! Wrapper for the optional trailing command.
//!
//! The command runs while watching is active; its stdout and stderr are
//! mirrored line by line into the diagnostic log (never stdout, which
//! belongs to the entry sink) and its exit status becomes the process exit
//! code.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Exit code reported when the child's status carries no code (killed by a
/// signal) or the child could not be waited on.
pub const UNKNOWN_EXIT_CODE: i32 = -2;

/// Runs `program` with `args` and returns its exit code.
///
/// # Errors
///
/// Returns an error when the child cannot be spawned; wait failures map to
/// [`UNKNOWN_EXIT_CODE`] instead.
pub async fn run(program: &str, args: &[String]) -> std::io::Result<i32> {
    tracing::info!(command = %program, ?args, "executing command");
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take().map(|out| tokio::spawn(log_lines(out)));
    let stderr = child.stderr.take().map(|err| tokio::spawn(log_lines(err)));

    let status = child.wait().await;

    if let Some(task) = stdout {
        let _ = task.await;
    }
    if let Some(task) = stderr {
        let _ = task.await;
    }

    match status {
        Ok(status) => {
            let code = status.code().unwrap_or(UNKNOWN_EXIT_CODE);
            tracing::info!(code, "command finished");
            Ok(code)
        }
        Err(e) => {
            tracing::error!(command = %program, error = %e, "failed to wait for command");
            Ok(UNKNOWN_EXIT_CODE)
        }
    }
}

async fn log_lines(reader: impl AsyncRead + Unpin) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!(target: "process", "{line}");
    }
}
