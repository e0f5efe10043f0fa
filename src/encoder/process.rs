//! External process execution.
//!
//! All ffmpeg invocations go through these helpers: the child runs as an
//! awaited async task, stderr is accumulated for diagnostics, and a non-zero
//! exit becomes a `CoreError::ExternalProcess` carrying the truncated tail.
//! No timeout is imposed here; callers that need one wrap the future.

use crate::error::{CoreError, Result};
use bytes::Bytes;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Run a program to completion, discarding stdout.
pub async fn run(program: &Path, args: &[String]) -> Result<()> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| spawn_failure(program, e))?;

    if !output.status.success() {
        return Err(CoreError::process_failure(
            &program.to_string_lossy(),
            output.status.to_string(),
            &String::from_utf8_lossy(&output.stderr),
        ));
    }
    Ok(())
}

/// Run a program with a working directory, discarding stdout.
///
/// Used for playlist remuxing, where segment references inside the playlist
/// are relative and only resolve from the playlist's own directory.
pub async fn run_in_dir(program: &Path, args: &[String], dir: &Path) -> Result<()> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| spawn_failure(program, e))?;

    if !output.status.success() {
        return Err(CoreError::process_failure(
            &program.to_string_lossy(),
            output.status.to_string(),
            &String::from_utf8_lossy(&output.stderr),
        ));
    }
    Ok(())
}

/// Run a program and capture stdout as bytes.
pub async fn run_capture(program: &Path, args: &[String]) -> Result<Bytes> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| spawn_failure(program, e))?;

    if !output.status.success() {
        return Err(CoreError::process_failure(
            &program.to_string_lossy(),
            output.status.to_string(),
            &String::from_utf8_lossy(&output.stderr),
        ));
    }
    Ok(Bytes::from(output.stdout))
}

fn spawn_failure(program: &Path, err: std::io::Error) -> CoreError {
    CoreError::process_failure(
        &program.to_string_lossy(),
        "failed to spawn".to_string(),
        &err.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_run_success() {
        let result = run(Path::new("true"), &[]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_failure_carries_status() {
        let result = run(Path::new("false"), &[]).await;
        assert_matches!(result, Err(CoreError::ExternalProcess { .. }));
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let result = run(Path::new("hlsforge-no-such-binary"), &[]).await;
        assert_matches!(result, Err(CoreError::ExternalProcess { status, .. }) => {
            assert_eq!(status, "failed to spawn");
        });
    }

    #[tokio::test]
    async fn test_run_capture_collects_stdout() {
        let out = run_capture(Path::new("echo"), &["-n".into(), "hello".into()])
            .await
            .unwrap();
        assert_eq!(&out[..], b"hello");
    }
}
