//! Error taxonomy for the transcoding core.
//!
//! Nothing here is treated as fatal to the host process: schedulers log and
//! drop, caches clean up and surface the error to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// How many bytes of external-process diagnostics to keep.
pub const DIAGNOSTIC_LIMIT: usize = 4000;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The source file for a job disappeared before it could start.
    #[error("source missing: {0}")]
    SourceMissing(PathBuf),

    /// The master playlist already exists; the work is already done.
    #[error("output already present: {0}")]
    OutputAlreadyPresent(PathBuf),

    /// An external process (ffmpeg) exited non-zero or failed to spawn.
    #[error("{program} failed with {status}: {stderr}")]
    ExternalProcess {
        program: String,
        status: String,
        stderr: String,
    },

    /// The completion notification could not be delivered.
    #[error("notification failed: {0}")]
    Notification(String),

    /// Writing a cached artifact failed; partial output has been removed.
    #[error("cache write failed for {path}: {source}")]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Build an `ExternalProcess` error, keeping only the tail of stderr.
    pub fn process_failure(program: &str, status: String, stderr: &str) -> Self {
        let stderr = stderr.trim();
        let truncated = if stderr.len() > DIAGNOSTIC_LIMIT {
            // Keep the tail; ffmpeg puts the actionable line last.
            let start = stderr.len() - DIAGNOSTIC_LIMIT;
            let start = stderr
                .char_indices()
                .map(|(i, _)| i)
                .find(|&i| i >= start)
                .unwrap_or(start);
            format!("...{}", &stderr[start..])
        } else {
            stderr.to_string()
        };
        CoreError::ExternalProcess {
            program: program.to_string(),
            status,
            stderr: truncated,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
