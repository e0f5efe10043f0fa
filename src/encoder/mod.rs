//! Transcode scheduling.
//!
//! The scheduler owns the encode lifecycle: it scans the library, keeps two
//! FIFO queues (interrupted encodes drain before fresh ones), runs at most
//! `workers` ffmpeg processes at a time, and rescans when the filesystem
//! watcher reports changes. A job's slot is released only after the process
//! has exited and the completion notification has been attempted, so a
//! rescan can never double-schedule a title that is still in flight.

pub mod args;
pub mod discover;
pub mod process;

pub use discover::{discover_jobs, Discovery, TranscodeJob};

use crate::config::{Config, TranscodeConfig};
use crate::error::{CoreError, Result};
use crate::inventory::{self, ResumeCursor};
use crate::notifications::ManifestNotifier;
use notify::{RecursiveMode, Watcher};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What pre-flight decided for a job.
#[derive(Debug)]
pub enum JobPlan {
    Skip(SkipReason),
    Fresh,
    Resume(ResumeCursor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SourceMissing,
    AlreadyComplete,
}

/// Re-validate a job immediately before spawning ffmpeg.
///
/// Discovery results go stale while a job sits in the queue: the source may
/// have been deleted, or an earlier run may have finished the title. The
/// output directory is created here, and when resume is off (or nothing
/// survived) stale partial output is wiped so ffmpeg starts from a clean
/// directory.
pub fn prepare(job: &TranscodeJob, settings: &TranscodeConfig) -> Result<JobPlan> {
    if !job.source_absolute.exists() {
        return Ok(JobPlan::Skip(SkipReason::SourceMissing));
    }
    if job.master_absolute.exists() {
        return Ok(JobPlan::Skip(SkipReason::AlreadyComplete));
    }

    std::fs::create_dir_all(&job.output_dir_absolute)?;

    let inv = inventory::scan_segments(
        &job.output_dir_absolute,
        job.pattern.as_ref(),
        &job.layout.base_name,
    );

    if settings.resume {
        if let Some(cursor) = ResumeCursor::from_inventory(&inv, settings.segment_duration()) {
            return Ok(JobPlan::Resume(cursor));
        }
    }

    remove_hls_artifacts(job)?;
    Ok(JobPlan::Fresh)
}

/// Delete partial HLS output for a title: its segments and any playlist
/// files carrying its base name. The source file is never touched.
fn remove_hls_artifacts(job: &TranscodeJob) -> Result<()> {
    let entries = match std::fs::read_dir(&job.output_dir_absolute) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    let base_lower = job.layout.base_name.to_lowercase();
    let mut removed = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        let is_segment = match &job.pattern {
            Some(pattern) => pattern.is_match(&name),
            None => {
                let lower = name.to_lowercase();
                lower.starts_with(&format!("{}_", base_lower)) && lower.ends_with(".ts")
            }
        };
        let is_playlist =
            name.to_lowercase().starts_with(&base_lower) && name.to_lowercase().ends_with(".m3u8");

        if is_segment || is_playlist {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::info!(
            "Removed {} stale artifact(s) for {}",
            removed,
            job.descriptor
        );
    }
    Ok(())
}

struct JobDone {
    key: String,
    failed: bool,
}

/// Long-running scheduler. Owns the watcher, the queues and the worker pool.
pub struct TranscodeScheduler {
    config: Arc<Config>,
    notifier: Arc<ManifestNotifier>,

    resume_queue: VecDeque<TranscodeJob>,
    fresh_queue: VecDeque<TranscodeJob>,
    queued: HashSet<String>,
    running: HashSet<String>,
    watched: HashSet<PathBuf>,
}

impl TranscodeScheduler {
    pub fn new(config: Arc<Config>, notifier: Arc<ManifestNotifier>) -> Self {
        Self {
            config,
            notifier,
            resume_queue: VecDeque::new(),
            fresh_queue: VecDeque::new(),
            queued: HashSet::new(),
            running: HashSet::new(),
            watched: HashSet::new(),
        }
    }

    /// Run until the task is cancelled. Performs an initial scan, then
    /// reacts to filesystem events and job completions.
    pub async fn run(mut self) -> Result<()> {
        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel::<()>();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<JobDone>();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(_) => {
                    let _ = fs_tx.send(());
                }
                Err(err) => {
                    tracing::warn!("Watch error: {}", err);
                }
            })
            .map_err(|e| CoreError::Io(std::io::Error::other(e)))?;

        self.rescan(&mut watcher);
        self.drain(&done_tx);

        loop {
            tokio::select! {
                event = fs_rx.recv() => {
                    if event.is_none() {
                        break;
                    }
                    self.settle(&mut fs_rx).await;
                    tracing::debug!("Filesystem changed, rescanning library");
                    self.rescan(&mut watcher);
                    self.drain(&done_tx);
                }
                done = done_rx.recv() => {
                    let Some(done) = done else { break };
                    self.running.remove(&done.key);
                    if done.failed {
                        tracing::warn!("Transcode failed: {}", done.key);
                    }
                    self.drain(&done_tx);
                }
            }
        }

        Ok(())
    }

    /// Coalesce a burst of filesystem events into one rescan: keep eating
    /// events until the configured window passes with none arriving.
    async fn settle(&self, fs_rx: &mut mpsc::UnboundedReceiver<()>) {
        let window = self.config.transcode.rescan_debounce();
        loop {
            match tokio::time::timeout(window, fs_rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    }

    fn rescan(&mut self, watcher: &mut notify::RecommendedWatcher) {
        let discovery = discover_jobs(&self.config.media_dir, &self.config.transcode.templates());

        // Drop watches on directories that left the library. Unwatch can
        // fail when the directory is already gone; the registration is
        // forgotten either way.
        let stale: Vec<PathBuf> = self
            .watched
            .difference(&discovery.watch_dirs)
            .cloned()
            .collect();
        for dir in stale {
            if let Err(err) = watcher.unwatch(&dir) {
                tracing::debug!("Failed to unwatch {:?}: {}", dir, err);
            }
            self.watched.remove(&dir);
        }

        for dir in &discovery.watch_dirs {
            if self.watched.contains(dir) {
                continue;
            }
            match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.watched.insert(dir.clone());
                }
                Err(err) => {
                    tracing::debug!("Failed to watch {:?}: {}", dir, err);
                }
            }
        }

        let mut added = 0usize;
        for job in discovery.jobs {
            // Running jobs are authoritative over whatever a rescan claims.
            if self.running.contains(&job.key) || self.queued.contains(&job.key) {
                continue;
            }
            self.queued.insert(job.key.clone());
            added += 1;
            if job.resume_eligible && self.config.transcode.resume {
                self.resume_queue.push_back(job);
            } else {
                self.fresh_queue.push_back(job);
            }
        }
        if added > 0 {
            tracing::info!(
                "Queued {} job(s) ({} resumable, {} fresh)",
                added,
                self.resume_queue.len(),
                self.fresh_queue.len()
            );
        }
    }

    fn drain(&mut self, done_tx: &mpsc::UnboundedSender<JobDone>) {
        while self.running.len() < self.config.transcode.workers {
            let Some(job) = self
                .resume_queue
                .pop_front()
                .or_else(|| self.fresh_queue.pop_front())
            else {
                break;
            };
            self.queued.remove(&job.key);
            self.running.insert(job.key.clone());
            self.spawn_job(job, done_tx.clone());
        }
    }

    fn spawn_job(&self, job: TranscodeJob, done_tx: mpsc::UnboundedSender<JobDone>) {
        let config = Arc::clone(&self.config);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let key = job.key.clone();
            let failed = match run_job(&job, &config, &notifier).await {
                Ok(()) => false,
                Err(err) => {
                    tracing::error!("Transcode error for {}: {}", job.descriptor, err);
                    true
                }
            };
            let _ = done_tx.send(JobDone { key, failed });
        });
    }
}

async fn run_job(job: &TranscodeJob, config: &Config, notifier: &ManifestNotifier) -> Result<()> {
    let cursor = match prepare(job, &config.transcode)? {
        JobPlan::Skip(reason) => {
            tracing::info!("Skipping {} ({:?})", job.descriptor, reason);
            return Ok(());
        }
        JobPlan::Fresh => {
            tracing::info!("Starting encode: {}", job.descriptor);
            None
        }
        JobPlan::Resume(cursor) => {
            tracing::info!(
                "Resuming encode at segment {} ({:.1}s in): {}",
                cursor.start_number,
                cursor.seek_seconds,
                job.descriptor
            );
            Some(cursor)
        }
    };

    let ffmpeg_args = args::build_transcode_args(
        &config.transcode,
        &config.media_dir,
        &job.source_absolute,
        &job.layout,
        cursor.as_ref(),
    );
    process::run(&config.transcode.ffmpeg_path, &ffmpeg_args).await?;

    if !job.master_absolute.exists() {
        tracing::warn!(
            "ffmpeg exited cleanly but master playlist is missing: {}",
            job.key
        );
        return Ok(());
    }

    tracing::info!("Encode complete: {}", job.descriptor);
    notifier.notify_complete(job).await;
    Ok(())
}
