//! Completion notifications.
//!
//! After a transcode finishes, the daemon tells the application server that
//! a new master playlist exists so the library can pick it up without a
//! rescan. Delivery is best effort: a failed notification is logged and the
//! encode still counts as complete, since the master playlist on disk is the
//! durable record.

use crate::config::NotifyConfig;
use crate::encoder::TranscodeJob;
use crate::layout::MediaKind;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ManifestNotifier {
    client: reqwest::Client,
    config: NotifyConfig,
}

impl ManifestNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled()
    }

    /// Announce a freshly written master playlist. Never fails the caller.
    pub async fn notify_complete(&self, job: &TranscodeJob) {
        if !self.enabled() {
            tracing::debug!("Notifications disabled, skipping: {}", job.key);
            return;
        }

        let payload = manifest_payload(job);
        let request = self
            .client
            .post(&self.config.url)
            .header("x-internal-key", &self.config.api_key)
            .json(&payload);

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Notified manifest update: {}", job.key);
            }
            Ok(response) => {
                tracing::warn!(
                    "Manifest notification rejected ({}): {}",
                    response.status(),
                    job.key
                );
            }
            Err(err) => {
                tracing::warn!("Manifest notification failed for {}: {}", job.key, err);
            }
        }
    }
}

fn manifest_payload(job: &TranscodeJob) -> serde_json::Value {
    match job.kind {
        MediaKind::Movie => json!({
            "kind": job.kind.as_str(),
            "master_playlist": job.key,
            "descriptor": job.descriptor,
            "movie_title": job.layout.base_name,
        }),
        MediaKind::Episode => json!({
            "kind": job.kind.as_str(),
            "master_playlist": job.key,
            "descriptor": job.descriptor,
            "show_title": job.show_title,
            "season_label": job.season_label,
            "episode_title": job.layout.base_name,
            "episode_number": job.episode_number,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{resolve_layout, HlsTemplates};
    use std::path::Path;

    fn templates() -> HlsTemplates {
        HlsTemplates {
            master: "%b.m3u8".into(),
            variant: "%b.m3u8".into(),
            segment: "%b_%05d.ts".into(),
        }
    }

    fn episode_job() -> TranscodeJob {
        let layout = resolve_layout(
            MediaKind::Episode,
            Some("shows/Lost/Season 1/Lost S01E02.mkv"),
            None,
            &templates(),
        )
        .unwrap();
        let mut job = TranscodeJob::for_tests(
            Path::new("/media"),
            MediaKind::Episode,
            "/media/shows/Lost/Season 1/Lost S01E02.mkv".into(),
            layout,
        );
        job.show_title = Some("Lost".into());
        job.season_label = Some("Season 1".into());
        job.episode_number = Some(2);
        job
    }

    #[test]
    fn test_episode_payload_shape() {
        let payload = manifest_payload(&episode_job());
        assert_eq!(payload["kind"], "episode");
        assert_eq!(payload["show_title"], "Lost");
        assert_eq!(payload["season_label"], "Season 1");
        assert_eq!(payload["episode_number"], 2);
        assert_eq!(
            payload["master_playlist"],
            "shows/Lost/Season 1/Lost S01E02/Lost S01E02.m3u8"
        );
    }

    #[test]
    fn test_movie_payload_shape() {
        let layout = resolve_layout(
            MediaKind::Movie,
            Some("movies/Alien (1979)/Alien.mkv"),
            None,
            &templates(),
        )
        .unwrap();
        let job = TranscodeJob::for_tests(
            Path::new("/media"),
            MediaKind::Movie,
            "/media/movies/Alien (1979)/Alien.mkv".into(),
            layout,
        );
        let payload = manifest_payload(&job);
        assert_eq!(payload["kind"], "movie");
        assert_eq!(payload["movie_title"], "Alien");
        assert!(payload.get("episode_number").is_none());
    }

    #[test]
    fn test_disabled_without_url() {
        let notifier = ManifestNotifier::new(NotifyConfig::default());
        assert!(!notifier.enabled());
    }
}
