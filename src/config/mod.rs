mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./hlsforge.toml",
        "~/.config/hlsforge/config.toml",
        "/etc/hlsforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if !config.media_dir.exists() {
        tracing::warn!("Media directory does not exist: {:?}", config.media_dir);
    }

    if config.transcode.segment_duration_secs == 0 {
        anyhow::bail!("Segment duration cannot be 0");
    }

    if config.transcode.workers == 0 {
        anyhow::bail!("Transcode worker count cannot be 0");
    }

    if config.cache.remux_workers == 0 {
        anyhow::bail!("Remux worker count cannot be 0");
    }

    if !config.transcode.master_template.contains("%b") {
        anyhow::bail!(
            "Master playlist template must contain a %b placeholder: {}",
            config.transcode.master_template
        );
    }

    // ffmpeg is the authority on playlist types; only warn on odd values.
    let playlist_type = config.transcode.playlist_type.as_str();
    if !matches!(playlist_type, "vod" | "event") {
        tracing::warn!("Unusual hls_playlist_type: {}", playlist_type);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.transcode.segment_duration_secs, 6);
        assert_eq!(config.transcode.master_template, "%b.m3u8");
        assert!(config.transcode.resume);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            media_dir = "/srv/media"

            [transcode]
            segment_duration_secs = 4
            workers = 2

            [notify]
            url = "http://app:3004/api/media/notify"
            api_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.media_dir, std::path::PathBuf::from("/srv/media"));
        assert_eq!(config.transcode.segment_duration_secs, 4);
        assert_eq!(config.transcode.workers, 2);
        // Untouched sections keep their defaults.
        assert_eq!(config.transcode.preset, "slow");
        assert_eq!(config.cache.playlist_ttl_secs, 5);
        assert!(config.notify.enabled());
    }

    #[test]
    fn test_rejects_zero_segment_duration() {
        let mut config = Config::default();
        config.transcode.segment_duration_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_template_without_base_placeholder() {
        let mut config = Config::default();
        config.transcode.master_template = "master.m3u8".into();
        assert!(validate_config(&config).is_err());
    }
}
