use std::path::{Path, PathBuf};
use std::time::Duration;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::{
    backend::ExportPreset,
    error::{ConfigError, Result},
};

/// Main configuration for the video trimmer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where and how artifacts are named
    pub output: OutputConfig,

    /// Export encoding settings
    pub export: ExportConfig,

    /// Thumbnail settings
    pub thumbnail: ThumbnailConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        self.export.validate()?;
        self.thumbnail.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Artifact location and naming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory that receives exported clips and thumbnails
    pub directory: PathBuf,

    /// Reserved filename prefix; every file named `<prefix>_*` with a tracked
    /// extension in `directory` belongs to the engine
    pub prefix: String,

    /// Container extension for exported clips
    pub video_extension: String,

    /// Extension for still images
    pub image_extension: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir(),
            prefix: "vtrim".to_string(),
            video_extension: "mp4".to_string(),
            image_extension: "jpg".to_string(),
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        let bad_prefix = self.prefix.is_empty()
            || self
                .prefix
                .chars()
                .any(|c| c == '/' || c == '\\' || c == '.' || c.is_whitespace());
        if bad_prefix {
            return Err(invalid("output.prefix", &self.prefix).into());
        }

        for (key, ext) in [
            ("output.video_extension", &self.video_extension),
            ("output.image_extension", &self.image_extension),
        ] {
            if ext.is_empty() || ext.contains('.') || ext.contains('/') {
                return Err(invalid(key, ext).into());
            }
        }

        if self.video_extension.eq_ignore_ascii_case(&self.image_extension) {
            return Err(invalid(
                "output.extensions",
                format!("{}={}", self.video_extension, self.image_extension),
            )
            .into());
        }

        Ok(())
    }
}

/// Export encoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Quality preset used for every export
    pub preset: ExportPreset,

    /// Encoder for the video stream
    pub video_codec: String,

    /// Encoder for the audio stream
    pub audio_codec: String,

    /// Audio bitrate in kbit/s
    pub audio_bitrate_kbps: u32,

    /// Encoder threads
    pub threads: usize,

    /// `ffmpeg` executable
    pub ffmpeg_path: PathBuf,

    /// `ffprobe` executable
    pub ffprobe_path: PathBuf,

    /// Upper bound for a metadata probe or a single frame grab, in ms
    pub probe_timeout_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            preset: ExportPreset::Highest,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 128,
            threads: num_cpus::get(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            probe_timeout_ms: 30_000,
        }
    }
}

impl ExportConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.video_codec.is_empty() {
            return Err(invalid("export.video_codec", "").into());
        }

        if self.audio_bitrate_kbps == 0 {
            return Err(invalid("export.audio_bitrate_kbps", self.audio_bitrate_kbps).into());
        }

        if self.threads == 0 {
            return Err(invalid("export.threads", self.threads).into());
        }

        if self.probe_timeout_ms == 0 {
            return Err(invalid("export.probe_timeout_ms", self.probe_timeout_ms).into());
        }

        Ok(())
    }
}

/// Resampling filter used when a thumbnail is rescaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Thumbnail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// JPEG quality used when the caller does not pass one (0-100)
    pub default_quality: u8,

    /// Filter used for rescaling
    pub filter: ResizeFilter,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            default_quality: 80,
            filter: ResizeFilter::Lanczos3,
        }
    }
}

impl ThumbnailConfig {
    fn validate(&self) -> Result<()> {
        if self.default_quality > 100 {
            return Err(invalid("thumbnail.default_quality", self.default_quality).into());
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("trimmer.toml");

        let mut original_config = Config::default();
        original_config.output.prefix = "clipcache".to_string();
        original_config.export.preset = ExportPreset::Low;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.output.prefix, "clipcache");
        assert_eq!(loaded_config.export.preset, ExportPreset::Low);
        assert_eq!(loaded_config.thumbnail.filter, ResizeFilter::Lanczos3);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[thumbnail]\ndefault_quality = 55\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.thumbnail.default_quality, 55);
        assert_eq!(config.output.prefix, "vtrim");
        assert_eq!(config.export.video_codec, "libx264");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = Config::from_file(dir.path().join("nope.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_prefix() {
        let mut config = Config::default();
        config.output.prefix = "../escape".to_string();
        assert!(config.validate().is_err());

        config.output.prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clashing_extensions() {
        let mut config = Config::default();
        config.output.image_extension = "MP4".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_probe_timeout_is_rejected() {
        let mut config = Config::default();
        assert_eq!(config.export.probe_timeout(), Duration::from_secs(30));
        config.export.probe_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_quality() {
        let mut config = Config::default();
        config.thumbnail.default_quality = 101;
        assert!(config.validate().is_err());
    }
}
