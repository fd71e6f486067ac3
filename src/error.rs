use thiserror::Error;

/// Main error type for the video trimmer
///
/// Every variant is terminal: the engine never retries on its own, callers
/// decide whether a failure is worth another attempt.
#[derive(Error, Debug)]
pub enum TrimError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("No video loaded")]
    NoVideoLoaded,

    #[error("Invalid video track: {reason}")]
    InvalidVideoTrack { reason: String },

    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    #[error("Invalid time range: {start_ms}ms-{end_ms}ms (duration {duration_ms}ms)")]
    InvalidTimeRange {
        start_ms: i64,
        end_ms: i64,
        duration_ms: i64,
    },

    #[error("Could not create export session: {reason}")]
    ExportSessionFailed { reason: String },

    #[error("Export failed: {reason}")]
    ExportFailed { reason: String },

    #[error("Export cancelled")]
    ExportCancelled,

    #[error("Thumbnail generation failed: {reason}")]
    ThumbnailGenerationFailed { reason: String },

    #[error("An export is already in progress")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using TrimError
pub type Result<T> = std::result::Result<T, TrimError>;

impl TrimError {
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::Unknown(message.into())
    }

    pub fn export_failed<S: Into<String>>(reason: S) -> Self {
        Self::ExportFailed {
            reason: reason.into(),
        }
    }

    pub fn thumbnail_failed<S: Into<String>>(reason: S) -> Self {
        Self::ThumbnailGenerationFailed {
            reason: reason.into(),
        }
    }

    /// Stable error code for transports that marshal errors as strings
    pub fn code(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::NoVideoLoaded => "NO_VIDEO_LOADED",
            Self::InvalidVideoTrack { .. } => "INVALID_VIDEO_TRACK",
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            Self::InvalidTimeRange { .. } => "INVALID_TIME_RANGE",
            Self::ExportSessionFailed { .. } => "EXPORT_SESSION_FAILED",
            Self::ExportFailed { .. } => "EXPORT_FAILED",
            Self::ExportCancelled => "EXPORT_CANCELLED",
            Self::ThumbnailGenerationFailed { .. } => "THUMBNAIL_GENERATION_FAILED",
            Self::Busy => "BUSY",
            Self::Config(_) | Self::Io(_) | Self::Unknown(_) => "UNKNOWN",
        }
    }

    /// Whether the caller may reasonably try the same call again
    pub fn is_recoverable(&self) -> bool {
        match self {
            // IO errors might be temporary
            Self::Io(_) => true,
            // The in-flight export will finish or can be cancelled
            Self::Busy => true,
            // Backend hiccups are worth a retry from the caller's side
            Self::ExportFailed { .. } | Self::ThumbnailGenerationFailed { .. } => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::FileNotFound { path } => {
                format!("Could not find video file '{}'. Please check the path.", path)
            }
            Self::NoVideoLoaded => "Load a video before trimming or grabbing a frame.".to_string(),
            Self::InvalidTimeRange {
                start_ms,
                end_ms,
                duration_ms,
            } => format!(
                "The range {}ms-{}ms is not inside the video (0ms-{}ms) or is empty.",
                start_ms, end_ms, duration_ms
            ),
            Self::UnsupportedFormat { .. } => {
                "This video is protected or uses a format that cannot be exported.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
