//! # Render Backend Module
//!
//! The engine never touches pixels itself. Decoding, encoding and muxing go
//! through a [`RenderBackend`], driven by a composition, a time range and the
//! orientation instruction attached to it.

pub mod ffmpeg;
pub mod probe;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::composition::Composition;
use crate::error::Result;
use crate::export::{CancelToken, ProgressReporter};
use crate::video::types::{AssetMetadata, Frame, MediaTime, TimeRange};

pub use ffmpeg::FfmpegBackend;

/// Export quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPreset {
    Highest,
    Medium,
    Low,
}

/// Everything a backend needs to render one trimmed clip
#[derive(Debug, Clone)]
pub struct ExportSession {
    pub composition: Composition,
    pub range: TimeRange,
    pub output_path: PathBuf,
    pub preset: ExportPreset,
}

/// Trait for render backends (FFmpeg, platform media frameworks, etc.)
pub trait RenderBackend: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Check if this backend is usable on the current system
    fn is_available(&self) -> bool;

    /// Resolve container metadata. Blocking; callers run it off the async
    /// executor.
    fn probe(&self, path: &Path) -> Result<AssetMetadata>;

    /// Whether `preset` can be used to export an asset with this metadata
    fn supports_export(&self, metadata: &AssetMetadata, preset: ExportPreset) -> bool;

    /// Render the session to `session.output_path`.
    ///
    /// Implementations poll `cancel` and return
    /// [`TrimError::ExportCancelled`](crate::error::TrimError::ExportCancelled)
    /// once they notice it. Progress is reported as a fraction of the range.
    fn export(
        &self,
        session: &ExportSession,
        cancel: &CancelToken,
        progress: &ProgressReporter,
    ) -> Result<()>;

    /// Decode the closest sync frame at or before `at`, in the track's
    /// stored orientation
    fn extract_frame(&self, source: &Path, at: MediaTime) -> Result<Frame>;
}
