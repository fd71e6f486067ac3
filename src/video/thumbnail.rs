use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::imageops::FilterType;
use tokio::{task, time};
use tracing::{debug, info};

use crate::backend::RenderBackend;
use crate::cache::ArtifactNamer;
use crate::error::{Result, TrimError};
use crate::video::orientation::Rotation;
use crate::video::types::{LoadedAsset, MediaTime, Size};

/// Parameters of a single still-frame grab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub position_ms: i64,

    /// Exact output size; aspect ratio is not preserved
    pub target_size: Option<Size>,

    /// JPEG quality, 0-100
    pub quality: u8,
}

/// Grabs upright still frames from the loaded asset
#[derive(Clone)]
pub struct ThumbnailExtractor {
    backend: Arc<dyn RenderBackend>,
    namer: ArtifactNamer,
    extension: String,
    filter: FilterType,
    timeout: Duration,
}

impl ThumbnailExtractor {
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        namer: ArtifactNamer,
        extension: impl Into<String>,
        filter: FilterType,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            namer,
            extension: extension.into(),
            filter,
            timeout,
        }
    }

    /// Extract, orient, rescale and encode one frame into `output_dir`
    pub async fn extract(
        &self,
        asset: Arc<LoadedAsset>,
        request: ThumbnailRequest,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let this = self.clone();
        let output_dir = output_dir.to_path_buf();
        let work = task::spawn_blocking(move || this.extract_blocking(&asset, request, &output_dir));

        time::timeout(self.timeout, work)
            .await
            .map_err(|_| TrimError::thumbnail_failed(format!("frame grab timed out after {:?}", self.timeout)))?
            .map_err(|e| TrimError::thumbnail_failed(format!("frame task failed: {}", e)))?
    }

    fn extract_blocking(
        &self,
        asset: &LoadedAsset,
        request: ThumbnailRequest,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let position_ms = request.position_ms.clamp(0, asset.duration_ms().max(0));
        let at = MediaTime::from_millis(position_ms);
        debug!("Grabbing frame near {}ms from {}", position_ms, asset.path().display());

        let frame = self
            .backend
            .extract_frame(asset.path(), at)
            .map_err(|e| match e {
                TrimError::ThumbnailGenerationFailed { .. } => e,
                other => TrimError::thumbnail_failed(other.to_string()),
            })?;

        let mut frame = frame.oriented(Rotation::classify(&asset.preferred_transform()));

        if let Some(size) = request.target_size {
            if size.is_empty() {
                return Err(TrimError::thumbnail_failed(format!(
                    "cannot scale to {}x{}",
                    size.width, size.height
                )));
            }
            frame = frame.resized(size, self.filter);
        }

        std::fs::create_dir_all(output_dir)
            .map_err(|e| TrimError::thumbnail_failed(format!("cannot create {}: {}", output_dir.display(), e)))?;
        let path = self.namer.next_path(output_dir, &self.extension);

        if let Err(e) = frame.write_jpeg(&path, request.quality.min(100)) {
            let _ = std::fs::remove_file(&path);
            return Err(TrimError::thumbnail_failed(format!("encode failed: {}", e)));
        }

        info!("Thumbnail {}x{} written to {}", frame.width(), frame.height(), path.display());
        Ok(path)
    }
}
