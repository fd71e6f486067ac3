use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::{task, time};
use tracing::{debug, info, warn};

use crate::backend::{ExportPreset, RenderBackend};
use crate::error::{Result, TrimError};
use crate::video::types::{AssetMetadata, LoadedAsset};

/// Opens source files and resolves their metadata off the caller's executor
pub struct AssetLoader {
    backend: Arc<dyn RenderBackend>,
    preset: ExportPreset,
    timeout: Duration,
}

impl AssetLoader {
    /// `timeout` bounds the metadata probe
    pub fn new(backend: Arc<dyn RenderBackend>, preset: ExportPreset, timeout: Duration) -> Self {
        Self {
            backend,
            preset,
            timeout,
        }
    }

    /// Load and validate the video at `path`
    pub async fn load<P: AsRef<Path>>(&self, path: P) -> Result<LoadedAsset> {
        let path = path.as_ref().to_path_buf();

        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(TrimError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        debug!("Probing {}", path.display());
        let metadata = self.probe(path.clone()).await?;
        self.check(&path, &metadata)?;

        info!(
            "Loaded {}: {:.1}s, {}x{}, {} tracks",
            path.display(),
            metadata.duration.as_secs_f64(),
            metadata.natural_size.width,
            metadata.natural_size.height,
            metadata.tracks.len()
        );

        Ok(LoadedAsset::new(path, metadata))
    }

    async fn probe(&self, path: PathBuf) -> Result<AssetMetadata> {
        let backend = Arc::clone(&self.backend);

        let probed = time::timeout(self.timeout, task::spawn_blocking(move || backend.probe(&path)))
            .await
            .map_err(|_| TrimError::InvalidVideoTrack {
                reason: format!("metadata probe timed out after {:?}", self.timeout),
            })?
            .map_err(|e| TrimError::InvalidVideoTrack {
                reason: format!("metadata task failed: {}", e),
            })?;

        probed.map_err(|e| match e {
            TrimError::InvalidVideoTrack { .. } | TrimError::UnsupportedFormat { .. } => e,
            other => TrimError::InvalidVideoTrack {
                reason: other.to_string(),
            },
        })
    }

    /// Both checks apply: protected content and preset compatibility
    fn check(&self, path: &Path, metadata: &AssetMetadata) -> Result<()> {
        if metadata.video_track().is_none() {
            return Err(TrimError::InvalidVideoTrack {
                reason: format!("{} has no video track", path.display()),
            });
        }

        if metadata.duration.value <= 0 {
            return Err(TrimError::InvalidVideoTrack {
                reason: format!("{} has no playable duration", path.display()),
            });
        }

        if metadata.protected {
            warn!("Refusing protected asset {}", path.display());
            return Err(TrimError::UnsupportedFormat {
                reason: "content is DRM protected".to_string(),
            });
        }

        if !self.backend.supports_export(metadata, self.preset) {
            return Err(TrimError::UnsupportedFormat {
                reason: format!("{} cannot export this asset with the {:?} preset", self.backend.name(), self.preset),
            });
        }

        Ok(())
    }
}
