use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::{
    backend::{FfmpegBackend, RenderBackend},
    cache::{ArtifactNamer, CacheManager},
    composition::Composition,
    config::Config,
    error::{Result, TrimError},
    export::{CancelToken, ExportPipeline, ExportSlot, ExportTask, RenderContext},
    video::{trim, AssetLoader, LoadedAsset, Size, ThumbnailExtractor, ThumbnailRequest},
};

/// Single-asset trim and export engine
///
/// The engine holds at most one loaded asset and runs at most one export at
/// a time:
/// 1. `load_video` - open and validate a source file
/// 2. `trim_video` / `start_trim` - validate a range and export it
/// 3. `generate_thumbnail` - grab an upright still from the asset
/// 4. `clear_cache` - prune everything the engine has written
pub struct TrimEngine {
    config: Config,
    loader: AssetLoader,
    pipeline: ExportPipeline,
    thumbnails: ThumbnailExtractor,
    cache: CacheManager,
    asset: Option<Arc<LoadedAsset>>,
    active_export: Arc<Mutex<Option<CancelToken>>>,
}

impl TrimEngine {
    /// Create an engine that renders through the `ffmpeg` executables
    pub fn new(config: Config) -> Result<Self> {
        let backend = Arc::new(FfmpegBackend::new(config.export.clone()));
        if !backend.is_available() {
            warn!("{} backend is not available on this system", backend.name());
        }
        Self::with_backend(config, backend)
    }

    /// Create an engine around an explicit render backend
    pub fn with_backend(config: Config, backend: Arc<dyn RenderBackend>) -> Result<Self> {
        config.validate()?;

        let context = Arc::new(RenderContext::spawn("render-context")?);
        let output = &config.output;

        let timeout = config.export.probe_timeout();
        let loader = AssetLoader::new(Arc::clone(&backend), config.export.preset, timeout);
        let pipeline = ExportPipeline::new(
            Arc::clone(&backend),
            context,
            ArtifactNamer::new(output.prefix.clone()),
            output.video_extension.clone(),
            config.export.preset,
        );
        let thumbnails = ThumbnailExtractor::new(
            Arc::clone(&backend),
            ArtifactNamer::new(output.prefix.clone()),
            output.image_extension.clone(),
            config.thumbnail.filter.into(),
            timeout,
        );
        let cache = CacheManager::from_config(output);

        debug!(
            "Engine ready: backend={}, output={}",
            backend.name(),
            output.directory.display()
        );

        Ok(Self {
            config,
            loader,
            pipeline,
            thumbnails,
            cache,
            asset: None,
            active_export: Arc::new(Mutex::new(None)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn output_dir(&self) -> &Path {
        &self.config.output.directory
    }

    /// Load `path`, replacing any previously loaded asset.
    ///
    /// On failure the engine is left with no asset loaded. Exports already
    /// running keep their own reference to the old asset.
    pub async fn load_video<P: AsRef<Path>>(&mut self, path: P) -> Result<Arc<LoadedAsset>> {
        match self.loader.load(path).await {
            Ok(asset) => {
                let asset = Arc::new(asset);
                self.asset = Some(Arc::clone(&asset));
                Ok(asset)
            }
            Err(e) => {
                self.asset = None;
                warn!("Load failed: {}", e);
                Err(e)
            }
        }
    }

    /// Drop the loaded asset, if any
    pub fn release(&mut self) {
        if self.asset.take().is_some() {
            debug!("Released loaded asset");
        }
    }

    pub fn loaded_asset(&self) -> Option<&LoadedAsset> {
        self.asset.as_deref()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.asset.as_ref().map(|a| a.duration_ms())
    }

    fn require_asset(&self) -> Result<Arc<LoadedAsset>> {
        self.asset.clone().ok_or(TrimError::NoVideoLoaded)
    }

    /// Validate `[start_ms, end_ms)` and start exporting it in the background.
    ///
    /// Fails with `Busy` while another export holds the engine.
    pub fn start_trim(&self, start_ms: i64, end_ms: i64, include_audio: bool) -> Result<ExportTask> {
        let asset = self.require_asset()?;
        let range = trim::validate(start_ms, end_ms, asset.duration_ms())?;
        let composition = Composition::build(&asset, include_audio)?;

        let cancel = CancelToken::new();
        let slot = ExportSlot::claim(&self.active_export, &cancel)?;

        info!(
            "Trimming {} to {}ms-{}ms (audio: {})",
            asset.path().display(),
            range.start_ms,
            range.end_ms,
            composition.has_audio()
        );

        Ok(self.pipeline.spawn(
            composition,
            range,
            self.output_dir().to_path_buf(),
            cancel,
            Some(slot),
        ))
    }

    /// Export `[start_ms, end_ms)` of the loaded asset and wait for the file
    pub async fn trim_video(&self, start_ms: i64, end_ms: i64, include_audio: bool) -> Result<PathBuf> {
        self.start_trim(start_ms, end_ms, include_audio)?.wait().await
    }

    /// Cancel the in-flight export. Returns false if nothing was running.
    pub fn cancel_export(&self) -> bool {
        let active = match self.active_export.lock() {
            Ok(active) => active,
            Err(_) => return false,
        };
        match active.as_ref() {
            Some(token) => {
                info!("Cancelling active export");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_exporting(&self) -> bool {
        self.active_export
            .lock()
            .map(|active| active.is_some())
            .unwrap_or(false)
    }

    /// Grab an upright JPEG still at `position_ms`.
    ///
    /// The frame is rescaled to exactly `width` x `height` only when both are
    /// given. `quality` is clamped to 100.
    pub async fn generate_thumbnail(
        &self,
        position_ms: i64,
        width: Option<u32>,
        height: Option<u32>,
        quality: u8,
    ) -> Result<PathBuf> {
        let asset = self.require_asset()?;
        let target_size = match (width, height) {
            (Some(width), Some(height)) => Some(Size::new(width, height)),
            _ => None,
        };

        let request = ThumbnailRequest {
            position_ms,
            target_size,
            quality: quality.min(100),
        };
        self.thumbnails.extract(asset, request, self.output_dir()).await
    }

    /// Delete every artifact the engine has written to its output directory
    pub fn clear_cache(&self) -> usize {
        self.cache.clear(&[self.output_dir()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportState;
    use crate::testing::{ExportBehavior, ScriptedBackend};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        engine: TrimEngine,
        backend: Arc<ScriptedBackend>,
        source: PathBuf,
        output: TempDir,
        _source_dir: TempDir,
    }

    fn fixture(behavior: ExportBehavior) -> Fixture {
        let output = tempdir().unwrap();
        let source_dir = tempdir().unwrap();
        let source = source_dir.path().join("holiday.mov");
        std::fs::write(&source, b"source bytes").unwrap();

        let mut config = Config::default();
        config.output.directory = output.path().to_path_buf();

        let backend = Arc::new(ScriptedBackend::new(behavior));
        let engine = TrimEngine::with_backend(config, backend.clone()).unwrap();

        Fixture {
            engine,
            backend,
            source,
            output,
            _source_dir: source_dir,
        }
    }

    fn output_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_trim_first_three_seconds() {
        let mut fx = fixture(ExportBehavior::Succeed);
        fx.engine.load_video(&fx.source).await.unwrap();

        let path = fx.engine.trim_video(0, 3000, true).await.unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("vtrim_") && name.ends_with(".mp4"));
        assert!(path.starts_with(fx.output.path()));
        assert!(path.exists());
        assert!(!fx.engine.is_exporting());

        let session = fx.backend.last_session().unwrap();
        assert_eq!(session.range.duration_ms(), 3000);
        assert!(session.composition.has_audio());
    }

    #[tokio::test]
    async fn test_full_range_keeps_duration() {
        let mut fx = fixture(ExportBehavior::Succeed);
        fx.engine.load_video(&fx.source).await.unwrap();
        let duration = fx.engine.duration_ms().unwrap();

        fx.engine.trim_video(0, duration, false).await.unwrap();

        let session = fx.backend.last_session().unwrap();
        assert_eq!(session.range.duration_ms(), duration);
        assert_eq!(session.composition.duration().as_millis(), duration);
        assert!(!session.composition.has_audio());
    }

    #[tokio::test]
    async fn test_reversed_range_is_rejected_before_export() {
        let mut fx = fixture(ExportBehavior::Succeed);
        fx.engine.load_video(&fx.source).await.unwrap();

        let err = fx.engine.trim_video(5000, 3000, true).await.unwrap_err();

        assert!(matches!(err, TrimError::InvalidTimeRange { .. }));
        assert_eq!(fx.backend.export_calls(), 0);
        assert_eq!(output_files(&fx.output), 0);
    }

    #[tokio::test]
    async fn test_operations_need_a_loaded_asset() {
        let fx = fixture(ExportBehavior::Succeed);

        let err = fx.engine.generate_thumbnail(1500, None, None, 80).await.unwrap_err();
        assert!(matches!(err, TrimError::NoVideoLoaded));

        let err = fx.engine.trim_video(0, 1000, true).await.unwrap_err();
        assert!(matches!(err, TrimError::NoVideoLoaded));
        assert_eq!(fx.engine.duration_ms(), None);
    }

    #[tokio::test]
    async fn test_failed_load_clears_previous_asset() {
        let mut fx = fixture(ExportBehavior::Succeed);
        fx.engine.load_video(&fx.source).await.unwrap();
        assert!(fx.engine.loaded_asset().is_some());

        let err = fx
            .engine
            .load_video(fx.source.with_file_name("missing.mov"))
            .await
            .unwrap_err();

        assert!(matches!(err, TrimError::FileNotFound { .. }));
        assert!(fx.engine.loaded_asset().is_none());
    }

    #[tokio::test]
    async fn test_release_drops_asset() {
        let mut fx = fixture(ExportBehavior::Succeed);
        fx.engine.load_video(&fx.source).await.unwrap();
        fx.engine.release();
        assert!(fx.engine.loaded_asset().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_export_leaves_nothing_behind() {
        let mut fx = fixture(ExportBehavior::WaitForCancel);
        fx.engine.load_video(&fx.source).await.unwrap();

        let task = fx.engine.start_trim(0, 3000, true).unwrap();
        fx.backend.wait_until_partial_written().await;
        assert_eq!(output_files(&fx.output), 1);

        assert!(fx.engine.cancel_export());
        let states = task.subscribe_state();
        let err = tokio::time::timeout(Duration::from_secs(5), task.wait())
            .await
            .unwrap()
            .unwrap_err();

        assert!(matches!(err, TrimError::ExportCancelled));
        assert_eq!(*states.borrow(), ExportState::Cancelled);
        assert_eq!(output_files(&fx.output), 0);
        assert!(!fx.engine.is_exporting());
        assert!(!fx.engine.cancel_export());
    }

    #[tokio::test]
    async fn test_second_export_is_busy() {
        let mut fx = fixture(ExportBehavior::WaitForCancel);
        fx.engine.load_video(&fx.source).await.unwrap();

        let first = fx.engine.start_trim(0, 3000, true).unwrap();
        let err = fx.engine.start_trim(0, 1000, true).unwrap_err();
        assert!(matches!(err, TrimError::Busy));

        first.cancel();
        let _ = first.wait().await;
        assert!(!fx.engine.is_exporting());
    }

    #[tokio::test]
    async fn test_thumbnail_lands_in_output_dir() {
        let mut fx = fixture(ExportBehavior::Succeed);
        fx.engine.load_video(&fx.source).await.unwrap();

        let path = fx
            .engine
            .generate_thumbnail(1500, Some(64), Some(36), 250)
            .await
            .unwrap();

        assert!(path.starts_with(fx.output.path()));
        assert_eq!(path.extension().unwrap(), "jpg");
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 36));
    }

    #[tokio::test]
    async fn test_clear_cache_is_idempotent() {
        let mut fx = fixture(ExportBehavior::Succeed);
        fx.engine.load_video(&fx.source).await.unwrap();
        fx.engine.trim_video(0, 1000, true).await.unwrap();
        fx.engine.generate_thumbnail(0, None, None, 80).await.unwrap();
        std::fs::write(fx.output.path().join("keep.mp4"), b"user file").unwrap();

        assert_eq!(fx.engine.clear_cache(), 2);
        assert_eq!(fx.engine.clear_cache(), 0);
        assert_eq!(output_files(&fx.output), 1);
    }
}
