//! Fixtures and a scripted render backend for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::backend::{ExportPreset, ExportSession, RenderBackend};
use crate::error::{Result, TrimError};
use crate::export::{CancelToken, ProgressReporter};
use crate::video::types::{
    AffineTransform, AssetMetadata, Frame, LoadedAsset, MediaTime, Size, Track, TrackKind,
};

pub(crate) fn sample_metadata(duration_ms: i64) -> AssetMetadata {
    AssetMetadata {
        tracks: vec![
            Track {
                kind: TrackKind::Video,
                index: 0,
                codec: "h264".to_string(),
            },
            Track {
                kind: TrackKind::Audio,
                index: 1,
                codec: "aac".to_string(),
            },
        ],
        duration: MediaTime::from_millis(duration_ms),
        natural_size: Size::new(1920, 1080),
        preferred_transform: AffineTransform::IDENTITY,
        protected: false,
    }
}

pub(crate) fn sample_asset(duration_ms: i64) -> LoadedAsset {
    LoadedAsset::new("clip.mp4", sample_metadata(duration_ms))
}

#[derive(Debug, Clone)]
pub(crate) enum ExportBehavior {
    /// Write a small file and succeed
    Succeed,
    /// Write a partial file, then fail with this message
    Fail(String),
    /// Write a partial file and block until cancelled
    WaitForCancel,
    /// Report success without writing anything
    WriteNothing,
}

pub(crate) struct ScriptedBackend {
    behavior: ExportBehavior,
    metadata: Mutex<Option<AssetMetadata>>,
    frame: Mutex<Option<Frame>>,
    supported: AtomicBool,
    export_calls: AtomicUsize,
    partial_written: AtomicBool,
    last_session: Mutex<Option<ExportSession>>,
    last_frame_request: Mutex<Option<MediaTime>>,
    stall: Option<Duration>,
}

impl ScriptedBackend {
    pub(crate) fn new(behavior: ExportBehavior) -> Self {
        Self {
            behavior,
            metadata: Mutex::new(Some(sample_metadata(10_000))),
            frame: Mutex::new(Some(Frame::new_filled(32, 18, [200, 40, 40]))),
            supported: AtomicBool::new(true),
            export_calls: AtomicUsize::new(0),
            partial_written: AtomicBool::new(false),
            last_session: Mutex::new(None),
            last_frame_request: Mutex::new(None),
            stall: None,
        }
    }

    /// Block every probe and frame grab for `delay` before answering
    pub(crate) fn stalled(mut self, delay: Duration) -> Self {
        self.stall = Some(delay);
        self
    }

    fn maybe_stall(&self) {
        if let Some(delay) = self.stall {
            std::thread::sleep(delay);
        }
    }

    pub(crate) fn with_metadata(self, metadata: Option<AssetMetadata>) -> Self {
        *self.metadata.lock().unwrap() = metadata;
        self
    }

    pub(crate) fn with_frame(self, frame: Option<Frame>) -> Self {
        *self.frame.lock().unwrap() = frame;
        self
    }

    pub(crate) fn unsupported(self) -> Self {
        self.supported.store(false, Ordering::SeqCst);
        self
    }

    pub(crate) fn export_calls(&self) -> usize {
        self.export_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_session(&self) -> Option<ExportSession> {
        self.last_session.lock().unwrap().clone()
    }

    pub(crate) fn last_frame_request(&self) -> Option<MediaTime> {
        *self.last_frame_request.lock().unwrap()
    }

    pub(crate) async fn wait_until_partial_written(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.partial_written.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "backend never started writing");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn write_partial(&self, path: &Path) -> Result<()> {
        std::fs::write(path, b"partial mdat")?;
        self.partial_written.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl RenderBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn probe(&self, path: &Path) -> Result<AssetMetadata> {
        self.maybe_stall();
        self.metadata
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TrimError::InvalidVideoTrack {
                reason: format!("cannot parse {}", path.display()),
            })
    }

    fn supports_export(&self, _metadata: &AssetMetadata, _preset: ExportPreset) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    fn export(
        &self,
        session: &ExportSession,
        cancel: &CancelToken,
        progress: &ProgressReporter,
    ) -> Result<()> {
        self.export_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_session.lock().unwrap() = Some(session.clone());

        match &self.behavior {
            ExportBehavior::Succeed => {
                progress.report(0.5);
                std::fs::write(&session.output_path, b"ftyp isom moov mdat")?;
                Ok(())
            }
            ExportBehavior::Fail(message) => {
                self.write_partial(&session.output_path)?;
                Err(TrimError::export_failed(message.clone()))
            }
            ExportBehavior::WaitForCancel => {
                self.write_partial(&session.output_path)?;
                let deadline = Instant::now() + Duration::from_secs(10);
                while Instant::now() < deadline {
                    if cancel.is_cancelled() {
                        return Err(TrimError::ExportCancelled);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(TrimError::export_failed("test never cancelled the export"))
            }
            ExportBehavior::WriteNothing => Ok(()),
        }
    }

    fn extract_frame(&self, _source: &Path, at: MediaTime) -> Result<Frame> {
        self.maybe_stall();
        *self.last_frame_request.lock().unwrap() = Some(at);
        self.frame
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TrimError::thumbnail_failed("decoder returned no frame"))
    }
}
