use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{ExportPreset, ExportSession, RenderBackend};
use crate::cache::ArtifactNamer;
use crate::composition::Composition;
use crate::error::{Result, TrimError};
use crate::export::context::RenderContext;
use crate::export::control::{CancelToken, ProgressReporter};
use crate::video::types::TimeRange;

/// Lifecycle of one export job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Preparing,
    Composing,
    Exporting,
    Completed,
    Failed,
    Cancelled,
}

impl ExportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Mutable state of one export invocation
struct ExportJob {
    output_path: Option<PathBuf>,
    state: watch::Sender<ExportState>,
    cancel: CancelToken,
    progress: ProgressReporter,
}

impl ExportJob {
    fn transition(&self, next: ExportState) {
        debug!("Export state -> {:?}", next);
        self.state.send_replace(next);
    }

    /// Remove whatever the backend left at the output path
    async fn discard_output(&self) {
        let Some(path) = &self.output_path else {
            return;
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed partial output {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial output {}: {}", path.display(), e),
        }
    }

    async fn cancelled(&self) -> TrimError {
        self.discard_output().await;
        self.transition(ExportState::Cancelled);
        info!("Export cancelled");
        TrimError::ExportCancelled
    }

    async fn failed(&self, error: TrimError) -> TrimError {
        self.discard_output().await;
        self.transition(ExportState::Failed);
        warn!("Export failed: {}", error);
        error
    }
}

/// Claim on the engine's single export slot, released on drop
pub struct ExportSlot {
    active: Arc<Mutex<Option<CancelToken>>>,
}

impl ExportSlot {
    /// Take the slot for `cancel`, or fail with `Busy` if a job holds it
    pub fn claim(active: &Arc<Mutex<Option<CancelToken>>>, cancel: &CancelToken) -> Result<Self> {
        let mut current = active
            .lock()
            .map_err(|_| TrimError::unknown("export slot lock poisoned"))?;
        if current.is_some() {
            return Err(TrimError::Busy);
        }
        *current = Some(cancel.clone());
        Ok(Self {
            active: Arc::clone(active),
        })
    }
}

impl Drop for ExportSlot {
    fn drop(&mut self) {
        if let Ok(mut current) = self.active.lock() {
            *current = None;
        }
    }
}

/// Handle to a running export
#[derive(Debug)]
pub struct ExportTask {
    handle: JoinHandle<Result<PathBuf>>,
    cancel: CancelToken,
    state: watch::Receiver<ExportState>,
    progress: watch::Receiver<f32>,
}

impl ExportTask {
    /// Ask the job to stop; it resolves as `ExportCancelled` once cleaned up
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> ExportState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<ExportState> {
        self.state.clone()
    }

    pub fn progress(&self) -> f32 {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<f32> {
        self.progress.clone()
    }

    /// Wait for the terminal outcome
    pub async fn wait(self) -> Result<PathBuf> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TrimError::ExportCancelled),
            Err(e) => Err(TrimError::unknown(format!("export task failed: {}", e))),
        }
    }
}

/// Drives the render backend for trim exports
#[derive(Clone)]
pub struct ExportPipeline {
    backend: Arc<dyn RenderBackend>,
    context: Arc<RenderContext>,
    namer: ArtifactNamer,
    extension: String,
    preset: ExportPreset,
}

impl ExportPipeline {
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        context: Arc<RenderContext>,
        namer: ArtifactNamer,
        extension: impl Into<String>,
        preset: ExportPreset,
    ) -> Self {
        Self {
            backend,
            context,
            namer,
            extension: extension.into(),
            preset,
        }
    }

    /// Export `range` of `composition` into `output_dir` and wait for it
    pub async fn export(
        &self,
        composition: Composition,
        range: TimeRange,
        output_dir: &Path,
        cancel: CancelToken,
    ) -> Result<PathBuf> {
        let (state, _) = watch::channel(ExportState::Idle);
        let (progress, _) = ProgressReporter::channel();
        let mut job = ExportJob {
            output_path: None,
            state,
            cancel,
            progress,
        };
        self.run(&mut job, composition, range, output_dir).await
    }

    /// Start the export on the runtime and return a handle to it.
    ///
    /// `slot` is held until the job reaches a terminal state.
    pub fn spawn(
        &self,
        composition: Composition,
        range: TimeRange,
        output_dir: PathBuf,
        cancel: CancelToken,
        slot: Option<ExportSlot>,
    ) -> ExportTask {
        let (state_tx, state_rx) = watch::channel(ExportState::Idle);
        let (progress, progress_rx) = ProgressReporter::channel();
        let mut job = ExportJob {
            output_path: None,
            state: state_tx,
            cancel: cancel.clone(),
            progress,
        };

        let pipeline = self.clone();
        let handle = tokio::spawn(async move {
            let _slot = slot;
            pipeline.run(&mut job, composition, range, &output_dir).await
        });

        ExportTask {
            handle,
            cancel,
            state: state_rx,
            progress: progress_rx,
        }
    }

    async fn run(
        &self,
        job: &mut ExportJob,
        mut composition: Composition,
        range: TimeRange,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        // Preparing: claim a fresh name in our namespace
        job.transition(ExportState::Preparing);
        if job.cancel.is_cancelled() {
            return Err(job.cancelled().await);
        }

        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            return Err(job.failed(TrimError::ExportSessionFailed {
                reason: format!("cannot create {}: {}", output_dir.display(), e),
            }).await);
        }

        let output_path = self.namer.next_path(output_dir, &self.extension);
        if tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            debug!("Replacing stale artifact {}", output_path.display());
            if let Err(e) = tokio::fs::remove_file(&output_path).await {
                return Err(job.failed(TrimError::ExportSessionFailed {
                    reason: format!("cannot replace {}: {}", output_path.display(), e),
                }).await);
            }
        }
        job.output_path = Some(output_path.clone());

        // Composing: the transform only applies inside the trim window
        job.transition(ExportState::Composing);
        composition.narrow_to(range);
        if job.cancel.is_cancelled() {
            return Err(job.cancelled().await);
        }

        // Exporting: single hop onto the render context
        job.transition(ExportState::Exporting);
        info!(
            "Exporting {}ms-{}ms of {} to {} via {}",
            range.start_ms,
            range.end_ms,
            composition.source().display(),
            output_path.display(),
            self.backend.name()
        );

        let session = ExportSession {
            composition,
            range,
            output_path: output_path.clone(),
            preset: self.preset,
        };
        let backend = Arc::clone(&self.backend);
        let cancel = job.cancel.clone();
        let progress = job.progress.clone();

        let outcome = self
            .context
            .run(move || backend.export(&session, &cancel, &progress))
            .await
            .and_then(|result| result);

        match outcome {
            Ok(()) => {
                let size = tokio::fs::metadata(&output_path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                if size == 0 {
                    return Err(job.failed(TrimError::export_failed(
                        "backend reported success but wrote no output",
                    )).await);
                }

                job.progress.report(1.0);
                job.transition(ExportState::Completed);
                info!("Export complete: {} ({} bytes)", output_path.display(), size);
                Ok(output_path)
            }
            Err(TrimError::ExportCancelled) => Err(job.cancelled().await),
            Err(_) if job.cancel.is_cancelled() => Err(job.cancelled().await),
            Err(e) => Err(job.failed(e).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_asset, ExportBehavior, ScriptedBackend};
    use std::time::Duration;
    use tempfile::tempdir;

    fn pipeline(backend: Arc<ScriptedBackend>) -> ExportPipeline {
        ExportPipeline::new(
            backend,
            Arc::new(RenderContext::spawn("render-pipeline-test").unwrap()),
            ArtifactNamer::new("vtrim"),
            "mp4",
            ExportPreset::Highest,
        )
    }

    fn composition() -> Composition {
        Composition::build(&sample_asset(10_000), true).unwrap()
    }

    fn range(start_ms: i64, end_ms: i64) -> TimeRange {
        TimeRange { start_ms, end_ms }
    }

    async fn wait_for_state(task: &ExportTask, wanted: ExportState) {
        let mut states = task.subscribe_state();
        tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| *s == wanted))
            .await
            .expect("state reached in time")
            .expect("state channel open");
    }

    #[tokio::test]
    async fn test_successful_export_writes_named_file() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new(ExportBehavior::Succeed));
        let path = pipeline(backend.clone())
            .export(composition(), range(0, 3000), dir.path(), CancelToken::new())
            .await
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("vtrim_"));
        assert!(name.ends_with(".mp4"));
        assert!(std::fs::metadata(&path).unwrap().len() > 0);

        let session = backend.last_session().unwrap();
        assert_eq!(session.range, range(0, 3000));
        assert_eq!(session.composition.instruction().time_range, range(0, 3000));
    }

    #[tokio::test]
    async fn test_missing_output_dir_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let backend = Arc::new(ScriptedBackend::new(ExportBehavior::Succeed));
        let path = pipeline(backend)
            .export(composition(), range(0, 1000), &nested, CancelToken::new())
            .await
            .unwrap();
        assert!(path.starts_with(&nested));
    }

    #[tokio::test]
    async fn test_backend_failure_is_surfaced_and_cleaned() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new(ExportBehavior::Fail("encoder exploded".into())));
        let err = pipeline(backend)
            .export(composition(), range(0, 1000), dir.path(), CancelToken::new())
            .await
            .unwrap_err();

        match err {
            TrimError::ExportFailed { reason } => assert!(reason.contains("encoder exploded")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_output_is_a_failure() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new(ExportBehavior::WriteNothing));
        let err = pipeline(backend)
            .export(composition(), range(0, 1000), dir.path(), CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TrimError::ExportFailed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_before_start_never_reaches_backend() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new(ExportBehavior::Succeed));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = pipeline(backend.clone())
            .export(composition(), range(0, 1000), dir.path(), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, TrimError::ExportCancelled));
        assert_eq!(backend.export_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_export_removes_partial_file() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new(ExportBehavior::WaitForCancel));
        let task = pipeline(backend.clone()).spawn(
            composition(),
            range(0, 3000),
            dir.path().to_path_buf(),
            CancelToken::new(),
            None,
        );

        wait_for_state(&task, ExportState::Exporting).await;
        backend.wait_until_partial_written().await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        task.cancel();
        let states = task.subscribe_state();
        let err = task.wait().await.unwrap_err();

        assert!(matches!(err, TrimError::ExportCancelled));
        assert_eq!(*states.borrow(), ExportState::Cancelled);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_spawned_task_reports_completion() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new(ExportBehavior::Succeed));
        let task = pipeline(backend).spawn(
            composition(),
            range(0, 10_000),
            dir.path().to_path_buf(),
            CancelToken::new(),
            None,
        );
        let states = task.subscribe_state();
        let progress = task.subscribe_progress();

        let path = task.wait().await.unwrap();
        assert!(path.exists());
        assert_eq!(*states.borrow(), ExportState::Completed);
        assert_eq!(*progress.borrow(), 1.0);
    }

    #[test]
    fn test_slot_is_exclusive_and_released() {
        let active = Arc::new(Mutex::new(None));
        let first = ExportSlot::claim(&active, &CancelToken::new()).unwrap();
        assert!(matches!(
            ExportSlot::claim(&active, &CancelToken::new()),
            Err(TrimError::Busy)
        ));
        drop(first);
        assert!(ExportSlot::claim(&active, &CancelToken::new()).is_ok());
    }
}
