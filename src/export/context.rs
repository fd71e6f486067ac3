//! The render context: a dedicated thread that owns every backend render
//! call. The export pipeline hops onto it once per job and awaits the result
//! back on the async side.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::error::{Result, TrimError};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct RenderContext {
    name: String,
    sender: Mutex<mpsc::Sender<Job>>,
}

impl RenderContext {
    /// Start the render thread
    pub fn spawn<S: Into<String>>(name: S) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();

        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })
            .map_err(|e| TrimError::ExportSessionFailed {
                reason: format!("could not start render context: {}", e),
            })?;

        debug!("Render context '{}' started", name);
        Ok(Self {
            name,
            sender: Mutex::new(sender),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `work` on the render thread and await its result.
    ///
    /// A panic inside `work` is contained on the render thread and surfaces
    /// as [`TrimError::Unknown`].
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let context = self.name.clone();

        let job: Job = Box::new(move || {
            match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(value) => {
                    let _ = reply.send(value);
                }
                Err(_) => error!("Render job panicked on '{}'", context),
            }
        });

        self.sender
            .lock()
            .map_err(|_| TrimError::unknown("render context lock poisoned"))?
            .send(job)
            .map_err(|_| TrimError::ExportSessionFailed {
                reason: format!("render context '{}' has shut down", self.name),
            })?;

        result
            .await
            .map_err(|_| TrimError::unknown(format!("render job on '{}' did not complete", self.name)))
    }
}
