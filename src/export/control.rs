use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Shared cancellation flag for one export job.
///
/// Cloning hands out another handle to the same flag. Backends poll
/// [`CancelToken::is_cancelled`] while they work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Write side of an export's progress channel (fraction in `0.0..=1.0`)
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: Arc<watch::Sender<f32>>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, watch::Receiver<f32>) {
        let (sender, receiver) = watch::channel(0.0);
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    pub fn report(&self, fraction: f32) {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        self.sender.send_replace(fraction);
    }
}
