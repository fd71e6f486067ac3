//! # Video-Trimmer
//!
//! Cut a time range out of a single video, keep or drop its audio, and get
//! a file that plays right side up. Grab upright JPEG stills from the same
//! asset on demand.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use video_trimmer::{Config, TrimEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut engine = TrimEngine::new(Config::default())?;
//! engine.load_video("holiday.mov").await?;
//!
//! // First three seconds, with audio
//! let clip = engine.trim_video(0, 3000, true).await?;
//!
//! // A 320x180 still at 1.5s
//! let still = engine.generate_thumbnail(1500, Some(320), Some(180), 80).await?;
//!
//! println!("{} {}", clip.display(), still.display());
//! engine.clear_cache();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`engine`] - The [`TrimEngine`] facade holding the loaded asset
//! - [`video`] - Loading, orientation, trim validation and thumbnails
//! - [`composition`] - Derived timeline and render instruction
//! - [`export`] - Cancellable export jobs and the render context
//! - [`backend`] - The [`RenderBackend`](backend::RenderBackend) trait and the ffmpeg backend
//! - [`cache`] - Artifact naming and pruning
//! - [`config`] - Configuration management
//!
//! ## Cancelling an export
//!
//! ```rust,no_run
//! use video_trimmer::{Config, TrimEngine, TrimError};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut engine = TrimEngine::new(Config::default())?;
//! engine.load_video("holiday.mov").await?;
//!
//! let task = engine.start_trim(0, 60_000, false)?;
//! task.cancel();
//! assert!(matches!(task.wait().await, Err(TrimError::ExportCancelled)));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod composition;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod logging;
pub mod video;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    engine::TrimEngine,
    error::{Result, TrimError},
    export::{ExportState, ExportTask},
};
