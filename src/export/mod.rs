//! # Export Module
//!
//! Asynchronous, cancellable rendering of a trimmed composition.
//!
//! A job moves `Idle → Preparing → Composing → Exporting` and ends in exactly
//! one of `Completed`, `Failed` or `Cancelled`. Failed and cancelled jobs never
//! leave a partial file behind.

pub mod context;
pub mod control;
pub mod pipeline;

pub use context::RenderContext;
pub use control::{CancelToken, ProgressReporter};
pub use pipeline::{ExportPipeline, ExportSlot, ExportState, ExportTask};
