//! # Composition Module
//!
//! Builds the derived timeline that the render backend consumes: the source
//! video track, an optional audio track and the orientation instruction.

pub mod builder;

pub use builder::{Composition, RenderInstruction, TrackSegment};
