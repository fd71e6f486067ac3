//! # Video Module
//!
//! Asset loading, orientation, trim validation and still-frame extraction.

pub mod loader;
pub mod orientation;
pub mod thumbnail;
pub mod trim;
pub mod types;

pub use loader::AssetLoader;
pub use orientation::{OrientationFix, Rotation};
pub use thumbnail::{ThumbnailExtractor, ThumbnailRequest};
pub use types::{
    AffineTransform, AssetMetadata, Frame, LoadedAsset, MediaTime, Size, TimeRange, Track,
    TrackKind,
};
