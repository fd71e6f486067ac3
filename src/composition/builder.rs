use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TrimError};
use crate::video::orientation::{self, Rotation};
use crate::video::types::{AffineTransform, LoadedAsset, MediaTime, Size, TimeRange, Track};

/// A source track placed on the composition timeline
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSegment {
    pub track: Track,

    /// Where the segment starts inside the source track
    pub source_start: MediaTime,

    /// Length of the segment
    pub duration: MediaTime,

    /// Where the segment starts on the composition timeline
    pub insert_at: MediaTime,
}

impl TrackSegment {
    fn full_length(track: &Track, duration: MediaTime) -> Self {
        Self {
            track: track.clone(),
            source_start: MediaTime::ZERO,
            duration,
            insert_at: MediaTime::ZERO,
        }
    }
}

/// Layer instruction telling the backend how to draw the video track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderInstruction {
    pub render_size: Size,
    pub transform: AffineTransform,
    pub rotation: Rotation,

    /// Window in which the transform applies
    pub time_range: TimeRange,
}

/// Derived timeline built from a loaded asset, used as render input
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    source: PathBuf,
    duration: MediaTime,
    video: TrackSegment,
    audio: Option<TrackSegment>,
    instruction: RenderInstruction,
}

impl Composition {
    /// Assemble a composition spanning the whole asset.
    ///
    /// The audio segment is present only when `include_audio` is set and the
    /// asset has an audio track; a missing audio track is not an error.
    pub fn build(asset: &LoadedAsset, include_audio: bool) -> Result<Self> {
        let video_track = asset
            .video_track()
            .ok_or_else(|| TrimError::InvalidVideoTrack {
                reason: format!("{} has no video track", asset.path().display()),
            })?;

        let duration = asset.duration();
        let video = TrackSegment::full_length(video_track, duration);

        let audio = if include_audio {
            asset
                .audio_track()
                .map(|track| TrackSegment::full_length(track, duration))
        } else {
            None
        };

        if include_audio && audio.is_none() {
            debug!("Audio requested but {} has no audio track", asset.path().display());
        }

        let fix = orientation::resolve(asset.natural_size(), asset.preferred_transform());
        debug!(
            "Render instruction: {}x{} rotated {} degrees",
            fix.render_size.width,
            fix.render_size.height,
            fix.rotation.degrees()
        );

        Ok(Self {
            source: asset.path().to_path_buf(),
            duration,
            video,
            audio,
            instruction: RenderInstruction {
                render_size: fix.render_size,
                transform: fix.transform,
                rotation: fix.rotation,
                time_range: TimeRange {
                    start_ms: 0,
                    end_ms: duration.as_millis(),
                },
            },
        })
    }

    /// Restrict the render instruction to the accepted trim window
    pub fn narrow_to(&mut self, range: TimeRange) {
        self.instruction.time_range = range;
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn duration(&self) -> MediaTime {
        self.duration
    }

    pub fn video(&self) -> &TrackSegment {
        &self.video
    }

    pub fn audio(&self) -> Option<&TrackSegment> {
        self.audio.as_ref()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn instruction(&self) -> &RenderInstruction {
        &self.instruction
    }
}
