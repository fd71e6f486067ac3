use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::video::orientation::Rotation;

/// Timescale used when converting milliseconds to backend time values
pub const PREFERRED_TIMESCALE: i32 = 600;

/// A single decoded video frame
///
/// Thin wrapper around an RGB image buffer with the handful of operations the
/// thumbnail path needs.
#[derive(Clone, Debug)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_fn(width, height, |_, _| Rgb(color));
        Self { buffer }
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Turn the frame upright for the given display rotation
    pub fn oriented(self, rotation: Rotation) -> Self {
        let buffer = match rotation {
            Rotation::None => self.buffer,
            Rotation::Clockwise90 => imageops::rotate90(&self.buffer),
            Rotation::CounterClockwise90 => imageops::rotate270(&self.buffer),
            Rotation::UpsideDown => imageops::rotate180(&self.buffer),
        };
        Self { buffer }
    }

    /// Rescale to exactly `size`; aspect ratio is the caller's concern
    pub fn resized(&self, size: Size, filter: FilterType) -> Self {
        if self.size() == size {
            return self.clone();
        }
        Self::new(imageops::resize(&self.buffer, size.width, size.height, filter))
    }

    /// Encode as JPEG at `quality` (1-100)
    pub fn write_jpeg<P: AsRef<Path>>(&self, path: P, quality: u8) -> std::result::Result<(), image::ImageError> {
        let file = File::create(path).map_err(image::ImageError::IoError)?;
        let mut writer = BufWriter::new(file);
        let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
        encoder.encode(
            self.buffer.as_raw(),
            self.width(),
            self.height(),
            ColorType::Rgb8,
        )
    }
}

/// Pixel dimensions of a frame or render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Same size with the axes swapped (quarter-turn rotation)
    pub fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 2D affine transform in row-vector form.
///
/// A point `(x, y)` maps to `(a*x + c*y + tx, b*x + d*y + ty)`. Coordinates
/// are y-down, so a positive angle turns the picture clockwise on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl AffineTransform {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Pure rotation by `degrees` around the origin
    pub fn rotation_degrees(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Rotation angle of the linear part in radians, `atan2(b, a)`
    pub fn angle(&self) -> f64 {
        self.b.atan2(self.a)
    }

    /// Copy of this transform with the translation replaced
    pub fn with_translation(self, tx: f64, ty: f64) -> Self {
        Self { tx, ty, ..self }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Time value in backend-native units (`value / timescale` seconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: i32,
}

impl MediaTime {
    pub const ZERO: Self = Self {
        value: 0,
        timescale: PREFERRED_TIMESCALE,
    };

    /// Nearest tick at the preferred timescale
    pub fn from_millis(ms: i64) -> Self {
        Self {
            value: (ms * PREFERRED_TIMESCALE as i64 * 2 + 1000).div_euclid(2000),
            timescale: PREFERRED_TIMESCALE,
        }
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self {
            value: (secs * PREFERRED_TIMESCALE as f64).round() as i64,
            timescale: PREFERRED_TIMESCALE,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.value as f64 / self.timescale as f64
    }

    pub fn as_millis(&self) -> i64 {
        if self.timescale == 0 {
            return 0;
        }
        self.value * 1000 / self.timescale as i64
    }
}

/// Kind of an elementary stream inside a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

/// A single track of the source container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub kind: TrackKind,

    /// Stream index inside the container
    pub index: u32,

    /// Codec short name as reported by the backend (e.g. "h264")
    pub codec: String,
}

/// Everything a backend probe resolves about a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub tracks: Vec<Track>,
    pub duration: MediaTime,
    pub natural_size: Size,
    pub preferred_transform: AffineTransform,
    pub protected: bool,
}

impl AssetMetadata {
    pub fn video_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    pub fn audio_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Audio)
    }
}

/// A source video whose metadata has been resolved and validated
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAsset {
    path: PathBuf,
    metadata: AssetMetadata,
}

impl LoadedAsset {
    pub fn new<P: Into<PathBuf>>(path: P, metadata: AssetMetadata) -> Self {
        Self {
            path: path.into(),
            metadata,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &AssetMetadata {
        &self.metadata
    }

    pub fn video_track(&self) -> Option<&Track> {
        self.metadata.video_track()
    }

    pub fn audio_track(&self) -> Option<&Track> {
        self.metadata.audio_track()
    }

    pub fn duration(&self) -> MediaTime {
        self.metadata.duration
    }

    pub fn duration_ms(&self) -> i64 {
        self.metadata.duration.as_millis()
    }

    pub fn natural_size(&self) -> Size {
        self.metadata.natural_size
    }

    pub fn preferred_transform(&self) -> AffineTransform {
        self.metadata.preferred_transform
    }

    pub fn is_protected(&self) -> bool {
        self.metadata.protected
    }
}

/// Validated trim window in milliseconds, `0 <= start_ms < end_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeRange {
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Window start in seconds, exact to the millisecond
    pub fn start_secs(&self) -> f64 {
        self.start_ms as f64 / 1000.0
    }

    /// Window length in seconds, exact to the millisecond
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms() as f64 / 1000.0
    }
}
