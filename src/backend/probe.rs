//! Parsing of `ffprobe -print_format json -show_streams -show_format` output.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TrimError};
use crate::video::types::{AffineTransform, AssetMetadata, MediaTime, Size, Track, TrackKind};

/// Sample-entry tags used by encrypted (DRM) tracks
const PROTECTED_CODEC_TAGS: &[&str] = &["encv", "enca", "drmi", "drms", "drmv", "drma"];

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    codec_tag_string: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
    #[serde(default)]
    disposition: HashMap<String, i64>,
}

#[derive(Debug, Deserialize)]
struct SideData {
    side_data_type: Option<String>,
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl ProbeStream {
    fn is_cover_art(&self) -> bool {
        self.disposition.get("attached_pic").copied().unwrap_or(0) != 0
    }

    fn is_protected(&self) -> bool {
        self.codec_tag_string
            .as_deref()
            .map(|tag| PROTECTED_CODEC_TAGS.contains(&tag))
            .unwrap_or(false)
            || self.tags.keys().any(|k| k.eq_ignore_ascii_case("encryption"))
    }

    /// Display rotation in degrees, positive = clockwise on screen.
    ///
    /// The display matrix side data stores a counter-clockwise angle, the
    /// legacy `rotate` tag a clockwise one.
    fn display_rotation(&self) -> f64 {
        let from_matrix = self
            .side_data_list
            .iter()
            .filter(|sd| sd.side_data_type.as_deref() == Some("Display Matrix"))
            .find_map(|sd| sd.rotation);

        if let Some(ccw) = from_matrix {
            return -ccw;
        }

        self.tags
            .get("rotate")
            .and_then(|r| r.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
}

/// Build a rotation transform, snapping right angles to exact matrices
fn transform_for_degrees(degrees: f64) -> AffineTransform {
    let normalized = degrees.rem_euclid(360.0);
    let snapped = (normalized / 90.0).round() * 90.0;
    if (normalized - snapped).abs() > 1e-6 {
        return AffineTransform::rotation_degrees(normalized);
    }

    let (a, b) = match snapped as i64 % 360 {
        90 => (0.0, 1.0),
        180 => (-1.0, 0.0),
        270 => (0.0, -1.0),
        _ => (1.0, 0.0),
    };
    AffineTransform {
        a,
        b,
        c: -b,
        d: a,
        tx: 0.0,
        ty: 0.0,
    }
}

/// Turn raw ffprobe JSON into asset metadata.
///
/// Validation beyond "is this parseable" (missing video track, protected
/// content) is left to the asset loader.
pub fn parse_probe_output(json: &str) -> Result<AssetMetadata> {
    let output: ProbeOutput = serde_json::from_str(json).map_err(|e| TrimError::InvalidVideoTrack {
        reason: format!("unreadable probe output: {}", e),
    })?;

    let mut tracks = Vec::new();
    let mut protected = false;
    let mut primary_video: Option<&ProbeStream> = None;

    for stream in &output.streams {
        protected |= stream.is_protected();

        let kind = match stream.codec_type.as_deref() {
            Some("video") if !stream.is_cover_art() => TrackKind::Video,
            Some("audio") => TrackKind::Audio,
            _ => continue,
        };

        if kind == TrackKind::Video && primary_video.is_none() {
            primary_video = Some(stream);
        }

        tracks.push(Track {
            kind,
            index: stream.index,
            codec: stream.codec_name.clone().unwrap_or_default(),
        });
    }

    let duration_secs = output
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| primary_video.and_then(|s| parse_seconds(s.duration.as_deref())))
        .ok_or_else(|| TrimError::InvalidVideoTrack {
            reason: "container reports no duration".to_string(),
        })?;

    let (natural_size, preferred_transform) = match primary_video {
        Some(stream) => (
            Size::new(stream.width.unwrap_or(0), stream.height.unwrap_or(0)),
            transform_for_degrees(stream.display_rotation()),
        ),
        None => (Size::new(0, 0), AffineTransform::IDENTITY),
    };

    debug!(
        "Probed {} tracks, {:.3}s, {}x{}, protected={}",
        tracks.len(),
        duration_secs,
        natural_size.width,
        natural_size.height,
        protected
    );

    Ok(AssetMetadata {
        tracks,
        duration: MediaTime::from_secs_f64(duration_secs),
        natural_size,
        preferred_transform,
        protected,
    })
}
