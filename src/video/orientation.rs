//! Orientation correction for tracks that carry a display transform.
//!
//! Phones record sensor-native frames and tag them with a rotation. Exporting
//! through a composition drops that tag, so the rotation has to be baked in:
//! the render target is resized and the transform is re-anchored so the
//! rotated frame lands inside it.

use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use crate::video::types::{AffineTransform, Size};

/// Angular tolerance in radians when classifying a transform
pub const ANGLE_EPSILON: f64 = 1e-4;

/// Right-angle rotation classified from a display transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    /// 0 degrees, or an angle that is not a quarter turn
    None,
    /// +90 degrees (clockwise on a y-down screen)
    Clockwise90,
    /// -90 / 270 degrees
    CounterClockwise90,
    /// 180 degrees
    UpsideDown,
}

impl Rotation {
    /// Classify the rotation of a transform's linear part
    pub fn classify(transform: &AffineTransform) -> Self {
        let theta = transform.angle();

        if (theta - FRAC_PI_2).abs() < ANGLE_EPSILON {
            Self::Clockwise90
        } else if (theta + FRAC_PI_2).abs() < ANGLE_EPSILON {
            Self::CounterClockwise90
        } else if (theta.abs() - PI).abs() < ANGLE_EPSILON {
            Self::UpsideDown
        } else {
            Self::None
        }
    }

    pub fn degrees(&self) -> i32 {
        match self {
            Self::None => 0,
            Self::Clockwise90 => 90,
            Self::CounterClockwise90 => -90,
            Self::UpsideDown => 180,
        }
    }

    pub fn swaps_axes(&self) -> bool {
        matches!(self, Self::Clockwise90 | Self::CounterClockwise90)
    }
}

/// Output of [`resolve`]: where and how the source frame is drawn
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationFix {
    pub render_size: Size,
    pub transform: AffineTransform,
    pub rotation: Rotation,
}

/// Compute the corrected render size and transform for a track.
///
/// The linear part of `preferred` is kept; only the translation is replaced
/// so that the rotated frame's bounding box starts at the origin.
pub fn resolve(natural_size: Size, preferred: AffineTransform) -> OrientationFix {
    let rotation = Rotation::classify(&preferred);
    let w = natural_size.width as f64;
    let h = natural_size.height as f64;

    let (render_size, transform) = match rotation {
        Rotation::Clockwise90 => (natural_size.transposed(), preferred.with_translation(h, 0.0)),
        Rotation::CounterClockwise90 => {
            (natural_size.transposed(), preferred.with_translation(0.0, w))
        }
        Rotation::UpsideDown => (natural_size, preferred.with_translation(w, h)),
        Rotation::None => (natural_size, preferred.with_translation(0.0, 0.0)),
    };

    OrientationFix {
        render_size,
        transform,
        rotation,
    }
}
