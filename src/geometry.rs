//! Geometry policy: decides the size every frame is normalized to.
//!
//! The decision is made once, from a single sample frame, and returned as a
//! [`Geometry`] value. Landscape samples are resized to the requested size,
//! with the height adjusted when the requested size would distort the
//! picture. Portrait samples keep their aspect ratio at the requested height
//! and are letterboxed with side bars up to the requested width.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, TimelapseError};

/// Largest accepted difference between the native aspect ratio and the
/// aspect ratio of the computed size.
pub const ASPECT_TOLERANCE: f64 = 0.01;

/// Frame dimensions derived from a sample frame and the requested size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// Width the frame content is resized to (before side bars).
    pub width: u32,
    /// Height the frame content is resized to.
    pub height: u32,
    /// The sample was taller than wide.
    pub vertical: bool,
    /// Requested width; the letterboxed width for vertical frames.
    pub total_width: u32,
    /// Width of the black bar added on each side of vertical frames.
    pub side_bars: u32,
    /// The height was recomputed to keep the native aspect ratio.
    pub aspect_corrected: bool,
}

impl Geometry {
    /// Width of the frames handed to the encoder.
    pub fn frame_width(&self) -> u32 {
        self.width + 2 * self.side_bars
    }
}

/// Derive the encode geometry for a sample of `native_width` x
/// `native_height` pixels and a requested size.
///
/// `sample` only names the frame in errors.
pub fn derive_geometry(
    sample: &Path,
    native_width: u32,
    native_height: u32,
    requested_width: u32,
    requested_height: u32,
) -> Result<Geometry> {
    if native_width == 0 || native_height == 0 {
        return Err(TimelapseError::DegenerateImage {
            path: sample.to_path_buf(),
            width: native_width,
            height: native_height,
        });
    }
    if requested_width == 0 || requested_height == 0 {
        return Err(TimelapseError::invalid_option(
            "size",
            format!("{}x{}", requested_width, requested_height),
            "width and height must be greater than zero",
        ));
    }

    let native_ratio = native_width as f64 / native_height as f64;
    let mut width = requested_width;
    let mut height = requested_height;
    let mut side_bars = 0;
    let vertical = native_width < native_height;

    if vertical {
        info!("Pictures are vertical");
        width = ((native_ratio * requested_height as f64).round() as u32).max(1);
        side_bars = requested_width.saturating_sub(width) / 2;
        if width > requested_width {
            warn!(
                content_width = width,
                requested_width, "Vertical content is wider than the requested width, no side bars added"
            );
        }
    }

    let ratio = width as f64 / requested_height as f64;
    let aspect_corrected = (native_ratio - ratio).abs() >= ASPECT_TOLERANCE;
    if aspect_corrected {
        height = ((width as f64 / native_ratio).round() as u32).max(1);
        warn!(
            native_ratio,
            requested_ratio = ratio,
            "Aspect ratio not conserved, height changed to {}",
            height
        );
    } else {
        debug!(native_ratio, "Aspect ratio is conserved");
    }

    Ok(Geometry {
        width,
        height,
        vertical,
        total_width: requested_width,
        side_bars,
        aspect_corrected,
    })
}
