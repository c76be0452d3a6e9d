use std::fmt;
use std::str::FromStr;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TimelapseError};

/// A crop window in source pixels, written `WxH+X+Y`.
///
/// The offsets are optional (`WxH` crops from the top-left corner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CropWindow {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl CropWindow {
    pub fn new(width: u32, height: u32, x: u32, y: u32) -> Self {
        Self { width, height, x, y }
    }

    /// Check the window against a frame of `frame_width` x `frame_height`.
    pub fn validate_against(&self, frame_width: u32, frame_height: u32) -> Result<()> {
        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        if right > frame_width as u64 {
            return Err(self.invalid(format!(
                "columns ({} offset + {} width = {}) exceed frame width ({})",
                self.x, self.width, right, frame_width
            )));
        }
        if bottom > frame_height as u64 {
            return Err(self.invalid(format!(
                "rows ({} offset + {} height = {}) exceed frame height ({})",
                self.y, self.height, bottom, frame_height
            )));
        }
        Ok(())
    }

    /// Cut the window out of `img`.
    pub fn apply(&self, img: &DynamicImage) -> DynamicImage {
        img.crop_imm(self.x, self.y, self.width, self.height)
    }

    fn invalid(&self, reason: String) -> TimelapseError {
        TimelapseError::InvalidCrop { window: self.to_string(), reason }
    }
}

impl fmt::Display for CropWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

impl FromStr for CropWindow {
    type Err = TimelapseError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| TimelapseError::InvalidCrop {
            window: s.to_string(),
            reason: reason.to_string(),
        };
        let spec = s.trim();

        let mut parts = spec.split('+');
        let size = parts.next().unwrap_or_default();
        let (w, h) = size
            .split_once(['x', 'X'])
            .ok_or_else(|| invalid("expected WxH+X+Y"))?;
        let width: u32 = w.parse().map_err(|_| invalid("width is not a number"))?;
        let height: u32 = h.parse().map_err(|_| invalid("height is not a number"))?;

        let x = match parts.next() {
            Some(v) => v.parse().map_err(|_| invalid("x offset is not a number"))?,
            None => 0,
        };
        let y = match parts.next() {
            Some(v) => v.parse().map_err(|_| invalid("y offset is not a number"))?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(invalid("expected WxH+X+Y"));
        }
        if width == 0 || height == 0 {
            return Err(invalid("window must not be empty"));
        }

        Ok(Self { width, height, x, y })
    }
}

impl TryFrom<String> for CropWindow {
    type Error = TimelapseError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CropWindow> for String {
    fn from(window: CropWindow) -> Self {
        window.to_string()
    }
}
