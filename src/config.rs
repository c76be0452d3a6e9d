use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crop::CropWindow;
use crate::error::{Result, TimelapseError};

/// External program used to mux the frames into a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    #[default]
    Mencoder,
    Ffmpeg,
}

impl EncoderKind {
    pub fn program(&self) -> &'static str {
        match self {
            EncoderKind::Mencoder => "mencoder",
            EncoderKind::Ffmpeg => "ffmpeg",
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for EncoderKind {
    type Err = TimelapseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mencoder" => Ok(EncoderKind::Mencoder),
            "ffmpeg" => Ok(EncoderKind::Ffmpeg),
            other => Err(TimelapseError::invalid_option("encoder", other, "expected 'mencoder' or 'ffmpeg'")),
        }
    }
}

fn default_extension() -> String {
    "jpg".to_string()
}
fn default_width() -> u32 {
    1080
}
fn default_height() -> u32 {
    720
}
fn default_framerate() -> u32 {
    7
}

/// Options for one timelapse run.
///
/// Built once before the run starts and never modified by it; sizes that
/// depend on the pictures are returned separately as a
/// [`Geometry`](crate::Geometry).
///
/// The same structure is read from `timelapser.json`, where every field is
/// optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelapseOptions {
    /// File extension of the pictures, without the dot
    pub extension: String,
    /// Rotation applied to every frame, in degrees clockwise
    pub rotation: f64,
    /// Requested width of the video
    pub width: u32,
    /// Requested height of the video
    pub height: u32,
    /// Frames per second of the video
    pub framerate: u32,
    /// Window cut out of the source pictures before resizing
    pub crop: Option<CropWindow>,
    /// Program muxing the frames
    pub encoder: EncoderKind,
}

impl Default for TimelapseOptions {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            rotation: 0.0,
            width: default_width(),
            height: default_height(),
            framerate: default_framerate(),
            crop: None,
            encoder: EncoderKind::default(),
        }
    }
}

impl TimelapseOptions {
    /// Load options from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| TimelapseError::io(format!("reading config {}", path.display()), e))?;
        serde_json::from_str(&text).map_err(|e| {
            TimelapseError::invalid_option("config", path.display(), &format!("parsing config json: {}", e))
        })
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_framerate(mut self, framerate: u32) -> Self {
        self.framerate = framerate;
        self
    }

    pub fn with_crop(mut self, crop: Option<CropWindow>) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderKind) -> Self {
        self.encoder = encoder;
        self
    }

    /// Extension without a leading dot, as matched against file names.
    pub fn normalized_extension(&self) -> &str {
        self.extension.trim().trim_start_matches('.')
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let ext = self.normalized_extension();
        if ext.is_empty() || ext.contains(['/', '\\', '*', '?']) {
            return Err(TimelapseError::invalid_option("extension", &self.extension, "expected a plain file extension"));
        }
        if self.width == 0 {
            return Err(TimelapseError::invalid_option("width", self.width, "must be greater than zero"));
        }
        if self.height == 0 {
            return Err(TimelapseError::invalid_option("height", self.height, "must be greater than zero"));
        }
        if self.framerate == 0 {
            return Err(TimelapseError::invalid_option("framerate", self.framerate, "must be greater than zero"));
        }
        if !self.rotation.is_finite() {
            return Err(TimelapseError::invalid_option("rotation", self.rotation, "must be a finite number of degrees"));
        }
        Ok(())
    }
}
