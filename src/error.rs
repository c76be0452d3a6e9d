use std::path::PathBuf;

use thiserror::Error;

/// Every way a timelapse run can stop.
///
/// There is no recovery: the pipeline returns the first error it meets and
/// the binary turns it into a message and an exit code.
#[derive(Error, Debug)]
pub enum TimelapseError {
    #[error("Invalid option {key} = {value}: {reason}")]
    InvalidOption { key: String, value: String, reason: String },

    #[error("Invalid crop window {window}: {reason}")]
    InvalidCrop { window: String, reason: String },

    #[error("Could not {action} {}: {source}", path.display())]
    Setup {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No *.{extension} files found in {}", dir.display())]
    NoFrames { dir: PathBuf, extension: String },

    #[error("Failed to process frame {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Sample frame {} has degenerate dimensions {width}x{height}", path.display())]
    DegenerateImage { path: PathBuf, width: u32, height: u32 },

    #[error("Could not start encoder '{program}': {source}")]
    EncoderLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder '{program}' failed with {status}")]
    EncoderFailed { program: String, status: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using TimelapseError
pub type Result<T> = std::result::Result<T, TimelapseError>;

impl TimelapseError {
    pub(crate) fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    pub(crate) fn invalid_option(key: &str, value: impl ToString, reason: &str) -> Self {
        Self::InvalidOption {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Argument and configuration problems exit with 2, the same code clap
    /// uses for malformed flags. Everything else exits with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidOption { .. } | Self::InvalidCrop { .. } => 2,
            _ => 1,
        }
    }
}
