//! # timelapser - turn a folder of photographs into a timelapse
//!
//! `timelapser` takes a directory of sequential pictures, backs them up,
//! normalizes the working copies (crop, resize, rotation, side bars for
//! portrait shots) and muxes them into a motion-JPEG AVI with an external
//! encoder.
//!
//! ## Layout
//!
//! A run on `shots/` produces:
//!
//! - `shots/original/` - the pictures as they were, never modified again
//! - `shots/processed/` - working copies, rewritten in place
//! - `shots/timelapse_<w>x<h>_<fps>fps.avi` - the video
//!
//! Running again on the same directory reuses `processed/` without
//! resizing it a second time.
//!
//! ## Example
//!
//! ```no_run
//! use timelapser::{Timelapser, TimelapseOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = TimelapseOptions::default()
//!     .with_size(1280, 720)
//!     .with_framerate(12);
//! let report = Timelapser::new(options)?.run(Path::new("shots"))?;
//! println!("{} frames -> {}", report.frames, report.video.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! ```no_run
//! use timelapser::{Timelapser, TimelapseOptions, ProgressPhase};
//! use std::path::Path;
//!
//! let timelapser = Timelapser::new(TimelapseOptions::default()).unwrap();
//! timelapser.run_with_progress(Path::new("shots"), |progress| {
//!     match progress.phase {
//!         ProgressPhase::Encoding => println!("Encoding..."),
//!         _ => println!("{}: {}/{}", progress.message, progress.completed, progress.total),
//!     }
//! }).unwrap();
//! ```

pub mod config;
pub mod crop;
pub mod encoder;
pub mod error;
pub mod geometry;
pub mod organizer;
pub mod transform;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use config::{EncoderKind, TimelapseOptions};
pub use crop::CropWindow;
pub use encoder::{encoder_for, output_filename, EncodeJob, Encoder, Ffmpeg, Mencoder};
pub use error::{Result, TimelapseError};
pub use geometry::{derive_geometry, Geometry};
pub use organizer::{Layout, OrganizeOutcome};
pub use transform::FramePlan;

/// Represents the current phase of a timelapse run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Backing up pictures and creating working copies
    Organizing,
    /// Cropping, resizing and rotating working copies
    Transforming,
    /// Adding side bars to portrait frames
    Letterboxing,
    /// Running the external encoder
    Encoding,
    /// Video written
    Complete,
}

/// Progress information for a timelapse run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    /// Current phase of the run
    pub phase: ProgressPhase,
    /// Number of frames completed in the current phase
    pub completed: usize,
    /// Total number of frames in the current phase (0 if indeterminate)
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    /// Human-readable message describing current status
    pub message: String,
}

impl Progress {
    /// Progress of a per-frame phase
    pub fn frames(phase: ProgressPhase, completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let label = match phase {
            ProgressPhase::Organizing => "Organizing",
            ProgressPhase::Transforming => "Transforming",
            ProgressPhase::Letterboxing => "Adding side bars to",
            ProgressPhase::Encoding => "Encoding",
            ProgressPhase::Complete => "Finished",
        };
        Self {
            phase,
            completed,
            total,
            percentage,
            message: format!("{} frame {} of {}", label, completed, total),
        }
    }

    /// The encoder has been started
    pub fn encoding() -> Self {
        Self {
            phase: ProgressPhase::Encoding,
            completed: 0,
            total: 0,
            percentage: 0.0,
            message: "Assembling the time lapse...".to_string(),
        }
    }

    /// The video has been written
    pub fn complete(total_frames: usize) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total_frames,
            total: total_frames,
            percentage: 100.0,
            message: format!("Timelapse complete: {} frames", total_frames),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct TimelapseReport {
    /// Number of frames in the video
    pub frames: usize,
    /// Geometry derived from the sample frame
    pub geometry: Geometry,
    /// Whether this run organized the directory or reused it
    pub outcome: OrganizeOutcome,
    /// Final location of the video
    pub video: PathBuf,
}

/// Runs the whole pipeline for one directory
pub struct Timelapser {
    options: TimelapseOptions,
    encoder: Box<dyn Encoder>,
}

impl Timelapser {
    /// Create a timelapser using the encoder named in `options`
    pub fn new(options: TimelapseOptions) -> Result<Self> {
        let encoder = encoder_for(options.encoder);
        Self::with_encoder(options, encoder)
    }

    /// Create a timelapser muxing with a custom encoder
    pub fn with_encoder(options: TimelapseOptions, encoder: Box<dyn Encoder>) -> Result<Self> {
        options.validate()?;
        Ok(Self { options, encoder })
    }

    /// Options this timelapser was built with
    pub fn options(&self) -> &TimelapseOptions {
        &self.options
    }

    /// Build the timelapse for the pictures in `root`
    pub fn run(&self, root: &Path) -> Result<TimelapseReport> {
        self.run_with_progress(root, |_| {})
    }

    /// Build the timelapse for the pictures in `root`, reporting progress
    ///
    /// The callback receives a [`Progress`] after every frame of every
    /// per-frame phase, once when the encoder starts and once at the end.
    pub fn run_with_progress<F>(&self, root: &Path, progress_callback: F) -> Result<TimelapseReport>
    where
        F: Fn(Progress),
    {
        if !root.is_dir() {
            return Err(TimelapseError::Setup {
                action: "open directory",
                path: root.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }
        let opts = &self.options;
        let extension = opts.normalized_extension();
        let layout = Layout::new(root);

        // Phase 1: back up pictures, settle the frame set
        let set = organizer::organize(&layout, extension, |done, total| {
            progress_callback(Progress::frames(ProgressPhase::Organizing, done, total))
        })?;
        let first_run = set.outcome.is_first_run();
        let frames = set.frames;

        // Phase 2: derive geometry from the first frame
        let sample = &frames[0];
        let (mut native_width, mut native_height) =
            image::image_dimensions(sample).map_err(|source| TimelapseError::Image { path: sample.clone(), source })?;
        let crop = match opts.crop {
            Some(window) if first_run => {
                window.validate_against(native_width, native_height)?;
                native_width = window.width;
                native_height = window.height;
                Some(window)
            }
            Some(window) => {
                warn!(%window, "Frames were already cropped on a previous run, ignoring crop window");
                None
            }
            None => None,
        };
        let geometry = derive_geometry(sample, native_width, native_height, opts.width, opts.height)?;
        info!(
            width = geometry.width,
            height = geometry.height,
            vertical = geometry.vertical,
            side_bars = geometry.side_bars,
            "Frame geometry"
        );

        // Phase 3: crop, resize and rotate
        let plan = FramePlan {
            crop,
            resize: first_run.then_some((geometry.width, geometry.height)),
            rotation: opts.rotation,
        };
        if !plan.is_noop() {
            transform::transform_frames(&frames, &plan, |done, total| {
                progress_callback(Progress::frames(ProgressPhase::Transforming, done, total))
            })?;
        }

        // Phase 4: side bars for portrait frames
        if geometry.vertical && geometry.side_bars > 0 {
            info!(side_bars = geometry.side_bars, "Adding side bars");
            transform::letterbox_frames(&frames, geometry.side_bars, |done, total| {
                progress_callback(Progress::frames(ProgressPhase::Letterboxing, done, total))
            })?;
        }

        // Phase 5: mux and move the video next to the originals.
        // Rotation may have swapped the sides, so the encoder gets the size on disk.
        let sample = &frames[0];
        let frame_size =
            image::image_dimensions(sample).map_err(|source| TimelapseError::Image { path: sample.clone(), source })?;
        progress_callback(Progress::encoding());
        let video = encoder::encode_timelapse(
            self.encoder.as_ref(),
            &layout,
            &frames,
            extension,
            (geometry.width, geometry.height),
            frame_size,
            opts.framerate,
        )?;

        progress_callback(Progress::complete(frames.len()));
        Ok(TimelapseReport { frames: frames.len(), geometry, outcome: set.outcome, video })
    }
}
