//! Muxing the frame set into a video with an external encoder.
//!
//! The encoder itself sits behind the [`Encoder`] trait so the pipeline can
//! run against a stand-in; [`Mencoder`] and [`Ffmpeg`] drive the real
//! programs.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command as ProcCommand;

use tracing::{debug, info};

use crate::config::EncoderKind;
use crate::error::{Result, TimelapseError};
use crate::organizer::{move_file, Layout};

/// Name of the frame list handed to the encoder, written next to the frames.
pub const FRAME_LIST_NAME: &str = ".timelapser-frames.lst";

/// Name of the video for a given size and framerate.
pub fn output_filename(width: u32, height: u32, framerate: u32) -> String {
    format!("timelapse_{}x{}_{}fps.avi", width, height, framerate)
}

/// Frame type understood by the encoders for a file extension.
pub fn frame_type(extension: &str) -> String {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "jpg".to_string(),
        other => other.to_string(),
    }
}

/// Everything an encoder needs to produce one video.
#[derive(Debug, Clone, Copy)]
pub struct EncodeJob<'a> {
    /// Directory holding the frames; the video is written here
    pub workdir: &'a Path,
    /// Frames in playback order
    pub frames: &'a [PathBuf],
    pub frame_type: &'a str,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// File name of the video, relative to `workdir`
    pub output_name: &'a str,
}

impl EncodeJob<'_> {
    pub fn output_path(&self) -> PathBuf {
        self.workdir.join(self.output_name)
    }

    fn frame_names(&self) -> impl Iterator<Item = String> + '_ {
        self.frames
            .iter()
            .map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
    }
}

/// Something that turns a frame set into a video file.
pub trait Encoder {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Mux `job.frames` into `job.output_path()` and return that path.
    fn mux(&self, job: &EncodeJob<'_>) -> Result<PathBuf>;
}

/// Build the encoder for `kind`, using the program found on `PATH`.
pub fn encoder_for(kind: EncoderKind) -> Box<dyn Encoder> {
    match kind {
        EncoderKind::Mencoder => Box::new(Mencoder::default()),
        EncoderKind::Ffmpeg => Box::new(Ffmpeg::default()),
    }
}

/// Removes the frame list when the encoder is done with it.
pub struct ListFileGuard {
    path: PathBuf,
}

impl ListFileGuard {
    /// Write `contents` to `path` and guard it.
    pub fn write(path: PathBuf, contents: &str) -> Result<Self> {
        let mut file = fs::File::create(&path)
            .map_err(|e| TimelapseError::io(format!("creating frame list {}", path.display()), e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| TimelapseError::io(format!("writing frame list {}", path.display()), e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ListFileGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// MEncoder with the multi-file (`mf://`) input, writing motion-JPEG.
#[derive(Debug, Clone)]
pub struct Mencoder {
    pub program: PathBuf,
}

impl Default for Mencoder {
    fn default() -> Self {
        Self { program: PathBuf::from("mencoder") }
    }
}

impl Mencoder {
    /// Command line for `job`, reading the frames from `list_name`.
    pub fn args(job: &EncodeJob<'_>, list_name: &str) -> Vec<String> {
        vec![
            format!("mf://@{}", list_name),
            "-mf".into(),
            format!("type={}:w={}:h={}:fps={}", job.frame_type, job.width, job.height, job.framerate),
            "-ovc".into(),
            "lavc".into(),
            "-lavcopts".into(),
            "vcodec=mjpeg".into(),
            "-oac".into(),
            "copy".into(),
            "-o".into(),
            job.output_name.to_string(),
        ]
    }

    /// One file name per line.
    pub fn frame_list(job: &EncodeJob<'_>) -> String {
        job.frame_names().map(|n| n + "\n").collect()
    }
}

impl Encoder for Mencoder {
    fn name(&self) -> &str {
        "mencoder"
    }

    fn mux(&self, job: &EncodeJob<'_>) -> Result<PathBuf> {
        let list = ListFileGuard::write(job.workdir.join(FRAME_LIST_NAME), &Self::frame_list(job))?;
        debug!(list = %list.path().display(), "Wrote mencoder frame list");
        run_encoder(&self.program, &Self::args(job, FRAME_LIST_NAME), job)
    }
}

/// ffmpeg reading an ffconcat script, writing motion-JPEG.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    pub program: PathBuf,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self { program: PathBuf::from("ffmpeg") }
    }
}

impl Ffmpeg {
    pub fn args(job: &EncodeJob<'_>, list_name: &str) -> Vec<String> {
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list_name.to_string(),
            "-r".into(),
            job.framerate.to_string(),
            "-s".into(),
            format!("{}x{}", job.width, job.height),
            "-c:v".into(),
            "mjpeg".into(),
            "-q:v".into(),
            "2".into(),
            "-an".into(),
            job.output_name.to_string(),
        ]
    }

    /// ffconcat script showing every frame for `1/framerate` seconds.
    ///
    /// The last frame is listed twice, otherwise the demuxer drops its
    /// duration.
    pub fn frame_list(job: &EncodeJob<'_>) -> String {
        let duration = 1.0 / job.framerate as f64;
        let mut script = String::from("ffconcat version 1.0\n");
        let mut last = None;
        for name in job.frame_names() {
            let quoted = name.replace('\'', "'\\''");
            script.push_str(&format!("file '{}'\nduration {:.6}\n", quoted, duration));
            last = Some(quoted);
        }
        if let Some(name) = last {
            script.push_str(&format!("file '{}'\n", name));
        }
        script
    }
}

impl Encoder for Ffmpeg {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn mux(&self, job: &EncodeJob<'_>) -> Result<PathBuf> {
        let list = ListFileGuard::write(job.workdir.join(FRAME_LIST_NAME), &Self::frame_list(job))?;
        debug!(list = %list.path().display(), "Wrote ffconcat script");
        run_encoder(&self.program, &Self::args(job, FRAME_LIST_NAME), job)
    }
}

fn run_encoder(program: &Path, args: &[String], job: &EncodeJob<'_>) -> Result<PathBuf> {
    let program_name = program.display().to_string();
    debug!(program = %program_name, ?args, "Running encoder");

    let status = ProcCommand::new(program)
        .args(args)
        .current_dir(job.workdir)
        .status()
        .map_err(|source| TimelapseError::EncoderLaunch { program: program_name.clone(), source })?;

    if !status.success() {
        return Err(TimelapseError::EncoderFailed { program: program_name, status: status.to_string() });
    }

    let produced = job.output_path();
    if !produced.is_file() {
        return Err(TimelapseError::EncoderFailed {
            program: program_name,
            status: format!("success but no {} was written", job.output_name),
        });
    }
    Ok(produced)
}

/// Delete videos named `name` left by an earlier run, in both the working
/// directory and the root.
pub fn remove_stale_output(layout: &Layout, name: &str) -> Result<()> {
    for dir in [&layout.processed, &layout.root] {
        let stale = dir.join(name);
        if stale.is_file() {
            info!(file = %stale.display(), "Removing previous timelapse");
            fs::remove_file(&stale)
                .map_err(|e| TimelapseError::io(format!("removing {}", stale.display()), e))?;
        }
    }
    Ok(())
}

/// Mux `frames` with `encoder` and move the video into `layout.root`.
///
/// The video is named after `name_size` (the content size chosen by the
/// geometry policy) while the encoder is told `frame_size`, the size of the
/// frames on disk. Returns the final location of the video.
pub fn encode_timelapse(
    encoder: &dyn Encoder,
    layout: &Layout,
    frames: &[PathBuf],
    extension: &str,
    name_size: (u32, u32),
    frame_size: (u32, u32),
    framerate: u32,
) -> Result<PathBuf> {
    let output_name = output_filename(name_size.0, name_size.1, framerate);
    remove_stale_output(layout, &output_name)?;
    let (width, height) = frame_size;

    let frame_type = frame_type(extension);
    let job = EncodeJob {
        workdir: &layout.processed,
        frames,
        frame_type: &frame_type,
        width,
        height,
        framerate,
        output_name: &output_name,
    };
    info!(encoder = encoder.name(), output = %output_name, "Assembling the time lapse");
    let produced = encoder.mux(&job)?;

    let destination = layout.root.join(&output_name);
    move_file(&produced, &destination)?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job<'a>(dir: &'a Path, frames: &'a [PathBuf]) -> EncodeJob<'a> {
        EncodeJob {
            workdir: dir,
            frames,
            frame_type: "jpg",
            width: 1080,
            height: 720,
            framerate: 7,
            output_name: "timelapse_1080x720_7fps.avi",
        }
    }

    #[test]
    fn output_name_embeds_size_and_rate() {
        assert_eq!(output_filename(1080, 720, 7), "timelapse_1080x720_7fps.avi");
        assert_eq!(output_filename(1920, 1080, 30), "timelapse_1920x1080_30fps.avi");
    }

    #[test]
    fn frame_type_maps_jpeg_variants() {
        assert_eq!(frame_type("JPG"), "jpg");
        assert_eq!(frame_type("jpeg"), "jpg");
        assert_eq!(frame_type("png"), "png");
    }

    #[test]
    fn mencoder_command_line() {
        let frames = [PathBuf::from("/w/a.jpg"), PathBuf::from("/w/b.jpg")];
        let job = job(Path::new("/w"), &frames);
        assert_eq!(
            Mencoder::args(&job, "list.lst"),
            [
                "mf://@list.lst",
                "-mf",
                "type=jpg:w=1080:h=720:fps=7",
                "-ovc",
                "lavc",
                "-lavcopts",
                "vcodec=mjpeg",
                "-oac",
                "copy",
                "-o",
                "timelapse_1080x720_7fps.avi"
            ]
        );
        assert_eq!(Mencoder::frame_list(&job), "a.jpg\nb.jpg\n");
    }

    #[test]
    fn ffmpeg_script_repeats_last_frame() {
        let frames = [PathBuf::from("/w/a.jpg"), PathBuf::from("/w/it's.jpg")];
        let job = job(Path::new("/w"), &frames);
        let script = Ffmpeg::frame_list(&job);
        assert_eq!(
            script,
            "ffconcat version 1.0\n\
             file 'a.jpg'\nduration 0.142857\n\
             file 'it'\\''s.jpg'\nduration 0.142857\n\
             file 'it'\\''s.jpg'\n"
        );
        let args = Ffmpeg::args(&job, "list.lst");
        assert!(args.windows(2).any(|w| w == ["-c:v", "mjpeg"]));
        assert!(args.windows(2).any(|w| w == ["-s", "1080x720"]));
        assert_eq!(args.last().map(String::as_str), Some("timelapse_1080x720_7fps.avi"));
    }

    #[test]
    fn list_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FRAME_LIST_NAME);
        {
            let guard = ListFileGuard::write(path.clone(), "a.jpg\n").unwrap();
            assert_eq!(fs::read_to_string(guard.path()).unwrap(), "a.jpg\n");
        }
        assert!(!path.exists());
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let frames = [dir.path().join("a.jpg")];
        let encoder = Mencoder { program: dir.path().join("no-such-mencoder") };

        let err = encoder.mux(&job(dir.path(), &frames)).unwrap_err();
        assert!(matches!(err, TimelapseError::EncoderLaunch { .. }));
        assert!(!dir.path().join(FRAME_LIST_NAME).exists());
    }

    #[test]
    fn stale_videos_are_removed_from_both_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fs::create_dir(&layout.processed).unwrap();
        let name = output_filename(1080, 720, 7);
        fs::write(layout.root.join(&name), b"old").unwrap();
        fs::write(layout.processed.join(&name), b"old").unwrap();
        fs::write(layout.root.join("timelapse_640x480_7fps.avi"), b"other").unwrap();

        remove_stale_output(&layout, &name).unwrap();
        assert!(!layout.root.join(&name).exists());
        assert!(!layout.processed.join(&name).exists());
        assert!(layout.root.join("timelapse_640x480_7fps.avi").exists());
    }
}
