//! Splits the pictures of a directory into an untouched `original/` backup
//! and a `processed/` working copy.
//!
//! The presence of both directories marks a directory as already organized;
//! a second run then works on `processed/` directly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Result, TimelapseError};

pub const ORIGINAL_DIR: &str = "original";
pub const PROCESSED_DIR: &str = "processed";

/// Directories of one timelapse run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Directory holding the pictures; the finished video ends up here
    pub root: PathBuf,
    pub original: PathBuf,
    pub processed: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            original: root.join(ORIGINAL_DIR),
            processed: root.join(PROCESSED_DIR),
        }
    }

    /// Both `original/` and `processed/` exist.
    pub fn is_organized(&self) -> bool {
        self.original.is_dir() && self.processed.is_dir()
    }
}

/// Whether [`organize`] moved files or found them already in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganizeOutcome {
    /// First run: pictures were copied and moved, frames still need resizing
    Organized,
    /// Re-run: `processed/` was reused as is, frames are assumed resized
    AlreadyOrganized,
}

impl OrganizeOutcome {
    pub fn is_first_run(&self) -> bool {
        matches!(self, OrganizeOutcome::Organized)
    }
}

/// The frame set of a run: the working copies in `processed/`, sorted.
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub outcome: OrganizeOutcome,
    pub frames: Vec<PathBuf>,
}

/// List the files of `dir` whose extension is exactly `extension`, sorted
/// by file name.
///
/// Only the top level of `dir` is read and hidden files are skipped.
pub fn list_frames(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let err = e.into_io_error().unwrap_or_else(|| io::Error::other("filesystem loop"));
            TimelapseError::io(format!("reading directory {}", dir.display()), err)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let hidden = entry.file_name().to_str().is_some_and(|n| n.starts_with('.'));
        if !hidden && entry.path().extension().is_some_and(|e| e == extension) {
            frames.push(entry.into_path());
        }
    }
    frames.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(frames)
}

/// Organize `layout.root` and return the frame set to work on.
///
/// `progress` is called with `(completed, total)` after every picture moved.
pub fn organize<F>(layout: &Layout, extension: &str, progress: F) -> Result<FrameSet>
where
    F: Fn(usize, usize),
{
    if layout.is_organized() {
        info!(dir = %layout.processed.display(), "Pictures already organized, reusing working copies");
        let frames = list_frames(&layout.processed, extension)?;
        if frames.is_empty() {
            return Err(TimelapseError::NoFrames { dir: layout.processed.clone(), extension: extension.to_string() });
        }
        return Ok(FrameSet { outcome: OrganizeOutcome::AlreadyOrganized, frames });
    }

    let pictures = list_frames(&layout.root, extension)?;
    if pictures.is_empty() {
        return Err(TimelapseError::NoFrames { dir: layout.root.clone(), extension: extension.to_string() });
    }

    info!(count = pictures.len(), "Organizing pictures in different folders");
    create_dir(&layout.original)?;
    create_dir(&layout.processed)?;

    let total = pictures.len();
    let mut frames = Vec::with_capacity(total);
    for (idx, picture) in pictures.iter().enumerate() {
        let name = picture
            .file_name()
            .ok_or_else(|| TimelapseError::io("organizing pictures", io::Error::other("picture without a file name")))?;
        let working = layout.processed.join(name);
        fs::copy(picture, &working).map_err(|source| TimelapseError::Setup {
            action: "copy picture to",
            path: working.clone(),
            source,
        })?;
        let archived = layout.original.join(name);
        move_file(picture, &archived)?;
        debug!(picture = %picture.display(), "Archived picture");

        frames.push(working);
        progress(idx + 1, total);
    }

    Ok(FrameSet { outcome: OrganizeOutcome::Organized, frames })
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir(dir).map_err(|source| TimelapseError::Setup {
        action: "create directory",
        path: dir.to_path_buf(),
        source,
    })
}

/// Move `from` to `to`, copying when a rename is not possible.
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .and_then(|_| fs::remove_file(from))
        .map_err(|source| TimelapseError::Setup { action: "move file to", path: to.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), name.as_bytes()).unwrap();
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn list_frames_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["img_010.jpg", "img_002.jpg", "img_001.png", "notes.txt", ".hidden.jpg", "IMG_003.JPG"] {
            touch(dir.path(), name);
        }
        fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let frames = list_frames(dir.path(), "jpg").unwrap();
        assert_eq!(names(&frames), ["img_002.jpg", "img_010.jpg"]);
    }

    #[test]
    fn first_run_archives_and_copies() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.jpg", "c.jpg", "keep.txt"] {
            touch(dir.path(), name);
        }
        let layout = Layout::new(dir.path());
        let calls = Cell::new(0);

        let set = organize(&layout, "jpg", |done, total| {
            calls.set(calls.get() + 1);
            assert_eq!(total, 3);
            assert!(done <= total);
        })
        .unwrap();

        assert_eq!(set.outcome, OrganizeOutcome::Organized);
        assert!(set.outcome.is_first_run());
        assert_eq!(calls.get(), 3);
        assert_eq!(names(&set.frames), ["a.jpg", "b.jpg", "c.jpg"]);
        assert!(set.frames.iter().all(|p| p.starts_with(&layout.processed)));
        assert_eq!(names(&list_frames(&layout.original, "jpg").unwrap()), ["a.jpg", "b.jpg", "c.jpg"]);
        assert!(list_frames(dir.path(), "jpg").unwrap().is_empty());
        assert!(dir.path().join("keep.txt").exists());
        assert_eq!(fs::read(layout.original.join("a.jpg")).unwrap(), b"a.jpg");
    }

    #[test]
    fn second_run_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.jpg");
        let layout = Layout::new(dir.path());
        organize(&layout, "jpg", |_, _| {}).unwrap();

        // A picture dropped in the root after organizing must stay untouched.
        touch(dir.path(), "late.jpg");
        let set = organize(&layout, "jpg", |_, _| panic!("nothing should be moved")).unwrap();

        assert_eq!(set.outcome, OrganizeOutcome::AlreadyOrganized);
        assert_eq!(names(&set.frames), ["a.jpg"]);
        assert!(dir.path().join("late.jpg").exists());
        assert_eq!(names(&list_frames(&layout.original, "jpg").unwrap()), ["a.jpg"]);
    }

    #[test]
    fn empty_directory_is_rejected_before_creating_folders() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());

        let err = organize(&layout, "jpg", |_, _| {}).unwrap_err();
        assert!(matches!(err, TimelapseError::NoFrames { .. }));
        assert!(!layout.original.exists());
        assert!(!layout.processed.exists());
    }

    #[test]
    fn half_organized_directory_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.jpg");
        let layout = Layout::new(dir.path());
        fs::create_dir(&layout.original).unwrap();

        let err = organize(&layout, "jpg", |_, _| {}).unwrap_err();
        assert!(matches!(err, TimelapseError::Setup { action: "create directory", .. }));
        assert!(dir.path().join("a.jpg").exists());
    }
}
