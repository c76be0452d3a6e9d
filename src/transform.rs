use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageError, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::debug;

use crate::crop::CropWindow;
use crate::error::{Result, TimelapseError};

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Quality of re-encoded JPEG frames. Working copies are rewritten once per
/// pass, so the library default of 75 would compound.
pub const JPEG_QUALITY: u8 = 95;

/// What happens to every frame in the main transform pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    /// Window cut out before resizing
    pub crop: Option<CropWindow>,
    /// Exact size the frame is resized to
    pub resize: Option<(u32, u32)>,
    /// Clockwise rotation in degrees, 0 for none
    pub rotation: f64,
}

impl FramePlan {
    /// Nothing to do: frames can be left as they are.
    pub fn is_noop(&self) -> bool {
        self.crop.is_none() && self.resize.is_none() && self.rotation == 0.0
    }

    /// Apply crop, resize and rotation, in that order.
    ///
    /// Fails when the crop window does not fit inside `img`.
    pub fn apply(&self, mut img: DynamicImage) -> Result<DynamicImage> {
        if let Some(window) = self.crop {
            window.validate_against(img.width(), img.height())?;
            img = window.apply(&img);
        }
        if let Some((w, h)) = self.resize {
            if (img.width(), img.height()) != (w, h) {
                img = img.resize_exact(w, h, FilterType::Lanczos3);
            }
        }
        if self.rotation != 0.0 {
            img = rotate(img, self.rotation);
        }
        Ok(img)
    }
}

/// Run `plan` over every frame, overwriting each file in place.
///
/// Frames are handled one at a time in the given order; the first frame
/// that fails to decode or encode aborts the pass.
pub fn transform_frames<F>(frames: &[PathBuf], plan: &FramePlan, progress: F) -> Result<()>
where
    F: Fn(usize, usize),
{
    let total = frames.len();
    for (idx, path) in frames.iter().enumerate() {
        let img = open_frame(path)?;
        let img = plan.apply(img).map_err(|err| match err {
            TimelapseError::InvalidCrop { window, reason } => {
                TimelapseError::InvalidCrop { window, reason: format!("{} in {}", reason, path.display()) }
            }
            other => other,
        })?;
        save_frame(&img, path)?;
        debug!(frame = %path.display(), "Transformed frame");
        progress(idx + 1, total);
    }
    Ok(())
}

/// Add black bars of `side_bars` pixels to the left and right of every
/// frame, in place.
pub fn letterbox_frames<F>(frames: &[PathBuf], side_bars: u32, progress: F) -> Result<()>
where
    F: Fn(usize, usize),
{
    let total = frames.len();
    for (idx, path) in frames.iter().enumerate() {
        let img = open_frame(path)?;
        save_frame(&add_side_bars(&img, side_bars), path)?;
        progress(idx + 1, total);
    }
    Ok(())
}

/// Rotate `img` clockwise by `degrees`.
///
/// Quarter turns are exact. Other angles rotate on a canvas large enough
/// to hold the whole picture, with the uncovered corners filled black.
pub fn rotate(img: DynamicImage, degrees: f64) -> DynamicImage {
    let turn = degrees.rem_euclid(360.0);
    let is = |target: f64| (turn - target).abs() < 1e-9;
    if is(0.0) || is(360.0) {
        return img;
    }
    if is(90.0) {
        return img.rotate90();
    }
    if is(180.0) {
        return img.rotate180();
    }
    if is(270.0) {
        return img.rotate270();
    }

    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    let theta = turn.to_radians();
    let (cos, sin) = (theta.cos().abs(), theta.sin().abs());
    let bound_w = ((w as f64 * cos + h as f64 * sin).ceil() as u32).max(w);
    let bound_h = ((w as f64 * sin + h as f64 * cos).ceil() as u32).max(h);

    let mut canvas = RgbImage::from_pixel(bound_w, bound_h, BLACK);
    imageops::replace(&mut canvas, &rgb, ((bound_w - w) / 2) as i64, ((bound_h - h) / 2) as i64);
    DynamicImage::ImageRgb8(rotate_about_center(&canvas, theta as f32, Interpolation::Bilinear, BLACK))
}

/// Pad `img` with `side_bars` black columns on each side.
pub fn add_side_bars(img: &DynamicImage, side_bars: u32) -> DynamicImage {
    let rgb = img.to_rgb8();
    let mut canvas = RgbImage::from_pixel(rgb.width() + 2 * side_bars, rgb.height(), BLACK);
    imageops::replace(&mut canvas, &rgb, side_bars as i64, 0);
    DynamicImage::ImageRgb8(canvas)
}

pub(crate) fn open_frame(path: &Path) -> Result<DynamicImage> {
    let img = image::open(path).map_err(|source| TimelapseError::Image { path: path.to_path_buf(), source })?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

fn save_frame(img: &DynamicImage, path: &Path) -> Result<()> {
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    let saved = if is_jpeg {
        fs::File::create(path)
            .map_err(ImageError::IoError)
            .and_then(|file| img.write_with_encoder(JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY)))
    } else {
        img.save(path)
    };
    saved.map_err(|source| TimelapseError::Image { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marked(w: u32, h: u32) -> DynamicImage {
        let mut img = RgbImage::from_pixel(w, h, Rgb([200, 200, 200]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn quarter_turns_are_exact() {
        let img = marked(4, 2);
        let r = rotate(img.clone(), 90.0);
        assert_eq!((r.width(), r.height()), (2, 4));
        // Top-left moves to top-right on a clockwise quarter turn.
        assert_eq!(r.to_rgb8().get_pixel(1, 0), &Rgb([255, 0, 0]));

        let r = rotate(img.clone(), -90.0);
        assert_eq!(r.to_rgb8().get_pixel(0, 3), &Rgb([255, 0, 0]));

        let r = rotate(img.clone(), 180.0);
        assert_eq!(r.to_rgb8().get_pixel(3, 1), &Rgb([255, 0, 0]));

        let r = rotate(img, 360.0);
        assert_eq!(r.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn arbitrary_angle_grows_canvas() {
        let r = rotate(marked(40, 20), 45.0);
        assert!(r.width() >= 42 && r.height() >= 42, "{}x{}", r.width(), r.height());
        assert_eq!(r.to_rgb8().get_pixel(0, 0), &BLACK);
    }

    #[test]
    fn side_bars_pad_left_and_right() {
        let padded = add_side_bars(&marked(3, 5), 2);
        assert_eq!((padded.width(), padded.height()), (7, 5));
        let rgb = padded.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &BLACK);
        assert_eq!(rgb.get_pixel(1, 4), &BLACK);
        assert_eq!(rgb.get_pixel(2, 0), &Rgb([255, 0, 0]));
        assert_eq!(rgb.get_pixel(4, 4), &Rgb([200, 200, 200]));
        assert_eq!(rgb.get_pixel(6, 2), &BLACK);
    }

    #[test]
    fn plan_crops_before_resizing() {
        let plan = FramePlan { crop: Some(CropWindow::new(20, 10, 5, 5)), resize: Some((8, 4)), rotation: 0.0 };
        let out = plan.apply(marked(40, 30)).unwrap();
        assert_eq!((out.width(), out.height()), (8, 4));
        assert!(!plan.is_noop());
        assert!(FramePlan { crop: None, resize: None, rotation: 0.0 }.is_noop());
    }

    #[test]
    fn frames_are_rewritten_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<PathBuf> = ["a.png", "b.png"].iter().map(|n| dir.path().join(n)).collect();
        for f in &frames {
            marked(30, 20).save(f).unwrap();
        }
        let plan = FramePlan { crop: None, resize: Some((15, 10)), rotation: 90.0 };
        let seen = std::cell::Cell::new(0);

        transform_frames(&frames, &plan, |done, _| seen.set(done)).unwrap();
        assert_eq!(seen.get(), 2);
        for f in &frames {
            let img = image::open(f).unwrap();
            assert_eq!((img.width(), img.height()), (10, 15));
        }

        letterbox_frames(&frames, 3, |_, _| {}).unwrap();
        assert_eq!(image::open(&frames[1]).unwrap().width(), 16);
    }

    #[test]
    fn unreadable_frame_aborts_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.png");
        let bad = dir.path().join("b.png");
        marked(4, 4).save(&good).unwrap();
        std::fs::write(&bad, b"not a png").unwrap();

        let plan = FramePlan { crop: None, resize: Some((2, 2)), rotation: 0.0 };
        let err = transform_frames(&[good, bad.clone()], &plan, |_, _| {}).unwrap_err();
        match err {
            TimelapseError::Image { path, .. } => assert_eq!(path, bad),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn crop_window_is_checked_on_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let wide = dir.path().join("a.png");
        let narrow = dir.path().join("b.png");
        marked(40, 30).save(&wide).unwrap();
        marked(20, 30).save(&narrow).unwrap();

        let plan = FramePlan { crop: Some(CropWindow::new(30, 20, 5, 5)), resize: Some((15, 10)), rotation: 0.0 };
        let err = transform_frames(&[wide.clone(), narrow], &plan, |_, _| {}).unwrap_err();
        match err {
            TimelapseError::InvalidCrop { reason, .. } => assert!(reason.contains("b.png"), "{reason}"),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(image::image_dimensions(&wide).unwrap(), (15, 10));
    }

    #[test]
    fn jpeg_frames_keep_high_quality() {
        let dir = tempfile::tempdir().unwrap();
        let mut img = RgbImage::new(64, 64);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 4) as u8, (y * 4) as u8, ((x * y) % 256) as u8]);
        }
        let img = DynamicImage::ImageRgb8(img);

        let default_quality = dir.path().join("default.jpg");
        img.save(&default_quality).unwrap();
        let frame = dir.path().join("frame.jpg");
        save_frame(&img, &frame).unwrap();

        let size = |p: &Path| fs::metadata(p).unwrap().len();
        assert!(size(&frame) > size(&default_quality));
        assert_eq!(image::image_dimensions(&frame).unwrap(), (64, 64));
    }
}
