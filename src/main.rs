use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use timelapser::{CropWindow, EncoderKind, Progress, ProgressPhase, TimelapseError, TimelapseOptions, Timelapser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "timelapser.json";

fn load_config(explicit: Option<&Path>) -> Result<TimelapseOptions> {
    if let Some(p) = explicit {
        return TimelapseOptions::from_file(p).with_context(|| format!("loading config {}", p.display()));
    }

    // Look for timelapser.json in the config dir, current dir fallback, then built-in defaults
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::config_dir() {
        d.push("timelapser");
        d.push(CONFIG_FILE);
        tried.push(d);
    }
    tried.push(PathBuf::from(CONFIG_FILE));

    for p in &tried {
        if p.exists() {
            info!(config = %p.display(), "Loading configuration");
            return TimelapseOptions::from_file(p).with_context(|| format!("loading config {}", p.display()));
        }
    }

    Ok(TimelapseOptions::default())
}

#[derive(Parser, Debug)]
#[command(version, about = "Assemble a directory of sequential photographs into a timelapse video.")]
struct Args {
    /// Folder containing the pictures
    #[arg(default_value = ".")]
    path: PathBuf,

    /// File extension to look for [default: jpg]
    #[arg(short, long)]
    extension: Option<String>,

    /// Rotation angle to apply, in degrees clockwise [default: 0]
    #[arg(short, long, allow_negative_numbers = true)]
    rotation: Option<f64>,

    /// New width of the pictures [default: 1080]
    #[arg(short, long)]
    width: Option<u32>,

    /// New height of the pictures [default: 720]
    #[arg(short = 't', long)]
    height: Option<u32>,

    /// Framerate of the timelapse [default: 7]
    #[arg(short, long)]
    framerate: Option<u32>,

    /// Crop window applied to the original pictures, as WxH+X+Y
    #[arg(short, long)]
    crop: Option<CropWindow>,

    /// Encoder used to assemble the video (mencoder or ffmpeg) [default: mencoder]
    #[arg(long)]
    encoder: Option<EncoderKind>,

    /// Configuration file (JSON) providing defaults for the options above
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    /// Flags given on the command line override the configuration file.
    fn apply(&self, mut opts: TimelapseOptions) -> TimelapseOptions {
        if let Some(ext) = &self.extension {
            opts.extension = ext.clone();
        }
        if let Some(rotation) = self.rotation {
            opts.rotation = rotation;
        }
        if let Some(width) = self.width {
            opts.width = width;
        }
        if let Some(height) = self.height {
            opts.height = height;
        }
        if let Some(framerate) = self.framerate {
            opts.framerate = framerate;
        }
        if self.crop.is_some() {
            opts.crop = self.crop;
        }
        if let Some(encoder) = self.encoder {
            opts.encoder = encoder;
        }
        opts
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            let code = err.downcast_ref::<TimelapseError>().map(TimelapseError::exit_code).unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let options = args.apply(load_config(args.config.as_deref())?);
    let root = expand_home(&args.path);

    info!("Starting timelapser v{}", env!("CARGO_PKG_VERSION"));
    info!(
        path = %root.display(),
        extension = %options.extension,
        width = options.width,
        height = options.height,
        framerate = options.framerate,
        encoder = %options.encoder,
        "Options"
    );

    let timelapser = Timelapser::new(options)?;

    // One bar per phase, replaced when the phase changes
    let current: RefCell<Option<(ProgressPhase, ProgressBar)>> = RefCell::new(None);
    let report = timelapser.run_with_progress(&root, |progress: Progress| {
        let mut guard = current.borrow_mut();
        if guard.as_ref().map(|(phase, _)| *phase) != Some(progress.phase) {
            if let Some((_, pb)) = guard.take() {
                pb.finish();
            }
            if progress.phase != ProgressPhase::Complete {
                *guard = Some((progress.phase, new_bar(&progress)));
            }
        }
        if let Some((_, pb)) = guard.as_ref() {
            pb.set_position(progress.completed as u64);
        }
    })?;
    if let Some((_, pb)) = current.borrow_mut().take() {
        pb.finish();
    }

    println!(
        "\nAll done! {} frames assembled into {}",
        report.frames,
        report.video.display()
    );
    Ok(())
}

fn new_bar(progress: &Progress) -> ProgressBar {
    if progress.phase == ProgressPhase::Encoding {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(progress.message.clone());
        pb.enable_steady_tick(Duration::from_millis(120));
        return pb;
    }

    let label = match progress.phase {
        ProgressPhase::Organizing => "Organizing",
        ProgressPhase::Transforming => "Transforming",
        ProgressPhase::Letterboxing => "Side bars",
        _ => "Frames",
    };
    let pb = ProgressBar::new(progress.total as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg:>12} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(label);
    pb
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map(|home| home.join(rest)).unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
