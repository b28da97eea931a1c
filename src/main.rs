use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use subburn::driver::FrameDriver;
use subburn::encoding::{FfmpegMode, FfmpegPipe};
use subburn::schema::load_and_validate_job;
use subburn::subtitles::SubtitleTrack;

#[derive(Debug, Parser)]
#[command(name = "subburn")]
#[command(about = "Burns animated caption overlays into video")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a job manifest into an output video.
    Render {
        job: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long = "ffmpeg", value_enum, default_value_t = CliFfmpegMode::Auto)]
        ffmpeg: CliFfmpegMode,
    },
    /// Validate a job manifest and its subtitle records without rendering.
    Check {
        job: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliFfmpegMode {
    Auto,
    System,
    Sidecar,
}

impl From<CliFfmpegMode> for FfmpegMode {
    fn from(mode: CliFfmpegMode) -> Self {
        match mode {
            CliFfmpegMode::Auto => FfmpegMode::Auto,
            CliFfmpegMode::System => FfmpegMode::System,
            CliFfmpegMode::Sidecar => FfmpegMode::Sidecar,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            job,
            output,
            ffmpeg,
        } => run_render(&job, &output, ffmpeg.into()),
        Commands::Check { job } => run_check(&job),
    }
}

fn run_check(job_path: &Path) -> Result<()> {
    let job = load_and_validate_job(job_path)?;
    let track = SubtitleTrack::load(&job.subtitles)?;

    println!(
        "OK: {} ({}x{}, {} fps, {} frames, {:?})",
        job_path.display(),
        job.environment.width,
        job.environment.height,
        job.environment.fps,
        job.environment.total_frames(),
        job.caption.style
    );
    println!(
        "Subtitles: {} segment(s), word timing: {}",
        track.segments().len(),
        if track.has_words() { "yes" } else { "no" }
    );
    Ok(())
}

fn run_render(job_path: &Path, output_path: &Path, mode: FfmpegMode) -> Result<()> {
    let job = load_and_validate_job(job_path)?;
    let track = SubtitleTrack::load(&job.subtitles)?;
    let config = job.to_render_config()?;

    let mut driver = FrameDriver::new(config.clone(), track)?;
    let mut pipe = FfmpegPipe::spawn_with_mode(&config, &job.input, output_path, mode)?;

    match driver.run(&mut pipe) {
        Ok(frames) => {
            println!("Wrote {} ({frames} frames)", output_path.display());
            Ok(())
        }
        Err(error) => {
            // A partial file from a failed encode is worse than no file.
            let _ = fs::remove_file(output_path);
            Err(error).with_context(|| format!("render failed for {}", job_path.display()))
        }
    }
}
