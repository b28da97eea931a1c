use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::raster::Rgba;

const DEFAULT_TUBE_COLOR: &str = "#ff2d95";
const DEFAULT_HALO_COLOR: &str = "#00eaff";

/// A render job manifest: source video, subtitle records, and the caption
/// styling for one run. Loaded from yaml; relative paths resolve against
/// the manifest's directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Job {
    pub input: PathBuf,
    pub subtitles: PathBuf,
    pub environment: Environment,
    pub caption: CaptionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration: f64,
}

impl Environment {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!(
                "resolution must be positive, got {}x{}",
                self.width,
                self.height
            );
        }
        if self.fps == 0 {
            bail!("fps must be > 0");
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            bail!("duration in seconds must be > 0");
        }
        Ok(())
    }

    pub fn total_frames(&self) -> u64 {
        let frames = (self.duration * f64::from(self.fps)).ceil();
        frames.max(1.0) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionStyle {
    Holographic,
    Rainbow,
    Led,
    Neon,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptionConfig {
    pub style: CaptionStyle,
    pub font: PathBuf,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_text_height")]
    pub text_height_percent: f32,
    /// Required for the holographic style, ignored by the others.
    #[serde(default)]
    pub style_image: Option<PathBuf>,
    #[serde(default)]
    pub tube_color: Option<String>,
    #[serde(default)]
    pub halo_color: Option<String>,
}

fn default_font_size() -> f32 {
    72.0
}

fn default_text_height() -> f32 {
    50.0
}

/// Everything the frame loop reads. Built once from a validated job and
/// immutable for the whole run.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration: f64,
    pub style: CaptionStyle,
    pub font: PathBuf,
    pub font_size: f32,
    pub text_height_percent: f32,
    pub style_image: Option<PathBuf>,
    pub tube_color: Rgba,
    pub halo_color: Rgba,
}

impl RenderConfig {
    pub fn total_frames(&self) -> u64 {
        let frames = (self.duration * f64::from(self.fps)).ceil();
        frames.max(1.0) as u64
    }
}

impl Job {
    pub fn validate(&self) -> Result<()> {
        self.environment.validate()?;

        if !self.caption.font_size.is_finite() || self.caption.font_size <= 0.0 {
            bail!("caption.font_size must be > 0");
        }
        let percent = self.caption.text_height_percent;
        if !percent.is_finite() || percent < 0.0 || percent > 100.0 {
            bail!("caption.text_height_percent must be within 0..=100, got {percent}");
        }

        if self.caption.style == CaptionStyle::Holographic {
            let image = self.caption.style_image.as_deref().ok_or_else(|| {
                anyhow!("caption.style_image is required for the holographic style")
            })?;
            if !image.exists() {
                bail!("style image '{}' does not exist", image.display());
            }
        }

        if let Some(raw) = self.caption.tube_color.as_deref() {
            parse_hex_color(raw).context("invalid caption.tube_color")?;
        }
        if let Some(raw) = self.caption.halo_color.as_deref() {
            parse_hex_color(raw).context("invalid caption.halo_color")?;
        }

        Ok(())
    }

    pub fn to_render_config(&self) -> Result<RenderConfig> {
        let tube_color = match self.caption.tube_color.as_deref() {
            Some(raw) => parse_hex_color(raw).context("invalid caption.tube_color")?,
            None => parse_hex_color(DEFAULT_TUBE_COLOR)?,
        };
        let halo_color = match self.caption.halo_color.as_deref() {
            Some(raw) => parse_hex_color(raw).context("invalid caption.halo_color")?,
            None => parse_hex_color(DEFAULT_HALO_COLOR)?,
        };

        Ok(RenderConfig {
            width: self.environment.width,
            height: self.environment.height,
            fps: self.environment.fps,
            duration: self.environment.duration,
            style: self.caption.style,
            font: self.caption.font.clone(),
            font_size: self.caption.font_size,
            text_height_percent: self.caption.text_height_percent,
            style_image: self.caption.style_image.clone(),
            tube_color,
            halo_color,
        })
    }
}

pub fn load_and_validate_job(path: &Path) -> Result<Job> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read job manifest {}", path.display()))?;
    let mut job: Job = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;

    let job_dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    job.input = resolve_path(&job_dir, &job.input);
    job.subtitles = resolve_path(&job_dir, &job.subtitles);
    job.caption.font = resolve_path(&job_dir, &job.caption.font);
    if let Some(image) = job.caption.style_image.take() {
        job.caption.style_image = Some(resolve_path(&job_dir, &image));
    }

    job.validate()?;
    Ok(job)
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Parses `#rrggbb` (leading '#' optional) into an opaque color.
pub fn parse_hex_color(raw: &str) -> Result<Rgba> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("expected a #rrggbb color, got '{raw}'");
    }
    let r = u8::from_str_radix(&hex[0..2], 16)?;
    let g = u8::from_str_radix(&hex[2..4], 16)?;
    let b = u8::from_str_radix(&hex[4..6], 16)?;
    Ok([r, g, b, 255])
}
