//! The frame loop: one pass over `0..total_frames`, strictly in order, each
//! frame rendered onto a cleared surface and handed to the sink. The sink is
//! where backpressure happens; everything here is synchronous.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::effects::EffectState;
use crate::encoding::FrameSink;
use crate::fonts::TextPainter;
use crate::raster::Surface;
use crate::schema::RenderConfig;
use crate::subtitles::SubtitleTrack;

/// Fixed seed for effect jitter; renders of the same job are reproducible.
const EFFECT_SEED: u64 = 0x73_75_62_62_75_72_6e;

pub struct FrameDriver {
    config: RenderConfig,
    track: SubtitleTrack,
    painter: TextPainter,
    effect: EffectState,
    surface: Surface,
    aux: Surface,
    frame_buf: Vec<u8>,
}

impl FrameDriver {
    /// Validates everything that can fail before the first frame: font
    /// parsing, glyph coverage, style assets, surface allocation.
    pub fn new(config: RenderConfig, track: SubtitleTrack) -> Result<Self> {
        let painter = TextPainter::from_path(&config.font)?;
        painter
            .ensure_supported_codepoints(track.chars())
            .context("subtitle text contains characters the font cannot draw")?;

        let effect = EffectState::for_style(&config, EFFECT_SEED)?;
        let surface = Surface::new(config.width, config.height)?;
        let aux = Surface::new(config.width, config.height)?;

        Ok(Self {
            config,
            track,
            painter,
            effect,
            surface,
            aux,
            frame_buf: Vec::new(),
        })
    }

    /// Renders every frame into `sink` and closes the stream. Returns the
    /// number of frames produced.
    pub fn run(&mut self, sink: &mut dyn FrameSink) -> Result<u64> {
        let total_frames = self.config.total_frames();
        let fps = u64::from(self.config.fps);
        let started = Instant::now();

        for frame_index in 0..total_frames {
            let timestamp = frame_index as f64 / self.config.fps as f64;

            let Self {
                config,
                track,
                painter,
                effect,
                surface,
                aux,
                frame_buf,
            } = self;

            surface.clear();
            match track.active_at(timestamp) {
                Some(subtitle) => {
                    effect.render(surface, aux, painter, config, subtitle, track, timestamp)?
                }
                None => effect.on_silence(aux),
            }

            surface.to_rgba(frame_buf);
            sink.submit(frame_buf.clone())?;

            if frame_index > 0 && frame_index % fps == 0 {
                let elapsed = started.elapsed().as_secs_f64();
                let rate = frame_index as f64 / elapsed;
                let remaining = Duration::from_secs_f64(
                    ((total_frames - frame_index) as f64 / rate).max(0.0),
                );
                eprintln!(
                    "[subburn] progress: {frame_index}/{total_frames} frames ({:.1}%) - {:.1} fps - ETA {}",
                    frame_index as f64 / total_frames as f64 * 100.0,
                    rate,
                    format_elapsed(remaining)
                );
            }
        }

        sink.finish()?;
        Ok(total_frames)
    }
}

/// `1h 2m 3s` / `2m 3s` / `3s`, matching how long encodes actually run.
pub fn format_elapsed(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{seconds}s")
    }
}
