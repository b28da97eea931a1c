//! The four caption styles. Each keeps its animation state in one variant of
//! [`EffectState`], owned by the frame driver and dispatched per frame; no
//! style can observe another style's state.

mod holographic;
mod led;
mod neon;
mod rainbow;

pub use holographic::HolographicEffect;
pub use led::{detect_dots, LedEffect, LED_TILE_SIZE};
pub use neon::{word_alpha, NeonEffect};
pub use rainbow::RainbowEffect;

use anyhow::Result;

use crate::fonts::TextPainter;
use crate::layout::{text_position, TextPosition};
use crate::raster::{CoverageMask, Surface};
use crate::schema::{CaptionStyle, RenderConfig};
use crate::subtitles::{Subtitle, SubtitleTrack};

/// Stroke radius for text outlines; a ring of this radius reads as a ~4px
/// border at caption sizes.
pub(crate) const OUTLINE_RADIUS: u32 = 2;

pub enum EffectState {
    Holographic(HolographicEffect),
    Rainbow(RainbowEffect),
    Led(LedEffect),
    Neon(NeonEffect),
}

impl EffectState {
    /// Builds the state for the configured style, loading style assets up
    /// front so a missing resource fails before the frame loop starts.
    pub fn for_style(config: &RenderConfig, seed: u64) -> Result<Self> {
        Ok(match config.style {
            CaptionStyle::Holographic => Self::Holographic(HolographicEffect::new(config)?),
            CaptionStyle::Rainbow => Self::Rainbow(RainbowEffect::new(
                config.width,
                config.height,
                seed,
            )),
            CaptionStyle::Led => Self::Led(LedEffect::new(seed)),
            CaptionStyle::Neon => Self::Neon(NeonEffect::new()),
        })
    }

    /// Renders the active subtitle for one frame.
    pub fn render(
        &mut self,
        surface: &mut Surface,
        aux: &mut Surface,
        painter: &mut TextPainter,
        config: &RenderConfig,
        subtitle: &Subtitle,
        track: &SubtitleTrack,
        timestamp: f64,
    ) -> Result<()> {
        match self {
            Self::Holographic(effect) => effect.render(surface, painter, config, subtitle, timestamp),
            Self::Rainbow(effect) => effect.render(surface, aux, painter, config, subtitle),
            Self::Led(effect) => effect.render(surface, aux, painter, config, subtitle),
            Self::Neon(effect) => {
                effect.render(surface, painter, config, subtitle, track, timestamp)
            }
        }
    }

    /// Per-frame upkeep when no subtitle is active. Text-keyed caches reset;
    /// the rainbow particle field keeps falling so it does not visibly snap
    /// when the next subtitle appears.
    pub fn on_silence(&mut self, aux: &mut Surface) {
        match self {
            Self::Holographic(effect) => effect.reset_text_cache(),
            Self::Rainbow(effect) => effect.advance_and_draw(aux),
            Self::Led(effect) => effect.reset_text_cache(),
            Self::Neon(effect) => effect.reset_text_cache(),
        }
    }
}

/// Deterministic splitmix64 stream; the effects need jitter, not
/// cryptographic randomness, and a seeded stream keeps renders reproducible.
#[derive(Debug, Clone)]
pub struct Prng(u64);

impl Prng {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Wrapped lines centered horizontally, stamped into `mask` at the shared
/// placement. Every style goes through this so LED detection coordinates
/// match display coordinates exactly.
pub(crate) fn stamp_block(
    painter: &mut TextPainter,
    mask: &mut CoverageMask,
    lines: &[String],
    font_size: f32,
    canvas_width: u32,
    position: TextPosition,
) {
    use crate::layout::TextMeasure;

    for (index, line) in lines.iter().enumerate() {
        let line_width = painter.text_width(line, font_size);
        let x = (canvas_width as f32 - line_width) / 2.0;
        let baseline_y = position.start_y + index as f32 * position.line_height;
        painter.stamp_line(mask, line, font_size, x, baseline_y);
    }
}

pub(crate) fn block_position(config: &RenderConfig, line_count: usize) -> TextPosition {
    text_position(
        config.height,
        line_count,
        config.font_size,
        config.text_height_percent,
    )
}
