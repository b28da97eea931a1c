//! Neon style: each word is a glass tube that flickers on when its
//! transcript interval starts and fades after it ends. Words are laid out by
//! consuming wrapped lines in reading order, so the word records must line up
//! with the same wrap the other styles use.

use crate::fonts::TextPainter;
use crate::layout::{TextMeasure, WrapCache};
use crate::raster::{Composite, CoverageMask, Surface};
use crate::schema::RenderConfig;
use crate::subtitles::{Subtitle, SubtitleTrack, Word};

use super::{block_position, OUTLINE_RADIUS};

/// Ramp from floor to full brightness after a word starts.
const ATTACK_SECONDS: f64 = 0.15;
/// Decay back to the floor after a word ends.
const RELEASE_SECONDS: f64 = 0.3;
/// A tube that is "off" still glows faintly.
const ALPHA_FLOOR: f32 = 0.05;
/// Lead/trail slack when matching word records to the subtitle window.
const WORD_WINDOW_TOLERANCE: f64 = 0.1;

const OFF_OUTLINE: [u8; 4] = [30, 30, 30, 255];
const FILAMENT_WHITE: [u8; 4] = [255, 255, 255, 255];

/// Brightness envelope for one word. Linear attack over
/// [`ATTACK_SECONDS`], hold at 1.0 until `end`, linear release over
/// [`RELEASE_SECONDS`], clamped to `[ALPHA_FLOOR, 1.0]` everywhere.
pub fn word_alpha(timestamp: f64, start: f64, end: f64) -> f32 {
    let raw = if timestamp < start {
        f64::from(ALPHA_FLOOR)
    } else if timestamp <= end {
        f64::from(ALPHA_FLOOR) + (1.0 - f64::from(ALPHA_FLOOR)) * (timestamp - start) / ATTACK_SECONDS
    } else {
        1.0 - (1.0 - f64::from(ALPHA_FLOOR)) * (timestamp - end) / RELEASE_SECONDS
    };
    (raw as f32).clamp(ALPHA_FLOOR, 1.0)
}

pub struct NeonEffect {
    wrap: WrapCache,
    word_mask: CoverageMask,
    glow: CoverageMask,
}

impl NeonEffect {
    pub fn new() -> Self {
        Self {
            wrap: WrapCache::default(),
            word_mask: CoverageMask::new(0, 0),
            glow: CoverageMask::new(0, 0),
        }
    }

    pub fn render(
        &mut self,
        surface: &mut Surface,
        painter: &mut TextPainter,
        config: &RenderConfig,
        subtitle: &Subtitle,
        track: &SubtitleTrack,
        timestamp: f64,
    ) -> anyhow::Result<()> {
        let lines = self
            .wrap
            .lines(painter, &subtitle.text, config.font_size, config.width)
            .to_vec();
        if lines.is_empty() {
            return Ok(());
        }
        let position = block_position(config, lines.len());

        let words = track.words_overlapping(
            subtitle.start - WORD_WINDOW_TOLERANCE,
            subtitle.end + WORD_WINDOW_TOLERANCE,
        );

        if self.word_mask.width() != config.width || self.word_mask.height() != config.height {
            self.word_mask = CoverageMask::new(config.width, config.height);
            self.glow = CoverageMask::new(config.width, config.height);
        }

        let space_width = painter.text_width(" ", config.font_size);
        let halo_radius = ((config.font_size * 0.1).round() as u32).max(2);
        let tube_radius = ((config.font_size * 0.04).round() as u32).max(1);

        let mut word_records = words.iter();
        for (line_index, line) in lines.iter().enumerate() {
            let line_width = painter.text_width(line, config.font_size);
            let baseline_y = position.start_y + line_index as f32 * position.line_height;
            let mut x = (config.width as f32 - line_width) / 2.0;

            for token in line.split_whitespace() {
                let alpha = match word_records.next() {
                    Some(record) => timed_alpha(record, timestamp),
                    // More tokens than transcript words; keep the rest lit.
                    None => 1.0,
                };

                self.draw_word(
                    surface,
                    painter,
                    config,
                    token,
                    config.font_size,
                    x,
                    baseline_y,
                    alpha,
                    halo_radius,
                    tube_radius,
                );
                x += painter.text_width(token, config.font_size) + space_width;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_word(
        &mut self,
        surface: &mut Surface,
        painter: &mut TextPainter,
        config: &RenderConfig,
        token: &str,
        font_size: f32,
        x: f32,
        baseline_y: f32,
        alpha: f32,
        halo_radius: u32,
        tube_radius: u32,
    ) {
        self.word_mask.clear();
        painter.stamp_line(&mut self.word_mask, token, font_size, x, baseline_y);
        if self.word_mask.is_empty() {
            return;
        }

        let outline = self.word_mask.stroke_ring(OUTLINE_RADIUS);
        surface.blend_mask(&outline, OFF_OUTLINE, 1.0, Composite::SourceOver);

        if alpha <= ALPHA_FLOOR + 0.01 {
            return;
        }

        // Wide soft halo behind everything.
        self.glow.clone_from(&self.word_mask);
        self.glow.blur(halo_radius, 3);
        surface.blend_mask(&self.glow, config.halo_color, alpha, Composite::Lighter);

        // Tighter glow hugging the stroke, the tube itself.
        self.glow.clone_from(&outline);
        self.glow.blur(tube_radius, 3);
        surface.blend_mask(&self.glow, config.tube_color, alpha, Composite::Lighter);

        if alpha > 0.5 {
            let filament_alpha = (alpha - 0.5) / 0.5;
            let filament = self.word_mask.stroke_ring(1);
            surface.blend_mask(&filament, FILAMENT_WHITE, filament_alpha, Composite::Lighter);
            if alpha > 0.9 {
                surface.blend_mask(&filament, FILAMENT_WHITE, 1.0, Composite::Lighter);
            }
        }
    }

    pub fn reset_text_cache(&mut self) {
        self.wrap.clear();
    }
}

impl Default for NeonEffect {
    fn default() -> Self {
        Self::new()
    }
}

fn timed_alpha(record: &Word, timestamp: f64) -> f32 {
    word_alpha(timestamp, record.start, record.end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_at_word_start_is_the_floor() {
        assert!((word_alpha(1.0, 1.0, 2.0) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn alpha_reaches_full_after_the_attack() {
        assert!((word_alpha(1.15, 1.0, 2.0) - 1.0).abs() < 1e-6);
        // Held at full through the rest of the interval.
        assert!((word_alpha(1.7, 1.0, 2.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn alpha_decays_to_the_floor_after_release() {
        assert!((word_alpha(2.3, 1.0, 2.0) - 0.05).abs() < 1e-6);
        let mid_release = word_alpha(2.15, 1.0, 2.0);
        assert!(mid_release > 0.05 && mid_release < 1.0);
    }

    #[test]
    fn alpha_is_clamped_for_out_of_range_timestamps() {
        assert_eq!(word_alpha(-100.0, 1.0, 2.0), 0.05);
        assert_eq!(word_alpha(1e9, 1.0, 2.0), 0.05);
        for t in [-5.0, 0.0, 1.0, 1.07, 1.5, 2.0, 2.1, 2.29, 3.0, 50.0] {
            let alpha = word_alpha(t, 1.0, 2.0);
            assert!((0.05..=1.0).contains(&alpha));
        }
    }
}
