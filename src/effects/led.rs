//! LED dot-matrix style. The expensive part, scanning stamped text pixels
//! into dot centroids, runs only when the subtitle text changes; the per-frame
//! work is just animating and drawing the detected dots.

use crate::fonts::TextPainter;
use crate::layout::WrapCache;
use crate::raster::{Composite, CoverageMask, Rgba, Surface};
use crate::schema::RenderConfig;
use crate::subtitles::Subtitle;

use super::{block_position, stamp_block, Prng};

/// Detection tile edge in pixels; one dot per tile at most.
pub const LED_TILE_SIZE: u32 = 8;

/// Channel threshold for a pixel to count as lit text.
const WHITE_THRESHOLD: u8 = 200;

const LED_PALETTE: [Rgba; 8] = [
    [0xff, 0x00, 0x00, 0xff],
    [0xff, 0x88, 0x00, 0xff],
    [0xff, 0xff, 0x00, 0xff],
    [0x88, 0xff, 0x00, 0xff],
    [0x00, 0xff, 0x00, 0xff],
    [0x00, 0xff, 0xff, 0xff],
    [0x00, 0x88, 0xff, 0xff],
    [0x88, 0x00, 0xff, 0xff],
];

#[derive(Debug, Clone)]
struct Dot {
    x: f32,
    y: f32,
    color_index: f32,
    color_speed: f32,
    brightness: f32,
}

pub struct LedEffect {
    dots: Vec<Dot>,
    cached_text: Option<String>,
    prng: Prng,
    wrap: WrapCache,
    mask: CoverageMask,
}

impl LedEffect {
    pub fn new(seed: u64) -> Self {
        Self {
            dots: Vec::new(),
            cached_text: None,
            prng: Prng::new(seed),
            wrap: WrapCache::default(),
            mask: CoverageMask::new(0, 0),
        }
    }

    pub fn render(
        &mut self,
        surface: &mut Surface,
        aux: &mut Surface,
        painter: &mut TextPainter,
        config: &RenderConfig,
        subtitle: &Subtitle,
    ) -> anyhow::Result<()> {
        if self.cached_text.as_deref() != Some(subtitle.text.as_str()) {
            self.detect(aux, painter, config, &subtitle.text);
            self.cached_text = Some(subtitle.text.clone());
        }
        if self.dots.is_empty() {
            return Ok(());
        }

        // Backing panel behind the whole dot field.
        let mut min_x = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for dot in &self.dots {
            min_x = min_x.min(dot.x);
            max_x = max_x.max(dot.x);
            min_y = min_y.min(dot.y);
            max_y = max_y.max(dot.y);
        }
        let padding = config.font_size * 0.5;
        surface.fill_round_rect(
            min_x - padding,
            min_y - padding,
            (max_x - min_x) + padding * 2.0,
            (max_y - min_y) + padding * 2.0,
            config.font_size * 0.3,
            [0, 0, 0, 255],
            Composite::SourceOver,
        );

        let tile = LED_TILE_SIZE as f32;
        for dot in &mut self.dots {
            dot.color_index += dot.color_speed;
            if dot.color_index >= LED_PALETTE.len() as f32 {
                dot.color_index = 0.0;
            }
            dot.brightness += 0.05;
            let brightness = (dot.brightness.sin() + 1.0) / 2.0 * 0.5 + 0.5;
            let color = LED_PALETTE[dot.color_index as usize];

            surface.fill_circle(dot.x, dot.y, tile * 0.3, color, brightness, Composite::SourceOver);
            surface.fill_circle(
                dot.x,
                dot.y,
                tile * 0.5,
                color,
                brightness * 0.3,
                Composite::SourceOver,
            );
        }
        Ok(())
    }

    /// Stamps the text onto the scratch surface and converts lit pixels into
    /// dots with randomized animation phases.
    fn detect(
        &mut self,
        aux: &mut Surface,
        painter: &mut TextPainter,
        config: &RenderConfig,
        text: &str,
    ) {
        self.dots.clear();

        let lines = self
            .wrap
            .lines(painter, text, config.font_size, config.width)
            .to_vec();
        if lines.is_empty() {
            return;
        }
        let position = block_position(config, lines.len());

        if self.mask.width() != config.width || self.mask.height() != config.height {
            self.mask = CoverageMask::new(config.width, config.height);
        }
        self.mask.clear();
        stamp_block(
            painter,
            &mut self.mask,
            &lines,
            config.font_size,
            config.width,
            position,
        );

        aux.clear();
        aux.blend_mask(&self.mask, [255, 255, 255, 255], 1.0, Composite::SourceOver);

        for (x, y) in detect_dots(aux.pixels(), config.width, config.height, LED_TILE_SIZE) {
            self.dots.push(Dot {
                x,
                y,
                color_index: self.prng.next_f32() * LED_PALETTE.len() as f32,
                color_speed: 0.05 + self.prng.next_f32() * 0.1,
                brightness: self.prng.next_f32(),
            });
        }
    }

    pub fn reset_text_cache(&mut self) {
        self.dots.clear();
        self.cached_text = None;
        self.wrap.clear();
    }
}

/// Scans an RGBA buffer in square tiles. A tile yields one dot at the
/// centroid of the near-white pixels in its first row containing any;
/// deterministic for a fixed buffer.
pub fn detect_dots(pixels: &[u8], width: u32, height: u32, tile: u32) -> Vec<(f32, f32)> {
    let mut dots = Vec::new();

    let mut tile_y = 0;
    while tile_y < height {
        let mut tile_x = 0;
        while tile_x < width {
            let mut found = false;
            let mut sum_x = 0.0f32;
            let mut sum_y = 0.0f32;
            let mut count = 0u32;

            'rows: for dy in 0..tile {
                for dx in 0..tile {
                    let x = tile_x + dx;
                    let y = tile_y + dy;
                    if x >= width || y >= height {
                        continue;
                    }
                    let idx = ((y * width + x) * 4) as usize;
                    if pixels[idx] > WHITE_THRESHOLD
                        && pixels[idx + 1] > WHITE_THRESHOLD
                        && pixels[idx + 2] > WHITE_THRESHOLD
                        && pixels[idx + 3] > WHITE_THRESHOLD
                    {
                        found = true;
                        sum_x += x as f32;
                        sum_y += y as f32;
                        count += 1;
                    }
                }
                if found {
                    break 'rows;
                }
            }

            if found && count > 0 {
                dots.push((sum_x / count as f32, sum_y / count as f32));
            }
            tile_x += tile;
        }
        tile_y += tile;
    }

    dots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_buffer(width: u32, height: u32, lit: &[(u32, u32)]) -> Vec<u8> {
        let mut pixels = vec![0u8; (width * height * 4) as usize];
        for &(x, y) in lit {
            let idx = ((y * width + x) * 4) as usize;
            pixels[idx..idx + 4].copy_from_slice(&[255, 255, 255, 255]);
        }
        pixels
    }

    #[test]
    fn one_dot_per_lit_tile_at_the_centroid() {
        // Two lit pixels on the same row of one tile, one in another tile.
        let pixels = white_buffer(32, 16, &[(2, 3), (6, 3), (20, 9)]);
        let dots = detect_dots(&pixels, 32, 16, 8);
        assert_eq!(dots.len(), 2);
        assert_eq!(dots[0], (4.0, 3.0));
        assert_eq!(dots[1], (20.0, 9.0));
    }

    #[test]
    fn detection_is_deterministic() {
        let pixels = white_buffer(64, 64, &[(1, 1), (9, 9), (33, 40), (60, 60)]);
        let first = detect_dots(&pixels, 64, 64, 8);
        let second = detect_dots(&pixels, 64, 64, 8);
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn dim_pixels_are_ignored() {
        let mut pixels = white_buffer(8, 8, &[]);
        let idx = ((3 * 8 + 3) * 4) as usize;
        pixels[idx..idx + 4].copy_from_slice(&[190, 190, 190, 255]);
        assert!(detect_dots(&pixels, 8, 8, 8).is_empty());
    }

    #[test]
    fn empty_buffer_yields_no_dots() {
        let pixels = vec![0u8; 16 * 16 * 4];
        assert!(detect_dots(&pixels, 16, 16, 8).is_empty());
    }
}
