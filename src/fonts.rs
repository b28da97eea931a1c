use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::Font;

use crate::layout::TextMeasure;
use crate::raster::CoverageMask;

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

/// Rasterizes caption text into coverage masks. Glyph bitmaps are cached per
/// raster config; the cache lives for the whole run since font and size are
/// fixed per job.
#[derive(Debug)]
pub struct TextPainter {
    font: Font,
    font_name: String,
    glyph_cache: HashMap<fontdue::layout::GlyphRasterConfig, GlyphBitmap>,
}

impl TextPainter {
    pub fn from_path(font_path: &Path) -> Result<Self> {
        let font_bytes = fs::read(font_path)
            .with_context(|| format!("failed to read font file {}", font_path.display()))?;
        Self::from_bytes(font_bytes, &font_path.display().to_string())
    }

    pub fn from_bytes(font_bytes: Vec<u8>, font_name: &str) -> Result<Self> {
        let font = Font::from_bytes(font_bytes, fontdue::FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font {font_name}: {error}"))?;
        Ok(Self {
            font,
            font_name: font_name.to_owned(),
            glyph_cache: HashMap::new(),
        })
    }

    /// Baseline-to-top distance at the given size.
    pub fn ascent(&self, font_size: f32) -> f32 {
        self.font
            .horizontal_line_metrics(font_size)
            .map(|metrics| metrics.ascent)
            .unwrap_or(font_size * 0.8)
    }

    /// Fails fast on glyphs the font cannot draw, so a missing codepoint
    /// surfaces at setup instead of as tofu halfway through an encode.
    pub fn ensure_supported_codepoints(&self, chars: impl Iterator<Item = char>) -> Result<()> {
        for ch in chars {
            if matches!(ch, '\n' | '\r' | '\t' | ' ') {
                continue;
            }
            if self.font.lookup_glyph_index(ch) == 0 {
                return Err(anyhow!(
                    "unsupported codepoint U+{:04X} ({}) in font {}",
                    ch as u32,
                    ch.escape_default(),
                    self.font_name
                ));
            }
        }
        Ok(())
    }

    /// Stamps one line of text into `mask`, anchored so the glyph baseline
    /// sits at `baseline_y` and the line starts at `x`.
    pub fn stamp_line(
        &mut self,
        mask: &mut CoverageMask,
        text: &str,
        font_size: f32,
        x: f32,
        baseline_y: f32,
    ) {
        if text.is_empty() {
            return;
        }

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x,
            y: baseline_y - self.ascent(font_size),
            max_width: None,
            max_height: None,
            horizontal_align: fontdue::layout::HorizontalAlign::Left,
            vertical_align: fontdue::layout::VerticalAlign::Top,
            line_height: 1.0,
            wrap_style: fontdue::layout::WrapStyle::Letter,
            wrap_hard_breaks: false,
        });
        layout.append(&[&self.font], &TextStyle::new(text, font_size, 0));

        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let glyph_bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = self.font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    bitmap,
                }
            });

            let gx = glyph.x.round() as i32;
            let gy = glyph.y.round() as i32;
            for row in 0..glyph_bitmap.height {
                for col in 0..glyph_bitmap.width {
                    let coverage = glyph_bitmap.bitmap[row * glyph_bitmap.width + col];
                    if coverage == 0 {
                        continue;
                    }
                    mask.accumulate(gx + col as i32, gy + row as i32, coverage);
                }
            }
        }
    }
}

impl TextMeasure for TextPainter {
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, font_size).advance_width)
            .sum()
    }
}
