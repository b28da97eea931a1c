//! Holographic style: white text mask filled by a slowly scrolling still
//! image, with a black outline. Pure function of the timestamp; the only
//! state carried across frames is the decoded image and the wrap cache.

use anyhow::{anyhow, Context, Result};

use crate::fonts::TextPainter;
use crate::layout::WrapCache;
use crate::raster::{Composite, CoverageMask, Surface};
use crate::schema::RenderConfig;
use crate::subtitles::Subtitle;

use super::{block_position, stamp_block, OUTLINE_RADIUS};

/// Full up-then-down scroll takes `2 * SCROLL_PERIOD` seconds.
const SCROLL_PERIOD: f64 = 100.0;
/// The scroll strip is this many canvas heights tall.
const SCROLL_SPAN: f32 = 5.0;

pub struct HolographicEffect {
    image: Vec<u8>,
    image_width: u32,
    image_height: u32,
    wrap: WrapCache,
    mask: CoverageMask,
}

impl HolographicEffect {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let path = config
            .style_image
            .as_deref()
            .ok_or_else(|| anyhow!("holographic style requires a style image"))?;
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode style image {}", path.display()))?
            .into_rgba8();
        let (image_width, image_height) = decoded.dimensions();

        Ok(Self {
            image: decoded.into_raw(),
            image_width,
            image_height,
            wrap: WrapCache::default(),
            mask: CoverageMask::new(config.width, config.height),
        })
    }

    pub fn render(
        &mut self,
        surface: &mut Surface,
        painter: &mut TextPainter,
        config: &RenderConfig,
        subtitle: &Subtitle,
        timestamp: f64,
    ) -> Result<()> {
        let lines = self
            .wrap
            .lines(painter, &subtitle.text, config.font_size, config.width)
            .to_vec();
        if lines.is_empty() {
            return Ok(());
        }
        let position = block_position(config, lines.len());

        self.mask.clear();
        stamp_block(
            painter,
            &mut self.mask,
            &lines,
            config.font_size,
            config.width,
            position,
        );
        surface.blend_mask(&self.mask, [255, 255, 255, 255], 1.0, Composite::SourceOver);

        // Triangular ping-pong scroll through a strip several screens tall.
        let progress = (timestamp % (SCROLL_PERIOD * 2.0)) / SCROLL_PERIOD;
        let y_dir = (if progress <= 1.0 { progress } else { 2.0 - progress }) as f32;

        let canvas_width = config.width as f32;
        let canvas_height = config.height as f32;
        let strip_height = canvas_height * SCROLL_SPAN;
        let scroll_y = y_dir * (strip_height - canvas_height);

        let aspect = self.image_width as f32 / self.image_height as f32;
        let draw_height = strip_height;
        let draw_width = draw_height * aspect;
        let draw_x = (canvas_width - draw_width) / 2.0;
        let draw_y = -scroll_y;

        let scale_x = draw_width / self.image_width as f32;
        let scale_y = draw_height / self.image_height as f32;
        surface.composite_image(
            &self.image,
            self.image_width,
            self.image_height,
            -draw_x / scale_x,
            -draw_y / scale_y,
            canvas_width / scale_x,
            canvas_height / scale_y,
            Composite::SourceIn,
        );

        let outline = self.mask.stroke_ring(OUTLINE_RADIUS);
        surface.blend_mask(&outline, [0, 0, 0, 255], 1.0, Composite::SourceOver);
        Ok(())
    }

    pub fn reset_text_cache(&mut self) {
        self.wrap.clear();
    }
}
