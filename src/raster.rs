//! CPU raster surfaces and coverage masks.
//!
//! Surfaces store premultiplied RGBA8 (tiny-skia's pixmap layout). Every
//! primitive takes its composite mode as an explicit parameter; there is no
//! ambient "current graphics state" to save and restore.

use anyhow::{anyhow, Result};
use tiny_skia::Pixmap;

/// Straight-alpha color, `[r, g, b, a]`.
pub type Rgba = [u8; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    /// Standard painter's blend.
    SourceOver,
    /// Keep-destination-alpha: the source replaces color but is clipped to
    /// the destination's existing alpha shape.
    SourceIn,
    /// Additive; overlapping draws brighten, used for glow accumulation.
    Lighter,
}

pub struct Surface {
    pixmap: Pixmap,
    width: u32,
    height: u32,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("invalid surface size {width}x{height}"))?;
        Ok(Self {
            pixmap,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self) {
        self.pixmap.data_mut().fill(0);
    }

    /// Premultiplied RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Demultiplies into straight RGBA for the raw-frame handoff. The
    /// encoder's overlay filter expects straight alpha.
    pub fn to_rgba(&self, out: &mut Vec<u8>) {
        let data = self.pixmap.data();
        out.clear();
        out.reserve(data.len());
        for px in data.chunks_exact(4) {
            let a = px[3];
            if a == 0 {
                out.extend_from_slice(&[0, 0, 0, 0]);
            } else if a == 255 {
                out.extend_from_slice(px);
            } else {
                let a16 = u16::from(a);
                out.push(((u16::from(px[0]) * 255 + a16 / 2) / a16).min(255) as u8);
                out.push(((u16::from(px[1]) * 255 + a16 / 2) / a16).min(255) as u8);
                out.push(((u16::from(px[2]) * 255 + a16 / 2) / a16).min(255) as u8);
                out.push(a);
            }
        }
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba, mode: Composite) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let x0 = (x.floor().max(0.0)) as u32;
        let y0 = (y.floor().max(0.0)) as u32;
        let x1 = ((x + w).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((y + h).ceil().max(0.0) as u32).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let sp = premultiply(color, 1.0);
        let width = self.width;
        let data = self.pixmap.data_mut();
        for yy in y0..y1 {
            let row = (yy * width) as usize * 4;
            for xx in x0..x1 {
                blend_px(data, row + xx as usize * 4, sp, mode);
            }
        }
    }

    /// Antialiased filled circle; `alpha` scales the color's alpha.
    pub fn fill_circle(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        color: Rgba,
        alpha: f32,
        mode: Composite,
    ) {
        if radius <= 0.0 || alpha <= 0.0 {
            return;
        }
        let x0 = ((cx - radius).floor().max(0.0)) as u32;
        let y0 = ((cy - radius).floor().max(0.0)) as u32;
        let x1 = (((cx + radius).ceil() + 1.0).max(0.0) as u32).min(self.width);
        let y1 = (((cy + radius).ceil() + 1.0).max(0.0) as u32).min(self.height);

        let width = self.width;
        let data = self.pixmap.data_mut();
        for yy in y0..y1 {
            let row = (yy * width) as usize * 4;
            for xx in x0..x1 {
                let dx = xx as f32 + 0.5 - cx;
                let dy = yy as f32 + 0.5 - cy;
                let coverage = (radius - (dx * dx + dy * dy).sqrt() + 0.5).clamp(0.0, 1.0);
                if coverage <= 0.0 {
                    continue;
                }
                let sp = premultiply(color, alpha * coverage);
                blend_px(data, row + xx as usize * 4, sp, mode);
            }
        }
    }

    /// Rounded rectangle via a signed-distance coverage test.
    pub fn fill_round_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        radius: f32,
        color: Rgba,
        mode: Composite,
    ) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let radius = radius.min(w / 2.0).min(h / 2.0).max(0.0);
        let cx = x + w / 2.0;
        let cy = y + h / 2.0;
        let half_w = w / 2.0 - radius;
        let half_h = h / 2.0 - radius;

        let x0 = (x.floor().max(0.0)) as u32;
        let y0 = (y.floor().max(0.0)) as u32;
        let x1 = (((x + w).ceil() + 1.0).max(0.0) as u32).min(self.width);
        let y1 = (((y + h).ceil() + 1.0).max(0.0) as u32).min(self.height);

        let width = self.width;
        let data = self.pixmap.data_mut();
        for yy in y0..y1 {
            let row = (yy * width) as usize * 4;
            for xx in x0..x1 {
                let qx = ((xx as f32 + 0.5 - cx).abs() - half_w).max(0.0);
                let qy = ((yy as f32 + 0.5 - cy).abs() - half_h).max(0.0);
                let dist = (qx * qx + qy * qy).sqrt();
                let coverage = (radius - dist + 0.5).clamp(0.0, 1.0);
                if coverage <= 0.0 {
                    continue;
                }
                let sp = premultiply(color, coverage);
                blend_px(data, row + xx as usize * 4, sp, mode);
            }
        }
    }

    /// Full-surface composite of `src` onto `self`. With `SourceIn` this is
    /// the "keep destination alpha" step the mask effects rely on: the
    /// result is `src` clipped to the destination's alpha everywhere, and
    /// transparent where either side is transparent.
    pub fn composite_from(&mut self, src: &Surface, mode: Composite) {
        debug_assert_eq!(self.width, src.width);
        debug_assert_eq!(self.height, src.height);

        let src_data = src.pixmap.data();
        let data = self.pixmap.data_mut();
        for (dst_px, src_px) in data.chunks_exact_mut(4).zip(src_data.chunks_exact(4)) {
            let sp = [
                u16::from(src_px[0]),
                u16::from(src_px[1]),
                u16::from(src_px[2]),
                u16::from(src_px[3]),
            ];
            blend_slice(dst_px, sp, mode);
        }
    }

    /// Draws the source-rect `(sx, sy, sw, sh)` of a straight-alpha RGBA
    /// image scaled over the whole surface, nearest-neighbor sampled.
    pub fn composite_image(
        &mut self,
        image: &[u8],
        image_width: u32,
        image_height: u32,
        sx: f32,
        sy: f32,
        sw: f32,
        sh: f32,
        mode: Composite,
    ) {
        if image_width == 0 || image_height == 0 || sw <= 0.0 || sh <= 0.0 {
            return;
        }
        let width = self.width;
        let height = self.height;
        let data = self.pixmap.data_mut();

        for yy in 0..height {
            let v = sy + (yy as f32 + 0.5) / height as f32 * sh;
            let iv = (v.floor().max(0.0) as u32).min(image_height - 1);
            let row = (yy * width) as usize * 4;
            let img_row = (iv * image_width) as usize * 4;
            for xx in 0..width {
                let u = sx + (xx as f32 + 0.5) / width as f32 * sw;
                let iu = (u.floor().max(0.0) as u32).min(image_width - 1);
                let src = &image[img_row + iu as usize * 4..img_row + iu as usize * 4 + 4];
                let sp = premultiply([src[0], src[1], src[2], src[3]], 1.0);
                blend_px(data, row + xx as usize * 4, sp, mode);
            }
        }
    }

    /// Blends a coverage mask as a solid color; `alpha` scales coverage.
    pub fn blend_mask(&mut self, mask: &CoverageMask, color: Rgba, alpha: f32, mode: Composite) {
        debug_assert_eq!(self.width, mask.width);
        debug_assert_eq!(self.height, mask.height);
        if alpha <= 0.0 {
            return;
        }

        let data = self.pixmap.data_mut();
        for (idx, &coverage) in mask.data.iter().enumerate() {
            if coverage == 0 {
                continue;
            }
            let sp = premultiply(color, alpha * f32::from(coverage) / 255.0);
            blend_px(data, idx * 4, sp, mode);
        }
    }
}

/// 8-bit glyph/shape coverage buffer, the intermediate for text fills,
/// stroke rings, and glow blurs.
#[derive(Debug, Clone)]
pub struct CoverageMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl CoverageMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&coverage| coverage == 0)
    }

    /// Max-blends a coverage sample (overlapping glyphs keep the stronger
    /// coverage rather than double-darkening).
    pub fn accumulate(&mut self, x: i32, y: i32, coverage: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = (y as u32 * self.width + x as u32) as usize;
        self.data[idx] = self.data[idx].max(coverage);
    }

    /// Stroke band of the mask's shape: dilation minus erosion with a disc
    /// of `radius` pixels, i.e. an outline of roughly `2 * radius` width
    /// straddling the shape's edge.
    pub fn stroke_ring(&self, radius: u32) -> CoverageMask {
        let offsets = disc_offsets(radius);
        let mut out = CoverageMask::new(self.width, self.height);
        let w = self.width as i32;
        let h = self.height as i32;

        for y in 0..h {
            for x in 0..w {
                let mut max_cov = 0u8;
                let mut min_cov = 255u8;
                for &(dx, dy) in &offsets {
                    let nx = x + dx;
                    let ny = y + dy;
                    let coverage = if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        0
                    } else {
                        self.data[(ny * w + nx) as usize]
                    };
                    max_cov = max_cov.max(coverage);
                    min_cov = min_cov.min(coverage);
                }
                out.data[(y * w + x) as usize] = max_cov.saturating_sub(min_cov);
            }
        }
        out
    }

    /// Separable box blur; `passes >= 3` approximates a gaussian well enough
    /// for glow halos.
    pub fn blur(&mut self, radius: u32, passes: u32) {
        if radius == 0 {
            return;
        }
        let mut scratch = vec![0u8; self.data.len()];
        for _ in 0..passes {
            box_blur_horizontal(&self.data, &mut scratch, self.width, self.height, radius);
            box_blur_vertical(&scratch, &mut self.data, self.width, self.height, radius);
        }
    }
}

fn disc_offsets(radius: u32) -> Vec<(i32, i32)> {
    let r = radius as i32;
    let r2 = r * r;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r2 {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

fn box_blur_horizontal(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: u32) {
    let w = width as i32;
    let window = u32::from(2 * radius + 1);
    for y in 0..height {
        let row = (y * width) as usize;
        let mut sum: u32 = 0;
        for x in 0..=(radius.min(width.saturating_sub(1))) {
            sum += u32::from(src[row + x as usize]);
        }
        for x in 0..w {
            dst[row + x as usize] = (sum / window) as u8;
            let add = x + radius as i32 + 1;
            if add < w {
                sum += u32::from(src[row + add as usize]);
            }
            let sub = x - radius as i32;
            if sub >= 0 {
                sum -= u32::from(src[row + sub as usize]);
            }
        }
    }
}

fn box_blur_vertical(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: u32) {
    let h = height as i32;
    let window = u32::from(2 * radius + 1);
    for x in 0..width {
        let mut sum: u32 = 0;
        for y in 0..=(radius.min(height.saturating_sub(1))) {
            sum += u32::from(src[(y * width + x) as usize]);
        }
        for y in 0..h {
            dst[(y as u32 * width + x) as usize] = (sum / window) as u8;
            let add = y + radius as i32 + 1;
            if add < h {
                sum += u32::from(src[(add as u32 * width + x) as usize]);
            }
            let sub = y - radius as i32;
            if sub >= 0 {
                sum -= u32::from(src[(sub as u32 * width + x) as usize]);
            }
        }
    }
}

/// Straight color + extra alpha scale → premultiplied u16 channels.
fn premultiply(color: Rgba, alpha: f32) -> [u16; 4] {
    let a = (f32::from(color[3]) * alpha.clamp(0.0, 1.0)).round() as u16;
    [
        (u16::from(color[0]) * a + 127) / 255,
        (u16::from(color[1]) * a + 127) / 255,
        (u16::from(color[2]) * a + 127) / 255,
        a,
    ]
}

fn blend_px(data: &mut [u8], idx: usize, sp: [u16; 4], mode: Composite) {
    blend_slice(&mut data[idx..idx + 4], sp, mode);
}

fn blend_slice(dst: &mut [u8], sp: [u16; 4], mode: Composite) {
    match mode {
        Composite::SourceOver => {
            if sp[3] == 0 {
                return;
            }
            let inv = 255 - sp[3];
            for channel in 0..4 {
                let d = u16::from(dst[channel]);
                dst[channel] = (sp[channel] + (d * inv + 127) / 255).min(255) as u8;
            }
        }
        Composite::SourceIn => {
            let da = u16::from(dst[3]);
            for channel in 0..4 {
                dst[channel] = ((sp[channel] * da + 127) / 255) as u8;
            }
        }
        Composite::Lighter => {
            if sp[3] == 0 {
                return;
            }
            for channel in 0..4 {
                let d = u16::from(dst[channel]);
                dst[channel] = (d + sp[channel]).min(255) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(surface: &Surface, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * surface.width() + x) * 4) as usize;
        let data = surface.pixels();
        [data[idx], data[idx + 1], data[idx + 2], data[idx + 3]]
    }

    #[test]
    fn source_over_replaces_with_opaque_color() {
        let mut surface = Surface::new(4, 4).unwrap();
        surface.fill_rect(0.0, 0.0, 4.0, 4.0, [10, 20, 30, 255], Composite::SourceOver);
        surface.fill_rect(1.0, 1.0, 1.0, 1.0, [200, 0, 0, 255], Composite::SourceOver);
        assert_eq!(px(&surface, 1, 1), [200, 0, 0, 255]);
        assert_eq!(px(&surface, 0, 0), [10, 20, 30, 255]);
    }

    #[test]
    fn source_in_clips_to_destination_alpha() {
        let mut surface = Surface::new(2, 1).unwrap();
        // Left pixel opaque, right pixel transparent.
        surface.fill_rect(0.0, 0.0, 1.0, 1.0, [255, 255, 255, 255], Composite::SourceOver);

        let mut layer = Surface::new(2, 1).unwrap();
        layer.fill_rect(0.0, 0.0, 2.0, 1.0, [0, 200, 0, 255], Composite::SourceOver);

        surface.composite_from(&layer, Composite::SourceIn);
        assert_eq!(px(&surface, 0, 0), [0, 200, 0, 255]);
        assert_eq!(px(&surface, 1, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn lighter_accumulates_and_saturates() {
        let mut surface = Surface::new(1, 1).unwrap();
        surface.fill_rect(0.0, 0.0, 1.0, 1.0, [200, 10, 0, 255], Composite::SourceOver);
        surface.fill_rect(0.0, 0.0, 1.0, 1.0, [100, 10, 0, 255], Composite::Lighter);
        assert_eq!(px(&surface, 0, 0), [255, 20, 0, 255]);
    }

    #[test]
    fn stroke_ring_is_hollow() {
        let mut mask = CoverageMask::new(16, 16);
        for y in 4..12 {
            for x in 4..12 {
                mask.accumulate(x, y, 255);
            }
        }
        let ring = mask.stroke_ring(2);
        // Deep interior erased, edge band present.
        assert_eq!(ring.data()[(8 * 16 + 8) as usize], 0);
        assert_eq!(ring.data()[(4 * 16 + 8) as usize], 255);
        assert_eq!(ring.data()[(8 * 16 + 4) as usize], 255);
    }

    #[test]
    fn blur_spreads_coverage_outward() {
        let mut mask = CoverageMask::new(9, 9);
        mask.accumulate(4, 4, 255);
        mask.blur(2, 3);
        assert!(mask.data()[(4 * 9 + 4) as usize] > 0);
        assert!(mask.data()[(4 * 9 + 2) as usize] > 0);
        assert_eq!(mask.data()[0], 0);
    }

    #[test]
    fn demultiply_restores_straight_alpha() {
        let mut surface = Surface::new(1, 1).unwrap();
        surface.fill_rect(0.0, 0.0, 1.0, 1.0, [200, 100, 40, 128], Composite::SourceOver);

        let mut out = Vec::new();
        surface.to_rgba(&mut out);
        assert_eq!(out[3], 128);
        assert!((i16::from(out[0]) - 200).abs() <= 2);
        assert!((i16::from(out[1]) - 100).abs() <= 2);
        assert!((i16::from(out[2]) - 40).abs() <= 2);
    }

    #[test]
    fn round_rect_covers_center_not_corner() {
        let mut surface = Surface::new(20, 20).unwrap();
        surface.fill_round_rect(
            2.0,
            2.0,
            16.0,
            16.0,
            6.0,
            [255, 255, 255, 255],
            Composite::SourceOver,
        );
        assert_eq!(px(&surface, 10, 10)[3], 255);
        assert_eq!(px(&surface, 2, 2)[3], 0);
    }
}
