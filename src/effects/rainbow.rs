//! Rainbow style: a dense field of falling colored squares, visible only
//! through the text mask. The particle field advances every frame of the run,
//! subtitle or not, so color motion stays continuous across caption gaps.

use crate::fonts::TextPainter;
use crate::layout::WrapCache;
use crate::raster::{Composite, CoverageMask, Rgba, Surface};
use crate::schema::RenderConfig;
use crate::subtitles::Subtitle;

use super::{block_position, stamp_block, Prng, OUTLINE_RADIUS};

const PARTICLE_COUNT: usize = 30_000;
const FALL_SPEED: f32 = 2.0;
const COLOR_ZOOM: f32 = 3.0;
const BASE_SIZE: f32 = 20.0;
/// Hue stops the diagonal gradient interpolates between, in degrees.
const HUE_STOPS: [f32; 8] = [0.0, 30.0, 60.0, 120.0, 180.0, 240.0, 270.0, 300.0];
/// Respawn height above the top edge after a particle falls off the bottom.
const RESPAWN_Y: f32 = -50.0;

#[derive(Debug, Clone)]
pub(crate) struct Particle {
    pub x: f32,
    pub y: f32,
    pub speed_var: f32,
    pub size_var: f32,
    pub lightness: f32,
}

pub struct RainbowEffect {
    particles: Vec<Particle>,
    color_offset: f32,
    prng: Prng,
    width: u32,
    height: u32,
    wrap: WrapCache,
    mask: CoverageMask,
}

impl RainbowEffect {
    pub fn new(width: u32, height: u32, seed: u64) -> Self {
        Self::with_count(width, height, seed, PARTICLE_COUNT)
    }

    pub(crate) fn with_count(width: u32, height: u32, seed: u64, count: usize) -> Self {
        let mut prng = Prng::new(seed);
        let particles = (0..count)
            .map(|_| spawn(&mut prng, width as f32, Some(height as f32)))
            .collect();
        Self {
            particles,
            color_offset: 0.0,
            prng,
            width,
            height,
            wrap: WrapCache::default(),
            mask: CoverageMask::new(width, height),
        }
    }

    /// One simulation step plus a full redraw of the field onto `aux`.
    pub fn advance_and_draw(&mut self, aux: &mut Surface) {
        aux.clear();
        self.color_offset += FALL_SPEED * 0.002;

        let width = self.width as f32;
        let height = self.height as f32;
        for particle in &mut self.particles {
            particle.y += FALL_SPEED * particle.speed_var;
            if particle.y > height {
                *particle = spawn(&mut self.prng, width, None);
            }

            let diagonal = (particle.x + particle.y) / (width + height);
            let hue = gradient_hue(diagonal * COLOR_ZOOM - self.color_offset);
            let color = hsl_to_rgb(hue, 0.8, particle.lightness / 100.0);
            let size = BASE_SIZE * particle.size_var;
            aux.fill_rect(particle.x, particle.y, size, size, color, Composite::SourceOver);
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
        self.advance_and_draw(aux);

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
        surface.composite_from(aux, Composite::SourceIn);

        let outline = self.mask.stroke_ring(OUTLINE_RADIUS);
        surface.blend_mask(&outline, [255, 255, 255, 255], 1.0, Composite::SourceOver);
        Ok(())
    }

    pub fn reset_text_cache(&mut self) {
        self.wrap.clear();
    }

    #[cfg(test)]
    pub(crate) fn particles(&self) -> &[Particle] {
        &self.particles
    }
}

fn spawn(prng: &mut Prng, width: f32, initial_height: Option<f32>) -> Particle {
    Particle {
        x: prng.next_f32() * width,
        y: match initial_height {
            Some(height) => prng.next_f32() * height,
            None => RESPAWN_Y,
        },
        speed_var: 0.8 + prng.next_f32() * 0.4,
        size_var: 0.8 + prng.next_f32() * 0.4,
        lightness: 40.0 + prng.next_f32() * 20.0,
    }
}

/// Interpolates between adjacent hue stops for a position wrapped into
/// `[0, 1)`.
fn gradient_hue(position: f32) -> f32 {
    let mut wrapped = position % 1.0;
    if wrapped < 0.0 {
        wrapped += 1.0;
    }
    let index = wrapped * (HUE_STOPS.len() - 1) as f32;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    let blend = index - lower as f32;
    HUE_STOPS[lower] * (1.0 - blend) + HUE_STOPS[upper] * blend
}

/// Standard HSL to RGB, hue in degrees, s/l in `[0, 1]`.
fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> Rgba {
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let h = (hue.rem_euclid(360.0)) / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    [
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
        255,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particles_fall_and_respawn_above_the_frame() {
        let height = 120u32;
        let mut effect = RainbowEffect::with_count(160, height, 3, 200);
        let mut aux = Surface::new(160, height).unwrap();

        for _ in 0..500 {
            let before: Vec<f32> = effect.particles().iter().map(|p| p.y).collect();
            effect.advance_and_draw(&mut aux);
            for (particle, &previous_y) in effect.particles().iter().zip(&before) {
                if particle.y == RESPAWN_Y {
                    continue; // just respawned
                }
                assert!(particle.y > previous_y, "particles must fall monotonically");
                assert!(
                    particle.y <= height as f32 + FALL_SPEED * 1.2,
                    "particle overshot the bottom without respawning"
                );
            }
        }
    }

    #[test]
    fn color_offset_advances_every_step() {
        let mut effect = RainbowEffect::with_count(64, 64, 1, 10);
        let mut aux = Surface::new(64, 64).unwrap();
        let before = effect.color_offset;
        effect.advance_and_draw(&mut aux);
        assert!(effect.color_offset > before);
    }

    #[test]
    fn gradient_hue_hits_the_stops() {
        assert_eq!(gradient_hue(0.0), 0.0);
        assert_eq!(gradient_hue(1.0), 0.0); // wraps
        let last = 6.0 / 7.0 + 1e-7;
        assert!((gradient_hue(last) - 270.0).abs() < 1.0);
    }

    #[test]
    fn hsl_primaries_convert_exactly() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), [255, 0, 0, 255]);
        assert_eq!(hsl_to_rgb(120.0, 1.0, 0.5), [0, 255, 0, 255]);
        assert_eq!(hsl_to_rgb(240.0, 1.0, 0.5), [0, 0, 255, 255]);
        assert_eq!(hsl_to_rgb(0.0, 0.0, 1.0), [255, 255, 255, 255]);
    }
}
