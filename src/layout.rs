//! Text layout: paragraph-aware greedy word wrap plus the vertical placement
//! formula shared by every caption style.
//!
//! Placement must be bit-for-bit reproducible between stamping and detection
//! (the LED style scans pixels at the same coordinates it later draws at),
//! so both live here as pure functions.

/// Horizontal padding reserved on each side of the canvas.
pub const SIDE_PADDING: f32 = 50.0;
/// Extra slack subtracted from the wrap width on top of the padding.
pub const WRAP_SLACK: f32 = 40.0;

/// Measurement seam so the wrap algorithm stays pure and testable; the
/// production implementation is `fonts::TextPainter`.
pub trait TextMeasure {
    fn text_width(&self, text: &str, font_size: f32) -> f32;
}

pub fn max_text_width(canvas_width: u32) -> f32 {
    canvas_width as f32 - SIDE_PADDING * 2.0 - WRAP_SLACK
}

/// Splits on explicit line breaks first (intentional breaks survive), then
/// greedily packs words left to right. A single word wider than `max_width`
/// is kept on its own line rather than split. Blank paragraphs are dropped.
pub fn wrap_text(
    measure: &dyn TextMeasure,
    text: &str,
    max_width: f32,
    font_size: f32,
) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        if paragraph.trim().is_empty() {
            continue;
        }

        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_owned()
            } else {
                format!("{current} {word}")
            };

            if measure.text_width(&candidate, font_size) > max_width && !current.is_empty() {
                lines.push(std::mem::replace(&mut current, word.to_owned()));
            } else {
                current = candidate;
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextPosition {
    /// Baseline of the first wrapped line.
    pub start_y: f32,
    pub line_height: f32,
}

/// Vertical placement of the wrapped block. `text_height_percent` is
/// inverted: 100 anchors near the top of the canvas, 0 near the bottom.
pub fn text_position(
    canvas_height: u32,
    line_count: usize,
    font_size: f32,
    text_height_percent: f32,
) -> TextPosition {
    let line_height = font_size * 1.2;
    let total_text_height = line_count as f32 * line_height;
    let vertical_range = canvas_height as f32 - total_text_height - font_size * 0.8;
    let inverted_percent = 100.0 - text_height_percent;
    let start_y = vertical_range * inverted_percent / 100.0 + font_size * 1.6;

    TextPosition {
        start_y,
        line_height,
    }
}

/// Wrap results cached per (text, font size, canvas width); recomputing the
/// wrap every frame is wasted measurement work for a static subtitle.
#[derive(Debug, Default)]
pub struct WrapCache {
    key: Option<(String, u32, u32)>,
    lines: Vec<String>,
}

impl WrapCache {
    pub fn lines(
        &mut self,
        measure: &dyn TextMeasure,
        text: &str,
        font_size: f32,
        canvas_width: u32,
    ) -> &[String] {
        let key = (text.to_owned(), font_size.to_bits(), canvas_width);
        if self.key.as_ref() != Some(&key) {
            self.lines = wrap_text(measure, text, max_text_width(canvas_width), font_size);
            self.key = Some(key);
        }
        &self.lines
    }

    pub fn clear(&mut self) {
        self.key = None;
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ten pixels per character, like a fixed-pitch font.
    struct FixedMeasure;

    impl TextMeasure for FixedMeasure {
        fn text_width(&self, text: &str, _font_size: f32) -> f32 {
            text.chars().count() as f32 * 10.0
        }
    }

    #[test]
    fn wrapped_lines_stay_within_max_width() {
        let text = "the quick brown fox jumps over the lazy dog";
        let max_width = 120.0;
        let lines = wrap_text(&FixedMeasure, text, max_width, 20.0);

        assert!(lines.len() > 1);
        for line in &lines {
            assert!(
                FixedMeasure.text_width(line, 20.0) <= max_width,
                "line '{line}' exceeds max width"
            );
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn overlong_single_word_keeps_its_own_line() {
        let lines = wrap_text(&FixedMeasure, "hi incomprehensibilities no", 100.0, 20.0);
        assert_eq!(lines, vec!["hi", "incomprehensibilities", "no"]);
    }

    #[test]
    fn explicit_breaks_are_preserved_and_blank_paragraphs_dropped() {
        let lines = wrap_text(&FixedMeasure, "one\n\n  \ntwo three", 1000.0, 20.0);
        assert_eq!(lines, vec!["one", "two three"]);
    }

    #[test]
    fn empty_text_yields_no_lines() {
        assert!(wrap_text(&FixedMeasure, "", 100.0, 20.0).is_empty());
        assert!(wrap_text(&FixedMeasure, "   \n  ", 100.0, 20.0).is_empty());
    }

    #[test]
    fn position_matches_reference_formula() {
        let position = text_position(1000, 2, 50.0, 50.0);
        assert_eq!(position.line_height, 60.0);
        // range = 1000 - 120 - 40 = 840; start_y = 840 * 0.5 + 80 = 500
        assert!((position.start_y - 500.0).abs() < 1e-4);
    }

    #[test]
    fn higher_percent_moves_block_upward() {
        let mut previous = f32::INFINITY;
        for percent in [0.0_f32, 25.0, 50.0, 75.0, 100.0] {
            let position = text_position(720, 3, 48.0, percent);
            assert!(
                position.start_y <= previous,
                "start_y should not move down as percent rises"
            );
            previous = position.start_y;
        }
    }

    #[test]
    fn wrap_cache_recomputes_only_on_key_change() {
        let mut cache = WrapCache::default();
        let first = cache.lines(&FixedMeasure, "a b c", 20.0, 200).to_vec();
        let second = cache.lines(&FixedMeasure, "a b c", 20.0, 200).to_vec();
        assert_eq!(first, second);

        let changed = cache.lines(&FixedMeasure, "d e f", 20.0, 200).to_vec();
        assert_ne!(first, changed);
    }
}
