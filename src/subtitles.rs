use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// One caption segment. Produced upstream (transcription/format parsing is
/// not this crate's job); consumed here as already-structured records.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Subtitle {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Word-level timing record, used only by the neon style.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Word {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubtitleDoc {
    #[serde(default)]
    segments: Vec<Subtitle>,
    #[serde(default)]
    words: Vec<Word>,
}

/// Time-ordered subtitle timeline with point lookup.
///
/// Segments may overlap in malformed upstream data; lookup deliberately
/// returns the first segment in list order whose interval contains the
/// timestamp and does not try to resolve the ambiguity.
#[derive(Debug, Clone, Default)]
pub struct SubtitleTrack {
    segments: Vec<Subtitle>,
    words: Vec<Word>,
}

impl SubtitleTrack {
    /// Builds a track, dropping records with malformed timing. Dropped
    /// records are counted and reported by the caller, never fatal.
    pub fn new(segments: Vec<Subtitle>, words: Vec<Word>) -> (Self, usize) {
        let total = segments.len() + words.len();

        let mut segments: Vec<Subtitle> = segments
            .into_iter()
            .filter(|segment| valid_interval(segment.start, segment.end))
            .collect();
        let mut words: Vec<Word> = words
            .into_iter()
            .filter(|word| valid_interval(word.start, word.end))
            .collect();

        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        words.sort_by(|a, b| a.start.total_cmp(&b.start));

        let dropped = total - segments.len() - words.len();
        (Self { segments, words }, dropped)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read subtitles {}", path.display()))?;
        let doc: SubtitleDoc = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse subtitle json {}", path.display()))?;

        let (track, dropped) = Self::new(doc.segments, doc.words);
        if dropped > 0 {
            eprintln!(
                "[subburn] warning: skipped {dropped} subtitle record(s) with malformed timing in {}",
                path.display()
            );
        }
        Ok(track)
    }

    /// First segment whose `[start, end)` interval contains `timestamp`.
    pub fn active_at(&self, timestamp: f64) -> Option<&Subtitle> {
        self.segments
            .iter()
            .find(|segment| timestamp >= segment.start && timestamp < segment.end)
    }

    /// Words overlapping `[window_start, window_end]`, in transcript order.
    pub fn words_overlapping(&self, window_start: f64, window_end: f64) -> Vec<Word> {
        self.words
            .iter()
            .filter(|word| word.end > window_start && word.start < window_end)
            .cloned()
            .collect()
    }

    pub fn segments(&self) -> &[Subtitle] {
        &self.segments
    }

    pub fn has_words(&self) -> bool {
        !self.words.is_empty()
    }

    /// All distinct characters the renderer will have to rasterize.
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.segments.iter().flat_map(|segment| segment.text.chars())
    }
}

fn valid_interval(start: f64, end: f64) -> bool {
    start.is_finite() && end.is_finite() && start >= 0.0 && end > start
}
