//! Burns animated caption overlays onto video. Frames are rasterized on the
//! CPU, one per timestamp, and piped as raw RGBA into an ffmpeg overlay
//! encode of the source video.

pub mod driver;
pub mod effects;
pub mod encoding;
pub mod fonts;
pub mod layout;
pub mod raster;
pub mod schema;
pub mod subtitles;
