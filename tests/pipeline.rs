//! End-to-end render pipeline test against an in-memory frame sink.
//!
//! Needs a real TTF to rasterize; scans the usual system font directories
//! and skips (passing) when none is installed, so CI boxes without fonts
//! stay green.

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use subburn::driver::FrameDriver;
use subburn::encoding::CollectingSink;
use subburn::schema::load_and_validate_job;
use subburn::subtitles::SubtitleTrack;

fn find_system_font() -> Option<PathBuf> {
    let roots = [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/System/Library/Fonts",
    ];
    let mut candidates = Vec::new();
    for root in roots {
        collect_ttf(Path::new(root), &mut candidates);
    }

    // Prefer fonts known to carry Latin glyphs; an arbitrary symbol font
    // would fail codepoint validation.
    let preferred = ["dejavu", "liberation", "freesans", "noto", "arial"];
    candidates
        .iter()
        .find(|path| {
            let name = path.to_string_lossy().to_lowercase();
            preferred.iter().any(|hint| name.contains(hint))
        })
        .or_else(|| candidates.first())
        .cloned()
}

fn collect_ttf(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_ttf(&path, out);
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf"))
        {
            out.push(path);
        }
    }
}

fn frame_has_visible_pixels(frame: &[u8]) -> bool {
    frame.chunks_exact(4).any(|px| px[3] > 0)
}

#[test]
fn holographic_run_produces_exact_frame_schedule() {
    let Some(font) = find_system_font() else {
        eprintln!("no system ttf font found, skipping pipeline test");
        return;
    };

    let dir = tempfile::tempdir().unwrap();

    // Solid magenta 100x100 style asset.
    let mut style = RgbaImage::new(100, 100);
    for px in style.pixels_mut() {
        *px = Rgba([255, 0, 255, 255]);
    }
    let style_path = dir.path().join("style.png");
    style.save(&style_path).unwrap();

    let subs_path = dir.path().join("subs.json");
    fs::write(
        &subs_path,
        r#"{"segments": [{"start": 0.0, "end": 1.0, "text": "HI"}]}"#,
    )
    .unwrap();

    let job_path = dir.path().join("job.yaml");
    fs::write(
        &job_path,
        format!(
            "input: source.mp4\n\
             subtitles: subs.json\n\
             environment:\n\
             \x20 width: 200\n\
             \x20 height: 120\n\
             \x20 fps: 10\n\
             \x20 duration: 2.0\n\
             caption:\n\
             \x20 style: holographic\n\
             \x20 font: {}\n\
             \x20 font_size: 40\n\
             \x20 style_image: style.png\n",
            font.display()
        ),
    )
    .unwrap();

    let job = load_and_validate_job(&job_path).unwrap();
    let track = SubtitleTrack::load(&job.subtitles).unwrap();
    let config = job.to_render_config().unwrap();

    let mut driver = FrameDriver::new(config, track).unwrap();
    let mut sink = CollectingSink::default();
    let frames = driver.run(&mut sink).unwrap();

    assert_eq!(frames, 20);
    assert_eq!(sink.frames.len(), 20);
    assert!(sink.finished);

    for frame in &sink.frames {
        assert_eq!(frame.len(), 200 * 120 * 4);
    }

    // Subtitle active for the first second only.
    for (index, frame) in sink.frames.iter().enumerate() {
        let visible = frame_has_visible_pixels(frame);
        if index < 10 {
            assert!(visible, "frame {index} should show the caption");
        } else {
            assert!(!visible, "frame {index} should be fully transparent");
        }
    }
}

#[test]
fn silent_rainbow_run_emits_transparent_frames_every_tick() {
    let Some(font) = find_system_font() else {
        eprintln!("no system ttf font found, skipping pipeline test");
        return;
    };

    let dir = tempfile::tempdir().unwrap();
    let subs_path = dir.path().join("subs.json");
    fs::write(&subs_path, r#"{"segments": []}"#).unwrap();

    let job_path = dir.path().join("job.yaml");
    fs::write(
        &job_path,
        format!(
            "input: source.mp4\n\
             subtitles: subs.json\n\
             environment:\n\
             \x20 width: 64\n\
             \x20 height: 64\n\
             \x20 fps: 5\n\
             \x20 duration: 1.0\n\
             caption:\n\
             \x20 style: rainbow\n\
             \x20 font: {}\n",
            font.display()
        ),
    )
    .unwrap();

    let job = load_and_validate_job(&job_path).unwrap();
    let track = SubtitleTrack::load(&job.subtitles).unwrap();
    let mut driver = FrameDriver::new(job.to_render_config().unwrap(), track).unwrap();
    let mut sink = CollectingSink::default();

    assert_eq!(driver.run(&mut sink).unwrap(), 5);
    for frame in &sink.frames {
        // Particles draw to the scratch surface only; with no subtitle the
        // output stays transparent.
        assert!(!frame_has_visible_pixels(frame));
    }
}
