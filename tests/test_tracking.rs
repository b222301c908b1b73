//! End-to-end detection on synthetic frames.
//!
//! Tests cover:
//! - Locating a bright rectangle with the legacy and corrected quirks
//! - Locating discs, including an orange ball under the default tuning
//! - Following the target as it moves between frames
//! - Per-stage debug dumps

mod common;

use std::sync::Arc;

use balltrack::Quirks;
use balltrack::pipeline::frame_debug_dir;
use common::*;
use image::Rgb;

// White 38x38 block after blurring and thresholding; pixel centers 21..=58.
const RECT: (u32, u32, u32, u32) = (20, 20, 40, 40);

fn found(estimate: TargetEstimate) -> (f64, f64) {
    match estimate {
        TargetEstimate::Found { x, y } => (x, y),
        TargetEstimate::NotFound => panic!("target was not found"),
    }
}

#[test]
fn test_locates_white_rectangle() -> anyhow::Result<()> {
    let pipeline = BallPipeline::new(white_target_config())?;
    let frame = Arc::new(white_rect_frame(RECT.0, RECT.1, RECT.2, RECT.3));

    let analysis = pipeline.process(frame, 0)?;
    assert!(!analysis.segments.is_empty(), "rectangle edges should be found");

    let masked = analysis.masked.to_rgb8();
    assert_eq!(masked.get_pixel(40, 40).0, [255, 255, 255]);
    assert_eq!(masked.get_pixel(20, 20).0, [0, 0, 0], "blurred corner is masked out");

    let (x, y) = found(analysis.estimate());
    assert_near(x, 39.5, 1.5);
    assert_near(y, 39.5, 1.5);
    Ok(())
}

#[test]
fn test_corrected_quirks_use_every_segment() -> anyhow::Result<()> {
    let config = PipelineConfig {
        quirks: Quirks::corrected(),
        ..white_target_config()
    };
    let pipeline = BallPipeline::new(config)?;
    let frame = Arc::new(white_rect_frame(RECT.0, RECT.1, RECT.2, RECT.3));

    let analysis = pipeline.process(frame, 0)?;
    let detection = analysis.detection.expect("target should be found");
    assert!(detection.bbox.width() >= 30.0, "box spans the block: {:?}", detection.bbox);
    assert!(detection.bbox.height() >= 30.0, "box spans the block: {:?}", detection.bbox);
    assert_near(detection.x, 39.5, 1.5);
    assert_near(detection.y, 39.5, 1.5);
    Ok(())
}

#[test]
fn test_follows_moving_target() -> anyhow::Result<()> {
    let pipeline = BallPipeline::new(white_target_config())?;
    let left = pipeline.process(Arc::new(white_rect_frame(10, 25, 24, 24)), 0)?;
    let right = pipeline.process(Arc::new(white_rect_frame(46, 25, 24, 24)), 1)?;

    let (lx, ly) = found(left.estimate());
    let (rx, ry) = found(right.estimate());
    assert_near(rx - lx, 36.0, 2.0);
    assert_near(ry, ly, 1.5);
    Ok(())
}

#[test]
fn test_locates_white_disc() -> anyhow::Result<()> {
    let pipeline = BallPipeline::new(white_target_config())?;
    let analysis = pipeline.process(Arc::new(white_disc_frame(40.0, 40.0, 20.0)), 0)?;
    assert!(analysis.segments.len() >= 4, "outline should break into chords");

    let (x, y) = found(analysis.estimate());
    assert_near(x, 40.0, 2.0);
    assert_near(y, 40.0, 2.0);
    Ok(())
}

#[test]
fn test_corrected_quirks_center_on_disc() -> anyhow::Result<()> {
    let config = PipelineConfig {
        quirks: Quirks::corrected(),
        ..white_target_config()
    };
    let pipeline = BallPipeline::new(config)?;
    let analysis = pipeline.process(Arc::new(white_disc_frame(30.0, 45.0, 12.0)), 0)?;

    let (x, y) = found(analysis.estimate());
    assert_near(x, 30.0, 1.5);
    assert_near(y, 45.0, 1.5);
    Ok(())
}

#[test]
fn test_default_config_finds_orange_ball() -> anyhow::Result<()> {
    let pipeline = BallPipeline::new(PipelineConfig::default())?;
    let frame = disc_frame(320, 240, 150.0, 110.0, 40.0, Rgb([255, 80, 0]));

    let analysis = pipeline.process(Arc::new(frame), 0)?;
    let (x, y) = found(analysis.estimate());
    assert_near(x, 150.0, 4.0);
    assert_near(y, 110.0, 4.0);
    Ok(())
}

#[test]
fn test_black_frame_is_not_found() -> anyhow::Result<()> {
    let pipeline = BallPipeline::new(white_target_config())?;
    let analysis = pipeline.process(Arc::new(black_frame()), 0)?;
    assert_eq!(analysis.estimate(), TargetEstimate::NotFound);
    assert!(analysis.detection.is_none());
    Ok(())
}

#[test]
fn test_debug_dump_writes_each_filter_stage() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_root = dir.path().join("debug");
    let pipeline = BallPipeline::new(white_target_config())?.with_debug(debug_root.clone())?;

    pipeline.process(Arc::new(white_rect_frame(RECT.0, RECT.1, RECT.2, RECT.3)), 7)?;

    let frame_dir = frame_debug_dir(&debug_root, 7);
    for stem in ["00_input", "01_blur", "02_hsv_threshold", "03_mask", "04_erode"] {
        assert!(frame_dir.join(format!("{stem}.png")).exists(), "missing {stem}");
    }
    assert!(!frame_dir.join("05_find_lines.png").exists());
    Ok(())
}
