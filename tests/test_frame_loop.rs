//! Integration tests for the frame loop.
//!
//! Tests cover:
//! - Replaying an image directory and publishing one line per frame
//! - Cooperative shutdown dropping the in-flight frame
//! - Per-frame failures mapped to the not-found sentinel
//! - Quit key after publish

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;

use balltrack::frame_loop::display::{NullDisplay, StdinQuitKey};
use balltrack::frame_loop::sink::{LineFormat, LineSink, NOT_FOUND_SENTINEL};
use balltrack::frame_loop::source::{CaptureSettings, ImageSequenceSource};
use common::*;

#[test]
fn test_replays_directory_and_publishes_every_frame() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_frames(
        dir.path(),
        &[
            white_rect_frame(20, 20, 40, 40),
            black_frame(),
            white_rect_frame(30, 20, 40, 40),
        ],
    );
    let settings = CaptureSettings {
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
        fps: 0.0,
    };
    let mut source = ImageSequenceSource::open(dir.path(), settings)?;
    let pipeline = BallPipeline::new(white_target_config())?;
    let mut sink = LineSink::new(Vec::new(), LineFormat::Plain);

    let report = FrameLoop::new(&pipeline, &mut source, &mut sink, &NeverStop).run()?;
    assert_eq!(report.frames, 3);
    assert_eq!(report.found, 2);
    assert_eq!(report.not_found, 1);
    assert_eq!(report.stop_reason, StopReason::EndOfStream);

    let text = String::from_utf8(sink.into_inner())?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], NOT_FOUND_SENTINEL);

    let (x, y) = lines[0].split_once(',').expect("coordinate pair");
    assert_near(x.parse()?, 39.5, 1.5);
    assert_near(y.parse()?, 39.5, 1.5);
    Ok(())
}

#[test]
fn test_shutdown_drops_in_flight_frame() -> anyhow::Result<()> {
    let pipeline = BallPipeline::new(white_target_config())?;
    let mut source = VecSource::new((0..5).map(|_| white_rect_frame(20, 20, 40, 40)));
    let mut sink = RecordingSink::default();
    let shutdown = ScriptedShutdown::stop_on_poll(3);

    let report = FrameLoop::new(&pipeline, &mut source, &mut sink, &shutdown).run()?;

    assert_eq!(sink.published.len(), 2, "third frame must not be published");
    assert_eq!(report.frames, 2);
    assert_eq!(report.stop_reason, StopReason::ShutdownRequested);
    assert_eq!(report.final_state, LoopState::Stopped);
    assert_eq!(shutdown.polls(), 3);
    assert_eq!(source.delivered(), 3);
    assert!(source.is_closed());
    Ok(())
}

#[test]
fn test_controller_thread_stops_the_loop() -> anyhow::Result<()> {
    let slot = SharedSlot::new();
    let controller = slot.clone();
    thread::spawn(move || controller.set(0)).join().expect("controller thread");

    let pipeline = BallPipeline::new(white_target_config())?;
    let mut source = VecSource::new([black_frame(), black_frame()]);
    let mut sink = RecordingSink::default();

    let report = FrameLoop::new(&pipeline, &mut source, &mut sink, &slot).run()?;
    assert!(sink.published.is_empty());
    assert_eq!(report.stop_reason, StopReason::ShutdownRequested);
    assert!(source.is_closed());
    Ok(())
}

#[test]
fn test_failed_frame_publishes_sentinel_and_continues() -> anyhow::Result<()> {
    let pipeline = BallPipeline::new(white_target_config())?;
    let mut source = VecSource::new([
        white_rect_frame(20, 20, 40, 40),
        gray_frame(),
        white_rect_frame(20, 20, 40, 40),
    ]);
    let mut sink = RecordingSink::default();

    let report = FrameLoop::new(&pipeline, &mut source, &mut sink, &NeverStop).run()?;
    assert_eq!(report.frames, 3);
    assert_eq!(report.failures, 1);
    assert!(sink.published[0].is_found());
    assert_eq!(sink.published[1], TargetEstimate::NotFound);
    assert!(sink.published[2].is_found());
    Ok(())
}

#[test]
fn test_quit_key_stops_after_publish() -> anyhow::Result<()> {
    let pipeline = BallPipeline::new(white_target_config())?;
    let mut source = VecSource::new([black_frame(), black_frame(), black_frame()]);
    let mut sink = RecordingSink::default();
    let mut display = StdinQuitKey::with_flag(NullDisplay, Arc::new(AtomicBool::new(true)));

    let report = FrameLoop::new(&pipeline, &mut source, &mut sink, &NeverStop)
        .with_display(&mut display)
        .run()?;
    assert_eq!(sink.published.len(), 1);
    assert_eq!(report.stop_reason, StopReason::QuitKey);
    assert_eq!(report.final_state, LoopState::Stopped);
    assert!(source.is_closed());
    Ok(())
}
