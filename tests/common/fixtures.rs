#![allow(dead_code)]

use std::cell::Cell;
use std::path::Path;

use balltrack::config::{ErodeConfig, HsvRanges, Interval};
use balltrack::frame_loop::shutdown::ShutdownSignal;
use balltrack::frame_loop::sink::PublishSink;
use balltrack::{BlurKind, PipelineConfig, TargetEstimate};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};

pub const FRAME_WIDTH: u32 = 80;
pub const FRAME_HEIGHT: u32 = 80;

/// Black frame with a white `rw` x `rh` rectangle whose top-left pixel is
/// `(x0, y0)`.
pub fn white_rect_frame(x0: u32, y0: u32, rw: u32, rh: u32) -> DynamicImage {
    let img = RgbImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
        if (x0..x0 + rw).contains(&x) && (y0..y0 + rh).contains(&y) {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    });
    DynamicImage::ImageRgb8(img)
}

/// Black `width` x `height` frame with a filled disc of `color` centred on
/// `(cx, cy)`.
pub fn disc_frame(width: u32, height: u32, cx: f64, cy: f64, r: f64, color: Rgb<u8>) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        if (x as f64 - cx).hypot(y as f64 - cy) <= r {
            color
        } else {
            Rgb([0, 0, 0])
        }
    });
    DynamicImage::ImageRgb8(img)
}

/// White disc on a standard-size black frame.
pub fn white_disc_frame(cx: f64, cy: f64, r: f64) -> DynamicImage {
    disc_frame(FRAME_WIDTH, FRAME_HEIGHT, cx, cy, r, Rgb([255, 255, 255]))
}

pub fn black_frame() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(FRAME_WIDTH, FRAME_HEIGHT))
}

/// A single-channel frame, which the colour pipeline rejects.
pub fn gray_frame() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::new(FRAME_WIDTH, FRAME_HEIGHT))
}

/// Config that keeps bright unsaturated pixels: a light 3x3 box blur, any
/// hue, low saturation, high value, and no erosion.
pub fn white_target_config() -> PipelineConfig {
    PipelineConfig {
        blur: BlurKind::Box,
        blur_radius: 1.0,
        hsv: HsvRanges {
            hue: Interval::new(0.0, 180.0),
            saturation: Interval::new(0.0, 30.0),
            value: Interval::new(200.0, 255.0),
        },
        erode: ErodeConfig {
            iterations: 0.0,
            ..ErodeConfig::default()
        },
        ..PipelineConfig::default()
    }
}

/// Write frames as numbered PNGs so they replay in order.
pub fn write_frames(dir: &Path, frames: &[DynamicImage]) {
    for (i, frame) in frames.iter().enumerate() {
        frame
            .save(dir.join(format!("{:03}.png", i)))
            .expect("Failed to save test frame");
    }
}

/// Sink that remembers every estimate it was handed.
#[derive(Default)]
pub struct RecordingSink {
    pub published: Vec<TargetEstimate>,
}

impl PublishSink for RecordingSink {
    fn publish(&mut self, estimate: &TargetEstimate) -> anyhow::Result<()> {
        self.published.push(*estimate);
        Ok(())
    }
}

/// Requests a stop on the `stop_on`-th poll (1-based).
pub struct ScriptedShutdown {
    stop_on: usize,
    polls: Cell<usize>,
}

impl ScriptedShutdown {
    pub fn stop_on_poll(stop_on: usize) -> Self {
        Self {
            stop_on,
            polls: Cell::new(0),
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.get()
    }
}

impl ShutdownSignal for ScriptedShutdown {
    fn stop_requested(&self) -> bool {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        polls >= self.stop_on
    }
}

pub fn assert_near(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} +/- {tolerance}, got {actual}"
    );
}
