//! Local preview of the masked frame with the detection overlay.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::models::Detection;

/// Radius of the circle drawn around the centroid, in pixels.
pub const CENTROID_MARKER_RADIUS: i32 = 50;

const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const OVERLAY_THICKNESS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Continue,
    /// The operator asked to quit.
    Quit,
}

pub trait FrameDisplay {
    /// Render one frame. Also the point where local key presses are observed.
    fn show(
        &mut self,
        frame_index: u64,
        frame: &DynamicImage,
        detection: Option<&Detection>,
    ) -> Result<DisplayEvent>;
}

/// Copy of `frame` with the bounding box and a centroid circle drawn on
/// top when a target was found.
pub fn draw_overlay(frame: &DynamicImage, detection: Option<&Detection>) -> RgbImage {
    let mut canvas = frame.to_rgb8();
    let Some(detection) = detection else {
        return canvas;
    };

    let bbox = detection.bbox;
    let left = bbox.x2 as i32;
    let top = bbox.y2 as i32;
    let width = (bbox.x1 as i32 - left + 1).max(1) as u32;
    let height = (bbox.y1 as i32 - top + 1).max(1) as u32;
    let center = (detection.x as i32, detection.y as i32);

    for t in 0..OVERLAY_THICKNESS {
        let rect = Rect::at(left - t, top - t).of_size(width + 2 * t as u32, height + 2 * t as u32);
        draw_hollow_rect_mut(&mut canvas, rect, OVERLAY_COLOR);
        draw_hollow_circle_mut(&mut canvas, center, CENTROID_MARKER_RADIUS + t, OVERLAY_COLOR);
    }
    canvas
}

/// Headless display.
pub struct NullDisplay;

impl FrameDisplay for NullDisplay {
    fn show(&mut self, _: u64, _: &DynamicImage, _: Option<&Detection>) -> Result<DisplayEvent> {
        Ok(DisplayEvent::Continue)
    }
}

/// Writes each annotated frame as `frame_NNNNN.png` into a directory.
pub struct DirectoryDisplay {
    dir: PathBuf,
}

impl DirectoryDisplay {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create display directory {}", dir.display()))?;
        Ok(Self { dir })
    }
}

impl FrameDisplay for DirectoryDisplay {
    fn show(
        &mut self,
        frame_index: u64,
        frame: &DynamicImage,
        detection: Option<&Detection>,
    ) -> Result<DisplayEvent> {
        let path = self.dir.join(format!("frame_{:05}.png", frame_index));
        draw_overlay(frame, detection)
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(DisplayEvent::Continue)
    }
}

/// Adds a quit key to another display: a line starting with `q` on stdin
/// makes the next `show` report [`DisplayEvent::Quit`].
pub struct StdinQuitKey<D> {
    inner: D,
    pressed: Arc<AtomicBool>,
}

impl<D: FrameDisplay> StdinQuitKey<D> {
    /// Watch stdin on a background thread.
    pub fn stdin(inner: D) -> Self {
        let pressed = Arc::new(AtomicBool::new(false));
        let flag = pressed.clone();
        let spawned = thread::Builder::new()
            .name("quit-key".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    match line {
                        Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                            info!("quit key pressed");
                            flag.store(true, Ordering::SeqCst);
                            break;
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
            });
        if let Err(err) = spawned {
            warn!("failed to start quit-key watcher: {err}");
        }
        Self { inner, pressed }
    }

    /// Use an externally controlled flag instead of stdin.
    pub fn with_flag(inner: D, pressed: Arc<AtomicBool>) -> Self {
        Self { inner, pressed }
    }
}

impl<D: FrameDisplay> FrameDisplay for StdinQuitKey<D> {
    fn show(
        &mut self,
        frame_index: u64,
        frame: &DynamicImage,
        detection: Option<&Detection>,
    ) -> Result<DisplayEvent> {
        let event = self.inner.show(frame_index, frame, detection)?;
        if self.pressed.load(Ordering::SeqCst) {
            return Ok(DisplayEvent::Quit);
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn detection() -> Detection {
        Detection {
            bbox: BoundingBox {
                x1: 150.0,
                y1: 120.0,
                x2: 50.0,
                y2: 40.0,
            },
            x: 100.0,
            y: 80.0,
        }
    }

    #[test]
    fn overlay_draws_box_and_circle() {
        let frame = DynamicImage::ImageRgb8(RgbImage::new(200, 200));
        let out = draw_overlay(&frame, Some(&detection()));
        assert_eq!(out.get_pixel(50, 40).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(150, 120).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(100, 80 - CENTROID_MARKER_RADIUS as u32).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(100, 80).0, [0, 0, 0]);
    }

    #[test]
    fn no_overlay_without_detection() {
        let frame = DynamicImage::ImageRgb8(RgbImage::new(20, 20));
        let out = draw_overlay(&frame, None);
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn degenerate_box_still_draws() {
        let mut single = detection();
        single.bbox = BoundingBox {
            x1: 10.0,
            y1: 10.0,
            x2: 10.0,
            y2: 10.0,
        };
        single.x = 10.0;
        single.y = 10.0;
        let frame = DynamicImage::ImageRgb8(RgbImage::new(30, 30));
        let out = draw_overlay(&frame, Some(&single));
        assert_eq!(out.get_pixel(10, 10).0, [255, 255, 255]);
    }

    #[test]
    fn directory_display_writes_frames() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut display = DirectoryDisplay::new(dir.path().join("preview")).unwrap();
        let frame = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        assert_eq!(display.show(3, &frame, None).unwrap(), DisplayEvent::Continue);
        assert!(dir.path().join("preview").join("frame_00003.png").exists());
    }

    #[test]
    fn quit_flag_turns_into_quit_event() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut display = StdinQuitKey::with_flag(NullDisplay, flag.clone());
        let frame = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        assert_eq!(display.show(0, &frame, None).unwrap(), DisplayEvent::Continue);
        flag.store(true, Ordering::SeqCst);
        assert_eq!(display.show(1, &frame, None).unwrap(), DisplayEvent::Quit);
    }
}
