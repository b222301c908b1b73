//! Frame acquisition.
//!
//! A [`FrameSource`] hands out frames one at a time and blocks until the
//! next one is available. [`Frames`] wraps any source in a pull-based
//! iterator: lazy, effectively infinite for a live camera, and not
//! restartable once it has ended.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use tracing::{debug, info};

use crate::error::CaptureError;

pub trait FrameSource {
    /// Block until the next frame is available. `Ok(None)` marks the end of
    /// the stream.
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError>;

    /// Release the underlying device. Later calls to `next_frame` yield `None`.
    fn close(&mut self);

    fn frames(&mut self) -> Frames<'_>
    where
        Self: Sized,
    {
        Frames::new(self)
    }
}

/// Pull-based iterator over a frame source. Ends permanently after the
/// first `None` or error.
pub struct Frames<'a> {
    source: &'a mut dyn FrameSource,
    finished: bool,
}

impl<'a> Frames<'a> {
    pub fn new(source: &'a mut dyn FrameSource) -> Self {
        Self {
            source,
            finished: false,
        }
    }

    /// Close the underlying source and end the sequence.
    pub fn close(&mut self) {
        self.source.close();
        self.finished = true;
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<DynamicImage, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.source.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for Frames<'_> {}

/// Capture settings shared by every concrete source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    /// Target framerate; `0` disables pacing.
    pub fps: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 32.0,
        }
    }
}

impl CaptureSettings {
    fn frame_interval(&self) -> Option<Duration> {
        (self.fps > 0.0).then(|| Duration::from_secs_f64(1.0 / self.fps))
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Replays a directory of still images, in file-name order, as if they came
/// from a camera: each frame is resized to the configured resolution,
/// converted to RGB, and released no faster than the target framerate.
pub struct ImageSequenceSource {
    pending: VecDeque<PathBuf>,
    settings: CaptureSettings,
    last_frame: Option<Instant>,
    closed: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, settings: CaptureSettings) -> Result<Self, CaptureError> {
        if !dir.is_dir() {
            return Err(CaptureError::Open {
                path: dir.to_path_buf(),
            });
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();
        info!(dir = %dir.display(), frames = paths.len(), "opened image sequence");

        Ok(Self {
            pending: paths.into(),
            settings,
            last_frame: None,
            closed: false,
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.settings.frame_interval(), self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError> {
        if self.closed {
            return Ok(None);
        }
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };

        let decoded = ImageReader::open(&path)?
            .with_guessed_format()?
            .decode()
            .map_err(|source| CaptureError::Read {
                path: path.clone(),
                source,
            })?;

        let CaptureSettings { width, height, .. } = self.settings;
        let rgb = if decoded.width() == width && decoded.height() == height {
            decoded.to_rgb8()
        } else {
            image::imageops::resize(&decoded.to_rgb8(), width, height, FilterType::Triangle)
        };

        self.pace();
        debug!(path = %path.display(), "captured frame");
        Ok(Some(DynamicImage::ImageRgb8(rgb)))
    }

    fn close(&mut self) {
        if !self.closed {
            info!(skipped = self.pending.len(), "closing image sequence");
        }
        self.closed = true;
        self.pending.clear();
    }
}

/// In-memory source, mostly for tests and for feeding pre-decoded frames.
#[derive(Default)]
pub struct VecSource {
    frames: VecDeque<DynamicImage>,
    delivered: usize,
    closed: bool,
}

impl VecSource {
    pub fn new(frames: impl IntoIterator<Item = DynamicImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            delivered: 0,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError> {
        if self.closed {
            return Ok(None);
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.delivered += 1;
        }
        Ok(frame)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame(value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([value; 3])))
    }

    #[test]
    fn frames_iterator_is_fused() {
        let mut source = VecSource::new([frame(1), frame(2)]);
        let mut frames = source.frames();
        assert!(frames.next().is_some());
        assert!(frames.next().is_some());
        assert!(frames.next().is_none());
        assert!(frames.next().is_none());
    }

    #[test]
    fn closing_ends_the_sequence() {
        let mut source = VecSource::new([frame(1), frame(2), frame(3)]);
        {
            let mut frames = source.frames();
            assert!(frames.next().is_some());
            frames.close();
            assert!(frames.next().is_none());
        }
        assert!(source.is_closed());
        assert_eq!(source.delivered(), 1);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn image_sequence_resizes_in_name_order() {
        let dir = tempfile::TempDir::new().unwrap();
        RgbImage::from_pixel(8, 6, Rgb([200, 0, 0]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbImage::from_pixel(4, 3, Rgb([0, 200, 0]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let settings = CaptureSettings {
            width: 4,
            height: 3,
            fps: 0.0,
        };
        let mut source = ImageSequenceSource::open(dir.path(), settings).unwrap();
        assert_eq!(source.remaining(), 2);

        let first = source.next_frame().unwrap().unwrap().to_rgb8();
        assert_eq!(first.dimensions(), (4, 3));
        assert_eq!(first.get_pixel(0, 0).0, [0, 200, 0]);

        let second = source.next_frame().unwrap().unwrap().to_rgb8();
        assert_eq!(second.dimensions(), (4, 3));
        let red = second.get_pixel(1, 1).0;
        assert!(red[0].abs_diff(200) <= 1 && red[1] == 0 && red[2] == 0, "{red:?}");

        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn missing_directory_fails_to_open() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            ImageSequenceSource::open(&missing, CaptureSettings::default()),
            Err(CaptureError::Open { .. })
        ));
    }

    #[test]
    fn pacing_spaces_frames() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["0.png", "1.png", "2.png"] {
            RgbImage::new(2, 2).save(dir.path().join(name)).unwrap();
        }
        let settings = CaptureSettings {
            width: 2,
            height: 2,
            fps: 50.0,
        };
        let mut source = ImageSequenceSource::open(dir.path(), settings).unwrap();
        let start = Instant::now();
        while source.next_frame().unwrap().is_some() {}
        assert!(start.elapsed() >= Duration::from_millis(39));
    }
}
