use std::path::PathBuf;

use thiserror::Error;

/// Invalid pipeline configuration. Detected before the frame loop starts and
/// never recovered from.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("blur radius must be positive and finite, got {0}")]
    NonPositiveRadius(f64),
    #[error("unknown blur kind {0:?} (expected box, gaussian, median or bilateral)")]
    UnknownBlurKind(String),
    #[error("{channel} interval is inverted: [{min}, {max}]")]
    InvertedInterval {
        channel: &'static str,
        min: f64,
        max: f64,
    },
    #[error("erosion iterations must be a non-negative finite number, got {0}")]
    NegativeIterations(f64),
    #[error("erosion kernel must have at least one set element")]
    EmptyKernel,
    #[error("erosion kernel row {row} has {len} cells, expected {width}")]
    RaggedKernel { row: usize, len: usize, width: usize },
    #[error("anchor ({x}, {y}) lies outside a {width}x{height} kernel")]
    AnchorOutOfKernel {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
    },
    #[error("line detector {name} must be positive and finite, got {value}")]
    InvalidLineOption { name: &'static str, value: f64 },
    #[error("mask is {mask_width}x{mask_height} but image is {width}x{height}")]
    MaskDimensionMismatch {
        width: u32,
        height: u32,
        mask_width: u32,
        mask_height: u32,
    },
    #[error("failed to load config {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// A failure confined to a single frame. The frame loop maps it to
/// `TargetEstimate::NotFound` and carries on.
#[derive(Debug, Error)]
pub enum FrameProcessingFailure {
    #[error("expected a {expected}-channel frame, got {actual} channels")]
    UnsupportedChannels { expected: u8, actual: u8 },
    #[error("frame has zero area ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error(transparent)]
    Mask(#[from] ConfigError),
    #[error("segment extremum is undefined (non-finite coordinate)")]
    UndefinedExtremum,
    #[error("step {step:?} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors raised by a frame source while acquiring frames.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open frame source {path:?}")]
    Open { path: PathBuf },
    #[error("failed to read frame {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
