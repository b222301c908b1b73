use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::Result;
use tracing::{debug, warn};

use crate::error::FrameProcessingFailure;
use crate::models::{Detection, LineSegment};

/// Data that flows through the pipeline for a single frame
#[derive(Clone)]
pub struct PipelineData {
    /// Output of the most recent image-producing step
    pub image: DynamicImage,

    /// The frame as captured (shared efficiently via Arc)
    pub original: Arc<DynamicImage>,

    /// Masked frame, kept for display after later steps replace `image`
    pub masked: Option<DynamicImage>,

    /// Segments found by line extraction
    pub segments: Vec<LineSegment>,

    /// Located target, if any
    pub detection: Option<Detection>,
}

impl PipelineData {
    /// Create PipelineData for a captured frame
    pub fn from_frame(frame: Arc<DynamicImage>) -> Self {
        Self {
            image: frame.as_ref().clone(),
            original: frame,
            masked: None,
            segments: Vec::new(),
            detection: None,
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Context available to all pipeline steps
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    pub frame_index: u64,
    pub debug: Option<&'a DebugConfig>,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Transform the frame's data. An error fails only the current frame.
    fn process(
        &self,
        data: PipelineData,
        context: &PipelineContext<'_>,
    ) -> Result<PipelineData, FrameProcessingFailure>;

    /// Human-readable name for this step (used in logs and debug file names)
    fn name(&self) -> &str;

    /// Whether the step replaces `PipelineData::image` (and is worth dumping)
    fn produces_image(&self) -> bool {
        true
    }
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    debug: Option<DebugConfig>,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            debug: None,
        }
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Names of the configured steps, in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step on one frame
    pub fn run(
        &self,
        frame: Arc<DynamicImage>,
        frame_index: u64,
    ) -> Result<PipelineData, FrameProcessingFailure> {
        self.run_partial(frame, frame_index, self.steps.len())
    }

    /// Run the pipeline but stop after `num_steps` steps (useful for debugging)
    pub fn run_partial(
        &self,
        frame: Arc<DynamicImage>,
        frame_index: u64,
        num_steps: usize,
    ) -> Result<PipelineData, FrameProcessingFailure> {
        let context = PipelineContext {
            frame_index,
            debug: self.debug.as_ref(),
        };

        let mut data = PipelineData::from_frame(frame);
        if let Some(debug_config) = context.debug {
            save_debug_image(debug_config, frame_index, "00_input", &data.image);
        }

        for (step_idx, step) in self.steps.iter().take(num_steps).enumerate() {
            debug!(frame = frame_index, step = step.name(), "running step");
            data = step.process(data, &context)?;

            if let Some(debug_config) = context.debug {
                if step.produces_image() {
                    let file_stem = format!(
                        "{:02}_{}",
                        step_idx + 1,
                        step.name().to_lowercase().replace(' ', "_")
                    );
                    save_debug_image(debug_config, frame_index, &file_stem, &data.image);
                }
            }
        }

        Ok(data)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory holding one frame's debug images
pub fn frame_debug_dir(root: &Path, frame_index: u64) -> PathBuf {
    root.join(format!("frame_{:05}", frame_index))
}

/// Debug dumps never fail the frame; problems are logged and skipped.
fn save_debug_image(config: &DebugConfig, frame_index: u64, file_stem: &str, image: &DynamicImage) {
    let dir = frame_debug_dir(&config.output_dir, frame_index);
    if let Err(err) = std::fs::create_dir_all(&dir) {
        warn!(dir = %dir.display(), "failed to create debug directory: {err}");
        return;
    }
    let path = dir.join(format!("{file_stem}.png"));
    match image.save(&path) {
        Ok(()) => debug!(path = %path.display(), "saved debug image"),
        Err(err) => warn!(path = %path.display(), "failed to save debug image: {err}"),
    }
}
