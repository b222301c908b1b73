pub mod filters;
pub mod lines;
pub mod locator;
pub mod steps;

use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;

use crate::config::PipelineConfig;
use crate::error::{ConfigError, FrameProcessingFailure};
use crate::models::{Detection, LineSegment, TargetEstimate};
use crate::pipeline::Pipeline;

/// Everything one frame produced.
#[derive(Clone)]
pub struct FrameAnalysis {
    /// Captured frame with everything outside the colour mask zeroed
    pub masked: DynamicImage,
    pub segments: Vec<LineSegment>,
    pub detection: Option<Detection>,
}

impl FrameAnalysis {
    pub fn estimate(&self) -> TargetEstimate {
        self.detection.into()
    }
}

/// The fixed blur → threshold → mask → erode → lines → locate sequence.
pub struct BallPipeline {
    config: PipelineConfig,
    pipeline: Pipeline,
}

impl BallPipeline {
    /// Validate `config` and assemble the stages. An invalid config never
    /// yields a pipeline.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pipeline = build_standard_pipeline(&config);
        Ok(Self { config, pipeline })
    }

    /// Dump every stage's image for every frame into `output_dir`.
    pub fn with_debug(mut self, output_dir: PathBuf) -> anyhow::Result<Self> {
        self.pipeline = self.pipeline.with_debug(output_dir)?;
        Ok(self)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.pipeline.step_names()
    }

    /// Run the whole sequence on one frame.
    pub fn process(
        &self,
        frame: Arc<DynamicImage>,
        frame_index: u64,
    ) -> Result<FrameAnalysis, FrameProcessingFailure> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(FrameProcessingFailure::EmptyFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }
        let data = self.pipeline.run(frame, frame_index)?;
        let masked = data.masked.ok_or_else(|| FrameProcessingFailure::Step {
            step: "Mask".to_string(),
            source: anyhow::anyhow!("mask stage produced no output"),
        })?;
        Ok(FrameAnalysis {
            masked,
            segments: data.segments,
            detection: data.detection,
        })
    }
}

/// Build the standard ball-tracking pipeline from a validated config
pub fn build_standard_pipeline(config: &PipelineConfig) -> Pipeline {
    use crate::detection::steps::*;

    Pipeline::new()
        .add_step(Arc::new(BlurStep {
            kind: config.blur,
            radius: config.blur_radius,
        }))
        .add_step(Arc::new(HsvThresholdStep { ranges: config.hsv }))
        .add_step(Arc::new(MaskStep))
        .add_step(Arc::new(ErodeStep {
            config: config.erode.clone(),
        }))
        .add_step(Arc::new(LineExtractionStep {
            options: config.lines,
            skip_first_segment: config.quirks.skip_first_segment,
        }))
        .add_step(Arc::new(LocateStep {
            first_endpoint_only: config.quirks.first_endpoint_only,
        }))
}
