pub mod config;
pub mod detection;
pub mod error;
pub mod frame_loop;
pub mod models;
pub mod pipeline;

pub use config::{BlurKind, PipelineConfig, Quirks};
pub use detection::{BallPipeline, FrameAnalysis};
pub use error::{CaptureError, ConfigError, FrameProcessingFailure};
pub use frame_loop::{FrameLoop, LoopReport, LoopState, StopReason};
pub use models::{BoundingBox, Detection, LineSegment, TargetEstimate};
pub use pipeline::{DebugConfig, Pipeline, PipelineContext, PipelineData, PipelineStep};
