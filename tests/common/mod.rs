mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from balltrack for tests
pub use balltrack::frame_loop::shutdown::{NeverStop, SharedSlot, ShutdownSignal};
pub use balltrack::frame_loop::sink::PublishSink;
pub use balltrack::frame_loop::source::{FrameSource, VecSource};
pub use balltrack::{
    BallPipeline, BlurKind, FrameLoop, LoopState, PipelineConfig, StopReason, TargetEstimate,
};
