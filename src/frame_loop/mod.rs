//! The acquire → process → publish → display cycle.

pub mod display;
pub mod shutdown;
pub mod sink;
pub mod source;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::detection::BallPipeline;
use crate::models::TargetEstimate;

use display::{DisplayEvent, FrameDisplay};
use shutdown::ShutdownSignal;
use sink::PublishSink;
use source::{FrameSource, Frames};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown slot held a stop value; the in-flight frame was dropped.
    ShutdownRequested,
    QuitKey,
    EndOfStream,
    FrameLimit,
}

/// Summary of one [`FrameLoop::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    /// Frames that went through the pipeline and were published
    pub frames: u64,
    pub found: u64,
    pub not_found: u64,
    /// Frames whose processing failed and were published as not found
    pub failures: u64,
    pub stop_reason: StopReason,
    pub final_state: LoopState,
}

/// Drives a [`BallPipeline`] over a frame source. Everything it touches is
/// injected; the loop keeps no state between frames beyond its counters.
pub struct FrameLoop<'a> {
    pipeline: &'a BallPipeline,
    source: &'a mut dyn FrameSource,
    sink: &'a mut dyn PublishSink,
    shutdown: &'a dyn ShutdownSignal,
    display: Option<&'a mut dyn FrameDisplay>,
    max_frames: Option<u64>,
}

impl<'a> FrameLoop<'a> {
    pub fn new(
        pipeline: &'a BallPipeline,
        source: &'a mut dyn FrameSource,
        sink: &'a mut dyn PublishSink,
        shutdown: &'a dyn ShutdownSignal,
    ) -> Self {
        Self {
            pipeline,
            source,
            sink,
            shutdown,
            display: None,
            max_frames: None,
        }
    }

    pub fn with_display(mut self, display: &'a mut dyn FrameDisplay) -> Self {
        self.display = Some(display);
        self
    }

    /// Stop cleanly after `limit` published frames.
    pub fn with_max_frames(mut self, limit: u64) -> Self {
        self.max_frames = Some(limit);
        self
    }

    /// Run until the stream ends, a stop is requested, or the quit key is
    /// pressed. Capture, publish and display errors end the run with an
    /// error after closing the source; pipeline failures only cost a frame.
    pub fn run(self) -> Result<LoopReport> {
        let FrameLoop {
            pipeline,
            source,
            sink,
            shutdown,
            mut display,
            max_frames,
        } = self;

        let mut state = LoopState::Running;
        let mut report = LoopReport {
            frames: 0,
            found: 0,
            not_found: 0,
            failures: 0,
            stop_reason: StopReason::EndOfStream,
            final_state: LoopState::Running,
        };
        info!(?state, "frame loop started");

        let mut frames = Frames::new(source);
        let mut frame_index = 0u64;

        let stop_reason = loop {
            if max_frames.is_some_and(|limit| report.frames >= limit) {
                frames.close();
                break StopReason::FrameLimit;
            }

            let frame = match frames.next() {
                Some(Ok(frame)) => frame,
                Some(Err(err)) => {
                    frames.close();
                    return Err(err).context("frame capture failed");
                }
                None => break StopReason::EndOfStream,
            };

            // Polled after acquisition and before processing: a stop drops
            // this frame unpublished.
            if shutdown.stop_requested() {
                state = LoopState::ShuttingDown;
                info!(?state, frame_index, "stop requested, dropping in-flight frame");
                frames.close();
                break StopReason::ShutdownRequested;
            }

            let frame = Arc::new(frame);
            let (estimate, shown) = match pipeline.process(frame.clone(), frame_index) {
                Ok(analysis) => (analysis.estimate(), Some(analysis)),
                Err(err) => {
                    warn!(frame_index, "frame processing failed: {err}");
                    report.failures += 1;
                    (TargetEstimate::NotFound, None)
                }
            };

            if let Err(err) = sink.publish(&estimate) {
                frames.close();
                return Err(err.context(format!("failed to publish frame {frame_index}")));
            }
            report.frames += 1;
            match estimate {
                TargetEstimate::Found { x, y } => {
                    report.found += 1;
                    debug!(frame_index, x, y, "target found");
                }
                TargetEstimate::NotFound => report.not_found += 1,
            }

            if let Some(display) = display.as_deref_mut() {
                let event = match &shown {
                    Some(analysis) => {
                        display.show(frame_index, &analysis.masked, analysis.detection.as_ref())
                    }
                    None => display.show(frame_index, &frame, None),
                };
                match event {
                    Ok(DisplayEvent::Continue) => {}
                    Ok(DisplayEvent::Quit) => {
                        info!(frame_index, "quit key observed");
                        frames.close();
                        break StopReason::QuitKey;
                    }
                    Err(err) => {
                        frames.close();
                        return Err(err.context(format!("failed to display frame {frame_index}")));
                    }
                }
            }

            frame_index += 1;
        };

        state = LoopState::Stopped;
        info!(
            ?state,
            ?stop_reason,
            frames = report.frames,
            found = report.found,
            failures = report.failures,
            "frame loop stopped"
        );
        report.stop_reason = stop_reason;
        report.final_state = state;
        Ok(report)
    }
}
