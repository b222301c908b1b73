use std::fmt;
use std::io::Write;
use std::sync::mpsc::Sender;

use anyhow::{Context, Result};
use serde::{Serialize, Serializer};

use crate::models::TargetEstimate;

/// Value published downstream when no target was found in a frame.
/// Consumers compare against this exact string.
pub const NOT_FOUND_SENTINEL: &str = "B00B13S";

/// Wire form of a [`TargetEstimate`]: a coordinate pair or the sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Publication {
    Position(f64, f64),
    NotFound,
}

impl From<TargetEstimate> for Publication {
    fn from(estimate: TargetEstimate) -> Self {
        match estimate {
            TargetEstimate::Found { x, y } => Publication::Position(x, y),
            TargetEstimate::NotFound => Publication::NotFound,
        }
    }
}

impl Serialize for Publication {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Publication::Position(x, y) => (x, y).serialize(serializer),
            Publication::NotFound => serializer.serialize_str(NOT_FOUND_SENTINEL),
        }
    }
}

impl fmt::Display for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Publication::Position(x, y) => write!(f, "{x},{y}"),
            Publication::NotFound => f.write_str(NOT_FOUND_SENTINEL),
        }
    }
}

/// Downstream consumer of per-frame results. Called exactly once per
/// processed frame.
pub trait PublishSink {
    fn publish(&mut self, estimate: &TargetEstimate) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineFormat {
    /// `x,y` or the bare sentinel
    #[default]
    Plain,
    /// `[x,y]` or `"<sentinel>"`
    Json,
}

/// Writes one line per frame to any writer (stdout, a file, a socket).
pub struct LineSink<W: Write> {
    writer: W,
    format: LineFormat,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W, format: LineFormat) -> Self {
        Self { writer, format }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PublishSink for LineSink<W> {
    fn publish(&mut self, estimate: &TargetEstimate) -> Result<()> {
        let publication = Publication::from(*estimate);
        match self.format {
            LineFormat::Plain => writeln!(self.writer, "{publication}")?,
            LineFormat::Json => {
                serde_json::to_writer(&mut self.writer, &publication)?;
                writeln!(self.writer)?;
            }
        }
        self.writer.flush().context("failed to flush publish sink")
    }
}

/// Forwards publications to another thread, e.g. a telemetry link.
pub struct ChannelSink {
    tx: Sender<Publication>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Publication>) -> Self {
        Self { tx }
    }
}

impl PublishSink for ChannelSink {
    fn publish(&mut self, estimate: &TargetEstimate) -> Result<()> {
        self.tx
            .send(Publication::from(*estimate))
            .map_err(|e| anyhow::anyhow!("publish channel closed: {}", e))
    }
}
