use serde::Serialize;

/// A detected straight edge between `(x1, y1)` and `(x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineSegment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl LineSegment {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn length(&self) -> f64 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }

    /// Direction from the first endpoint to the second, in degrees.
    pub fn angle(&self) -> f64 {
        (self.y2 - self.y1).atan2(self.x2 - self.x1).to_degrees()
    }
}

/// Axis-aligned box spanned by the segment extrema.
///
/// `(x1, y1)` holds the maxima and `(x2, y2)` the minima.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.x1 - self.x2
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y2
    }

    /// Arithmetic midpoint of the two x's and the two y's.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.x1 - self.x2) / 2.0 + self.x2,
            (self.y1 - self.y2) / 2.0 + self.y2,
        )
    }
}

/// Per-frame output crossing the system boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TargetEstimate {
    Found { x: f64, y: f64 },
    NotFound,
}

impl TargetEstimate {
    pub fn is_found(&self) -> bool {
        matches!(self, TargetEstimate::Found { .. })
    }
}

/// A located target together with the box it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub x: f64,
    pub y: f64,
}

impl From<Option<Detection>> for TargetEstimate {
    fn from(detection: Option<Detection>) -> Self {
        match detection {
            Some(d) => TargetEstimate::Found { x: d.x, y: d.y },
            None => TargetEstimate::NotFound,
        }
    }
}
