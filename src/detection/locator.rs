use crate::error::FrameProcessingFailure;
use crate::models::{BoundingBox, Detection, LineSegment};

/// Reduce a frame's segments to a bounding box and its centroid.
///
/// Returns `Ok(None)` when there are no segments. With
/// `first_endpoint_only` set, only `(x1, y1)` of each segment contributes to
/// the extrema; otherwise both endpoints do. A non-finite coordinate makes
/// the extrema undefined and fails the frame.
pub fn locate(
    segments: &[LineSegment],
    first_endpoint_only: bool,
) -> Result<Option<Detection>, FrameProcessingFailure> {
    if segments.is_empty() {
        return Ok(None);
    }
    let points = segments.iter().flat_map(|s| {
        let second = (!first_endpoint_only).then_some((s.x2, s.y2));
        std::iter::once((s.x1, s.y1)).chain(second)
    });

    let mut bbox = BoundingBox {
        x1: f64::MIN,
        y1: f64::MIN,
        x2: f64::MAX,
        y2: f64::MAX,
    };
    for (x, y) in points {
        if !x.is_finite() || !y.is_finite() {
            return Err(FrameProcessingFailure::UndefinedExtremum);
        }
        bbox.x1 = bbox.x1.max(x);
        bbox.x2 = bbox.x2.min(x);
        bbox.y1 = bbox.y1.max(y);
        bbox.y2 = bbox.y2.min(y);
    }

    let (x, y) = bbox.center();
    Ok(Some(Detection { bbox, x, y }))
}
