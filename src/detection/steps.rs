use crate::config::{BlurKind, ErodeConfig, HsvRanges};
use crate::detection::lines::{self, LineDetectorOptions};
use crate::detection::{filters, locator};
use crate::error::FrameProcessingFailure;
use crate::pipeline::{PipelineContext, PipelineData, PipelineStep};
use image::{DynamicImage, RgbImage};
use std::borrow::Cow;
use tracing::debug;

/// Borrow the image as 8-bit RGB, converting other colour layouts.
/// Single-channel images are rejected.
fn color_view(image: &DynamicImage) -> Result<Cow<'_, RgbImage>, FrameProcessingFailure> {
    match image {
        DynamicImage::ImageRgb8(rgb) => Ok(Cow::Borrowed(rgb)),
        other if other.color().has_color() => Ok(Cow::Owned(other.to_rgb8())),
        other => Err(FrameProcessingFailure::UnsupportedChannels {
            expected: 3,
            actual: other.color().channel_count(),
        }),
    }
}

/// Smooth the frame
pub struct BlurStep {
    pub kind: BlurKind,
    pub radius: f64,
}

impl PipelineStep for BlurStep {
    fn process(
        &self,
        mut data: PipelineData,
        _context: &PipelineContext<'_>,
    ) -> Result<PipelineData, FrameProcessingFailure> {
        let rgb = color_view(&data.image)?;
        let blurred = filters::blur(&rgb, self.kind, self.radius);
        data.image = DynamicImage::ImageRgb8(blurred);
        Ok(data)
    }

    fn name(&self) -> &str {
        "Blur"
    }
}

/// Binarize by hue/saturation/value ranges
pub struct HsvThresholdStep {
    pub ranges: HsvRanges,
}

impl PipelineStep for HsvThresholdStep {
    fn process(
        &self,
        mut data: PipelineData,
        _context: &PipelineContext<'_>,
    ) -> Result<PipelineData, FrameProcessingFailure> {
        let rgb = color_view(&data.image)?;
        let binary = filters::hsv_threshold(&rgb, &self.ranges);
        data.image = DynamicImage::ImageLuma8(binary);
        Ok(data)
    }

    fn name(&self) -> &str {
        "HSV Threshold"
    }
}

/// Keep the captured frame only where the previous step's mask is set
pub struct MaskStep;

impl PipelineStep for MaskStep {
    fn process(
        &self,
        mut data: PipelineData,
        _context: &PipelineContext<'_>,
    ) -> Result<PipelineData, FrameProcessingFailure> {
        let DynamicImage::ImageLuma8(mask) = &data.image else {
            return Err(FrameProcessingFailure::UnsupportedChannels {
                expected: 1,
                actual: data.image.color().channel_count(),
            });
        };
        let original = color_view(&data.original)?;
        let masked = DynamicImage::ImageRgb8(filters::mask(&original, mask)?);
        data.masked = Some(masked.clone());
        data.image = masked;
        Ok(data)
    }

    fn name(&self) -> &str {
        "Mask"
    }
}

/// Morphological erosion
pub struct ErodeStep {
    pub config: ErodeConfig,
}

impl PipelineStep for ErodeStep {
    fn process(
        &self,
        mut data: PipelineData,
        _context: &PipelineContext<'_>,
    ) -> Result<PipelineData, FrameProcessingFailure> {
        data.image = match &data.image {
            DynamicImage::ImageLuma8(gray) => {
                DynamicImage::ImageLuma8(filters::erode(gray, &self.config))
            }
            other => {
                let rgb = color_view(other)?;
                DynamicImage::ImageRgb8(filters::erode::<image::Rgb<u8>>(&rgb, &self.config))
            }
        };
        Ok(data)
    }

    fn name(&self) -> &str {
        "Erode"
    }
}

/// Detect straight line segments
pub struct LineExtractionStep {
    pub options: LineDetectorOptions,
    pub skip_first_segment: bool,
}

impl PipelineStep for LineExtractionStep {
    fn process(
        &self,
        mut data: PipelineData,
        context: &PipelineContext<'_>,
    ) -> Result<PipelineData, FrameProcessingFailure> {
        data.segments = lines::find_lines(&data.image, &self.options, self.skip_first_segment);
        debug!(
            frame = context.frame_index,
            segments = data.segments.len(),
            "extracted line segments"
        );
        Ok(data)
    }

    fn name(&self) -> &str {
        "Find Lines"
    }

    fn produces_image(&self) -> bool {
        false
    }
}

/// Reduce segments to a bounding box and centroid
pub struct LocateStep {
    pub first_endpoint_only: bool,
}

impl PipelineStep for LocateStep {
    fn process(
        &self,
        mut data: PipelineData,
        context: &PipelineContext<'_>,
    ) -> Result<PipelineData, FrameProcessingFailure> {
        data.detection = locator::locate(&data.segments, self.first_endpoint_only)?;
        if let Some(detection) = &data.detection {
            debug!(
                frame = context.frame_index,
                x = detection.x,
                y = detection.y,
                "target located"
            );
        }
        Ok(data)
    }

    fn name(&self) -> &str {
        "Locate Target"
    }

    fn produces_image(&self) -> bool {
        false
    }
}
