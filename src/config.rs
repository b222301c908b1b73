//! Static pipeline configuration.
//!
//! Every threshold is fixed once at construction. A config can be built in
//! code, loaded from a `.toml` or `.json` file, or overridden from the CLI.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::detection::lines::LineDetectorOptions;
use crate::error::ConfigError;

/// Smoothing filter applied before colour thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BlurKind {
    Box,
    Gaussian,
    Median,
    Bilateral,
}

impl BlurKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlurKind::Box => "box",
            BlurKind::Gaussian => "gaussian",
            BlurKind::Median => "median",
            BlurKind::Bilateral => "bilateral",
        }
    }
}

impl FromStr for BlurKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "box" | "box_blur" => Ok(BlurKind::Box),
            "gaussian" | "gaussian_blur" => Ok(BlurKind::Gaussian),
            "median" | "median_filter" => Ok(BlurKind::Median),
            "bilateral" | "bilateral_filter" => Ok(BlurKind::Bilateral),
            _ => Err(ConfigError::UnknownBlurKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for BlurKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BlurKind> for String {
    fn from(kind: BlurKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for BlurKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed interval, inclusive on both bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, channel: &'static str) -> Result<(), ConfigError> {
        if !(self.min <= self.max) {
            return Err(ConfigError::InvertedInterval {
                channel,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Hue/saturation/value acceptance ranges on the 8-bit HSV scale
/// (hue 0..180, saturation and value 0..255).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HsvRanges {
    pub hue: Interval,
    pub saturation: Interval,
    pub value: Interval,
}

impl Default for HsvRanges {
    fn default() -> Self {
        Self {
            hue: Interval::new(0.0, 18.03056027164686),
            saturation: Interval::new(156.0, 255.0),
            value: Interval::new(161.0, 255.0),
        }
    }
}

/// Binary structuring element, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kernel {
    rows: Vec<Vec<bool>>,
}

impl Kernel {
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Self {
        Self { rows }
    }

    /// Fully set `width` x `height` rectangle.
    pub fn rect(width: usize, height: usize) -> Self {
        Self {
            rows: vec![vec![true; width]; height],
        }
    }

    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn is_set(&self, kx: usize, ky: usize) -> bool {
        self.rows[ky][kx]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let width = self.width();
        for (row, cells) in self.rows.iter().enumerate() {
            if cells.len() != width {
                return Err(ConfigError::RaggedKernel {
                    row,
                    len: cells.len(),
                    width,
                });
            }
        }
        if !self.rows.iter().flatten().any(|&set| set) {
            return Err(ConfigError::EmptyKernel);
        }
        Ok(())
    }
}

/// How pixels outside the image are synthesized during erosion. The default
/// fills with zero, so a blob touching the frame edge loses its outer ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BorderPolicy {
    /// Fixed fill. `None` uses the maximum channel value, which never wins
    /// an erosion.
    Constant { value: Option<u8> },
    Replicate,
    Reflect101,
}

impl Default for BorderPolicy {
    fn default() -> Self {
        BorderPolicy::Constant { value: Some(0) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErodeConfig {
    /// `None` means a 3x3 rectangle.
    pub kernel: Option<Kernel>,
    /// `(-1, -1)` selects the kernel center.
    pub anchor: (i32, i32),
    /// Rounded half-up to a whole pass count.
    pub iterations: f64,
    pub border: BorderPolicy,
}

impl Default for ErodeConfig {
    fn default() -> Self {
        Self {
            kernel: None,
            anchor: (-1, -1),
            iterations: 1.0,
            border: BorderPolicy::default(),
        }
    }
}

impl ErodeConfig {
    /// Number of erosion passes: `iterations + 0.5`, truncated.
    pub fn iteration_count(&self) -> u32 {
        (self.iterations + 0.5) as u32
    }

    pub fn effective_kernel(&self) -> Kernel {
        self.kernel.clone().unwrap_or_else(|| Kernel::rect(3, 3))
    }

    /// Anchor in kernel coordinates, with negative components mapped to the center.
    pub fn resolved_anchor(&self, kernel: &Kernel) -> (usize, usize) {
        let ax = if self.anchor.0 < 0 {
            kernel.width() / 2
        } else {
            self.anchor.0 as usize
        };
        let ay = if self.anchor.1 < 0 {
            kernel.height() / 2
        } else {
            self.anchor.1 as usize
        };
        (ax, ay)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.iterations.is_finite() || self.iterations < 0.0 {
            return Err(ConfigError::NegativeIterations(self.iterations));
        }
        let kernel = self.effective_kernel();
        kernel.validate()?;
        let (x, y) = self.anchor;
        if x >= kernel.width() as i32 || y >= kernel.height() as i32 {
            return Err(ConfigError::AnchorOutOfKernel {
                x,
                y,
                width: kernel.width(),
                height: kernel.height(),
            });
        }
        Ok(())
    }
}

/// Toggles for two long-standing reductions in target location.
///
/// `skip_first_segment` drops the first segment the detector yields.
/// `first_endpoint_only` builds the bounding box from `(x1, y1)` alone.
/// Deployed thresholds were tuned with both on; the `legacy-quirks` feature
/// keeps them on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quirks {
    pub skip_first_segment: bool,
    pub first_endpoint_only: bool,
}

impl Quirks {
    pub const fn legacy() -> Self {
        Self {
            skip_first_segment: true,
            first_endpoint_only: true,
        }
    }

    pub const fn corrected() -> Self {
        Self {
            skip_first_segment: false,
            first_endpoint_only: false,
        }
    }
}

impl Default for Quirks {
    #[cfg(feature = "legacy-quirks")]
    fn default() -> Self {
        Self::legacy()
    }

    #[cfg(not(feature = "legacy-quirks"))]
    fn default() -> Self {
        Self::corrected()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub blur: BlurKind,
    pub blur_radius: f64,
    #[serde(flatten)]
    pub hsv: HsvRanges,
    pub erode: ErodeConfig,
    pub lines: LineDetectorOptions,
    pub quirks: Quirks,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur: BlurKind::Box,
            blur_radius: 24.324324324324326,
            hsv: HsvRanges::default(),
            erode: ErodeConfig::default(),
            lines: LineDetectorOptions::default(),
            quirks: Quirks::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.blur_radius.is_finite() || self.blur_radius <= 0.0 {
            return Err(ConfigError::NonPositiveRadius(self.blur_radius));
        }
        self.hsv.hue.validate("hue")?;
        self.hsv.saturation.validate("saturation")?;
        self.hsv.value.validate("value")?;
        self.erode.validate()?;
        self.lines.validate()?;
        Ok(())
    }

    /// Load and validate a config file. The format follows the extension:
    /// `.json` is parsed as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let load_err = |reason: String| ConfigError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: PipelineConfig = if is_json {
            serde_json::from_str(&text).map_err(|e| load_err(e.to_string()))?
        } else {
            toml::from_str(&text).map_err(|e| load_err(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }
}
