//! Line segment detection on a single-channel image.
//!
//! Follows the structure of the LSD detector. The image is Gaussian-subsampled
//! and a 2x2 gradient gives each pixel a level-line angle. Pixels are visited
//! in decreasing gradient magnitude and grown into regions of aligned angles.
//! Each region is fitted with a rectangle, refined until the rectangle is
//! dense enough, and the rectangle's long axis becomes the segment. Segment
//! direction follows the level-line, so the bright side of an edge is always
//! on the same hand.

use std::borrow::Cow;
use std::f64::consts::PI;

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::LineSegment;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineDetectorOptions {
    /// Subsampling factor applied before the gradient; `1.0` disables it.
    pub scale: f64,
    /// Gaussian sigma used when subsampling is `sigma_scale / scale`.
    pub sigma_scale: f64,
    /// Bound on the gradient quantization error.
    pub quant: f64,
    /// Angle tolerance, in degrees, for a pixel to join a region.
    pub angle_tolerance: f64,
    /// Minimum fraction of region pixels inside the fitted rectangle.
    pub density: f64,
    /// Smallest region that may become a segment. `None` derives it from
    /// the image size.
    pub min_region_size: Option<usize>,
}

impl Default for LineDetectorOptions {
    fn default() -> Self {
        Self {
            scale: 0.8,
            sigma_scale: 0.6,
            quant: 2.0,
            angle_tolerance: 22.5,
            density: 0.7,
            min_region_size: None,
        }
    }
}

impl LineDetectorOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("scale", self.scale),
            ("sigma_scale", self.sigma_scale),
            ("quant", self.quant),
            ("angle_tolerance", self.angle_tolerance),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidLineOption { name, value });
            }
        }
        Ok(())
    }

    fn precision(&self) -> f64 {
        self.angle_tolerance.to_radians()
    }

    /// Regions smaller than this cannot be meaningful for a `width` x `height`
    /// image at the configured angle tolerance.
    pub fn region_size_for(&self, width: u32, height: u32) -> usize {
        if let Some(size) = self.min_region_size {
            return size;
        }
        let p = self.angle_tolerance / 180.0;
        let log_nt = 5.0 * ((width as f64).log10() + (height as f64).log10()) / 2.0 + 11f64.log10();
        (-log_nt / p.log10()).max(1.0) as usize
    }
}

const NOT_DEFINED: f64 = -1024.0;

/// Find line segments in `input`, converting to grayscale first when it has
/// more than one channel. With `skip_first` set, the first detected segment
/// is dropped.
pub fn find_lines(
    input: &DynamicImage,
    options: &LineDetectorOptions,
    skip_first: bool,
) -> Vec<LineSegment> {
    let gray: Cow<'_, GrayImage> = match input {
        DynamicImage::ImageLuma8(gray) => Cow::Borrowed(gray),
        other => Cow::Owned(other.to_luma8()),
    };
    detect_segments(&gray, options)
        .into_iter()
        .skip(usize::from(skip_first))
        .collect()
}

struct Gradient {
    width: usize,
    height: usize,
    angles: Vec<f64>,
    magnitudes: Vec<f64>,
}

impl Gradient {
    fn compute(img: &Sampled, threshold: f64) -> Self {
        let (w, h) = (img.width, img.height);
        let mut angles = vec![NOT_DEFINED; w * h];
        let mut magnitudes = vec![0.0; w * h];
        let px = |x: usize, y: usize| img.data[y * w + x];

        for y in 0..h.saturating_sub(1) {
            for x in 0..w.saturating_sub(1) {
                let com1 = px(x + 1, y + 1) - px(x, y);
                let com2 = px(x + 1, y) - px(x, y + 1);
                let gx = com1 + com2;
                let gy = com1 - com2;
                let norm = ((gx * gx + gy * gy) / 4.0).sqrt();
                let idx = y * w + x;
                magnitudes[idx] = norm;
                if norm > threshold {
                    angles[idx] = gx.atan2(-gy);
                }
            }
        }

        Self {
            width: w,
            height: h,
            angles,
            magnitudes,
        }
    }

    fn is_defined(&self, idx: usize) -> bool {
        self.angles[idx] != NOT_DEFINED
    }

    fn coords(&self, idx: usize) -> (f64, f64) {
        ((idx % self.width) as f64, (idx / self.width) as f64)
    }
}

fn angle_diff(a: f64, b: f64) -> f64 {
    signed_angle_diff(a, b).abs()
}

/// `a - b` wrapped into `(-PI, PI]`.
fn signed_angle_diff(a: f64, b: f64) -> f64 {
    let mut d = a - b;
    while d <= -PI {
        d += 2.0 * PI;
    }
    while d > PI {
        d -= 2.0 * PI;
    }
    d
}

/// Gray levels as `f64`, row-major.
struct Sampled {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl Sampled {
    fn from_gray(img: &GrayImage) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.pixels().map(|p| p[0] as f64).collect(),
        }
    }

    /// Resample by `scale` with a Gaussian anti-aliasing kernel, one axis at
    /// a time. Out-of-range taps reflect symmetrically off the border.
    fn gaussian_scaled(img: &GrayImage, scale: f64, sigma_scale: f64) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let out_w = (w as f64 * scale).ceil() as usize;
        let out_h = (h as f64 * scale).ceil() as usize;
        let sigma = if scale < 1.0 { sigma_scale / scale } else { sigma_scale };
        // Kernel support where the Gaussian falls below 10^-3.
        let half = (sigma * (2.0 * 3.0 * 10f64.ln()).sqrt()).ceil() as i64;
        let taps = (2 * half + 1) as usize;

        let reflect = |j: i64, len: usize| -> usize {
            let period = 2 * len as i64;
            let j = j.rem_euclid(period);
            (if j >= len as i64 { period - 1 - j } else { j }) as usize
        };
        let kernel_at = |pos: usize, len: usize| -> (Vec<usize>, Vec<f64>) {
            let center = pos as f64 / scale;
            let nearest = (center + 0.5).floor() as i64;
            let mean = half as f64 + center - nearest as f64;
            let mut weights: Vec<f64> = (0..taps)
                .map(|i| {
                    let d = (i as f64 - mean) / sigma;
                    (-0.5 * d * d).exp()
                })
                .collect();
            let sum: f64 = weights.iter().sum();
            weights.iter_mut().for_each(|w| *w /= sum);
            let indices = (0..taps)
                .map(|i| reflect(nearest - half + i as i64, len))
                .collect();
            (indices, weights)
        };

        let mut horizontal = vec![0.0; out_w * h];
        for x in 0..out_w {
            let (indices, weights) = kernel_at(x, w);
            for y in 0..h {
                horizontal[y * out_w + x] = indices
                    .iter()
                    .zip(&weights)
                    .map(|(&j, k)| img.get_pixel(j as u32, y as u32)[0] as f64 * k)
                    .sum();
            }
        }

        let mut data = vec![0.0; out_w * out_h];
        for y in 0..out_h {
            let (indices, weights) = kernel_at(y, h);
            for x in 0..out_w {
                data[y * out_w + x] = indices
                    .iter()
                    .zip(&weights)
                    .map(|(&j, k)| horizontal[j * out_w + x] * k)
                    .sum();
            }
        }

        Self {
            width: out_w,
            height: out_h,
            data,
        }
    }
}

/// Every segment the detector accepts, in detection order, in the
/// coordinates of `img`.
pub fn detect_segments(img: &GrayImage, options: &LineDetectorOptions) -> Vec<LineSegment> {
    if img.width() < 2 || img.height() < 2 {
        return Vec::new();
    }
    let scale = options.scale;
    let sampled = if scale == 1.0 {
        Sampled::from_gray(img)
    } else {
        Sampled::gaussian_scaled(img, scale, options.sigma_scale)
    };
    if sampled.width < 2 || sampled.height < 2 {
        return Vec::new();
    }

    let prec = options.precision();
    let threshold = options.quant / prec.sin();
    let min_size = options.region_size_for(sampled.width as u32, sampled.height as u32);
    let grad = Gradient::compute(&sampled, threshold);

    let mut seeds: Vec<usize> = (0..grad.angles.len())
        .filter(|&i| grad.is_defined(i))
        .collect();
    seeds.sort_by(|&a, &b| grad.magnitudes[b].total_cmp(&grad.magnitudes[a]));

    let mut used = vec![false; grad.angles.len()];
    let mut segments = Vec::new();
    for seed in seeds {
        if used[seed] {
            continue;
        }
        let (region, region_angle) = grow_region(&grad, seed, prec, &mut used);
        if region.len() < min_size {
            continue;
        }
        if let Some(rect) = refine(&grad, region, region_angle, prec, options.density, &mut used) {
            segments.push(rect.to_segment(scale));
        }
    }
    segments
}

fn grow_region(grad: &Gradient, seed: usize, prec: f64, used: &mut [bool]) -> (Vec<usize>, f64) {
    let mut region = vec![seed];
    used[seed] = true;
    let mut angle = grad.angles[seed];
    let mut sum_cos = angle.cos();
    let mut sum_sin = angle.sin();

    let mut i = 0;
    while i < region.len() {
        let (x, y) = ((region[i] % grad.width) as i64, (region[i] / grad.width) as i64);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= grad.width as i64 || ny >= grad.height as i64 {
                    continue;
                }
                let n = ny as usize * grad.width + nx as usize;
                if used[n] || !grad.is_defined(n) || angle_diff(grad.angles[n], angle) > prec {
                    continue;
                }
                used[n] = true;
                region.push(n);
                sum_cos += grad.angles[n].cos();
                sum_sin += grad.angles[n].sin();
                angle = sum_sin.atan2(sum_cos);
            }
        }
        i += 1;
    }
    (region, angle)
}

/// Rectangle fitted to a region: weighted center, unit direction, and the
/// extent of the region along and across that direction.
struct RegionRect {
    cx: f64,
    cy: f64,
    dx: f64,
    dy: f64,
    l_min: f64,
    l_max: f64,
    width: f64,
}

impl RegionRect {
    fn fit(grad: &Gradient, region: &[usize], region_angle: f64, prec: f64) -> Option<Self> {
        let (mut cx, mut cy, mut total) = (0.0, 0.0, 0.0);
        for &idx in region {
            let (x, y) = grad.coords(idx);
            let w = grad.magnitudes[idx];
            cx += w * x;
            cy += w * y;
            total += w;
        }
        if total <= 0.0 {
            return None;
        }
        cx /= total;
        cy /= total;

        let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
        for &idx in region {
            let (x, y) = grad.coords(idx);
            let w = grad.magnitudes[idx];
            sxx += w * (x - cx) * (x - cx);
            syy += w * (y - cy) * (y - cy);
            sxy += w * (x - cx) * (y - cy);
        }
        let mut theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
        if angle_diff(theta, region_angle) > prec {
            theta += PI;
        }
        let (dx, dy) = (theta.cos(), theta.sin());

        let (mut l_min, mut l_max, mut w_min, mut w_max) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for &idx in region {
            let (x, y) = grad.coords(idx);
            let l = (x - cx) * dx + (y - cy) * dy;
            let w = -(x - cx) * dy + (y - cy) * dx;
            l_min = l_min.min(l);
            l_max = l_max.max(l);
            w_min = w_min.min(w);
            w_max = w_max.max(w);
        }

        Some(Self {
            cx,
            cy,
            dx,
            dy,
            l_min,
            l_max,
            width: (w_max - w_min).max(1.0),
        })
    }

    /// Fraction of the rectangle covered by `size` region pixels.
    fn density(&self, size: usize) -> f64 {
        let length = (self.l_max - self.l_min).max(1.0);
        size as f64 / (length * self.width)
    }

    fn endpoints(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.cx + self.l_min * self.dx, self.cy + self.l_min * self.dy),
            (self.cx + self.l_max * self.dx, self.cy + self.l_max * self.dy),
        )
    }

    /// Segment in input-image coordinates.
    fn to_segment(&self, scale: f64) -> LineSegment {
        let ((x1, y1), (x2, y2)) = self.endpoints();
        // Gradients sit between pixels; shift to pixel-center coordinates.
        LineSegment::new(
            (x1 + 0.5) / scale,
            (y1 + 0.5) / scale,
            (x2 + 0.5) / scale,
            (y2 + 0.5) / scale,
        )
    }
}

/// Accept a region as is when its rectangle is dense enough. Otherwise
/// regrow it from the seed with the angle tolerance narrowed to the spread
/// seen around the seed, and as a last resort shrink it around the seed.
/// Curved edges end up as a chain of short segments this way.
fn refine(
    grad: &Gradient,
    region: Vec<usize>,
    region_angle: f64,
    prec: f64,
    density: f64,
    used: &mut [bool],
) -> Option<RegionRect> {
    let rect = RegionRect::fit(grad, &region, region_angle, prec)?;
    if rect.density(region.len()) >= density {
        return Some(rect);
    }

    let seed = region[0];
    let (sx, sy) = grad.coords(seed);
    let seed_angle = grad.angles[seed];
    let (mut sum, mut sum_sq, mut n) = (0.0, 0.0, 0usize);
    for &idx in &region {
        used[idx] = false;
        let (x, y) = grad.coords(idx);
        if (x - sx).hypot(y - sy) < rect.width {
            let d = signed_angle_diff(grad.angles[idx], seed_angle);
            sum += d;
            sum_sq += d * d;
            n += 1;
        }
    }
    let mean = sum / n as f64;
    let tau = 2.0 * ((sum_sq - 2.0 * mean * sum) / n as f64 + mean * mean).max(0.0).sqrt();

    let (region, region_angle) = grow_region(grad, seed, tau, used);
    if region.len() < 2 {
        return None;
    }
    let rect = RegionRect::fit(grad, &region, region_angle, prec)?;
    if rect.density(region.len()) >= density {
        return Some(rect);
    }
    reduce_region_radius(grad, region, region_angle, prec, density, rect, used)
}

/// Drop the region pixels farthest from the seed until the rectangle is
/// dense enough. Dropped pixels become available as seeds again.
fn reduce_region_radius(
    grad: &Gradient,
    mut region: Vec<usize>,
    region_angle: f64,
    prec: f64,
    density: f64,
    mut rect: RegionRect,
    used: &mut [bool],
) -> Option<RegionRect> {
    let (sx, sy) = grad.coords(region[0]);
    let ((x1, y1), (x2, y2)) = rect.endpoints();
    let mut radius = (x1 - sx).hypot(y1 - sy).max((x2 - sx).hypot(y2 - sy));

    while rect.density(region.len()) < density {
        radius *= 0.75;
        region.retain(|&idx| {
            let (x, y) = grad.coords(idx);
            let keep = (x - sx).hypot(y - sy) <= radius;
            if !keep {
                used[idx] = false;
            }
            keep
        });
        if region.len() < 2 {
            return None;
        }
        rect = RegionRect::fit(grad, &region, region_angle, prec)?;
    }
    Some(rect)
}
