//! Pure per-frame image transforms: blur, HSV threshold, mask and erode.
//!
//! Every function reads its input and returns a freshly allocated image.

use image::{GrayImage, ImageBuffer, Luma, Pixel, Rgb, RgbImage};
use imageproc::filter::{median_filter, separable_filter_equal};

use crate::config::{BlurKind, BorderPolicy, ErodeConfig, HsvRanges, Kernel};
use crate::error::ConfigError;

/// Nearest integer, ties to even.
pub fn round_radius(radius: f64) -> u32 {
    radius.round_ties_even().max(0.0) as u32
}

/// Kernel side used by box and median blur: `2 * round(r) + 1`.
pub fn box_kernel_size(radius: f64) -> u32 {
    2 * round_radius(radius) + 1
}

/// Kernel side used by Gaussian blur: `6 * round(r) + 1`.
pub fn gaussian_kernel_size(radius: f64) -> u32 {
    6 * round_radius(radius) + 1
}

/// Smooth `src` with the selected filter. `radius` must be positive; the
/// config layer rejects anything else before a frame is ever processed.
/// Box and Gaussian replicate the edge pixel past the border.
pub fn blur(src: &RgbImage, kind: BlurKind, radius: f64) -> RgbImage {
    match kind {
        BlurKind::Box => {
            let side = box_kernel_size(radius) as usize;
            if side == 1 {
                return src.clone();
            }
            let kernel = vec![1.0f32 / side as f32; side];
            separable_filter_equal(src, &kernel)
        }
        BlurKind::Gaussian => {
            let side = gaussian_kernel_size(radius) as usize;
            if side == 1 {
                return src.clone();
            }
            let kernel = gaussian_kernel(side, round_radius(radius) as f32);
            separable_filter_equal(src, &kernel)
        }
        BlurKind::Median => {
            let r = round_radius(radius);
            if r == 0 {
                return src.clone();
            }
            median_filter(src, r, r)
        }
        BlurKind::Bilateral => {
            let sigma = round_radius(radius) as f32;
            bilateral(src, sigma, sigma)
        }
    }
}

fn gaussian_kernel(side: usize, sigma: f32) -> Vec<f32> {
    let center = (side / 2) as f32;
    let mut kernel: Vec<f32> = (0..side)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Edge-preserving smoothing. The window is a disc whose radius is derived
/// from the spatial sigma (`round(1.5 * sigma_space)`); colour distance is
/// the L1 distance across the three channels.
fn bilateral(src: &RgbImage, sigma_color: f32, sigma_space: f32) -> RgbImage {
    let sigma_color = if sigma_color <= 0.0 { 1.0 } else { sigma_color };
    let sigma_space = if sigma_space <= 0.0 { 1.0 } else { sigma_space };
    let radius = ((sigma_space * 1.5).round() as i64).max(1);
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2.sqrt() <= radius as f32 {
                offsets.push((dx, dy, (r2 * space_coeff).exp()));
            }
        }
    }

    // 3 * 255 is the largest possible L1 distance.
    let color_weights: Vec<f32> = (0..=3 * 255)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let (w, h) = src.dimensions();
    ImageBuffer::from_fn(w, h, |x, y| {
        let center = src.get_pixel(x, y).0;
        let mut acc = [0.0f32; 3];
        let mut norm = 0.0f32;
        for &(dx, dy, space_w) in &offsets {
            let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
            let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
            let p = src.get_pixel(sx, sy).0;
            let dist = (0..3)
                .map(|c| (p[c] as i32 - center[c] as i32).unsigned_abs() as usize)
                .sum::<usize>();
            let weight = space_w * color_weights[dist];
            for c in 0..3 {
                acc[c] += p[c] as f32 * weight;
            }
            norm += weight;
        }
        Rgb(acc.map(|v| (v / norm).round().clamp(0.0, 255.0) as u8))
    })
}

/// Convert one RGB pixel to 8-bit HSV: hue in `0..180` (degrees halved),
/// saturation and value in `0..=255`.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|c| c as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v == 0.0 { 0.0 } else { 255.0 * diff / v };

    let mut h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }
    let hue = (h / 2.0).round() as u32 % 180;

    [hue as u8, s.round() as u8, v as u8]
}

/// Binary mask (255 = match) of pixels whose hue, saturation and value all
/// fall inside the configured closed intervals.
pub fn hsv_threshold(src: &RgbImage, ranges: &HsvRanges) -> GrayImage {
    let (w, h) = src.dimensions();
    ImageBuffer::from_fn(w, h, |x, y| {
        let [hue, sat, val] = rgb_to_hsv(src.get_pixel(x, y).0);
        let hit = ranges.hue.contains(hue as f64)
            && ranges.saturation.contains(sat as f64)
            && ranges.value.contains(val as f64);
        Luma([if hit { 255 } else { 0 }])
    })
}

/// Copy of `src` with every pixel zeroed where `mask` is zero.
pub fn mask(src: &RgbImage, mask: &GrayImage) -> Result<RgbImage, ConfigError> {
    if src.dimensions() != mask.dimensions() {
        return Err(ConfigError::MaskDimensionMismatch {
            width: src.width(),
            height: src.height(),
            mask_width: mask.width(),
            mask_height: mask.height(),
        });
    }
    let mut out = src.clone();
    for (px, m) in out.pixels_mut().zip(mask.pixels()) {
        if m[0] == 0 {
            *px = Rgb([0, 0, 0]);
        }
    }
    Ok(out)
}

/// Morphological erosion repeated `config.iteration_count()` times.
/// Zero passes returns an unchanged copy.
pub fn erode<P>(src: &ImageBuffer<P, Vec<u8>>, config: &ErodeConfig) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let kernel = config.effective_kernel();
    let anchor = config.resolved_anchor(&kernel);
    let offsets = kernel_offsets(&kernel, anchor);

    let mut current = src.clone();
    for _ in 0..config.iteration_count() {
        current = erode_once(&current, &offsets, config.border);
    }
    current
}

fn kernel_offsets(kernel: &Kernel, (ax, ay): (usize, usize)) -> Vec<(i64, i64)> {
    let mut offsets = Vec::new();
    for ky in 0..kernel.height() {
        for kx in 0..kernel.width() {
            if kernel.is_set(kx, ky) {
                offsets.push((kx as i64 - ax as i64, ky as i64 - ay as i64));
            }
        }
    }
    offsets
}

fn erode_once<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    offsets: &[(i64, i64)],
    border: BorderPolicy,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = src.dimensions();
    let channels = P::CHANNEL_COUNT as usize;
    let fill = match border {
        BorderPolicy::Constant { value } => value.unwrap_or(u8::MAX),
        _ => u8::MAX,
    };

    let input: &[u8] = src;
    let mut out = ImageBuffer::<P, Vec<u8>>::new(w, h);
    let output: &mut [u8] = &mut out;

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let base = (y as usize * w as usize + x as usize) * channels;
            let mut min = [u8::MAX; 4];
            for &(dx, dy) in offsets {
                let sx = border_coord(x + dx, w as i64, border);
                let sy = border_coord(y + dy, h as i64, border);
                match (sx, sy) {
                    (Some(sx), Some(sy)) => {
                        let at = (sy as usize * w as usize + sx as usize) * channels;
                        for c in 0..channels {
                            min[c] = min[c].min(input[at + c]);
                        }
                    }
                    _ => {
                        for m in min.iter_mut().take(channels) {
                            *m = (*m).min(fill);
                        }
                    }
                }
            }
            output[base..base + channels].copy_from_slice(&min[..channels]);
        }
    }
    out
}

/// Map a possibly out-of-range coordinate back into `0..len`, or `None`
/// when the border policy synthesizes a constant instead.
fn border_coord(coord: i64, len: i64, border: BorderPolicy) -> Option<i64> {
    if (0..len).contains(&coord) {
        return Some(coord);
    }
    match border {
        BorderPolicy::Constant { .. } => None,
        BorderPolicy::Replicate => Some(coord.clamp(0, len - 1)),
        BorderPolicy::Reflect101 => {
            if len == 1 {
                return Some(0);
            }
            let period = 2 * (len - 1);
            let m = coord.rem_euclid(period);
            Some(if m < len { m } else { period - m })
        }
    }
}
