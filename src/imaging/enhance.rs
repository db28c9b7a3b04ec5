//! Multiplicative enhancement adjustments.
//!
//! Each adjustment blends the image with a "degenerate" version of itself:
//! `out = degenerate + factor * (image - degenerate)`. A factor of 1.0 is the
//! identity, values above 1.0 push the image away from the degenerate.
//!
//! | Adjustment | Degenerate image |
//! |------------|------------------|
//! | Sharpness  | 3x3 smoothing (centre weight 5), border pixels untouched |
//! | Contrast   | flat grey at the mean luma of the whole image |
//! | Saturation | per-pixel luma grey |

use image::{Rgb, RgbImage};
use tracing::warn;

use crate::imaging::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    Sharpness(f32),
    Contrast(f32),
    Saturation(f32),
}

impl Adjustment {
    fn name(self) -> &'static str {
        match self {
            Adjustment::Sharpness(_) => "sharpness",
            Adjustment::Contrast(_) => "contrast",
            Adjustment::Saturation(_) => "saturation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancementProfile {
    Standard,
    Wallpaper,
}

const STANDARD_STEPS: [Adjustment; 3] = [
    Adjustment::Sharpness(1.20),
    Adjustment::Contrast(1.10),
    Adjustment::Saturation(1.05),
];

const WALLPAPER_STEPS: [Adjustment; 3] = [
    Adjustment::Contrast(1.15),
    Adjustment::Saturation(1.10),
    Adjustment::Sharpness(1.10),
];

impl EnhancementProfile {
    pub fn adjustments(self) -> &'static [Adjustment] {
        match self {
            EnhancementProfile::Standard => &STANDARD_STEPS,
            EnhancementProfile::Wallpaper => &WALLPAPER_STEPS,
        }
    }
}

pub fn apply(image: RgbImage, profile: EnhancementProfile) -> RgbImage {
    apply_steps(image, profile.adjustments())
}

/// Runs each step on the output of the previous one. A step that fails is
/// skipped and the chain continues with the image it was given.
pub fn apply_steps(image: RgbImage, steps: &[Adjustment]) -> RgbImage {
    steps.iter().fold(image, |current, &step| match adjust(&current, step) {
        Ok(next) => next,
        Err(err) => {
            warn!("Skipping {} adjustment: {err}", step.name());
            current
        }
    })
}

pub fn adjust(image: &RgbImage, adjustment: Adjustment) -> Result<RgbImage, PipelineError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::Enhance(format!(
            "{} cannot be applied to an empty image",
            adjustment.name()
        )));
    }

    let adjusted = match adjustment {
        Adjustment::Sharpness(factor) => blend(image, factor, |x, y, pixel| {
            smoothed_pixel(image, x, y).unwrap_or(pixel.0)
        }),
        Adjustment::Contrast(factor) => {
            let mean = mean_luma(image);
            blend(image, factor, |_, _, _| [mean; 3])
        }
        Adjustment::Saturation(factor) => blend(image, factor, |_, _, pixel| {
            let grey = luma(pixel);
            [grey; 3]
        }),
    };
    Ok(adjusted)
}

fn blend<F>(image: &RgbImage, factor: f32, degenerate: F) -> RgbImage
where
    F: Fn(u32, u32, &Rgb<u8>) -> [u8; 3],
{
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        let base = degenerate(x, y, pixel);
        Rgb([
            mix(base[0], pixel[0], factor),
            mix(base[1], pixel[1], factor),
            mix(base[2], pixel[2], factor),
        ])
    })
}

fn mix(base: u8, value: u8, factor: f32) -> u8 {
    let base = f32::from(base);
    let out = base + factor * (f32::from(value) - base);
    out.round().clamp(0.0, 255.0) as u8
}

fn luma(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    let weighted = u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114;
    ((weighted + 500) / 1000) as u8
}

fn mean_luma(image: &RgbImage) -> u8 {
    let total: u64 = image.pixels().map(|pixel| u64::from(luma(pixel))).sum();
    let count = u64::from(image.width()) * u64::from(image.height());
    ((total + count / 2) / count) as u8
}

// None on the one-pixel border, where the kernel does not fit.
fn smoothed_pixel(image: &RgbImage, x: u32, y: u32) -> Option<[u8; 3]> {
    if x == 0 || y == 0 || x + 1 >= image.width() || y + 1 >= image.height() {
        return None;
    }

    let mut sums = [0u32; 3];
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            let weight = if nx == x && ny == y { 5 } else { 1 };
            let neighbour = image.get_pixel(nx, ny);
            for (sum, channel) in sums.iter_mut().zip(neighbour.0) {
                *sum += weight * u32::from(channel);
            }
        }
    }
    Some(sums.map(|sum| ((sum + 6) / 13) as u8))
}
