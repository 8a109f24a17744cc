// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Binarization: grayscale to inverted ink masks.
//
// Every function here returns a mask where ink (dark) pixels are 255 and
// paper is 0, which is what contour tracing and fill counting expect.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;
use optiscan_core::config::{AdaptiveMethod, BinarizationStrategy};
use tracing::{debug, instrument};

/// Ink value in a binary mask.
pub const INK: u8 = 255;
/// Paper value in a binary mask.
pub const PAPER: u8 = 0;

/// Convert any decoded image to single-channel intensity.
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Gaussian sigma matching a square kernel of side `kernel`.
pub fn sigma_for_kernel(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian pre-blur; kernels of 0 or 1 leave the image untouched.
pub fn smooth(gray: &GrayImage, kernel: u32) -> GrayImage {
    if kernel <= 1 {
        return gray.clone();
    }
    gaussian_blur_f32(gray, sigma_for_kernel(kernel))
}

/// Apply one binarization strategy to a grayscale image.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height(), strategy = %strategy))]
pub fn binarize(gray: &GrayImage, strategy: &BinarizationStrategy) -> GrayImage {
    let smoothed = smooth(gray, strategy.blur_kernel());
    match *strategy {
        BinarizationStrategy::Adaptive {
            method,
            block_size,
            offset,
            ..
        } => adaptive_threshold(&smoothed, method, block_size, offset),
        BinarizationStrategy::Otsu { .. } => {
            let threshold = otsu_threshold(&smoothed);
            debug!(threshold, "Otsu threshold computed");
            global_threshold(&smoothed, threshold)
        }
    }
}

/// Local threshold: a pixel is ink when it is darker than the mean of its
/// `block_size` neighbourhood by more than `offset`.
pub fn adaptive_threshold(
    gray: &GrayImage,
    method: AdaptiveMethod,
    block_size: u32,
    offset: i32,
) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut output = GrayImage::new(width, height);

    match method {
        AdaptiveMethod::Mean => {
            let integral = compute_integral_image(gray);
            let radius = block_size / 2;
            for (x, y, pixel) in gray.enumerate_pixels() {
                let mean = region_mean(&integral, width, height, x, y, radius);
                output.put_pixel(x, y, Luma([classify(pixel.0[0], mean, offset)]));
            }
        }
        AdaptiveMethod::Gaussian => {
            let local = gaussian_blur_f32(gray, sigma_for_kernel(block_size));
            for (x, y, pixel) in gray.enumerate_pixels() {
                let mean = local.get_pixel(x, y).0[0] as f64;
                output.put_pixel(x, y, Luma([classify(pixel.0[0], mean, offset)]));
            }
        }
    }

    output
}

fn classify(value: u8, local_mean: f64, offset: i32) -> u8 {
    if (value as f64) < local_mean - offset as f64 {
        INK
    } else {
        PAPER
    }
}

/// Pixels at or below `threshold` become ink.
pub fn global_threshold(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut output = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = if pixel.0[0] <= threshold { INK } else { PAPER };
        output.put_pixel(x, y, Luma([value]));
    }
    output
}

// -- Integral image helpers ---------------------------------------------------

/// Summed-area table of a grayscale image with a zero-padded border:
/// `table[y * (width + 1) + x]` is the sum over `[0, x) x [0, y)`.
pub(crate) fn compute_integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum: u64 = 0;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }

    table
}

/// Sum of the table's source over the half-open rectangle `[x1, x2) x [y1, y2)`.
pub(crate) fn region_sum(integral: &[u64], img_width: u32, x1: u32, y1: u32, x2: u32, y2: u32) -> u64 {
    let stride = (img_width + 1) as usize;
    let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize, y2 as usize);
    integral[y2 * stride + x2] + integral[y1 * stride + x1]
        - integral[y1 * stride + x2]
        - integral[y2 * stride + x1]
}

/// Mean over the square of `radius` around (cx, cy), clamped to the image.
fn region_mean(integral: &[u64], img_width: u32, img_height: u32, cx: u32, cy: u32, radius: u32) -> f64 {
    let x1 = cx.saturating_sub(radius);
    let y1 = cy.saturating_sub(radius);
    let x2 = (cx + radius + 1).min(img_width);
    let y2 = (cy + radius + 1).min(img_height);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }
    region_sum(integral, img_width, x1, y1, x2, y2) as f64 / area
}

/// Otsu threshold: the level maximising the between-class variance.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total_pixels = gray.width() as u64 * gray.height() as u64;
    if total_pixels == 0 {
        return 128;
    }

    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_background = 0.0f64;
    let mut weight_background = 0u64;
    let mut max_variance = 0.0f64;
    let mut best_threshold = 0u8;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total_pixels - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum_total - sum_background) / weight_foreground as f64;

        let between_variance = weight_background as f64
            * weight_foreground as f64
            * (mean_background - mean_foreground).powi(2);

        if between_variance > max_variance {
            max_variance = between_variance;
            best_threshold = t as u8;
        }
    }

    best_threshold
}
