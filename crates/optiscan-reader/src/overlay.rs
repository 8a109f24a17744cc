// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Debug overlay: the rectified sheet annotated with what was read.

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use optiscan_core::{QuestionFlag, ScanResult};
use optiscan_sheet::SheetLayout;
use optiscan_sheet::layout::{RoiRect, RoiTag};

use crate::bubbles::RoiFill;

const MARKED: Rgb<u8> = Rgb([0, 170, 0]);
const FLAGGED: Rgb<u8> = Rgb([230, 120, 0]);
const MARKER: Rgb<u8> = Rgb([220, 0, 0]);

/// Draw marker frames, marked bubbles (green) and the options of flagged
/// questions (orange) over the rectified grayscale sheet.
pub fn draw_overlay(
    rectified: &GrayImage,
    layout: &SheetLayout,
    fills: &[RoiFill],
    result: &ScanResult,
) -> RgbImage {
    let mut canvas = DynamicImage::ImageLuma8(rectified.clone()).to_rgb8();

    for m in &layout.markers {
        outline(&mut canvas, &RoiRect::new(m.x, m.y, m.size, m.size), MARKER, 2);
    }

    for fill in fills {
        let flagged = match fill.roi.tag {
            RoiTag::AnswerOption { question, .. } => result
                .flags
                .get(&question)
                .is_some_and(|flag| !matches!(flag, QuestionFlag::Ok | QuestionFlag::Empty)),
            _ => false,
        };
        if fill.marked {
            outline(&mut canvas, &fill.roi.rect, MARKED, 2);
        } else if flagged {
            outline(&mut canvas, &fill.roi.rect, FLAGGED, 1);
        }
    }

    canvas
}

fn outline(canvas: &mut RgbImage, rect: &RoiRect, color: Rgb<u8>, thickness: i32) {
    for t in 0..thickness {
        let w = (rect.w.round() as i32 - 2 * t).max(1) as u32;
        let h = (rect.h.round() as i32 - 2 * t).max(1) as u32;
        let r = Rect::at(rect.x.round() as i32 + t, rect.y.round() as i32 + t).of_size(w, h);
        draw_hollow_rect_mut(canvas, r, color);
    }
}
