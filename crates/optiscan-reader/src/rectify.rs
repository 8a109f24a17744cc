// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification into the canonical sheet frame.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use optiscan_core::error::{OptiscanError, Result};
use optiscan_sheet::SheetLayout;
use optiscan_sheet::layout::{SHEET_HEIGHT, SHEET_WIDTH};
use tracing::{debug, instrument};

use crate::markers::MarkerSet;

/// Smallest accepted area of the marker quadrilateral, in square pixels.
const MIN_QUAD_AREA: f32 = 64.0;

/// Where each marker centre must land in the rectified image.
///
/// Traced centroids use pixel-index coordinates, which sit half a unit
/// before the geometric centre of the printed square.
pub fn target_centers(layout: &SheetLayout) -> [(f32, f32); 4] {
    layout
        .marker_centers_clockwise()
        .map(|(x, y)| (x - 0.5, y - 0.5))
}

/// Projective transform taking the detected marker centres onto the
/// canonical ones.
pub fn sheet_projection(markers: &MarkerSet, layout: &SheetLayout) -> Result<Projection> {
    let source = markers.centers_clockwise();
    let area = shoelace_area(&source);
    if area < MIN_QUAD_AREA {
        return Err(OptiscanError::Rectification(format!(
            "marker quadrilateral is degenerate (area {area:.1})"
        )));
    }
    Projection::from_control_points(source, target_centers(layout)).ok_or_else(|| {
        OptiscanError::Rectification("no projective transform fits the markers".into())
    })
}

/// Resample `gray` into an 800x1130 image of the canonical sheet.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn rectify(gray: &GrayImage, markers: &MarkerSet, layout: &SheetLayout) -> Result<GrayImage> {
    let projection = sheet_projection(markers, layout)?;
    let mut output = GrayImage::new(SHEET_WIDTH, SHEET_HEIGHT);
    warp_into(
        gray,
        &projection,
        Interpolation::Bilinear,
        Luma([255u8]),
        &mut output,
    );
    debug!("Sheet rectified");
    Ok(output)
}

/// Area of a quadrilateral with vertices in order.
fn shoelace_area(corners: &[(f32, f32); 4]) -> f32 {
    let n = corners.len();
    let mut area = 0.0f32;
    for i in 0..n {
        let j = (i + 1) % n;
        area += corners[i].0 * corners[j].1;
        area -= corners[j].0 * corners[i].1;
    }
    area.abs() / 2.0
}
