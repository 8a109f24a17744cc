// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Corner-marker detection: contour tracing, shape filtering and quadrant
// assignment on a binary ink mask.

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::{approximate_polygon_dp, arc_length, convex_hull};
use imageproc::point::Point;
use optiscan_core::Corner;
use optiscan_core::config::MarkerFilter;
use serde::Serialize;
use tracing::{debug, instrument};

/// Axis-aligned bounds of a traced contour, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

/// Shape measurements of one traced contour.
///
/// Lives only inside one detection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerCandidate {
    pub cx: f64,
    pub cy: f64,
    pub area: f64,
    pub bounding_box: BoundingBox,
    /// Contour area / convex hull area.
    pub solidity: f64,
    pub vertex_count: usize,
    /// Contour area / bounding-box area.
    pub fill_density: f64,
}

impl MarkerCandidate {
    pub fn center(&self) -> (f64, f64) {
        (self.cx, self.cy)
    }

    fn distance_to(&self, (x, y): (f64, f64)) -> f64 {
        ((self.cx - x).powi(2) + (self.cy - y).powi(2)).sqrt()
    }

    /// Whether every shape condition of `filter` holds for an image of
    /// `image_area` pixels.
    pub fn passes(&self, filter: &MarkerFilter, image_area: f64) -> bool {
        let area_fraction = self.area / image_area;
        let aspect = self.bounding_box.aspect();
        area_fraction >= filter.min_area_fraction
            && area_fraction <= filter.max_area_fraction
            && aspect >= filter.min_aspect
            && aspect <= filter.max_aspect
            && self.solidity >= filter.min_solidity
            && (filter.min_vertices..=filter.max_vertices).contains(&self.vertex_count)
            && self.fill_density >= filter.min_fill_density
    }
}

/// One accepted marker per corner of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSet {
    pub top_left: MarkerCandidate,
    pub top_right: MarkerCandidate,
    pub bottom_left: MarkerCandidate,
    pub bottom_right: MarkerCandidate,
}

impl MarkerSet {
    pub fn get(&self, corner: Corner) -> &MarkerCandidate {
        match corner {
            Corner::TopLeft => &self.top_left,
            Corner::TopRight => &self.top_right,
            Corner::BottomLeft => &self.bottom_left,
            Corner::BottomRight => &self.bottom_right,
        }
    }

    /// Markers with their corners, in [`Corner::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Corner, &MarkerCandidate)> {
        Corner::ALL.into_iter().map(|corner| (corner, self.get(corner)))
    }

    /// Centres in TL, TR, BR, BL order (clockwise).
    pub fn centers_clockwise(&self) -> [(f32, f32); 4] {
        [
            Corner::TopLeft,
            Corner::TopRight,
            Corner::BottomRight,
            Corner::BottomLeft,
        ]
        .map(|corner| {
            let m = self.get(corner);
            (m.cx as f32, m.cy as f32)
        })
    }

    /// Corner holding the largest marker. The first corner wins a tie.
    pub fn largest(&self) -> Corner {
        self.iter()
            .fold(None::<(Corner, f64)>, |best, (corner, m)| match best {
                Some((_, area)) if area >= m.area => best,
                _ => Some((corner, m.area)),
            })
            .map_or(Corner::TopLeft, |(corner, _)| corner)
    }

    /// The printed top-left marker is the largest one; anything else hints
    /// at a rotated or mirrored sheet.
    pub fn orientation_consistent(&self) -> bool {
        self.largest() == Corner::TopLeft
    }
}

/// Trace every outer contour of `mask` and keep those passing `filter`.
#[instrument(skip_all, fields(width = mask.width(), height = mask.height()))]
pub fn find_candidates(mask: &GrayImage, filter: &MarkerFilter) -> Vec<MarkerCandidate> {
    let image_area = mask.width() as f64 * mask.height() as f64;
    let contours = find_contours::<u32>(mask);

    let candidates: Vec<MarkerCandidate> = contours
        .iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .filter_map(|contour| measure_contour(&contour.points, filter.approx_epsilon))
        .filter(|candidate| candidate.passes(filter, image_area))
        .collect();

    debug!(
        contours = contours.len(),
        candidates = candidates.len(),
        "Marker candidates filtered"
    );
    candidates
}

/// Measure one closed contour. Returns `None` for degenerate contours.
pub fn measure_contour(points: &[Point<u32>], approx_epsilon: f64) -> Option<MarkerCandidate> {
    if points.len() < 3 {
        return None;
    }

    let area = polygon_area(points);
    if area <= 0.0 {
        return None;
    }

    let bounding_box = bounding_box(points);
    let hull = convex_hull(points);
    let hull_area = polygon_area(&hull);
    let solidity = if hull_area > 0.0 {
        (area / hull_area).min(1.0)
    } else {
        0.0
    };

    let epsilon = (approx_epsilon * arc_length(points, true)).max(f64::EPSILON);
    let vertex_count = approximate_closed(points, epsilon).len();
    let (cx, cy) = centroid(points);

    Some(MarkerCandidate {
        cx,
        cy,
        area,
        bounding_box,
        solidity,
        vertex_count,
        fill_density: area / bounding_box.area(),
    })
}

/// Partition candidates by the frame midpoints and keep, per quadrant, the
/// candidate nearest that quadrant's corner. Candidates exactly on a
/// midpoint belong to no quadrant.
///
/// On failure returns the corners left without a candidate.
pub fn assign_quadrants(
    candidates: &[MarkerCandidate],
    width: u32,
    height: u32,
) -> Result<MarkerSet, Vec<Corner>> {
    let (mid_x, mid_y) = (width as f64 / 2.0, height as f64 / 2.0);

    let nearest = |corner: Corner| -> Option<MarkerCandidate> {
        let (px, py) = corner.point(width as f32, height as f32);
        let target = (px as f64, py as f64);
        candidates
            .iter()
            .filter(|c| in_quadrant(c, corner, mid_x, mid_y))
            .min_by(|a, b| a.distance_to(target).total_cmp(&b.distance_to(target)))
            .copied()
    };

    let found = Corner::ALL.map(|corner| (corner, nearest(corner)));
    let missing: Vec<Corner> = found
        .iter()
        .filter(|(_, candidate)| candidate.is_none())
        .map(|(corner, _)| *corner)
        .collect();

    match found {
        [
            (_, Some(top_left)),
            (_, Some(top_right)),
            (_, Some(bottom_left)),
            (_, Some(bottom_right)),
        ] => Ok(MarkerSet {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
        }),
        _ => Err(missing),
    }
}

fn in_quadrant(candidate: &MarkerCandidate, corner: Corner, mid_x: f64, mid_y: f64) -> bool {
    let (x, y) = candidate.center();
    match corner {
        Corner::TopLeft => x < mid_x && y < mid_y,
        Corner::TopRight => x > mid_x && y < mid_y,
        Corner::BottomLeft => x < mid_x && y > mid_y,
        Corner::BottomRight => x > mid_x && y > mid_y,
    }
}

/// Find all four corner markers on an ink mask, or `None` when a quadrant
/// has no acceptable candidate.
pub fn detect_markers(mask: &GrayImage, filter: &MarkerFilter) -> Option<MarkerSet> {
    let candidates = find_candidates(mask, filter);
    assign_quadrants(&candidates, mask.width(), mask.height())
        .inspect_err(|missing| debug!(?missing, "Quadrants without a marker candidate"))
        .ok()
}

// -- Contour geometry ---------------------------------------------------------

fn as_f64(p: &Point<u32>) -> (f64, f64) {
    (p.x as f64, p.y as f64)
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[Point<u32>]) -> f64 {
    let n = points.len();
    let mut twice = 0.0f64;
    for i in 0..n {
        let (x0, y0) = as_f64(&points[i]);
        let (x1, y1) = as_f64(&points[(i + 1) % n]);
        twice += x0 * y1 - x1 * y0;
    }
    twice.abs() / 2.0
}

/// Area centroid of a closed polygon, falling back to the vertex mean for
/// degenerate outlines.
fn centroid(points: &[Point<u32>]) -> (f64, f64) {
    let n = points.len();
    let (mut twice_area, mut sx, mut sy) = (0.0f64, 0.0f64, 0.0f64);
    for i in 0..n {
        let (x0, y0) = as_f64(&points[i]);
        let (x1, y1) = as_f64(&points[(i + 1) % n]);
        let cross = x0 * y1 - x1 * y0;
        twice_area += cross;
        sx += (x0 + x1) * cross;
        sy += (y0 + y1) * cross;
    }
    if twice_area.abs() < 1e-9 {
        let count = n.max(1) as f64;
        let (mx, my) = points
            .iter()
            .map(as_f64)
            .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        return (mx / count, my / count);
    }
    (sx / (3.0 * twice_area), sy / (3.0 * twice_area))
}

fn bounding_box(points: &[Point<u32>]) -> BoundingBox {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0u32, 0u32);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    }
}

/// Douglas-Peucker approximation of a closed contour: split at the point
/// farthest from the start, simplify both halves, then merge vertices that
/// nearly coincide.
fn approximate_closed(points: &[Point<u32>], epsilon: f64) -> Vec<Point<u32>> {
    let start = as_f64(&points[0]);
    let far = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let (x, y) = as_f64(p);
            (i, (x - start.0).powi(2) + (y - start.1).powi(2))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map_or(0, |(i, _)| i);
    if far == 0 {
        return vec![points[0]];
    }

    let mut first = approximate_polygon_dp(&points[..=far], epsilon, false);
    let mut closing = points[far..].to_vec();
    closing.push(points[0]);
    let second = approximate_polygon_dp(&closing, epsilon, false);

    // Both halves share the split point; the second ends where the first began.
    first.extend(second.into_iter().skip(1));
    first.pop();

    let mut merged: Vec<Point<u32>> = Vec::with_capacity(first.len());
    for p in first {
        if merged.last().is_none_or(|last| !near(last, &p)) {
            merged.push(p);
        }
    }
    while merged.len() > 1 && merged.first().zip(merged.last()).is_some_and(|(a, b)| near(a, b)) {
        merged.pop();
    }
    merged
}

fn near(a: &Point<u32>, b: &Point<u32>) -> bool {
    let (ax, ay) = as_f64(a);
    let (bx, by) = as_f64(b);
    (ax - bx).powi(2) + (ay - by).powi(2) <= 2.25
}
