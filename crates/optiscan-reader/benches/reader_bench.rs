// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the optiscan-reader pipeline. Inputs are rendered
// sheets, so every run exercises the full detection path.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage};

use optiscan_core::{ExamShape, OptionLetter};
use optiscan_reader::{ScanOptions, SheetReader, synthetic_marks};
use optiscan_sheet::SheetRenderer;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn rendered_sheet(shape: ExamShape) -> GrayImage {
    let marks = synthetic_marks(shape, OptionLetter::A, "1234567890");
    let rgb = SheetRenderer::new(shape).render(&marks);
    DynamicImage::ImageRgb8(rgb).to_luma8()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Marker-only detection, the per-tick cost of the camera preview.
fn bench_locate_markers(c: &mut Criterion) {
    let Ok(shape) = ExamShape::new(40, 5) else {
        return;
    };
    let gray = rendered_sheet(shape);
    let reader = SheetReader::default();

    c.bench_function("locate_markers (800x1130)", |b| {
        b.iter(|| {
            let detection = reader.locate_markers(black_box(&gray));
            black_box(detection.is_ok());
        });
    });
}

/// Full read of a 40-question sheet: ladder, rectification and scoring.
fn bench_read_sheet(c: &mut Criterion) {
    let Ok(shape) = ExamShape::new(40, 5) else {
        return;
    };
    let gray = rendered_sheet(shape);
    let reader = SheetReader::default();
    let options = ScanOptions::default();

    c.bench_function("read_gray (40 questions, 5 options)", |b| {
        b.iter(|| {
            let scan = reader.read_gray(black_box(&gray), shape, &options);
            black_box(scan.map(|s| s.result.answers.len()).ok());
        });
    });
}

criterion_group!(benches, bench_locate_markers, bench_read_sheet);
criterion_main!(benches);
