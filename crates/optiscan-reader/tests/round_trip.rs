// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Render sheets with known marks, then read them back through the public API.

use std::collections::BTreeMap;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};

use optiscan_core::scoring::{AnswerKey, ScorePolicy, score};
use optiscan_core::{Booklet, ExamShape, OptionLetter, QuestionFlag};
use optiscan_reader::{ScanOptions, SheetReader};
use optiscan_sheet::{SheetMarks, SheetRenderer};

fn answer_key(shape: ExamShape) -> AnswerKey {
    let answers: BTreeMap<u32, OptionLetter> = shape
        .questions()
        .map(|q| {
            let index = (q as usize * 7 + 3) % shape.option_count() as usize;
            (q, OptionLetter::ALL[index])
        })
        .collect();
    AnswerKey {
        booklet: Some(OptionLetter::C),
        answers,
    }
}

fn render_gray(shape: ExamShape, marks: &SheetMarks) -> GrayImage {
    let rgb = SheetRenderer::new(shape).render(marks);
    DynamicImage::ImageRgb8(rgb).to_luma8()
}

#[test]
fn filled_key_reads_back_exactly() {
    let shape = ExamShape::new(36, 5).unwrap();
    let key = answer_key(shape);
    let marks = SheetMarks::from_answer_key(&key).with_student_code("4815162342");

    let scan = SheetReader::default()
        .read_gray(&render_gray(shape, &marks), shape, &ScanOptions::default())
        .unwrap();
    let result = scan.result;

    assert_eq!(result.student_code, "4815162342");
    assert!(result.student_code_complete());
    assert_eq!(result.booklet, Booklet::Selected(OptionLetter::C));
    assert_eq!(result.answers.len(), 36);
    for (question, expected) in &key.answers {
        assert_eq!(result.answers[question], Some(*expected), "question {question}");
        assert_eq!(result.flags[question], QuestionFlag::Ok, "question {question}");
    }
    assert!(scan.warnings.is_empty());

    let summary = score(&shape, &result.answers, &key, &ScorePolicy::default());
    assert_eq!(summary.correct, 36);
    assert_eq!(summary.wrong, 0);
}

#[test]
fn blank_sheet_reads_as_all_empty() {
    let shape = ExamShape::new(20, 4).unwrap();
    let scan = SheetReader::default()
        .read_gray(&render_gray(shape, &SheetMarks::blank()), shape, &ScanOptions::default())
        .unwrap();
    let result = scan.result;

    assert_eq!(result.student_code, "__________");
    assert_eq!(result.booklet, Booklet::Unknown);
    assert!(result.answers.values().all(Option::is_none));
    assert!(result.flags.values().all(|f| *f == QuestionFlag::Empty));
    assert!(result.confidences.values().all(|c| *c == 0.0));
}

#[test]
fn png_file_round_trip() {
    let shape = ExamShape::new(24, 4).unwrap();
    let key = answer_key(shape);
    let marks = SheetMarks::from_answer_key(&key).with_student_code("0000012345");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sheet.png");
    SheetRenderer::new(shape)
        .render(&marks)
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();

    let scan = SheetReader::default()
        .read_file(&path, shape, &ScanOptions::with_overlay())
        .unwrap();
    assert_eq!(scan.result.student_code, "0000012345");
    for (question, expected) in &key.answers {
        assert_eq!(scan.result.answers[question], Some(*expected), "question {question}");
    }
    assert!(scan.overlay.is_some());
}

/// A keystoned, enlarged copy of the sheet on a larger canvas, as a phone
/// photo would give.
#[test]
fn perspective_distorted_sheet_is_rectified() {
    let shape = ExamShape::new(30, 4).unwrap();
    let key = answer_key(shape);
    let marks = SheetMarks::from_answer_key(&key).with_student_code("2718281828");
    let sheet = render_gray(shape, &marks);

    let (w, h) = (sheet.width() as f32, sheet.height() as f32);
    let projection = Projection::from_control_points(
        [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)],
        [(40.0, 30.0), (1010.0, 55.0), (1030.0, 1450.0), (25.0, 1425.0)],
    )
    .unwrap();
    let mut photo = GrayImage::from_pixel(1060, 1480, Luma([255u8]));
    warp_into(&sheet, &projection, Interpolation::Bilinear, Luma([255u8]), &mut photo);

    let scan = SheetReader::default()
        .read_gray(&photo, shape, &ScanOptions::default())
        .unwrap();
    assert_eq!((scan.detection.image_width, scan.detection.image_height), (1060, 1480));
    assert_eq!(scan.result.student_code, "2718281828");
    assert_eq!(scan.result.booklet, Booklet::Selected(OptionLetter::C));
    for (question, expected) in &key.answers {
        assert_eq!(scan.result.answers[question], Some(*expected), "question {question}");
    }
}

#[test]
fn double_mark_is_flagged() {
    let shape = ExamShape::new(10, 4).unwrap();
    let layout = optiscan_sheet::SheetLayout::new(shape);
    let marks = SheetMarks::blank();
    let mut sheet = render_gray(shape, &marks);

    // Fill question 3 options A and C by hand.
    for roi in &layout.answers {
        if let optiscan_sheet::RoiTag::AnswerOption { question: 3, option } = roi.tag {
            if matches!(option, OptionLetter::A | OptionLetter::C) {
                let center = (roi.rect.cx.round() as i32, roi.rect.cy.round() as i32);
                draw_filled_circle_mut(&mut sheet, center, 11, Luma([0u8]));
            }
        }
    }

    let scan = SheetReader::default()
        .read_gray(&sheet, shape, &ScanOptions::default())
        .unwrap();
    assert_eq!(scan.result.flags[&3], QuestionFlag::MultiMark);
    assert!(matches!(
        scan.result.answers[&3],
        Some(OptionLetter::A | OptionLetter::C)
    ));
    assert_eq!(scan.result.flags[&4], QuestionFlag::Empty);
}
