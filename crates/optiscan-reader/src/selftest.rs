// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Self-test: render a sheet with known marks and read it back.

use std::collections::BTreeMap;

use optiscan_core::error::Result;
use optiscan_core::{Booklet, ExamShape, NO_MARK, OptionLetter, QuestionFlag, ScanResult};
use optiscan_sheet::{SheetMarks, SheetRenderer};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::pipeline::{ScanOptions, SheetReader};

/// Comparison of what was drawn with what was read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfTestReport {
    pub shape: ExamShape,
    pub result: ScanResult,
    /// Questions read differently from what was drawn, or flagged.
    pub mismatched_questions: Vec<u32>,
    pub booklet_ok: bool,
    pub student_code_ok: bool,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.mismatched_questions.is_empty() && self.booklet_ok && self.student_code_ok
    }

    /// Share of questions read back correctly, in `[0, 1]`.
    pub fn accuracy(&self) -> f64 {
        let total = self.shape.question_count() as f64;
        (total - self.mismatched_questions.len() as f64) / total
    }
}

/// A deterministic mark pattern: question `q` gets option `(q - 1) mod k`,
/// every third question is left blank.
pub fn synthetic_marks(shape: ExamShape, booklet: OptionLetter, student_code: &str) -> SheetMarks {
    let answers: BTreeMap<u32, OptionLetter> = shape
        .questions()
        .filter(|q| q % 3 != 0)
        .filter_map(|q| {
            let index = (q - 1) as usize % shape.option_count() as usize;
            OptionLetter::from_index(index).map(|option| (q, option))
        })
        .collect();
    SheetMarks {
        booklet: Some(booklet),
        student_code: Some(student_code.to_string()),
        answers,
    }
}

/// Render `marks` for `shape`, run the full pipeline on the render and
/// compare.
#[instrument(skip_all, fields(questions = shape.question_count()))]
pub fn run_self_test(reader: &SheetReader, shape: ExamShape, marks: &SheetMarks) -> Result<SelfTestReport> {
    let rendered = SheetRenderer::new(shape).render(marks);
    let scan = reader.read_image(&image::DynamicImage::ImageRgb8(rendered), shape, &ScanOptions::default())?;
    let result = scan.result;

    let mismatched_questions: Vec<u32> = shape
        .questions()
        .filter(|q| {
            let drawn = marks.answers.get(q).copied();
            let read = result.answers.get(q).copied().flatten();
            let expected_flag = if drawn.is_some() {
                QuestionFlag::Ok
            } else {
                QuestionFlag::Empty
            };
            drawn != read || result.flags.get(q) != Some(&expected_flag)
        })
        .collect();

    let booklet_ok = match marks.booklet {
        Some(letter) => result.booklet == Booklet::Selected(letter),
        None => result.booklet == Booklet::Unknown,
    };

    let expected_code = expected_student_code(marks.student_code.as_deref());
    let student_code_ok = result.student_code == expected_code;

    let report = SelfTestReport {
        shape,
        result,
        mismatched_questions,
        booklet_ok,
        student_code_ok,
    };
    if report.passed() {
        info!(accuracy = report.accuracy(), "Self-test passed");
    } else {
        warn!(
            mismatched = report.mismatched_questions.len(),
            booklet_ok = report.booklet_ok,
            student_code_ok = report.student_code_ok,
            "Self-test found differences"
        );
    }
    Ok(report)
}

/// The code a perfect read of `drawn` produces: one character per column,
/// undrawn or non-digit columns as [`NO_MARK`].
fn expected_student_code(drawn: Option<&str>) -> String {
    let drawn: Vec<char> = drawn.unwrap_or_default().chars().collect();
    (0..optiscan_sheet::layout::STUDENT_ID_DIGITS as usize)
        .map(|i| match drawn.get(i) {
            Some(c) if c.is_ascii_digit() => *c,
            _ => NO_MARK,
        })
        .collect()
}
