// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bubble scoring: fill fractions over the rectified ink mask, grouped by
// semantic tag and classified into student code, booklet and answers.

use std::collections::BTreeMap;

use image::GrayImage;
use optiscan_core::config::FillThresholds;
use optiscan_core::{Booklet, NO_MARK, OptionLetter, QuestionFlag, ScanResult};
use optiscan_sheet::layout::{Roi, RoiRect, RoiTag};
use optiscan_sheet::SheetLayout;
use tracing::{debug, info, instrument};

use crate::binarize::{INK, compute_integral_image, region_sum};

/// Counts ink inside rectangles of one binary mask in constant time.
pub struct FillCounter {
    integral: Vec<u64>,
    width: u32,
    height: u32,
}

impl FillCounter {
    pub fn new(mask: &GrayImage) -> Self {
        Self {
            integral: compute_integral_image(mask),
            width: mask.width(),
            height: mask.height(),
        }
    }

    /// Fraction of ink pixels inside `rect` shrunk by `inset` on every side.
    /// Parts of the rectangle outside the mask count as paper.
    pub fn fill_fraction(&self, rect: &RoiRect, inset: f32) -> f64 {
        let inner = rect.inset(inset);
        let nominal = (inner.w.round() * inner.h.round()) as f64;
        if nominal <= 0.0 {
            return 0.0;
        }

        let clamp_x = |v: f32| (v.round().max(0.0) as u32).min(self.width);
        let clamp_y = |v: f32| (v.round().max(0.0) as u32).min(self.height);
        let (x1, x2) = (clamp_x(inner.x), clamp_x(inner.right()));
        let (y1, y2) = (clamp_y(inner.y), clamp_y(inner.bottom()));
        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let ink = region_sum(&self.integral, self.width, x1, y1, x2, y2) / INK as u64;
        (ink as f64 / nominal).min(1.0)
    }
}

/// Classification of one question.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionReading {
    pub answer: Option<OptionLetter>,
    pub flag: QuestionFlag,
    pub confidence: f64,
}

/// Classify a question from the fill fraction of each of its options.
///
/// Options with equal fill keep their sheet order, so the earlier letter
/// wins a tie.
pub fn classify_question(fills: &[(OptionLetter, f64)], thresholds: &FillThresholds) -> QuestionReading {
    let mut ranked = fills.to_vec();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let Some(&(top_option, top)) = ranked.first() else {
        return QuestionReading {
            answer: None,
            flag: QuestionFlag::Empty,
            confidence: 0.0,
        };
    };
    let second = ranked.get(1).map_or(0.0, |&(_, fill)| fill);

    if top < thresholds.selected {
        return QuestionReading {
            answer: None,
            flag: QuestionFlag::Empty,
            confidence: 0.0,
        };
    }

    let confidence = top / second.max(thresholds.ratio_floor);
    let flag = if second > thresholds.multi_mark_second && top / second < thresholds.multi_mark_ratio {
        QuestionFlag::MultiMark
    } else if confidence < thresholds.confident_ratio {
        QuestionFlag::LowConfidence
    } else {
        QuestionFlag::Ok
    };

    QuestionReading {
        answer: Some(top_option),
        flag,
        confidence,
    }
}

/// The most filled entry, if it reaches `selected`. The first entry wins a
/// tie.
pub fn pick_marked<T: Copy>(fills: &[(T, f64)], selected: f64) -> Option<T> {
    fills
        .iter()
        .fold(None::<(T, f64)>, |best, &(item, fill)| match best {
            Some((_, best_fill)) if best_fill >= fill => best,
            _ => Some((item, fill)),
        })
        .filter(|&(_, fill)| fill >= selected)
        .map(|(item, _)| item)
}

/// Fill fraction measured for one ROI, and whether it was read as a mark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiFill {
    pub roi: Roi,
    pub fill: f64,
    pub marked: bool,
}

/// Everything read from one rectified sheet.
#[derive(Debug, Clone)]
pub struct SheetReading {
    pub result: ScanResult,
    pub fills: Vec<RoiFill>,
}

/// Score every bubble of `layout` on the rectified ink `mask`.
#[instrument(skip_all, fields(questions = layout.shape.question_count()))]
pub fn read_sheet(
    mask: &GrayImage,
    layout: &SheetLayout,
    thresholds: &FillThresholds,
    inset: f32,
) -> SheetReading {
    let counter = FillCounter::new(mask);
    let measure = |rois: &[Roi]| -> Vec<RoiFill> {
        rois.iter()
            .map(|roi| RoiFill {
                roi: *roi,
                fill: counter.fill_fraction(&roi.rect, inset),
                marked: false,
            })
            .collect()
    };

    let mut student = measure(&layout.student_id);
    let mut booklet = measure(&layout.booklet);
    let mut answers = measure(&layout.answers);

    let student_code = read_student_code(&mut student, thresholds.selected);
    let booklet_choice = read_booklet(&mut booklet, thresholds.selected);

    let mut by_question: BTreeMap<u32, Vec<(OptionLetter, f64)>> = BTreeMap::new();
    for fill in &answers {
        if let RoiTag::AnswerOption { question, option } = fill.roi.tag {
            by_question.entry(question).or_default().push((option, fill.fill));
        }
    }

    let mut result = ScanResult {
        student_code,
        booklet: booklet_choice,
        answers: BTreeMap::new(),
        flags: BTreeMap::new(),
        confidences: BTreeMap::new(),
    };
    for (question, mut options) in by_question {
        options.sort_by_key(|(option, _)| *option);
        let reading = classify_question(&options, thresholds);
        result.answers.insert(question, reading.answer);
        result.flags.insert(question, reading.flag);
        result.confidences.insert(question, reading.confidence);
    }

    for fill in &mut answers {
        if let RoiTag::AnswerOption { question, option } = fill.roi.tag {
            fill.marked = result.answers.get(&question).copied().flatten() == Some(option);
        }
    }

    info!(
        student_code = %result.student_code,
        booklet = %result.booklet,
        flagged = result.flagged_questions().count(),
        "Bubbles scored"
    );

    let mut fills = student;
    fills.append(&mut booklet);
    fills.append(&mut answers);
    SheetReading { result, fills }
}

/// One character per digit column: the most filled digit, or [`NO_MARK`].
fn read_student_code(fills: &mut [RoiFill], selected: f64) -> String {
    let mut by_column: BTreeMap<u8, Vec<(u8, f64)>> = BTreeMap::new();
    for fill in fills.iter() {
        if let RoiTag::StudentDigit { column, digit } = fill.roi.tag {
            by_column.entry(column).or_default().push((digit, fill.fill));
        }
    }

    let mut code = String::with_capacity(by_column.len());
    for (column, mut digits) in by_column {
        digits.sort_by_key(|(digit, _)| *digit);
        match pick_marked(&digits, selected) {
            Some(digit) => {
                code.push(char::from(b'0' + digit));
                mark(fills, RoiTag::StudentDigit { column, digit });
            }
            None => code.push(NO_MARK),
        }
    }
    debug!(%code, "Student code read");
    code
}

fn read_booklet(fills: &mut [RoiFill], selected: f64) -> Booklet {
    let mut letters: Vec<(OptionLetter, f64)> = fills
        .iter()
        .filter_map(|fill| match fill.roi.tag {
            RoiTag::BookletOption { letter } => Some((letter, fill.fill)),
            _ => None,
        })
        .collect();
    letters.sort_by_key(|(letter, _)| *letter);

    match pick_marked(&letters, selected) {
        Some(letter) => {
            mark(fills, RoiTag::BookletOption { letter });
            Booklet::Selected(letter)
        }
        None => Booklet::Unknown,
    }
}

fn mark(fills: &mut [RoiFill], tag: RoiTag) {
    for fill in fills.iter_mut().filter(|fill| fill.roi.tag == tag) {
        fill.marked = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use optiscan_core::ExamShape;
    use OptionLetter::*;

    fn thresholds() -> FillThresholds {
        FillThresholds::default()
    }

    #[test]
    fn fill_below_threshold_is_empty() {
        let reading = classify_question(&[(A, 0.379), (B, 0.05)], &thresholds());
        assert_eq!(reading.answer, None);
        assert_eq!(reading.flag, QuestionFlag::Empty);
        assert_eq!(reading.confidence, 0.0);
    }

    #[test]
    fn fill_at_threshold_is_selected() {
        let reading = classify_question(&[(A, 0.05), (B, 0.38)], &thresholds());
        assert_eq!(reading.answer, Some(B));
        assert_eq!(reading.flag, QuestionFlag::Ok);
        assert!((reading.confidence - 7.6).abs() < 1e-9);
    }

    #[test]
    fn two_dark_marks_are_multi_mark() {
        let reading = classify_question(&[(A, 0.40), (B, 0.10), (C, 0.50)], &thresholds());
        assert_eq!(reading.answer, Some(C));
        assert_eq!(reading.flag, QuestionFlag::MultiMark);
        assert!((reading.confidence - 1.25).abs() < 1e-9);
    }

    #[test]
    fn close_runner_up_is_low_confidence() {
        let reading = classify_question(&[(A, 0.50), (B, 0.30)], &thresholds());
        assert_eq!(reading.answer, Some(A));
        assert_eq!(reading.flag, QuestionFlag::LowConfidence);
    }

    /// A clean mark among empty bubbles uses the ratio floor.
    #[test]
    fn lone_mark_is_confident() {
        let reading = classify_question(&[(A, 0.0), (B, 0.0), (C, 0.6)], &thresholds());
        assert_eq!(reading.flag, QuestionFlag::Ok);
        assert!((reading.confidence - 60.0).abs() < 1e-9);
    }

    #[test]
    fn equal_fills_keep_sheet_order() {
        let reading = classify_question(&[(A, 0.1), (B, 0.7), (C, 0.7)], &thresholds());
        assert_eq!(reading.answer, Some(B));
        assert_eq!(reading.flag, QuestionFlag::MultiMark);
        assert_eq!(pick_marked(&[(3u8, 0.5), (7u8, 0.5)], 0.38), Some(3));
        assert_eq!(pick_marked(&[(3u8, 0.2)], 0.38), None);
    }

    fn fills_with(rois: &[Roi], fill_for: impl Fn(RoiTag) -> f64) -> Vec<RoiFill> {
        rois.iter()
            .map(|roi| RoiFill {
                roi: *roi,
                fill: fill_for(roi.tag),
                marked: false,
            })
            .collect()
    }

    /// Student digits and booklet letters use the same inclusive threshold
    /// as answers.
    #[test]
    fn digit_and_booklet_threshold_is_inclusive() {
        let layout = SheetLayout::new(ExamShape::new(5, 4).unwrap());

        let mut student = fills_with(&layout.student_id, |tag| match tag {
            RoiTag::StudentDigit { column: 0, digit: 4 } => 0.38,
            RoiTag::StudentDigit { column: 1, digit: 7 } => 0.379,
            _ => 0.0,
        });
        assert_eq!(read_student_code(&mut student, 0.38), "4_________");
        let marked: Vec<RoiTag> = student.iter().filter(|f| f.marked).map(|f| f.roi.tag).collect();
        assert_eq!(marked, vec![RoiTag::StudentDigit { column: 0, digit: 4 }]);

        let mut booklet = fills_with(&layout.booklet, |tag| match tag {
            RoiTag::BookletOption { letter: B } => 0.38,
            _ => 0.1,
        });
        assert_eq!(read_booklet(&mut booklet, 0.38), Booklet::Selected(B));

        let mut faint = fills_with(&layout.booklet, |tag| match tag {
            RoiTag::BookletOption { letter: C } => 0.379,
            _ => 0.0,
        });
        assert_eq!(read_booklet(&mut faint, 0.38), Booklet::Unknown);
        assert!(faint.iter().all(|f| !f.marked));

        assert_eq!(pick_marked(&[(0u8, 0.1), (1u8, 0.38)], 0.38), Some(1));
        assert_eq!(pick_marked(&[(0u8, 0.1), (1u8, 0.379)], 0.38), None);
    }

    #[test]
    fn fill_fraction_counts_inset_ink() {
        let mut mask = GrayImage::new(100, 100);
        for y in 10..30 {
            for x in 10..20 {
                mask.put_pixel(x, y, Luma([INK]));
            }
        }
        let counter = FillCounter::new(&mask);
        let full = counter.fill_fraction(&RoiRect::new(10.0, 10.0, 20.0, 20.0), 0.0);
        assert!((full - 0.5).abs() < 1e-9);
        let inset = counter.fill_fraction(&RoiRect::new(7.0, 7.0, 26.0, 26.0), 3.0);
        assert!((inset - 0.5).abs() < 1e-9);
    }

    #[test]
    fn off_mask_roi_reads_as_paper() {
        let mask = GrayImage::from_pixel(50, 50, Luma([INK]));
        let counter = FillCounter::new(&mask);
        assert_eq!(counter.fill_fraction(&RoiRect::new(60.0, 60.0, 20.0, 20.0), 3.0), 0.0);
        let half = counter.fill_fraction(&RoiRect::new(40.0, 0.0, 20.0, 10.0), 0.0);
        assert!((half - 0.5).abs() < 1e-9);
    }

    /// Filling ROI rectangles directly on a mask reads back as marks.
    #[test]
    fn read_sheet_groups_by_tag() {
        let layout = SheetLayout::new(ExamShape::new(3, 4).unwrap());
        let mut mask = GrayImage::new(800, 1130);
        let mut fill_roi = |tag: RoiTag| {
            let roi = layout.all_rois().find(|r| r.tag == tag).copied().unwrap();
            for y in roi.rect.y as u32..roi.rect.bottom() as u32 {
                for x in roi.rect.x as u32..roi.rect.right() as u32 {
                    mask.put_pixel(x, y, Luma([INK]));
                }
            }
        };
        fill_roi(RoiTag::AnswerOption { question: 1, option: C });
        fill_roi(RoiTag::AnswerOption { question: 3, option: A });
        fill_roi(RoiTag::AnswerOption { question: 3, option: D });
        fill_roi(RoiTag::BookletOption { letter: B });
        fill_roi(RoiTag::StudentDigit { column: 0, digit: 4 });
        fill_roi(RoiTag::StudentDigit { column: 9, digit: 0 });

        let reading = read_sheet(&mask, &layout, &thresholds(), 3.0);
        let result = reading.result;
        assert_eq!(result.student_code, "4________0");
        assert_eq!(result.booklet, Booklet::Selected(B));
        assert_eq!(result.answers[&1], Some(C));
        assert_eq!(result.flags[&1], QuestionFlag::Ok);
        assert_eq!(result.answers[&2], None);
        assert_eq!(result.flags[&2], QuestionFlag::Empty);
        assert_eq!(result.answers[&3], Some(A));
        assert_eq!(result.flags[&3], QuestionFlag::MultiMark);

        let marked = reading.fills.iter().filter(|f| f.marked).count();
        assert_eq!(marked, 5);
    }
}
