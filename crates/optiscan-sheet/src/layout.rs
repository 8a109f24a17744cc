// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sheet geometry: the canonical pixel position of every marker, bubble and
// label for a given exam shape.
//
// Everything here is a pure function of the exam shape. The reader maps
// rectified pixels back to meaning through these coordinates, so identical
// inputs must always produce identical layouts.

use optiscan_core::{Corner, ExamShape, OptionLetter};
use serde::Serialize;

/// Canonical sheet width in sheet units (one unit = one rectified pixel).
pub const SHEET_WIDTH: u32 = 800;
/// Canonical sheet height in sheet units.
pub const SHEET_HEIGHT: u32 = 1130;

/// Side of the top-right, bottom-left and bottom-right markers.
pub const MARKER_SIZE: u32 = 34;
/// The top-left marker is larger so orientation can be sanity-checked.
pub const MARKER_SIZE_TOP_LEFT: u32 = 44;
/// Distance from the sheet edge to every marker.
pub const MARKER_MARGIN: u32 = 15;

pub const HEADER_LINE_Y: f32 = 82.0;
pub const DIVIDER_X: f32 = 378.0;
pub const LEFT_PANEL_X: f32 = 70.0;

/// Number of student-ID digit columns.
pub const STUDENT_ID_DIGITS: u8 = 10;

/// Booklet letters offered on every sheet.
pub const BOOKLET_OPTIONS: [OptionLetter; 4] = [
    OptionLetter::A,
    OptionLetter::B,
    OptionLetter::C,
    OptionLetter::D,
];

/// Questions stacked in one answer column before a new column starts.
pub const QUESTIONS_PER_COLUMN: u32 = 25;

/// Regular grid of equally sized cells, each holding one bubble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGrid {
    pub start_x: f32,
    pub start_y: f32,
    pub cell_w: f32,
    pub cell_h: f32,
    pub gap_x: f32,
    pub gap_y: f32,
    pub bubble_radius: f32,
}

impl CellGrid {
    /// Horizontal distance between neighbouring cells.
    pub fn pitch_x(&self) -> f32 {
        self.cell_w + self.gap_x
    }

    /// Vertical distance between neighbouring cells.
    pub fn pitch_y(&self) -> f32 {
        self.cell_h + self.gap_y
    }

    fn cell(&self, column: u32, row: u32) -> RoiRect {
        RoiRect::new(
            self.start_x + column as f32 * self.pitch_x(),
            self.start_y + row as f32 * self.pitch_y(),
            self.cell_w,
            self.cell_h,
        )
    }
}

pub const BOOKLET_GRID: CellGrid = CellGrid {
    start_x: 95.0,
    start_y: 108.0,
    cell_w: 34.0,
    cell_h: 30.0,
    gap_x: 12.0,
    gap_y: 0.0,
    bubble_radius: 12.0,
};

pub const STUDENT_ID_GRID: CellGrid = CellGrid {
    start_x: 78.0,
    start_y: 240.0,
    cell_w: 26.0,
    cell_h: 24.0,
    gap_x: 3.0,
    gap_y: 3.0,
    bubble_radius: 9.0,
};

pub const ANSWER_GRID: CellGrid = CellGrid {
    start_x: 400.0,
    start_y: 118.0,
    cell_w: 26.0,
    cell_h: 32.0,
    gap_x: 4.0,
    gap_y: 4.0,
    bubble_radius: 11.0,
};

/// Gap between two answer columns.
pub const ANSWER_COLUMN_GAP: f32 = 20.0;
/// Width reserved for the question number at the left of each answer row.
pub const QUESTION_LABEL_WIDTH: f32 = 30.0;

/// Axis-aligned rectangle in sheet units, with its centre precomputed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoiRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub cx: f32,
    pub cy: f32,
}

impl RoiRect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            cx: x + w / 2.0,
            cy: y + h / 2.0,
        }
    }

    /// Shrink the rectangle by `by` on every side.
    pub fn inset(&self, by: f32) -> Self {
        Self::new(
            self.x + by,
            self.y + by,
            (self.w - 2.0 * by).max(0.0),
            (self.h - 2.0 * by).max(0.0),
        )
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }
}

/// What a region of interest stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RoiTag {
    StudentDigit { column: u8, digit: u8 },
    BookletOption { letter: OptionLetter },
    AnswerOption { question: u32, option: OptionLetter },
    QuestionLabel { question: u32 },
}

/// A rectangle on the canonical sheet tied to one bubble or label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Roi {
    pub rect: RoiRect,
    pub tag: RoiTag,
}

/// A printed solid corner marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerSquare {
    pub corner: Corner,
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl MarkerSquare {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.size / 2.0, self.y + self.size / 2.0)
    }
}

/// The four corner markers in [`Corner::ALL`] order.
pub fn markers() -> [MarkerSquare; 4] {
    Corner::ALL.map(marker)
}

/// The marker printed at `corner`.
pub fn marker(corner: Corner) -> MarkerSquare {
    let (w, h, m) = (SHEET_WIDTH as f32, SHEET_HEIGHT as f32, MARKER_MARGIN as f32);
    let s = MARKER_SIZE as f32;
    let (x, y, size) = match corner {
        Corner::TopLeft => (m, m, MARKER_SIZE_TOP_LEFT as f32),
        Corner::TopRight => (w - m - s, m, s),
        Corner::BottomLeft => (m, h - m - s, s),
        Corner::BottomRight => (w - m - s, h - m - s, s),
    };
    MarkerSquare {
        corner,
        x,
        y,
        size,
    }
}

/// Student-ID bubbles: ten digit columns of ten rows (digit values 0 to 9).
pub fn student_id_grid() -> Vec<Roi> {
    let g = STUDENT_ID_GRID;
    let mut grid = Vec::with_capacity(STUDENT_ID_DIGITS as usize * 10);
    for column in 0..STUDENT_ID_DIGITS {
        for digit in 0..10u8 {
            grid.push(Roi {
                rect: g.cell(column as u32, digit as u32),
                tag: RoiTag::StudentDigit { column, digit },
            });
        }
    }
    grid
}

/// Booklet bubbles: one row, one cell per letter in [`BOOKLET_OPTIONS`].
pub fn booklet_grid() -> Vec<Roi> {
    BOOKLET_OPTIONS
        .iter()
        .enumerate()
        .map(|(i, &letter)| Roi {
            rect: BOOKLET_GRID.cell(i as u32, 0),
            tag: RoiTag::BookletOption { letter },
        })
        .collect()
}

/// Zero-based answer column holding `question` (1-based).
pub fn answer_column(question: u32) -> u32 {
    (question.saturating_sub(1)) / QUESTIONS_PER_COLUMN
}

/// Number of answer columns needed for `question_count` questions.
pub fn answer_column_count(question_count: u32) -> u32 {
    question_count.div_ceil(QUESTIONS_PER_COLUMN)
}

/// Width of one answer column's content (label plus option cells).
pub fn answer_row_width(option_count: u8) -> f32 {
    QUESTION_LABEL_WIDTH + option_count as f32 * ANSWER_GRID.pitch_x()
}

/// Left edge of answer column `column`: every earlier column's width plus gap.
pub fn answer_column_x(column: u32, option_count: u8) -> f32 {
    ANSWER_GRID.start_x + column as f32 * (answer_row_width(option_count) + ANSWER_COLUMN_GAP)
}

fn answer_row_y(question: u32) -> f32 {
    let row = (question - 1) % QUESTIONS_PER_COLUMN;
    ANSWER_GRID.start_y + row as f32 * ANSWER_GRID.pitch_y()
}

/// Answer bubbles for every question, options left to right.
pub fn answer_grid(shape: &ExamShape) -> Vec<Roi> {
    let g = ANSWER_GRID;
    let mut grid =
        Vec::with_capacity(shape.question_count() as usize * shape.option_count() as usize);
    for question in shape.questions() {
        let base_x = answer_column_x(answer_column(question), shape.option_count());
        let y = answer_row_y(question);
        for option in shape.options() {
            let x = base_x + QUESTION_LABEL_WIDTH + option.index() as f32 * g.pitch_x();
            grid.push(Roi {
                rect: RoiRect::new(x, y, g.cell_w, g.cell_h),
                tag: RoiTag::AnswerOption { question, option },
            });
        }
    }
    grid
}

/// Question-number label cells, one per question.
pub fn question_labels(shape: &ExamShape) -> Vec<Roi> {
    shape
        .questions()
        .map(|question| Roi {
            rect: RoiRect::new(
                answer_column_x(answer_column(question), shape.option_count()),
                answer_row_y(question),
                QUESTION_LABEL_WIDTH,
                ANSWER_GRID.cell_h,
            ),
            tag: RoiTag::QuestionLabel { question },
        })
        .collect()
}

/// Right-most x an answer bubble may reach and still be readable.
fn usable_right_edge() -> f32 {
    (SHEET_WIDTH - MARKER_MARGIN) as f32
}

/// Largest question count whose answer grid stays on the sheet.
pub fn max_questions(option_count: u8) -> u32 {
    let mut columns = 0;
    loop {
        let right = answer_column_x(columns, option_count) + answer_row_width(option_count)
            - ANSWER_GRID.gap_x;
        if right > usable_right_edge() {
            break;
        }
        columns += 1;
    }
    columns * QUESTIONS_PER_COLUMN
}

/// Complete layout of one sheet for one exam shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetLayout {
    pub shape: ExamShape,
    pub markers: [MarkerSquare; 4],
    pub student_id: Vec<Roi>,
    pub booklet: Vec<Roi>,
    pub answers: Vec<Roi>,
    pub labels: Vec<Roi>,
}

impl SheetLayout {
    pub fn new(shape: ExamShape) -> Self {
        Self {
            shape,
            markers: markers(),
            student_id: student_id_grid(),
            booklet: booklet_grid(),
            answers: answer_grid(&shape),
            labels: question_labels(&shape),
        }
    }

    pub fn marker(&self, corner: Corner) -> &MarkerSquare {
        let index = match corner {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomLeft => 2,
            Corner::BottomRight => 3,
        };
        &self.markers[index]
    }

    /// Ideal marker centres in TL, TR, BR, BL order (clockwise).
    pub fn marker_centers_clockwise(&self) -> [(f32, f32); 4] {
        [
            self.marker(Corner::TopLeft).center(),
            self.marker(Corner::TopRight).center(),
            self.marker(Corner::BottomRight).center(),
            self.marker(Corner::BottomLeft).center(),
        ]
    }

    /// Whether every answer bubble lies on the sheet.
    pub fn fits_sheet(&self) -> bool {
        self.answers
            .iter()
            .all(|roi| roi.rect.right() <= usable_right_edge())
    }

    /// Every ROI on the sheet.
    pub fn all_rois(&self) -> impl Iterator<Item = &Roi> {
        self.student_id
            .iter()
            .chain(&self.booklet)
            .chain(&self.answers)
            .chain(&self.labels)
    }
}
