// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster sheet renderer: draws the canonical answer sheet for an exam shape,
// optionally with bubbles pre-filled. Used for printable blanks, answer-key
// previews and synthetic self-test images.

use std::collections::BTreeMap;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut,
    draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use optiscan_core::error::{OptiscanError, Result};
use optiscan_core::scoring::AnswerKey;
use optiscan_core::{ExamShape, OptionLetter};
use tracing::{debug, info, instrument, warn};

use crate::layout::{
    ANSWER_GRID, BOOKLET_GRID, DIVIDER_X, HEADER_LINE_Y, LEFT_PANEL_X, MARKER_MARGIN,
    MARKER_SIZE, MARKER_SIZE_TOP_LEFT, QUESTION_LABEL_WIDTH, QUESTIONS_PER_COLUMN, RoiTag,
    SHEET_HEIGHT, SHEET_WIDTH, STUDENT_ID_DIGITS, STUDENT_ID_GRID, SheetLayout,
    answer_column_count, answer_column_x, answer_row_width,
};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const BUBBLE_OUTLINE: Rgb<u8> = Rgb([0x44, 0x44, 0x44]);

/// Font used for raster labels unless another is supplied.
static DEFAULT_FONT: &[u8] = include_bytes!("../assets/Tuffy.ttf");

fn gray(level: u8) -> Rgb<u8> {
    Rgb([level, level, level])
}

/// Bubbles to fill in when rendering a sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetMarks {
    pub booklet: Option<OptionLetter>,
    /// Digits to fill in the student-ID grid, one per column. Characters that
    /// are not ASCII digits leave their column blank.
    pub student_code: Option<String>,
    pub answers: BTreeMap<u32, OptionLetter>,
}

impl SheetMarks {
    /// A blank sheet.
    pub fn blank() -> Self {
        Self::default()
    }

    /// Fill the correct answers of `key`, and its booklet if it names one.
    pub fn from_answer_key(key: &AnswerKey) -> Self {
        Self {
            booklet: key.booklet,
            student_code: None,
            answers: key.answers.clone(),
        }
    }

    pub fn with_booklet(mut self, booklet: OptionLetter) -> Self {
        self.booklet = Some(booklet);
        self
    }

    pub fn with_student_code(mut self, code: impl Into<String>) -> Self {
        self.student_code = Some(code.into());
        self
    }

    fn student_digit(&self, column: u8) -> Option<u8> {
        let code = self.student_code.as_deref()?;
        let c = code.chars().nth(column as usize)?;
        c.to_digit(10).map(|d| d as u8)
    }
}

/// Horizontal anchoring of a text label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// One piece of printed text on the sheet, in sheet units.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLabel {
    pub text: String,
    pub x: f32,
    /// Baseline y.
    pub baseline: f32,
    pub size: f32,
    pub bold: bool,
    pub align: TextAlign,
    /// Gray level (0 = black).
    pub shade: u8,
}

impl SheetLabel {
    fn new(text: impl Into<String>, x: f32, baseline: f32, size: f32) -> Self {
        Self {
            text: text.into(),
            x,
            baseline,
            size,
            bold: false,
            align: TextAlign::Left,
            shade: 0,
        }
    }

    fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    fn align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    fn shade(mut self, shade: u8) -> Self {
        self.shade = shade;
        self
    }
}

/// Y of the row separating the student grid from the marking examples.
fn student_grid_bottom() -> f32 {
    let g = STUDENT_ID_GRID;
    g.start_y + 10.0 * g.pitch_y() - g.gap_y
}

fn student_grid_right() -> f32 {
    let g = STUDENT_ID_GRID;
    g.start_x + STUDENT_ID_DIGITS as f32 * g.pitch_x() - g.gap_x
}

/// Every text label printed on a sheet.
pub fn sheet_labels(layout: &SheetLayout, title: &str, booklet: Option<OptionLetter>) -> Vec<SheetLabel> {
    let shape = layout.shape;
    let center_x = SHEET_WIDTH as f32 / 2.0;
    let mut labels = Vec::new();

    labels.push(SheetLabel::new(title, center_x, 50.0, 20.0).bold().align(TextAlign::Center));

    let mut subtitle = Vec::new();
    if let Some(letter) = booklet {
        subtitle.push(format!("{letter} Booklet"));
    }
    subtitle.push(format!("{} Questions", shape.question_count()));
    subtitle.push(format!("{} Options", shape.option_count()));
    labels.push(
        SheetLabel::new(subtitle.join("  -  "), center_x, 68.0, 12.0)
            .align(TextAlign::Center)
            .shade(0x33),
    );

    // Left panel.
    let booklet_y = HEADER_LINE_Y + 8.0;
    labels.push(SheetLabel::new("Booklet", LEFT_PANEL_X, booklet_y + 10.0, 11.0).bold().shade(0x22));
    for roi in &layout.booklet {
        if let RoiTag::BookletOption { letter } = roi.tag {
            labels.push(
                SheetLabel::new(letter.to_string(), roi.rect.cx + BOOKLET_GRID.bubble_radius + 5.0, roi.rect.cy + 4.0, 10.0)
                    .bold()
                    .shade(0x55),
            );
        }
    }

    let student_y = booklet_y + 62.0;
    labels.push(
        SheetLabel::new("Student ID (10 Digits)", LEFT_PANEL_X, student_y + 10.0, 11.0)
            .bold()
            .shade(0x22),
    );
    let g = STUDENT_ID_GRID;
    let box_w = student_grid_right() - g.start_x + 6.0;
    labels.push(
        SheetLabel::new(
            "Mark the correct digit in each column",
            g.start_x + box_w / 2.0 - 3.0,
            g.start_y - 39.0,
            9.0,
        )
        .bold()
        .align(TextAlign::Center),
    );
    for digit in 0..10 {
        let cy = g.start_y + digit as f32 * g.pitch_y() + g.cell_h / 2.0;
        labels.push(
            SheetLabel::new(digit.to_string(), g.start_x - 6.0, cy + 3.0, 9.0)
                .bold()
                .align(TextAlign::Right)
                .shade(0x55),
        );
    }

    let examples_y = student_grid_bottom() + 26.0;
    labels.push(SheetLabel::new("Correct Marking:", LEFT_PANEL_X + 10.0, examples_y, 10.0).bold());
    labels.push(SheetLabel::new("Wrong Marking:", LEFT_PANEL_X + 10.0, examples_y + 24.0, 10.0).bold());
    let info_y = examples_y + 54.0;
    labels.push(SheetLabel::new("Full Name:", LEFT_PANEL_X + 10.0, info_y, 10.0).bold());
    labels.push(SheetLabel::new("Signature:", LEFT_PANEL_X + 10.0, info_y + 28.0, 10.0).bold());

    // Right panel.
    labels.push(SheetLabel::new("Answers", DIVIDER_X + 12.0, HEADER_LINE_Y + 18.0, 11.0).bold().shade(0x22));
    for column in 0..answer_column_count(shape.question_count()) {
        let base_x = answer_column_x(column, shape.option_count());
        for option in shape.options() {
            let cx = base_x + QUESTION_LABEL_WIDTH + option.index() as f32 * ANSWER_GRID.pitch_x() + ANSWER_GRID.cell_w / 2.0;
            labels.push(
                SheetLabel::new(option.to_string(), cx, ANSWER_GRID.start_y - 7.0, 11.0)
                    .bold()
                    .align(TextAlign::Center)
                    .shade(0x33),
            );
        }
    }
    for roi in &layout.labels {
        if let RoiTag::QuestionLabel { question } = roi.tag {
            labels.push(
                SheetLabel::new(format!("{question}."), roi.rect.x + QUESTION_LABEL_WIDTH - 6.0, roi.rect.cy + 4.0, 11.0)
                    .bold()
                    .align(TextAlign::Right),
            );
        }
    }

    labels.push(
        SheetLabel::new(
            "This form will be scanned by an optical reader. Please fill in with a pencil.",
            center_x,
            SHEET_HEIGHT as f32 - 8.0,
            8.0,
        )
        .align(TextAlign::Center)
        .shade(0x99),
    );

    labels
}

/// Draws answer sheets for one exam shape.
pub struct SheetRenderer {
    layout: SheetLayout,
    title: String,
    font: Option<FontArc>,
}

impl SheetRenderer {
    /// A renderer using the bundled font for text labels.
    pub fn new(shape: ExamShape) -> Self {
        let font = FontArc::try_from_slice(DEFAULT_FONT)
            .inspect_err(|err| warn!(%err, "Bundled font unusable; labels will be skipped"))
            .ok();
        Self {
            layout: SheetLayout::new(shape),
            title: "Exam".into(),
            font,
        }
    }

    /// Set the title printed at the top of the sheet.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Use a TrueType/OpenType font for the text labels instead of the
    /// bundled one.
    pub fn with_font_bytes(mut self, bytes: Vec<u8>) -> Result<Self> {
        let font = FontArc::try_from_vec(bytes)
            .map_err(|err| OptiscanError::Render(format!("invalid font: {err}")))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Render the sheet at the canonical 800x1130 resolution, text included.
    pub fn render(&self, marks: &SheetMarks) -> RgbImage {
        let mut canvas = self.render_geometry(marks);
        if let Some(font) = &self.font {
            let labels = sheet_labels(&self.layout, &self.title, marks.booklet);
            for label in &labels {
                draw_label(&mut canvas, font, label);
            }
            debug!(labels = labels.len(), "Text labels drawn");
        }
        canvas
    }

    /// Render markers, guides and bubbles only. The PDF writer sets the text
    /// itself on top of this raster.
    #[instrument(skip(self, marks), fields(questions = self.layout.shape.question_count()))]
    pub fn render_geometry(&self, marks: &SheetMarks) -> RgbImage {
        if !self.layout.fits_sheet() {
            warn!(
                questions = self.layout.shape.question_count(),
                options = self.layout.shape.option_count(),
                "Answer grid runs past the right edge of the sheet"
            );
        }

        let mut canvas = RgbImage::from_pixel(SHEET_WIDTH, SHEET_HEIGHT, WHITE);

        for m in &self.layout.markers {
            draw_filled_rect_mut(&mut canvas, rect(m.x, m.y, m.size, m.size), BLACK);
        }

        let right_marker_x = (SHEET_WIDTH - MARKER_MARGIN - MARKER_SIZE) as f32;
        draw_line_segment_mut(
            &mut canvas,
            ((MARKER_MARGIN + MARKER_SIZE_TOP_LEFT) as f32 + 5.0, HEADER_LINE_Y),
            (right_marker_x - 5.0, HEADER_LINE_Y),
            BLACK,
        );
        draw_line_segment_mut(
            &mut canvas,
            (DIVIDER_X, HEADER_LINE_Y + 4.0),
            (DIVIDER_X, (SHEET_HEIGHT - MARKER_MARGIN - MARKER_SIZE) as f32 - 5.0),
            gray(0xBB),
        );

        self.draw_left_panel(&mut canvas, marks);
        self.draw_right_panel(&mut canvas, marks);

        info!(
            filled_answers = marks.answers.len(),
            booklet = ?marks.booklet,
            "Sheet rendered"
        );
        canvas
    }

    fn draw_left_panel(&self, canvas: &mut RgbImage, marks: &SheetMarks) {
        let booklet_y = HEADER_LINE_Y + 8.0;
        for roi in &self.layout.booklet {
            let RoiTag::BookletOption { letter } = roi.tag else {
                continue;
            };
            let filled = marks.booklet == Some(letter);
            draw_bubble(canvas, roi.rect.cx, roi.rect.cy, BOOKLET_GRID.bubble_radius, filled);
        }
        hline(canvas, LEFT_PANEL_X, DIVIDER_X - 15.0, booklet_y + 52.0, gray(0xDD));

        let g = STUDENT_ID_GRID;
        let grid_right = student_grid_right();
        let grid_bottom = student_grid_bottom();
        let box_w = grid_right - g.start_x + 6.0;

        let instructions_y = g.start_y - 50.0;
        draw_filled_rect_mut(canvas, rect(g.start_x - 3.0, instructions_y, box_w, 16.0), gray(0xF0));
        draw_hollow_rect_mut(canvas, rect(g.start_x - 3.0, instructions_y, box_w, 16.0), gray(0xAA));

        let write_box_y = g.start_y - 28.0;
        for column in 0..STUDENT_ID_DIGITS {
            let x = g.start_x + column as f32 * g.pitch_x();
            draw_hollow_rect_mut(canvas, rect(x, write_box_y, g.cell_w, 16.0), gray(0x88));
        }

        for row in (0..10).step_by(2) {
            let y = g.start_y + row as f32 * g.pitch_y();
            draw_filled_rect_mut(canvas, rect(g.start_x - 3.0, y - 1.0, box_w, g.cell_h + 2.0), gray(0xF8));
        }

        for column in 1..STUDENT_ID_DIGITS {
            let x = g.start_x + column as f32 * g.pitch_x() - g.gap_x / 2.0;
            draw_line_segment_mut(canvas, (x, write_box_y), (x, grid_bottom + 2.0), gray(0xE0));
        }

        for roi in &self.layout.student_id {
            let RoiTag::StudentDigit { column, digit } = roi.tag else {
                continue;
            };
            let filled = marks.student_digit(column) == Some(digit);
            draw_bubble(canvas, roi.rect.cx, roi.rect.cy, g.bubble_radius, filled);
        }

        draw_hollow_rect_mut(
            canvas,
            rect(g.start_x - 3.0, write_box_y, box_w, grid_bottom - write_box_y + 3.0),
            gray(0xBB),
        );
        hline(canvas, LEFT_PANEL_X, DIVIDER_X - 15.0, grid_bottom + 12.0, gray(0xDD));

        // Marking examples: a solid bubble, then a ring with a faint dot.
        let examples_y = grid_bottom + 26.0;
        let example_x = LEFT_PANEL_X + 160.0;
        draw_bubble(canvas, example_x, examples_y - 4.0, 10.0, true);
        let (ex, ey) = (example_x.round() as i32, (examples_y + 20.0).round() as i32);
        draw_hollow_circle_mut(canvas, (ex, ey), 10, BLACK);
        draw_hollow_circle_mut(canvas, (ex, ey), 9, BLACK);
        draw_filled_circle_mut(canvas, (ex, ey), 4, gray(0xAA));

        let info_y = examples_y + 54.0;
        hline(canvas, LEFT_PANEL_X + 70.0, DIVIDER_X - 20.0, info_y + 2.0, gray(0x66));
        hline(canvas, LEFT_PANEL_X + 45.0, DIVIDER_X - 20.0, info_y + 30.0, gray(0x66));
    }

    fn draw_right_panel(&self, canvas: &mut RgbImage, marks: &SheetMarks) {
        let shape = self.layout.shape;
        let g = ANSWER_GRID;
        let row_w = answer_row_width(shape.option_count());

        for label in &self.layout.labels {
            let RoiTag::QuestionLabel { question } = label.tag else {
                continue;
            };
            if question % 2 == 0 {
                draw_filled_rect_mut(
                    canvas,
                    rect(label.rect.x - 2.0, label.rect.y - 2.0, row_w + 4.0, g.cell_h + 4.0),
                    gray(0xF8),
                );
            }
        }

        for roi in &self.layout.answers {
            let RoiTag::AnswerOption { question, option } = roi.tag else {
                continue;
            };
            let filled = marks.answers.get(&question) == Some(&option);
            draw_bubble(canvas, roi.rect.cx, roi.rect.cy, g.bubble_radius, filled);
        }

        for column in 0..answer_column_count(shape.question_count()) {
            let base_x = answer_column_x(column, shape.option_count());
            let in_column = QUESTIONS_PER_COLUMN.min(shape.question_count() - column * QUESTIONS_PER_COLUMN);
            for row in (5..in_column).step_by(5) {
                let y = g.start_y + row as f32 * g.pitch_y() - g.gap_y / 2.0;
                hline(canvas, base_x, base_x + row_w, y, gray(0xE0));
            }
        }
    }
}

/// Render a sheet as an examiner prints it: booklet bubble pre-filled if
/// given, and the answer key's bubbles filled for a key preview.
pub fn render_sheet(
    shape: ExamShape,
    booklet: Option<OptionLetter>,
    answer_key: Option<&AnswerKey>,
) -> RgbImage {
    let mut marks = answer_key.map(SheetMarks::from_answer_key).unwrap_or_default();
    marks.booklet = booklet;
    SheetRenderer::new(shape).render(&marks)
}

fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
    Rect::at(x.round() as i32, y.round() as i32).of_size(w.round().max(1.0) as u32, h.round().max(1.0) as u32)
}

fn hline(canvas: &mut RgbImage, x0: f32, x1: f32, y: f32, color: Rgb<u8>) {
    draw_line_segment_mut(canvas, (x0, y), (x1, y), color);
}

/// A filled bubble is a solid disc inside a white halo; an empty one is a
/// thin ring.
fn draw_bubble(canvas: &mut RgbImage, cx: f32, cy: f32, radius: f32, filled: bool) {
    let center = (cx.round() as i32, cy.round() as i32);
    let r = radius.round() as i32;
    if filled {
        draw_filled_circle_mut(canvas, center, r + 2, WHITE);
        draw_filled_circle_mut(canvas, center, r, BLACK);
    } else {
        draw_hollow_circle_mut(canvas, center, r, BUBBLE_OUTLINE);
    }
}

fn draw_label(canvas: &mut RgbImage, font: &FontArc, label: &SheetLabel) {
    // Bold faces are not available from a single font file; draw bold
    // labels one pixel wider instead.
    let scale = PxScale::from(label.size * 1.3);
    let (width, _) = text_size(scale, font, &label.text);
    let left = match label.align {
        TextAlign::Left => label.x,
        TextAlign::Center => label.x - width as f32 / 2.0,
        TextAlign::Right => label.x - width as f32,
    };
    let top = label.baseline - label.size;
    let color = gray(label.shade);
    draw_text_mut(canvas, color, left.round() as i32, top.round() as i32, scale, font, &label.text);
    if label.bold {
        draw_text_mut(canvas, color, left.round() as i32 + 1, top.round() as i32, scale, font, &label.text);
    }
}
