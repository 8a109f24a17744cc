// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printable answer-sheet PDF using `printpdf` 0.8.
//
// The machine-readable geometry (markers, bubbles, guide lines) is embedded
// as a raster so it prints with the exact proportions the reader expects.
// Labels are overlaid as real PDF text in the built-in Helvetica faces.

use std::path::Path;

use optiscan_core::PaperSize;
use optiscan_core::error::{OptiscanError, Result};
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    RawImageData, RawImageFormat, TextItem, XObjectTransform,
};
use tracing::{debug, info, instrument};

use crate::layout::{SHEET_HEIGHT, SHEET_WIDTH};
use crate::render::{SheetLabel, SheetMarks, SheetRenderer, TextAlign, sheet_labels};

/// Resolution the sheet raster is embedded at before fitting to the page.
const SHEET_DPI: f32 = 100.0;

/// Average Helvetica advance as a fraction of the font size.
const HELVETICA_AVG_ADVANCE: f32 = 0.52;

/// Writes answer sheets as single-page PDF documents.
pub struct SheetPdfWriter {
    paper_size: PaperSize,
    /// Printable margin on every side.
    margin_mm: f32,
}

impl SheetPdfWriter {
    pub fn new(paper_size: PaperSize) -> Self {
        Self {
            paper_size,
            margin_mm: 8.0,
        }
    }

    pub fn a4() -> Self {
        Self::new(PaperSize::A4)
    }

    pub fn with_margin_mm(mut self, margin_mm: f32) -> Self {
        self.margin_mm = margin_mm.max(0.0);
        self
    }

    fn page_dimensions(&self) -> (Mm, Mm) {
        let (w_mm, h_mm) = self.paper_size.dimensions_mm();
        (Mm(w_mm as f32), Mm(h_mm as f32))
    }

    /// Build the PDF bytes of one sheet.
    #[instrument(skip(self, renderer, marks), fields(title = renderer.title()))]
    pub fn create_sheet(&self, renderer: &SheetRenderer, marks: &SheetMarks) -> Result<Vec<u8>> {
        let (page_w, page_h) = self.page_dimensions();
        info!(paper = ?self.paper_size, "Creating answer-sheet PDF");

        let raster = renderer.render_geometry(marks);
        let (img_w, img_h) = raster.dimensions();
        if (img_w, img_h) != (SHEET_WIDTH, SHEET_HEIGHT) {
            return Err(OptiscanError::Pdf(format!(
                "unexpected sheet raster size {img_w}x{img_h}"
            )));
        }

        let raw = RawImage {
            pixels: RawImageData::U8(raster.into_raw()),
            width: img_w as usize,
            height: img_h as usize,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };

        let mut doc = PdfDocument::new(renderer.title());
        let xobject_id = doc.add_image(&raw);

        let placement = Placement::fit(page_w, page_h, self.margin_mm);
        let mut ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(placement.x_offset)),
                translate_y: Some(Pt(placement.y_offset)),
                scale_x: Some(placement.scale),
                scale_y: Some(placement.scale),
                dpi: Some(SHEET_DPI),
                rotate: None,
            },
        }];

        let labels = sheet_labels(renderer.layout(), renderer.title(), marks.booklet);
        for label in &labels {
            push_label(&mut ops, &placement, label);
        }

        doc.with_pages(vec![PdfPage::new(page_w, page_h, ops)]);
        debug!(
            scale = placement.scale,
            labels = labels.len(),
            "Sheet placed on page"
        );

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            debug!(warnings = warnings.len(), "printpdf reported warnings");
        }
        Ok(output)
    }

    /// Build one sheet and write it to `path`.
    pub fn write_sheet_to_file(
        &self,
        renderer: &SheetRenderer,
        marks: &SheetMarks,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let bytes = self.create_sheet(renderer, marks)?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!("Wrote answer-sheet PDF to {}", path.as_ref().display());
        Ok(())
    }
}

/// Where the sheet raster lands on the page, in points.
#[derive(Debug, Clone, Copy)]
struct Placement {
    x_offset: f32,
    y_offset: f32,
    scale: f32,
    /// Points per sheet unit after scaling.
    unit_pt: f32,
}

impl Placement {
    /// Fit the sheet inside the margins, centred, never upscaled.
    fn fit(page_w: Mm, page_h: Mm, margin_mm: f32) -> Self {
        let usable_w_pt = Mm(page_w.0 - 2.0 * margin_mm).into_pt().0;
        let usable_h_pt = Mm(page_h.0 - 2.0 * margin_mm).into_pt().0;

        let native_unit_pt = 72.0 / SHEET_DPI;
        let img_w_pt = SHEET_WIDTH as f32 * native_unit_pt;
        let img_h_pt = SHEET_HEIGHT as f32 * native_unit_pt;

        let scale = (usable_w_pt / img_w_pt).min(usable_h_pt / img_h_pt).min(1.0);
        let margin_pt = Mm(margin_mm).into_pt().0;

        Self {
            x_offset: margin_pt + (usable_w_pt - img_w_pt * scale) / 2.0,
            y_offset: margin_pt + (usable_h_pt - img_h_pt * scale) / 2.0,
            scale,
            unit_pt: native_unit_pt * scale,
        }
    }

    /// Sheet coordinates (y down) to page coordinates (y up).
    fn to_page(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.x_offset + x * self.unit_pt,
            self.y_offset + (SHEET_HEIGHT as f32 - y) * self.unit_pt,
        )
    }
}

fn builtin_font(bold: bool) -> BuiltinFont {
    if bold {
        BuiltinFont::HelveticaBold
    } else {
        BuiltinFont::Helvetica
    }
}

fn push_label(ops: &mut Vec<Op>, placement: &Placement, label: &SheetLabel) {
    let width = label.text.chars().count() as f32 * label.size * HELVETICA_AVG_ADVANCE;
    let left = match label.align {
        TextAlign::Left => label.x,
        TextAlign::Center => label.x - width / 2.0,
        TextAlign::Right => label.x - width,
    };
    let (x, y) = placement.to_page(left, label.baseline);

    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point { x: Pt(x), y: Pt(y) },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(label.size * placement.unit_pt),
        font: builtin_font(label.bold),
    });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(label.text.clone())],
        font: builtin_font(label.bold),
    });
    ops.push(Op::EndTextSection);
}
