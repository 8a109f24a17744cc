// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// optiscan-sheet: the answer-sheet template.
//
// Provides the canonical sheet geometry shared by the renderer and the
// reader, a raster renderer for blank, pre-filled and synthetic sheets, and
// a printable PDF writer.

pub mod layout;
pub mod pdf;
pub mod render;

pub use layout::{Roi, RoiRect, RoiTag, SheetLayout};
pub use pdf::SheetPdfWriter;
pub use render::{SheetMarks, SheetRenderer, render_sheet};
