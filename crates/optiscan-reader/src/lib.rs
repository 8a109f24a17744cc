// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// optiscan-reader: reads filled answer sheets from photos and scans.
//
// Provides the one-shot pipeline (binarization ladder, corner-marker
// detection, perspective rectification, bubble scoring), the marker-only
// camera preview with its async driver, and a render-and-read self-test.

pub mod binarize;
pub mod bubbles;
pub mod live;
pub mod markers;
pub mod overlay;
pub mod pipeline;
pub mod preview;
pub mod rectify;
pub mod selftest;

// Re-export the primary types so callers can use `optiscan_reader::SheetReader` etc.
pub use live::{LivePreview, run_live_preview};
pub use markers::MarkerSet;
pub use pipeline::{MarkerDetection, ScanOptions, ScanWarning, SheetReader, SheetScan, decode};
pub use preview::{MarkerDetector, MarkerPreview, PreviewStatus, ScanSession};
pub use selftest::{SelfTestReport, run_self_test, synthetic_marks};
