// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The full reading pipeline: decode, binarize with the retry ladder, locate
// markers, rectify, re-binarize and score bubbles.
//
// One call reads one still image to completion. Every intermediate buffer is
// owned by the call and dropped on return, including the early error paths.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use optiscan_core::config::BinarizationStrategy;
use optiscan_core::error::{OptiscanError, Result};
use optiscan_core::{Corner, ExamShape, ReaderConfig, ScanResult};
use optiscan_sheet::SheetLayout;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::binarize::{binarize, to_gray};
use crate::bubbles::read_sheet;
use crate::markers::{MarkerSet, detect_markers};
use crate::overlay::draw_overlay;
use crate::rectify::rectify;

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Also return the rectified sheet annotated with the marks read.
    pub debug_overlay: bool,
}

impl ScanOptions {
    pub fn with_overlay() -> Self {
        Self {
            debug_overlay: true,
        }
    }
}

/// Non-fatal observations made while reading a sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanWarning {
    /// The largest marker was not found top-left. The sheet is read as is.
    OrientationMismatch { largest: Corner },
    /// Markers were only found after falling back to a later strategy.
    StrategyFallback { strategy_index: usize, strategy: String },
    /// The answer grid runs past the sheet edge; those bubbles read as empty.
    LayoutOverflow { max_questions: u32 },
}

/// Markers found by the retry ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerDetection {
    pub markers: MarkerSet,
    /// Zero-based position in the ladder of the strategy that succeeded.
    pub strategy_index: usize,
    pub image_width: u32,
    pub image_height: u32,
}

/// Outcome of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct SheetScan {
    pub result: ScanResult,
    pub detection: MarkerDetection,
    pub warnings: Vec<ScanWarning>,
    pub overlay: Option<RgbImage>,
}

/// Reads answer sheets with one configuration.
///
/// The reader holds no per-scan state; any number of scans may share it.
#[derive(Debug, Clone, Default)]
pub struct SheetReader {
    config: ReaderConfig,
}

impl SheetReader {
    /// Create a reader after validating `config`.
    pub fn new(config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Read a sheet from an image file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn read_file(
        &self,
        path: impl AsRef<Path>,
        shape: ExamShape,
        options: &ScanOptions,
    ) -> Result<SheetScan> {
        let bytes = std::fs::read(path.as_ref())?;
        self.read_bytes(&bytes, shape, options)
    }

    /// Read a sheet from encoded image bytes (JPEG, PNG, ...).
    #[instrument(skip_all, fields(data_len = data.len()))]
    pub fn read_bytes(&self, data: &[u8], shape: ExamShape, options: &ScanOptions) -> Result<SheetScan> {
        let image = decode(data)?;
        self.read_image(&image, shape, options)
    }

    /// Read a sheet from a decoded image.
    pub fn read_image(&self, image: &DynamicImage, shape: ExamShape, options: &ScanOptions) -> Result<SheetScan> {
        let gray = to_gray(image);
        self.read_gray(&gray, shape, options)
    }

    /// Read a sheet from a grayscale frame.
    #[instrument(skip_all, fields(
        width = gray.width(),
        height = gray.height(),
        questions = shape.question_count(),
        option_count = shape.option_count(),
    ))]
    pub fn read_gray(&self, gray: &GrayImage, shape: ExamShape, options: &ScanOptions) -> Result<SheetScan> {
        let layout = SheetLayout::new(shape);
        let mut warnings = Vec::new();

        if !layout.fits_sheet() {
            let max_questions = optiscan_sheet::layout::max_questions(shape.option_count());
            warn!(max_questions, "Answer grid runs past the sheet edge");
            warnings.push(ScanWarning::LayoutOverflow { max_questions });
        }

        let detection = self.locate_markers(gray)?;
        if detection.strategy_index > 0 {
            let strategy = self.config.marker_strategies[detection.strategy_index].to_string();
            warnings.push(ScanWarning::StrategyFallback {
                strategy_index: detection.strategy_index,
                strategy,
            });
        }
        if !detection.markers.orientation_consistent() {
            let largest = detection.markers.largest();
            warn!(%largest, "Largest marker is not top-left; the sheet may be rotated");
            warnings.push(ScanWarning::OrientationMismatch { largest });
        }

        let rectified = rectify(gray, &detection.markers, &layout)?;
        let bubble_mask = binarize(&rectified, &self.config.bubble_strategy);
        let reading = read_sheet(&bubble_mask, &layout, &self.config.fill, self.config.roi_inset as f32);

        let overlay = options
            .debug_overlay
            .then(|| draw_overlay(&rectified, &layout, &reading.fills, &reading.result));

        info!(
            strategy_index = detection.strategy_index,
            warnings = warnings.len(),
            "Sheet read"
        );
        Ok(SheetScan {
            result: reading.result,
            detection,
            warnings,
            overlay,
        })
    }

    /// Run only the marker stages: binarize with each ladder strategy in
    /// turn until all four corner markers are found.
    #[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
    pub fn locate_markers(&self, gray: &GrayImage) -> Result<MarkerDetection> {
        let ladder = &self.config.marker_strategies;
        for (index, strategy) in ladder.iter().enumerate() {
            if let Some(markers) = self.try_strategy(gray, strategy) {
                info!(strategy_index = index, %strategy, "Corner markers located");
                return Ok(MarkerDetection {
                    markers,
                    strategy_index: index,
                    image_width: gray.width(),
                    image_height: gray.height(),
                });
            }
            if index + 1 < ladder.len() {
                warn!(attempt = index + 1, %strategy, "Marker detection failed; trying next strategy");
            }
        }
        Err(OptiscanError::MarkersNotFound {
            attempts: ladder.len(),
        })
    }

    fn try_strategy(&self, gray: &GrayImage, strategy: &BinarizationStrategy) -> Option<MarkerSet> {
        let mask = binarize(gray, strategy);
        let found = detect_markers(&mask, &self.config.marker_filter);
        debug!(found = found.is_some(), %strategy, "Detection attempt finished");
        found
    }
}

/// Decode encoded image bytes.
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(data).map_err(|err| OptiscanError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use optiscan_core::config::AdaptiveMethod;
    use optiscan_sheet::{SheetMarks, SheetRenderer};

    fn shape() -> ExamShape {
        ExamShape::new(10, 4).unwrap()
    }

    fn rendered() -> GrayImage {
        let img = SheetRenderer::new(shape()).render(&SheetMarks::blank());
        DynamicImage::ImageRgb8(img).to_luma8()
    }

    #[test]
    fn blank_paper_exhausts_the_ladder() {
        let reader = SheetReader::default();
        let paper = GrayImage::from_pixel(600, 800, Luma([235u8]));
        let err = reader.read_gray(&paper, shape(), &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, OptiscanError::MarkersNotFound { attempts: 3 }));
    }

    #[test]
    fn undecodable_bytes_fail_with_decode_error() {
        let reader = SheetReader::default();
        let err = reader
            .read_bytes(b"definitely not an image", shape(), &ScanOptions::default())
            .unwrap_err();
        assert!(matches!(err, OptiscanError::Decode(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let reader = SheetReader::default();
        let err = reader
            .read_file("/nonexistent/sheet.png", shape(), &ScanOptions::default())
            .unwrap_err();
        assert!(matches!(err, OptiscanError::Io(_)));
    }

    #[test]
    fn first_strategy_finds_rendered_markers() {
        let detection = SheetReader::default().locate_markers(&rendered()).unwrap();
        assert_eq!(detection.strategy_index, 0);
        assert!(detection.markers.orientation_consistent());
    }

    /// A first strategy that cannot produce ink forces the fallback.
    #[test]
    fn ladder_falls_back_to_next_strategy() {
        let config = ReaderConfig {
            marker_strategies: vec![
                BinarizationStrategy::Adaptive {
                    method: AdaptiveMethod::Mean,
                    blur_kernel: 0,
                    block_size: 21,
                    offset: 255,
                },
                BinarizationStrategy::Otsu { blur_kernel: 0 },
            ],
            ..ReaderConfig::default()
        };
        let reader = SheetReader::new(config).unwrap();
        let scan = reader.read_gray(&rendered(), shape(), &ScanOptions::default()).unwrap();
        assert_eq!(scan.detection.strategy_index, 1);
        assert!(scan
            .warnings
            .iter()
            .any(|w| matches!(w, ScanWarning::StrategyFallback { strategy_index: 1, .. })));
    }

    #[test]
    fn overlay_only_when_requested() {
        let reader = SheetReader::default();
        let gray = rendered();
        let plain = reader.read_gray(&gray, shape(), &ScanOptions::default()).unwrap();
        assert!(plain.overlay.is_none());
        let annotated = reader.read_gray(&gray, shape(), &ScanOptions::with_overlay()).unwrap();
        assert_eq!(annotated.overlay.map(|o| o.dimensions()), Some((800, 1130)));
    }

    #[test]
    fn oversized_exam_warns_about_overflow() {
        let wide = ExamShape::new(60, 5).unwrap();
        let img = SheetRenderer::new(wide).render(&SheetMarks::blank());
        let gray = DynamicImage::ImageRgb8(img).to_luma8();
        let scan = SheetReader::default()
            .read_gray(&gray, wide, &ScanOptions::default())
            .unwrap();
        assert!(scan
            .warnings
            .iter()
            .any(|w| matches!(w, ScanWarning::LayoutOverflow { max_questions: 50 })));
    }

    /// An upside-down sheet puts the large marker bottom-right. Reading
    /// still succeeds and reports the mismatch.
    #[test]
    fn upside_down_sheet_warns_but_reads() {
        let upside_down = image::imageops::rotate180(&rendered());
        let scan = SheetReader::default()
            .read_gray(&upside_down, shape(), &ScanOptions::default())
            .unwrap();
        assert!(scan.warnings.contains(&ScanWarning::OrientationMismatch {
            largest: Corner::BottomRight
        }));
        assert_eq!(scan.result.answers.len(), 10);
        assert_eq!(scan.result.flags.len(), 10);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ReaderConfig {
            marker_strategies: Vec::new(),
            ..ReaderConfig::default()
        };
        assert!(SheetReader::new(config).is_err());
    }
}
