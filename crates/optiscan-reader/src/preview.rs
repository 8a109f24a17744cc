// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Marker-only preview for camera streams, and the scan session that keeps
// it out of the way of full pipeline runs.

use image::{DynamicImage, GrayImage};
use optiscan_core::config::{BinarizationStrategy, MarkerFilter, PreviewConfig};
use optiscan_core::error::Result;
use optiscan_core::{ExamShape, ReaderConfig};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::binarize::{binarize, to_gray};
use crate::markers::{MarkerSet, detect_markers};
use crate::pipeline::{ScanOptions, SheetReader, SheetScan};

/// Result of one marker-only detection tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStatus {
    /// 1-based index of the delivered frame this status belongs to.
    pub frame: u64,
    pub located: bool,
    /// The four markers, for drawing the found-sheet outline.
    pub markers: Option<MarkerSet>,
}

/// Single-strategy marker detector. Holds no state between frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerDetector {
    strategy: BinarizationStrategy,
    filter: MarkerFilter,
}

impl MarkerDetector {
    pub fn new(strategy: BinarizationStrategy, filter: MarkerFilter) -> Self {
        Self { strategy, filter }
    }

    /// Binarize `frame` and look for all four corner markers.
    pub fn locate(&self, frame: &GrayImage, frame_index: u64) -> PreviewStatus {
        let mask = binarize(frame, &self.strategy);
        let markers = detect_markers(&mask, &self.filter);
        PreviewStatus {
            frame: frame_index,
            located: markers.is_some(),
            markers,
        }
    }
}

/// Runs marker detection on every `cadence`-th delivered frame.
#[derive(Debug, Clone)]
pub struct MarkerPreview {
    detector: MarkerDetector,
    cadence: u32,
    frames_seen: u64,
    paused: bool,
}

impl MarkerPreview {
    pub fn new(preview: &PreviewConfig, filter: MarkerFilter) -> Self {
        Self {
            detector: MarkerDetector::new(preview.strategy, filter),
            cadence: preview.cadence.max(1),
            frames_seen: 0,
            paused: false,
        }
    }

    pub fn from_config(config: &ReaderConfig) -> Self {
        Self::new(&config.preview, config.marker_filter)
    }

    pub fn detector(&self) -> MarkerDetector {
        self.detector
    }

    /// Count one delivered frame. Returns its index when detection is due.
    /// Frames delivered while paused are not counted.
    pub fn tick(&mut self) -> Option<u64> {
        if self.paused {
            return None;
        }
        self.frames_seen += 1;
        (self.frames_seen % self.cadence as u64 == 0).then_some(self.frames_seen)
    }

    /// Feed one frame; detection runs only when the cadence says so.
    pub fn on_frame(&mut self, frame: &GrayImage) -> Option<PreviewStatus> {
        let index = self.tick()?;
        let status = self.detector.locate(frame, index);
        debug!(frame = index, located = status.located, "Preview tick");
        Some(status)
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

/// A camera session: live preview plus on-demand full captures.
///
/// `capture` borrows the session mutably, so a preview tick can never run
/// while a capture is in flight.
#[derive(Debug, Clone)]
pub struct ScanSession {
    preview: MarkerPreview,
    reader: SheetReader,
}

impl ScanSession {
    pub fn new(config: ReaderConfig) -> Result<Self> {
        let preview = MarkerPreview::from_config(&config);
        let reader = SheetReader::new(config)?;
        Ok(Self { preview, reader })
    }

    pub fn preview(&self) -> &MarkerPreview {
        &self.preview
    }

    pub fn reader(&self) -> &SheetReader {
        &self.reader
    }

    /// Feed a streamed frame to the preview.
    pub fn on_frame(&mut self, frame: &GrayImage) -> Option<PreviewStatus> {
        self.preview.on_frame(frame)
    }

    /// Pause the preview, read `frame` with the full pipeline, then resume
    /// the preview whatever the outcome.
    #[instrument(skip_all, fields(questions = shape.question_count()))]
    pub fn capture(&mut self, frame: &DynamicImage, shape: ExamShape, options: &ScanOptions) -> Result<SheetScan> {
        self.preview.pause();
        info!("Preview paused for capture");
        let gray = to_gray(frame);
        let outcome = self.reader.read_gray(&gray, shape, options);
        self.preview.resume();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use optiscan_sheet::{SheetMarks, SheetRenderer};

    fn sheet() -> GrayImage {
        let img = SheetRenderer::new(ExamShape::new(5, 4).unwrap()).render(&SheetMarks::blank());
        DynamicImage::ImageRgb8(img).to_luma8()
    }

    fn preview(cadence: u32) -> MarkerPreview {
        let config = PreviewConfig {
            cadence,
            ..PreviewConfig::default()
        };
        MarkerPreview::new(&config, MarkerFilter::default())
    }

    #[test]
    fn detection_runs_on_cadence() {
        let mut p = preview(3);
        let frame = GrayImage::from_pixel(60, 80, Luma([200u8]));
        let ran: Vec<u64> = (0..9).filter_map(|_| p.on_frame(&frame)).map(|s| s.frame).collect();
        assert_eq!(ran, vec![3, 6, 9]);
    }

    #[test]
    fn paused_preview_skips_and_does_not_count() {
        let mut p = preview(2);
        p.pause();
        assert_eq!(p.tick(), None);
        assert_eq!(p.frames_seen(), 0);
        p.resume();
        assert_eq!(p.tick(), None);
        assert_eq!(p.tick(), Some(2));
    }

    #[test]
    fn preview_locates_rendered_sheet() {
        let mut p = preview(1);
        let status = p.on_frame(&sheet()).unwrap();
        assert!(status.located);
        assert!(status.markers.is_some());
    }

    #[test]
    fn blank_frame_is_not_located() {
        let status = preview(1).detector().locate(&GrayImage::from_pixel(300, 400, Luma([240u8])), 1);
        assert!(!status.located);
        assert!(status.markers.is_none());
    }

    /// The preview is paused during a capture and resumed afterwards, also
    /// when the capture fails.
    #[test]
    fn capture_resumes_preview() {
        let mut session = ScanSession::new(ReaderConfig::default()).unwrap();
        let shape = ExamShape::new(5, 4).unwrap();

        let scan = session
            .capture(&DynamicImage::ImageLuma8(sheet()), shape, &ScanOptions::default())
            .unwrap();
        assert_eq!(scan.result.answers.len(), 5);
        assert!(!session.preview().is_paused());

        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(300, 400, Luma([240u8])));
        assert!(session.capture(&blank, shape, &ScanOptions::default()).is_err());
        assert!(!session.preview().is_paused());
    }
}
