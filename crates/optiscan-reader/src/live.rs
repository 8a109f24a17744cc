// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async driver for the live marker preview.
//
// Frames arrive over an mpsc channel; every cadence-th frame is checked for
// markers on the blocking pool and the latest status is published through a
// watch channel. Only the frame being checked is held; no state carries from
// one tick to the next beyond the frame counter.

use std::sync::Arc;

use image::GrayImage;
use optiscan_core::error::{OptiscanError, Result};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::preview::{MarkerPreview, PreviewStatus};

/// Run the preview until the frame source closes or `shutdown` is notified.
/// Returns the preview so its counter can be inspected or reused.
#[instrument(skip_all)]
pub async fn run_live_preview(
    mut preview: MarkerPreview,
    mut frames: mpsc::Receiver<GrayImage>,
    status: watch::Sender<Option<PreviewStatus>>,
    shutdown: Arc<Notify>,
) -> Result<MarkerPreview> {
    info!("Live preview started");
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("Live preview received shutdown signal");
                break;
            }

            frame = frames.recv() => {
                let Some(frame) = frame else {
                    debug!("Frame source closed");
                    break;
                };
                let Some(index) = preview.tick() else {
                    continue;
                };
                let detector = preview.detector();
                let tick = tokio::task::spawn_blocking(move || detector.locate(&frame, index))
                    .await
                    .map_err(|e| OptiscanError::Preview(format!("detection task: {e}")))?;
                debug!(frame = index, located = tick.located, "Preview tick");
                // Nobody listening is not an error; the preview keeps going.
                let _ = status.send(Some(tick));
            }
        }
    }
    info!(frames = preview.frames_seen(), "Live preview stopped");
    Ok(preview)
}

/// A live preview running on its own task.
pub struct LivePreview {
    shutdown: Arc<Notify>,
    status: watch::Receiver<Option<PreviewStatus>>,
    task: JoinHandle<Result<MarkerPreview>>,
}

impl LivePreview {
    /// Spawn [`run_live_preview`] on the current runtime.
    pub fn spawn(preview: MarkerPreview, frames: mpsc::Receiver<GrayImage>) -> Self {
        let shutdown = Arc::new(Notify::new());
        let (status_tx, status_rx) = watch::channel(None);
        let task = tokio::spawn(run_live_preview(
            preview,
            frames,
            status_tx,
            Arc::clone(&shutdown),
        ));
        Self {
            shutdown,
            status: status_rx,
            task,
        }
    }

    /// A receiver of the most recent status.
    pub fn status(&self) -> watch::Receiver<Option<PreviewStatus>> {
        self.status.clone()
    }

    /// Signal the task to stop and wait for it. Must be called before a full
    /// capture reads from the same frame source.
    pub async fn stop(self) -> Result<MarkerPreview> {
        self.shutdown.notify_one();
        self.task
            .await
            .map_err(|e| OptiscanError::Preview(format!("task join: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma};
    use optiscan_core::ExamShape;
    use optiscan_core::config::{MarkerFilter, PreviewConfig};
    use optiscan_sheet::{SheetMarks, SheetRenderer};

    fn preview(cadence: u32) -> MarkerPreview {
        let config = PreviewConfig {
            cadence,
            ..PreviewConfig::default()
        };
        MarkerPreview::new(&config, MarkerFilter::default())
    }

    fn sheet() -> GrayImage {
        let img = SheetRenderer::new(ExamShape::new(5, 4).unwrap()).render(&SheetMarks::blank());
        DynamicImage::ImageRgb8(img).to_luma8()
    }

    #[tokio::test]
    async fn publishes_status_on_cadence_until_source_closes() {
        let (tx, rx) = mpsc::channel(8);
        let (status_tx, mut status_rx) = watch::channel(None);
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(run_live_preview(preview(2), rx, status_tx, shutdown));

        tx.send(GrayImage::from_pixel(40, 40, Luma([200u8]))).await.unwrap();
        tx.send(sheet()).await.unwrap();
        status_rx.changed().await.unwrap();
        let status = (*status_rx.borrow_and_update()).expect("status published");
        assert_eq!(status.frame, 2);
        assert!(status.located);

        drop(tx);
        let finished = task.await.unwrap().unwrap();
        assert_eq!(finished.frames_seen(), 2);
    }

    #[tokio::test]
    async fn stop_ends_a_running_preview() {
        let (tx, rx) = mpsc::channel(4);
        let live = LivePreview::spawn(preview(1), rx);
        let mut status = live.status();

        tx.send(GrayImage::from_pixel(50, 50, Luma([230u8]))).await.unwrap();
        status.changed().await.unwrap();
        assert_eq!(status.borrow().as_ref().map(|s| s.located), Some(false));

        let stopped = live.stop().await.unwrap();
        assert_eq!(stopped.frames_seen(), 1);
        drop(tx);
    }
}
