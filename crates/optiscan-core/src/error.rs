// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Optiscan.

use thiserror::Error;

/// Top-level error type for all Optiscan operations.
///
/// Per-question ambiguity is never an error: it is reported through
/// [`crate::QuestionFlag`] on an otherwise successful scan.
#[derive(Debug, Error)]
pub enum OptiscanError {
    // -- Input errors --
    #[error("invalid exam shape: {0}")]
    InvalidExam(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    // -- Pipeline errors --
    #[error("corner markers not found after {attempts} binarization attempts")]
    MarkersNotFound { attempts: usize },

    #[error("perspective rectification failed: {0}")]
    Rectification(String),

    #[error("live preview stopped unexpectedly: {0}")]
    Preview(String),

    // -- Configuration --
    #[error("invalid reader configuration: {0}")]
    InvalidConfig(String),

    // -- Sheet output --
    #[error("sheet rendering failed: {0}")]
    Render(String),

    #[error("PDF generation failed: {0}")]
    Pdf(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OptiscanError>;
