// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the people holding the camera.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity drives how a front end presents it.

use crate::error::OptiscanError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Retaking the photo will probably work.
    Transient,
    /// The user must change something first (lighting, framing, settings).
    ActionRequired,
    /// Retrying will not help, for example a wrong file or a broken configuration.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether simply scanning again is worthwhile.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert an `OptiscanError` into a `HumanError`.
pub fn humanize_error(err: &OptiscanError) -> HumanError {
    match err {
        OptiscanError::MarkersNotFound { .. } => HumanError {
            message: "Corner markers not found.".into(),
            suggestion: "Place the form on a flat surface and make sure the black squares at all 4 corners are visible.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        OptiscanError::Rectification(_) => HumanError {
            message: "The form looks too distorted to read.".into(),
            suggestion: "Hold the camera straight above the sheet and try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        OptiscanError::Preview(_) => HumanError {
            message: "The camera preview stopped.".into(),
            suggestion: "Close and reopen the camera, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        OptiscanError::Decode(_) => HumanError {
            message: "There's a problem with this image.".into(),
            suggestion: "The image may be damaged or in an unusual format. Try saving it as a JPEG or PNG first.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        OptiscanError::InvalidExam(detail) => HumanError {
            message: "The exam settings are not valid.".into(),
            suggestion: format!("Check the number of questions and options. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        OptiscanError::InvalidConfig(detail) => HumanError {
            message: "The reader settings are not valid.".into(),
            suggestion: format!("Fix or remove the configuration file. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        OptiscanError::Render(_) | OptiscanError::Pdf(_) => HumanError {
            message: "The answer sheet could not be created.".into(),
            suggestion: "Try again with fewer questions or a different output file.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        OptiscanError::Io(io) => HumanError {
            message: "A file could not be read or written.".into(),
            suggestion: format!("Check that the file exists and that you may access it. ({io})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        OptiscanError::Serialization(_) => HumanError {
            message: "A data file is damaged.".into(),
            suggestion: "The answer key or settings file is not valid JSON.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}
