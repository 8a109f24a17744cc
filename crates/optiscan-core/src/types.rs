// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Optiscan answer-sheet reader.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OptiscanError, Result};

/// Largest number of answer options a question may have (A to E).
pub const MAX_OPTIONS: u8 = 5;

/// Shape of an exam: how many questions and how many options per question.
///
/// The sheet template is parameterised only by these two numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExamShape {
    question_count: u32,
    option_count: u8,
}

impl ExamShape {
    /// Create a shape, rejecting zero questions or an option count outside 1..=5.
    pub fn new(question_count: u32, option_count: u8) -> Result<Self> {
        if question_count == 0 {
            return Err(OptiscanError::InvalidExam(
                "question count must be at least 1".into(),
            ));
        }
        if option_count == 0 || option_count > MAX_OPTIONS {
            return Err(OptiscanError::InvalidExam(format!(
                "option count must be between 1 and {MAX_OPTIONS}, got {option_count}"
            )));
        }
        Ok(Self {
            question_count,
            option_count,
        })
    }

    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    pub fn option_count(&self) -> u8 {
        self.option_count
    }

    /// Option letters used by this exam, in sheet order.
    pub fn options(&self) -> impl Iterator<Item = OptionLetter> {
        OptionLetter::ALL
            .into_iter()
            .take(self.option_count as usize)
    }

    /// Question numbers, starting at 1.
    pub fn questions(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.question_count
    }
}

/// An answer option letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
    E,
}

impl OptionLetter {
    pub const ALL: [OptionLetter; 5] = [Self::A, Self::B, Self::C, Self::D, Self::E];

    /// Letter at a zero-based position (0 → A).
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Zero-based position of this letter.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_char(self) -> char {
        (b'A' + self as u8) as char
    }

    /// Parse a single letter, case-insensitively.
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            'E' => Some(Self::E),
            _ => None,
        }
    }
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// The four sheet corners, each carrying one printed marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomLeft,
        Self::BottomRight,
    ];

    /// The theoretical corner point of a `width` x `height` frame.
    pub fn point(self, width: f32, height: f32) -> (f32, f32) {
        match self {
            Self::TopLeft => (0.0, 0.0),
            Self::TopRight => (width, 0.0),
            Self::BottomLeft => (0.0, height),
            Self::BottomRight => (width, height),
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
        };
        f.write_str(name)
    }
}

/// Booklet (exam variant) read from the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Booklet {
    Selected(OptionLetter),
    Unknown,
}

impl Booklet {
    pub fn letter(self) -> Option<OptionLetter> {
        match self {
            Self::Selected(letter) => Some(letter),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for Booklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selected(letter) => write!(f, "{letter}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for Booklet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Booklet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let mut chars = raw.chars();
        match (chars.next().and_then(OptionLetter::from_char), chars.next()) {
            (Some(letter), None) => Ok(Self::Selected(letter)),
            _ if raw == "unknown" => Ok(Self::Unknown),
            _ => Err(serde::de::Error::custom(format!(
                "expected a booklet letter or \"unknown\", got {raw:?}"
            ))),
        }
    }
}

/// Per-question reading status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionFlag {
    /// One clearly dominant mark.
    Ok,
    /// No option reached the fill threshold.
    Empty,
    /// Two comparably dark marks; the darker one is kept as a best guess.
    MultiMark,
    /// One mark selected, but not far enough ahead of the runner-up.
    LowConfidence,
}

/// Placeholder written into the student code for a column with no mark.
pub const NO_MARK: char = '_';

/// Outcome of reading one answer sheet.
///
/// Produced once per processed image and never mutated afterwards. The
/// `answers` map is the input contract of [`crate::scoring::score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// One character per student-ID column: a digit, or [`NO_MARK`].
    pub student_code: String,
    pub booklet: Booklet,
    pub answers: BTreeMap<u32, Option<OptionLetter>>,
    pub flags: BTreeMap<u32, QuestionFlag>,
    pub confidences: BTreeMap<u32, f64>,
}

impl ScanResult {
    /// Questions whose flag is anything other than [`QuestionFlag::Ok`].
    pub fn flagged_questions(&self) -> impl Iterator<Item = (u32, QuestionFlag)> + '_ {
        self.flags
            .iter()
            .filter(|(_, flag)| **flag != QuestionFlag::Ok)
            .map(|(q, flag)| (*q, *flag))
    }

    /// Whether every student-ID column carried a readable mark.
    pub fn student_code_complete(&self) -> bool {
        !self.student_code.contains(NO_MARK)
    }
}

/// Standard paper sizes for printable forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    Letter,
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::Letter => (216, 279),
        }
    }
}
