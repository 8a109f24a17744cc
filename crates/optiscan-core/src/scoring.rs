// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scoring: combines a scan's answers with an answer key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ExamShape, OptionLetter};

/// Correct option per question, optionally tied to one booklet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerKey {
    #[serde(default)]
    pub booklet: Option<OptionLetter>,
    pub answers: BTreeMap<u32, OptionLetter>,
}

impl AnswerKey {
    pub fn new(answers: BTreeMap<u32, OptionLetter>) -> Self {
        Self {
            booklet: None,
            answers,
        }
    }

    pub fn correct_option(&self, question: u32) -> Option<OptionLetter> {
        self.answers.get(&question).copied()
    }
}

/// How wrong answers and points are weighed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorePolicy {
    /// Every `wrong_penalty` wrong answers cancel one correct answer.
    /// Zero disables the penalty.
    pub wrong_penalty: u32,
    pub points_per_question: f64,
}

impl Default for ScorePolicy {
    fn default() -> Self {
        Self {
            wrong_penalty: 4,
            points_per_question: 1.0,
        }
    }
}

/// Tally of one graded sheet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub correct: u32,
    pub wrong: u32,
    pub empty: u32,
    pub net: f64,
    pub score: f64,
}

/// Grade `answers` against `key`.
///
/// A question without an answer is empty; an answer that does not match the
/// key (or whose question has no key entry) is wrong.
pub fn score(
    shape: &ExamShape,
    answers: &BTreeMap<u32, Option<OptionLetter>>,
    key: &AnswerKey,
    policy: &ScorePolicy,
) -> ScoreSummary {
    let (mut correct, mut wrong, mut empty) = (0u32, 0u32, 0u32);

    for question in shape.questions() {
        match answers.get(&question).copied().flatten() {
            None => empty += 1,
            Some(given) if key.correct_option(question) == Some(given) => correct += 1,
            Some(_) => wrong += 1,
        }
    }

    let mut net = correct as f64;
    if policy.wrong_penalty > 0 {
        net -= wrong as f64 / policy.wrong_penalty as f64;
    }
    let net = round2(net).max(0.0);
    let score = round2(net * policy.points_per_question);

    ScoreSummary {
        correct,
        wrong,
        empty,
        net,
        score,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
