// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// optiscan: read and grade multiple-choice answer sheets.
//
// Entry point. Initialises logging (stderr), parses the command line and
// prints results as JSON on stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use optiscan_core::error::{OptiscanError, Result};
use optiscan_core::human_errors::humanize_error;
use optiscan_core::scoring::{AnswerKey, ScorePolicy, ScoreSummary, score};
use optiscan_core::{ExamShape, OptionLetter, PaperSize, ReaderConfig, ScanResult};
use optiscan_reader::{
    MarkerDetection, ScanOptions, ScanWarning, SheetReader, decode, run_self_test, synthetic_marks,
};
use optiscan_sheet::{SheetMarks, SheetPdfWriter, SheetRenderer};

#[derive(Parser, Debug)]
#[command(name = "optiscan", version, about = "Read and grade multiple-choice answer sheets")]
struct Cli {
    /// Reader configuration as JSON. Missing fields take their defaults.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a photographed or scanned sheet and print the result as JSON
    Scan {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        #[command(flatten)]
        shape: ShapeArgs,

        /// Answer key (JSON) to grade the sheet against
        #[arg(long, value_name = "FILE")]
        key: Option<PathBuf>,

        /// Wrong answers that cancel one correct answer (0 disables)
        #[arg(long, default_value_t = 4)]
        penalty: u32,

        /// Points per question
        #[arg(long, default_value_t = 1.0)]
        points: f64,

        /// Write the annotated, rectified sheet to this PNG
        #[arg(long, value_name = "PNG")]
        overlay: Option<PathBuf>,
    },

    /// Only look for the four corner markers
    Locate {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },

    /// Render a blank or pre-filled sheet to PNG or PDF (chosen by extension)
    Render {
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[command(flatten)]
        shape: ShapeArgs,

        /// Booklet letter printed in the header and filled in
        #[arg(long, value_parser = parse_letter)]
        booklet: Option<OptionLetter>,

        /// Fill the correct answers of this key (JSON)
        #[arg(long, value_name = "FILE")]
        key: Option<PathBuf>,

        /// Fill these digits in the student-ID grid
        #[arg(long, value_name = "DIGITS")]
        student_code: Option<String>,

        #[arg(long)]
        title: Option<String>,

        /// TrueType font for raster text instead of the bundled one
        #[arg(long, value_name = "TTF")]
        font: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "a4")]
        paper: Paper,

        /// Page margin for PDF output, in millimetres
        #[arg(long, default_value_t = 8.0)]
        margin_mm: f32,
    },

    /// Render known marks, read them back and report the differences
    SelfTest {
        #[command(flatten)]
        shape: ShapeArgs,

        #[arg(long, value_parser = parse_letter, default_value = "A")]
        booklet: OptionLetter,

        #[arg(long, default_value = "0123456789")]
        student_code: String,
    },
}

#[derive(Args, Debug)]
struct ShapeArgs {
    /// Number of questions
    #[arg(short, long)]
    questions: u32,

    /// Options per question (1 to 5)
    #[arg(long, default_value_t = 5)]
    options: u8,
}

impl ShapeArgs {
    fn shape(&self) -> Result<ExamShape> {
        ExamShape::new(self.questions, self.options)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Paper {
    A4,
    Letter,
}

impl From<Paper> for PaperSize {
    fn from(paper: Paper) -> Self {
        match paper {
            Paper::A4 => PaperSize::A4,
            Paper::Letter => PaperSize::Letter,
        }
    }
}

fn parse_letter(raw: &str) -> std::result::Result<OptionLetter, String> {
    let mut chars = raw.chars();
    match (chars.next().and_then(OptionLetter::from_char), chars.next()) {
        (Some(letter), None) => Ok(letter),
        _ => Err(format!("expected one letter A to E, got {raw:?}")),
    }
}

/// What `scan` prints.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanReport<'a> {
    result: &'a ScanResult,
    detection: &'a MarkerDetection,
    warnings: &'a [ScanWarning],
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<ScoreSummary>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "optiscan failed");
            let human = humanize_error(&err);
            eprintln!("error: {}\n{}", human.message, human.suggestion);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => ReaderConfig::from_json_file(path)?,
        None => ReaderConfig::default(),
    };
    let reader = SheetReader::new(config)?;

    match cli.command {
        Command::Scan {
            image,
            shape,
            key,
            penalty,
            points,
            overlay,
        } => {
            let shape = shape.shape()?;
            let key = key.as_deref().map(load_key).transpose()?;
            let options = ScanOptions {
                debug_overlay: overlay.is_some(),
            };
            let scan = reader.read_file(&image, shape, &options)?;

            if let (Some(path), Some(annotated)) = (&overlay, &scan.overlay) {
                annotated.save(path).map_err(|e| OptiscanError::Render(e.to_string()))?;
                info!("Wrote overlay to {}", path.display());
            }

            let summary = key.as_ref().map(|key| {
                if let (Some(expected), Some(read)) = (key.booklet, scan.result.booklet.letter()) {
                    if expected != read {
                        warn!(%expected, %read, "Answer key is for a different booklet");
                    }
                }
                let policy = ScorePolicy {
                    wrong_penalty: penalty,
                    points_per_question: points,
                };
                score(&shape, &scan.result.answers, key, &policy)
            });

            print_json(&ScanReport {
                result: &scan.result,
                detection: &scan.detection,
                warnings: &scan.warnings,
                score: summary,
            })?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Locate { image } => {
            let bytes = std::fs::read(&image)?;
            let gray = decode(&bytes)?.to_luma8();
            let detection = reader.locate_markers(&gray)?;
            print_json(&detection)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Render {
            output,
            shape,
            booklet,
            key,
            student_code,
            title,
            font,
            paper,
            margin_mm,
        } => {
            let shape = shape.shape()?;
            let mut marks = match key.as_deref().map(load_key).transpose()? {
                Some(key) => SheetMarks::from_answer_key(&key),
                None => SheetMarks::blank(),
            };
            if let Some(letter) = booklet {
                marks = marks.with_booklet(letter);
            }
            if let Some(code) = student_code {
                marks = marks.with_student_code(code);
            }

            let mut renderer = SheetRenderer::new(shape);
            if let Some(title) = title {
                renderer = renderer.with_title(title);
            }
            if let Some(font) = font {
                renderer = renderer.with_font_bytes(std::fs::read(&font)?)?;
            }

            if is_pdf(&output) {
                SheetPdfWriter::new(paper.into())
                    .with_margin_mm(margin_mm)
                    .write_sheet_to_file(&renderer, &marks, &output)?;
            } else {
                renderer
                    .render(&marks)
                    .save(&output)
                    .map_err(|e| OptiscanError::Render(e.to_string()))?;
                info!("Wrote answer sheet to {}", output.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::SelfTest {
            shape,
            booklet,
            student_code,
        } => {
            let shape = shape.shape()?;
            let marks = synthetic_marks(shape, booklet, &student_code);
            let report = run_self_test(&reader, shape, &marks)?;
            print_json(&report)?;
            Ok(if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn load_key(path: &Path) -> Result<AnswerKey> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
