// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reader configuration: binarization ladder, marker filter, fill thresholds.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OptiscanError, Result};

/// How the local threshold of an adaptive binarization is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveMethod {
    /// Plain mean over a square block.
    Mean,
    /// Gaussian-weighted mean over the block.
    Gaussian,
}

/// One way of turning a grayscale image into a binary ink mask.
///
/// Every strategy produces an inverted mask: ink (dark) pixels become 255,
/// paper becomes 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BinarizationStrategy {
    /// Local threshold: a pixel is ink when it is darker than its
    /// neighbourhood mean minus `offset`.
    Adaptive {
        method: AdaptiveMethod,
        /// Gaussian pre-blur kernel size in pixels (0 or 1 disables it).
        blur_kernel: u32,
        /// Neighbourhood side length in pixels; odd, at least 3.
        block_size: u32,
        offset: i32,
    },
    /// Single global threshold picked from the histogram (Otsu).
    Otsu { blur_kernel: u32 },
}

impl BinarizationStrategy {
    pub fn blur_kernel(&self) -> u32 {
        match self {
            Self::Adaptive { blur_kernel, .. } | Self::Otsu { blur_kernel } => *blur_kernel,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if let Self::Adaptive { block_size, .. } = self {
            if *block_size < 3 || block_size % 2 == 0 {
                return Err(OptiscanError::InvalidConfig(format!(
                    "{name}: block size must be odd and at least 3, got {block_size}"
                )));
            }
        }
        let blur = self.blur_kernel();
        if blur > 1 && blur % 2 == 0 {
            return Err(OptiscanError::InvalidConfig(format!(
                "{name}: blur kernel must be odd, got {blur}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for BinarizationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adaptive {
                method,
                blur_kernel,
                block_size,
                offset,
            } => write!(
                f,
                "adaptive-{method:?} (blur {blur_kernel}, block {block_size}, offset {offset})"
            ),
            Self::Otsu { blur_kernel } => write!(f, "otsu (blur {blur_kernel})"),
        }
    }
}

/// Shape filter applied to every traced contour before it may become a
/// corner-marker candidate. All conditions must hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerFilter {
    /// Minimum contour area as a fraction of the image area.
    pub min_area_fraction: f64,
    /// Maximum contour area as a fraction of the image area.
    pub max_area_fraction: f64,
    /// Bounding-box width / height bounds.
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Contour area / convex hull area.
    pub min_solidity: f64,
    /// Vertex count bounds of the polygon approximation.
    pub min_vertices: usize,
    pub max_vertices: usize,
    /// Contour area / bounding-box area.
    pub min_fill_density: f64,
    /// Polygon approximation tolerance as a fraction of the perimeter.
    pub approx_epsilon: f64,
}

impl Default for MarkerFilter {
    fn default() -> Self {
        Self {
            min_area_fraction: 0.0005,
            max_area_fraction: 0.02,
            min_aspect: 0.6,
            max_aspect: 1.6,
            min_solidity: 0.8,
            min_vertices: 4,
            max_vertices: 8,
            min_fill_density: 0.7,
            approx_epsilon: 0.04,
        }
    }
}

/// Fill-fraction thresholds used to classify bubbles. Empirically tuned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillThresholds {
    /// A bubble at or above this fill fraction counts as marked.
    pub selected: f64,
    /// Runner-up fill above which a question may be multi-marked.
    pub multi_mark_second: f64,
    /// Top/runner-up ratio below which a question is multi-marked.
    pub multi_mark_ratio: f64,
    /// Top/runner-up ratio below which a marked answer is low-confidence.
    pub confident_ratio: f64,
    /// Lower bound on the runner-up fill when computing the ratio.
    pub ratio_floor: f64,
}

impl Default for FillThresholds {
    fn default() -> Self {
        Self {
            selected: 0.38,
            multi_mark_second: 0.35,
            multi_mark_ratio: 1.5,
            confident_ratio: 2.0,
            ratio_floor: 0.01,
        }
    }
}

/// Settings of the marker-only live preview.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Detection runs on every `cadence`-th delivered frame.
    pub cadence: u32,
    pub strategy: BinarizationStrategy,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            cadence: 15,
            strategy: BinarizationStrategy::Adaptive {
                method: AdaptiveMethod::Gaussian,
                blur_kernel: 5,
                block_size: 11,
                offset: 2,
            },
        }
    }
}

/// Complete configuration of the sheet reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Binarizations tried in order until all four corner markers are found.
    pub marker_strategies: Vec<BinarizationStrategy>,
    /// Binarization of the rectified sheet before bubbles are scored.
    pub bubble_strategy: BinarizationStrategy,
    pub marker_filter: MarkerFilter,
    pub fill: FillThresholds,
    /// Inset, in sheet units, applied to every ROI before counting ink.
    pub roi_inset: u32,
    pub preview: PreviewConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            marker_strategies: vec![
                BinarizationStrategy::Adaptive {
                    method: AdaptiveMethod::Gaussian,
                    blur_kernel: 5,
                    block_size: 21,
                    offset: 5,
                },
                BinarizationStrategy::Otsu { blur_kernel: 0 },
                BinarizationStrategy::Adaptive {
                    method: AdaptiveMethod::Mean,
                    blur_kernel: 3,
                    block_size: 31,
                    offset: 10,
                },
            ],
            bubble_strategy: BinarizationStrategy::Adaptive {
                method: AdaptiveMethod::Gaussian,
                blur_kernel: 0,
                block_size: 15,
                offset: 4,
            },
            marker_filter: MarkerFilter::default(),
            fill: FillThresholds::default(),
            roi_inset: 3,
            preview: PreviewConfig::default(),
        }
    }
}

impl ReaderConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.marker_strategies.is_empty() {
            return Err(OptiscanError::InvalidConfig(
                "at least one marker binarization strategy is required".into(),
            ));
        }
        for (i, strategy) in self.marker_strategies.iter().enumerate() {
            strategy.validate(&format!("marker strategy {}", i + 1))?;
        }
        self.bubble_strategy.validate("bubble strategy")?;
        self.preview.strategy.validate("preview strategy")?;

        if self.preview.cadence == 0 {
            return Err(OptiscanError::InvalidConfig(
                "preview cadence must be at least 1".into(),
            ));
        }

        let filter = &self.marker_filter;
        if filter.min_area_fraction >= filter.max_area_fraction {
            return Err(OptiscanError::InvalidConfig(
                "marker min area fraction must be below the max".into(),
            ));
        }
        if filter.min_aspect > filter.max_aspect || filter.min_vertices > filter.max_vertices {
            return Err(OptiscanError::InvalidConfig(
                "marker aspect and vertex bounds must be ordered".into(),
            ));
        }

        let fill = &self.fill;
        if !(0.0..=1.0).contains(&fill.selected) || fill.ratio_floor <= 0.0 {
            return Err(OptiscanError::InvalidConfig(
                "fill threshold must lie in [0, 1] and the ratio floor must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ReaderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.marker_strategies.len(), 3);
        assert_eq!(config.preview.cadence, 15);
    }

    /// The default ladder is adaptive, then Otsu, then adaptive with a
    /// different blur and block size.
    #[test]
    fn default_ladder_order() {
        let config = ReaderConfig::default();
        let ladder = &config.marker_strategies;
        assert!(matches!(ladder[0], BinarizationStrategy::Adaptive { block_size: 21, blur_kernel: 5, .. }));
        assert!(matches!(ladder[1], BinarizationStrategy::Otsu { .. }));
        assert!(matches!(ladder[2], BinarizationStrategy::Adaptive { block_size: 31, blur_kernel: 3, .. }));
    }

    #[test]
    fn empty_ladder_is_rejected() {
        let config = ReaderConfig {
            marker_strategies: Vec::new(),
            ..ReaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(OptiscanError::InvalidConfig(_))));
    }

    #[test]
    fn even_block_size_is_rejected() {
        let config = ReaderConfig {
            bubble_strategy: BinarizationStrategy::Adaptive {
                method: AdaptiveMethod::Mean,
                blur_kernel: 0,
                block_size: 16,
                offset: 4,
            },
            ..ReaderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    /// A partial JSON file only overrides the fields it names.
    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reader.json");
        std::fs::write(&path, r#"{ "roi_inset": 4, "fill": { "selected": 0.4 } }"#).unwrap();

        let config = ReaderConfig::from_json_file(&path).unwrap();
        assert_eq!(config.roi_inset, 4);
        assert!((config.fill.selected - 0.4).abs() < 1e-12);
        assert!((config.fill.confident_ratio - 2.0).abs() < 1e-12);
        assert_eq!(config.marker_strategies.len(), 3);
    }

    #[test]
    fn strategy_round_trips_through_json() {
        let json = r#"{ "kind": "otsu", "blur_kernel": 3 }"#;
        let strategy: BinarizationStrategy = serde_json::from_str(json).unwrap();
        assert_eq!(strategy, BinarizationStrategy::Otsu { blur_kernel: 3 });
    }
}
