use crate::core::flags::FlagSet;
use crate::types::{BandImage, FlagImage, OcError, OcResult};
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Neighborhood validation thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationParams {
    /// Pure pixels required among the 9 of the 3x3 window (center included)
    pub min_valid_neighbors: usize,
    /// Maximum coefficient of variation of the reference band over the window
    pub cv_threshold: f64,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            min_valid_neighbors: 5,
            cv_threshold: 0.15,
        }
    }
}

impl ValidationParams {
    pub fn validate(&self) -> OcResult<()> {
        if self.min_valid_neighbors > 9 {
            return Err(OcError::Config(format!(
                "min_valid_neighbors must be within 0..=9, got {}",
                self.min_valid_neighbors
            )));
        }
        if !(self.cv_threshold > 0.0) {
            return Err(OcError::Config(format!(
                "cv_threshold must be positive, got {}",
                self.cv_threshold
            )));
        }
        Ok(())
    }
}

/// Why a matchup failed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// The 3x3 window leaves the grid
    OutOfBounds,
    /// The matched pixel carries disqualifying flags
    CenterFlagged { flags: Vec<String> },
    TooFewPure { pure: usize, required: usize },
    /// Reference band too heterogeneous around the match
    Heterogeneous { cv: f64, threshold: f64 },
    DegenerateStatistic { detail: String },
    /// No pixel could be matched or validation inputs are absent
    Unavailable { detail: String },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::OutOfBounds => write!(f, "3x3 window exceeds grid bounds"),
            Rejection::CenterFlagged { flags } => write!(f, "center pixel flagged: {}", flags.join(", ")),
            Rejection::TooFewPure { pure, required } => {
                write!(f, "{} pure pixels, {} required", pure, required)
            }
            Rejection::Heterogeneous { cv, threshold } => {
                write!(f, "coefficient of variation {:.4} exceeds {}", cv, threshold)
            }
            Rejection::DegenerateStatistic { detail } => write!(f, "degenerate statistic: {}", detail),
            Rejection::Unavailable { detail } => write!(f, "unavailable: {}", detail),
        }
    }
}

impl From<OcError> for Rejection {
    fn from(err: OcError) -> Self {
        match err {
            OcError::OutOfBoundsNeighborhood { .. } => Rejection::OutOfBounds,
            OcError::DegenerateStatistic(detail) => Rejection::DegenerateStatistic { detail },
            other => Rejection::Unavailable {
                detail: other.to_string(),
            },
        }
    }
}

/// 3x3 spatial quality test around a matched pixel
#[derive(Debug, Clone)]
pub struct MatchupValidator {
    params: ValidationParams,
}

impl Default for MatchupValidator {
    fn default() -> Self {
        Self {
            params: ValidationParams::default(),
        }
    }
}

impl MatchupValidator {
    pub fn new(params: ValidationParams) -> OcResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ValidationParams {
        &self.params
    }

    /// True when the matchup at `(row, col)` passes every check
    pub fn validate(
        &self,
        row: usize,
        col: usize,
        flags: &FlagImage,
        reference: &BandImage,
        flag_set: &FlagSet,
    ) -> bool {
        self.assess(row, col, flags, reference, flag_set).is_ok()
    }

    /// Run the checks in order: center purity, neighborhood density,
    /// radiometric homogeneity. The first failing check is returned.
    pub fn assess(
        &self,
        row: usize,
        col: usize,
        flags: &FlagImage,
        reference: &BandImage,
        flag_set: &FlagSet,
    ) -> Result<(), Rejection> {
        let flag_window = neighborhood(flags, row, col)?;
        let reference_window = neighborhood(reference, row, col)?;

        let center = flag_window[[1, 1]] as u64;
        if !flag_set.is_pure(center) {
            let flags = flag_set
                .decode(center)
                .into_iter()
                .filter(|name| flag_set.invalid().contains(*name))
                .map(str::to_string)
                .collect();
            return Err(Rejection::CenterFlagged { flags });
        }

        let pure = flag_window
            .iter()
            .filter(|&&mask| flag_set.is_pure(mask as u64))
            .count();
        if pure < self.params.min_valid_neighbors {
            return Err(Rejection::TooFewPure {
                pure,
                required: self.params.min_valid_neighbors,
            });
        }

        let cv = coefficient_of_variation(&reference_window)?;
        if cv > self.params.cv_threshold {
            return Err(Rejection::Heterogeneous {
                cv,
                threshold: self.params.cv_threshold,
            });
        }

        log::debug!("Matchup at ({}, {}) valid: {} pure, cv = {:.4}", row, col, pure, cv);
        Ok(())
    }
}

/// 3x3 window centered on `(row, col)`
pub fn neighborhood<T>(grid: &Array2<T>, row: usize, col: usize) -> OcResult<ArrayView2<'_, T>> {
    let (rows, cols) = grid.dim();
    if row == 0 || col == 0 || row + 1 >= rows || col + 1 >= cols {
        return Err(OcError::OutOfBoundsNeighborhood {
            row,
            col,
            rows,
            cols,
        });
    }
    Ok(grid.slice(s![row - 1..=row + 1, col - 1..=col + 1]))
}

/// Population standard deviation over the mean.
///
/// The mean keeps its sign, so a window with a negative mean yields a
/// negative coefficient that never exceeds a positive threshold.
pub fn coefficient_of_variation(window: &ArrayView2<f64>) -> OcResult<f64> {
    let n = window.len();
    if n == 0 {
        return Err(OcError::DegenerateStatistic("empty window".to_string()));
    }

    let mean = window.sum() / n as f64;
    if !mean.is_finite() {
        return Err(OcError::DegenerateStatistic(format!("mean is {}", mean)));
    }
    if mean == 0.0 {
        return Err(OcError::DegenerateStatistic("zero mean".to_string()));
    }

    let variance = window.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    let cv = variance.sqrt() / mean;
    if !cv.is_finite() {
        return Err(OcError::DegenerateStatistic(format!("cv is {}", cv)));
    }
    Ok(cv)
}
