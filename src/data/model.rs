use std::fmt;

use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Reference year of the model time axis (days since 1850-01-01).
pub const REFERENCE_YEAR: i32 = 1850;

/// Length of a model year on the 365-day calendar.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Fraction of a window that the returned time bounds must cover.
pub const MIN_COVERAGE: f64 = 0.9;

// ---------------------------------------------------------------------------
// Grid – the spatial geometry shared by every variable of a model
// ---------------------------------------------------------------------------

/// Cell-centred latitude/longitude axes plus per-cell area.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// Latitude of each grid row, degrees north.
    pub lat: Array1<f64>,
    /// Longitude of each grid column, degrees east.
    pub lon: Array1<f64>,
    /// Cell area, shape `(lat.len(), lon.len())`.
    pub area: Array2<f64>,
}

impl Grid {
    /// `(nlat, nlon)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }

    /// Per-cell latitude and longitude (`meshgrid` with `ij` indexing).
    pub fn cell_coordinates(&self) -> (Array2<f64>, Array2<f64>) {
        let shape = self.shape();
        let lat = Array2::from_shape_fn(shape, |(i, _)| self.lat[i]);
        let lon = Array2::from_shape_fn(shape, |(_, j)| self.lon[j]);
        (lat, lon)
    }
}

// ---------------------------------------------------------------------------
// TimeWindow – one bounded interval of the time axis
// ---------------------------------------------------------------------------

/// A half-open interval `[start, end)` in days since 1850, labelled by the
/// year it starts in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub year: i32,
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn from_years(start_year: i32, end_year: i32) -> Self {
        TimeWindow {
            year: start_year,
            start: year_to_days(start_year),
            end: year_to_days(end_year),
        }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Fraction of the window covered by the union of `bounds`.
    ///
    /// Bounds are clipped to the window first, so overlapping or
    /// out-of-window steps never push the result above 1.
    pub fn coverage(&self, bounds: &[(f64, f64)]) -> f64 {
        if self.length() <= 0.0 {
            return 0.0;
        }
        let mut clipped: Vec<(f64, f64)> = bounds
            .iter()
            .map(|&(a, b)| (a.max(self.start), b.min(self.end)))
            .filter(|(a, b)| b > a)
            .collect();
        clipped.sort_by(|x, y| x.0.total_cmp(&y.0));

        let mut covered = 0.0;
        let mut current: Option<(f64, f64)> = None;
        for (a, b) in clipped {
            current = match current {
                Some((ca, cb)) if a <= cb => Some((ca, cb.max(b))),
                Some((ca, cb)) => {
                    covered += cb - ca;
                    Some((a, b))
                }
                None => Some((a, b)),
            };
        }
        if let Some((ca, cb)) = current {
            covered += cb - ca;
        }
        covered / self.length()
    }
}

fn year_to_days(year: i32) -> f64 {
    f64::from(year - REFERENCE_YEAR) * DAYS_PER_YEAR
}

/// Turn boundary years into consecutive windows `[y_i, y_{i+1})`.
pub fn windows_from_years(years: &[i32]) -> Result<Vec<TimeWindow>, PipelineError> {
    if years.len() < 2 {
        return Err(PipelineError::InvalidTimes(format!(
            "need at least two boundary years, got {}",
            years.len()
        )));
    }
    years
        .windows(2)
        .map(|pair| {
            if pair[1] <= pair[0] {
                Err(PipelineError::InvalidTimes(format!(
                    "boundaries must increase, found {} after {}",
                    pair[1], pair[0]
                )))
            } else {
                Ok(TimeWindow::from_years(pair[0], pair[1]))
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// VariableSpec – a requested column group
// ---------------------------------------------------------------------------

/// A group of variables and the statistics wanted for each of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    #[serde(rename = "vars")]
    pub variable_names: Vec<String>,
    #[serde(rename = "mean", default = "default_true")]
    pub compute_mean: bool,
    #[serde(rename = "variability", default)]
    pub compute_variability: bool,
}

fn default_true() -> bool {
    true
}

impl VariableSpec {
    /// Mean only, which is what an unadorned request asks for.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VariableSpec {
            variable_names: names.into_iter().map(Into::into).collect(),
            compute_mean: true,
            compute_variability: false,
        }
    }

    pub fn with_variability(mut self, on: bool) -> Self {
        self.compute_variability = on;
        self
    }

    pub fn with_mean(mut self, on: bool) -> Self {
        self.compute_mean = on;
        self
    }

    pub fn requests_any(&self) -> bool {
        (self.compute_mean || self.compute_variability) && !self.variable_names.is_empty()
    }
}

// ---------------------------------------------------------------------------
// GriddedVariable – what a model hands back for one variable and window
// ---------------------------------------------------------------------------

/// A masked `(time, lat, lon)` array with its unit, grid and time bounds.
///
/// `mask` is `true` where a value is invalid.
#[derive(Debug, Clone)]
pub struct GriddedVariable {
    pub name: String,
    pub unit: String,
    pub values: Array3<f64>,
    pub mask: Array3<bool>,
    pub time_bounds: Vec<(f64, f64)>,
    pub grid: Grid,
}

impl GriddedVariable {
    /// Spatial shape `(nlat, nlon)` of the value array.
    pub fn spatial_shape(&self) -> (usize, usize) {
        let (_, nlat, nlon) = self.values.dim();
        (nlat, nlon)
    }

    /// Time-bound-weighted mean of every cell over its valid time steps.
    pub fn mean_in_time(&self) -> StatField {
        let (values, mask) = self.reduce_in_time(|samples, weight_sum| {
            samples.iter().map(|&(x, w)| x * w).sum::<f64>() / weight_sum
        });
        StatField {
            label: format!("mean({}) [{}]", self.name, self.unit),
            values,
            mask,
        }
    }

    /// Time-bound-weighted standard deviation of every cell.
    pub fn variability(&self) -> StatField {
        let (values, mask) = self.reduce_in_time(|samples, weight_sum| {
            let mean = samples.iter().map(|&(x, w)| x * w).sum::<f64>() / weight_sum;
            let var = samples
                .iter()
                .map(|&(x, w)| w * (x - mean).powi(2))
                .sum::<f64>()
                / weight_sum;
            var.sqrt()
        });
        StatField {
            label: format!("std({}) [{}]", self.name, self.unit),
            values,
            mask,
        }
    }

    fn reduce_in_time<F>(&self, reduce: F) -> (Array2<f64>, Array2<bool>)
    where
        F: Fn(&[(f64, f64)], f64) -> f64,
    {
        let weights: Vec<f64> = self.time_bounds.iter().map(|(a, b)| b - a).collect();
        let shape = self.spatial_shape();
        let mut out = Array2::<f64>::zeros(shape);
        let mut out_mask = Array2::from_elem(shape, true);
        let mut samples = Vec::with_capacity(weights.len());

        for ((i, j), slot) in out.indexed_iter_mut() {
            samples.clear();
            let series = self.values.index_axis(Axis(1), i);
            let series_mask = self.mask.index_axis(Axis(1), i);
            for (t, &w) in weights.iter().enumerate() {
                if !series_mask[[t, j]] && w > 0.0 {
                    samples.push((series[[t, j]], w));
                }
            }
            let weight_sum: f64 = samples.iter().map(|&(_, w)| w).sum();
            if weight_sum > 0.0 {
                *slot = reduce(&samples, weight_sum);
                out_mask[[i, j]] = false;
            }
        }
        (out, out_mask)
    }
}

// ---------------------------------------------------------------------------
// StatField / Column – one statistic before and after compression
// ---------------------------------------------------------------------------

/// A per-cell statistic on the full grid, labelled `"<stat>(<var>) [<unit>]"`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatField {
    pub label: String,
    pub values: Array2<f64>,
    pub mask: Array2<bool>,
}

/// A compressed statistic: only the cells the composite mask keeps.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ProvenanceRecord – one line of the stack file
// ---------------------------------------------------------------------------

/// Maps a run of flat rows back to the (model, window) that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub model: String,
    pub year: i64,
    pub row_offset: usize,
}

impl fmt::Display for ProvenanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.model, self.year, self.row_offset)
    }
}
