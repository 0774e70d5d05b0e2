//! The model-access capability and an in-memory implementation of it.

use std::collections::BTreeMap;
use std::io;

use ndarray::Axis;

use crate::data::model::{GriddedVariable, TimeWindow};
use crate::error::ExtractError;

/// A named data source that can yield a variable's gridded time series.
pub trait ModelSource {
    fn name(&self) -> &str;

    /// Return the time steps of `variable` that overlap `window`.
    ///
    /// Coverage and units are checked by the caller; an implementation only
    /// reports what it has.
    fn extract(&self, variable: &str, window: &TimeWindow) -> Result<GriddedVariable, ExtractError>;
}

/// Keep only the time steps whose bounds overlap `window`, with their
/// bounds clipped to it.
pub fn slice_to_window(
    var: &GriddedVariable,
    window: &TimeWindow,
) -> Result<GriddedVariable, ExtractError> {
    let keep: Vec<usize> = var
        .time_bounds
        .iter()
        .enumerate()
        .filter(|&(_, &(a, b))| b > window.start && a < window.end)
        .map(|(t, _)| t)
        .collect();
    if keep.is_empty() {
        return Err(ExtractError::NoData(var.name.clone()));
    }
    Ok(GriddedVariable {
        name: var.name.clone(),
        unit: var.unit.clone(),
        values: var.values.select(Axis(0), &keep),
        mask: var.mask.select(Axis(0), &keep),
        time_bounds: keep
            .iter()
            .map(|&t| {
                let (a, b) = var.time_bounds[t];
                (a.max(window.start), b.min(window.end))
            })
            .collect(),
        grid: var.grid.clone(),
    })
}

// ---------------------------------------------------------------------------
// MemoryModel
// ---------------------------------------------------------------------------

/// A model held entirely in memory, for synthetic grids and tests.
#[derive(Debug, Clone)]
pub struct MemoryModel {
    name: String,
    variables: BTreeMap<String, GriddedVariable>,
    unreadable: BTreeMap<String, io::ErrorKind>,
}

impl MemoryModel {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryModel {
            name: name.into(),
            variables: BTreeMap::new(),
            unreadable: BTreeMap::new(),
        }
    }

    /// Add a variable; it is served under `var.name`.
    pub fn with_variable(mut self, var: GriddedVariable) -> Self {
        self.variables.insert(var.name.clone(), var);
        self
    }

    /// Make every extraction of `variable` fail with an I/O error of `kind`.
    pub fn with_unreadable(mut self, variable: impl Into<String>, kind: io::ErrorKind) -> Self {
        self.unreadable.insert(variable.into(), kind);
        self
    }
}

impl ModelSource for MemoryModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, variable: &str, window: &TimeWindow) -> Result<GriddedVariable, ExtractError> {
        if let Some(&kind) = self.unreadable.get(variable) {
            return Err(ExtractError::Read {
                variable: variable.to_string(),
                source: io::Error::new(kind, format!("{} is unreadable", variable)),
            });
        }
        let var = self
            .variables
            .get(variable)
            .ok_or_else(|| ExtractError::MissingVariable(variable.to_string()))?;
        slice_to_window(var, window)
    }
}
