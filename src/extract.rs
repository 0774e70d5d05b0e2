//! Per-window extraction: pull every requested variable, gate on temporal
//! coverage, normalise units, reduce to statistics and build the composite
//! mask.

use crate::data::filter::CompositeMask;
use crate::data::model::{
    GriddedVariable, Grid, StatField, TimeWindow, VariableSpec, MIN_COVERAGE,
};
use crate::error::{ExtractError, PipelineError};
use crate::regions::RegionMasker;
use crate::source::ModelSource;
use crate::units::UnitTable;

/// Everything needed to flatten one accepted (model, window) pair.
#[derive(Debug, Clone)]
pub struct ExtractedWindow {
    pub window: TimeWindow,
    /// Statistic fields in request order.
    pub fields: Vec<StatField>,
    pub grid: Grid,
    pub mask: CompositeMask,
}

/// Result of trying one window for one model.
#[derive(Debug)]
pub enum WindowOutcome {
    Complete(ExtractedWindow),
    /// Every variable was fine but no statistic was requested.
    Empty,
    /// The window cannot be used for this model.
    Skipped(ExtractError),
}

pub struct Extractor<'a> {
    specs: &'a [VariableSpec],
    units: &'a UnitTable,
    regions: &'a dyn RegionMasker,
    region_names: &'a [String],
}

impl<'a> Extractor<'a> {
    pub fn new(
        specs: &'a [VariableSpec],
        units: &'a UnitTable,
        regions: &'a dyn RegionMasker,
        region_names: &'a [String],
    ) -> Self {
        Extractor {
            specs,
            units,
            regions,
            region_names,
        }
    }

    /// Produce all columns for `window`, or a reason the window is unusable.
    ///
    /// The first failing variable ends the window; nothing partial escapes.
    /// Only a region that cannot be evaluated is fatal.
    pub fn extract_window(
        &self,
        model: &dyn ModelSource,
        window: &TimeWindow,
    ) -> Result<WindowOutcome, PipelineError> {
        let mut fields: Vec<StatField> = Vec::new();
        let mut grid: Option<Grid> = None;

        for spec in self.specs {
            for name in &spec.variable_names {
                let var = match self.fetch(model, name, window, grid.as_ref()) {
                    Ok(var) => var,
                    Err(e) => return Ok(WindowOutcome::Skipped(e)),
                };
                if spec.compute_mean {
                    insert_field(&mut fields, var.mean_in_time());
                }
                if spec.compute_variability {
                    insert_field(&mut fields, var.variability());
                }
                if grid.is_none() {
                    grid = Some(var.grid);
                }
            }
        }

        let Some(grid) = grid.filter(|_| !fields.is_empty()) else {
            return Ok(WindowOutcome::Empty);
        };

        let mut mask = CompositeMask::all_valid(grid.shape());
        for field in &fields {
            mask.exclude(field.mask.view());
        }
        for region in self.region_names {
            let outside = self.regions.mask_for(region, &grid)?;
            mask.exclude(outside.view());
        }

        Ok(WindowOutcome::Complete(ExtractedWindow {
            window: *window,
            fields,
            grid,
            mask,
        }))
    }

    fn fetch(
        &self,
        model: &dyn ModelSource,
        name: &str,
        window: &TimeWindow,
        expected: Option<&Grid>,
    ) -> Result<GriddedVariable, ExtractError> {
        let mut var = model.extract(name, window)?;
        check_consistent(&var)?;

        let coverage = window.coverage(&var.time_bounds);
        if coverage < MIN_COVERAGE {
            return Err(ExtractError::Incomplete {
                variable: name.to_string(),
                coverage,
            });
        }

        if let Some(expected) = expected {
            if expected.shape() != var.spatial_shape() {
                return Err(ExtractError::GridMismatch {
                    variable: name.to_string(),
                    expected: expected.shape(),
                    found: var.spatial_shape(),
                });
            }
        }

        self.units.normalize(&mut var)?;
        Ok(var)
    }
}

/// Later fields with an existing label replace it in place.
fn insert_field(fields: &mut Vec<StatField>, field: StatField) {
    match fields.iter_mut().find(|f| f.label == field.label) {
        Some(slot) => *slot = field,
        None => fields.push(field),
    }
}

fn check_consistent(var: &GriddedVariable) -> Result<(), ExtractError> {
    let malformed = |message: String| ExtractError::Malformed {
        variable: var.name.clone(),
        message,
    };
    if var.mask.dim() != var.values.dim() {
        return Err(malformed(format!(
            "mask shape {:?} differs from value shape {:?}",
            var.mask.dim(),
            var.values.dim()
        )));
    }
    if var.time_bounds.len() != var.values.dim().0 {
        return Err(malformed(format!(
            "{} time bounds for {} time steps",
            var.time_bounds.len(),
            var.values.dim().0
        )));
    }
    if var.grid.shape() != var.spatial_shape() || var.grid.area.dim() != var.grid.shape() {
        return Err(malformed(format!(
            "grid {:?} does not match values {:?}",
            var.grid.shape(),
            var.spatial_shape()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::{RegionBounds, Regions};
    use crate::source::MemoryModel;
    use ndarray::{array, Array2, Array3};

    /// One-year steps covering `years` from 1850, on a 2x2 grid.
    fn variable(name: &str, unit: &str, years: usize, invalid: Option<(usize, usize)>) -> GriddedVariable {
        let mut mask = Array3::from_elem((years, 2, 2), false);
        if let Some((i, j)) = invalid {
            for t in 0..years {
                mask[[t, i, j]] = true;
            }
        }
        GriddedVariable {
            name: name.into(),
            unit: unit.into(),
            values: Array3::from_elem((years, 2, 2), 300.0),
            mask,
            time_bounds: (0..years)
                .map(|t| (t as f64 * 365.0, (t + 1) as f64 * 365.0))
                .collect(),
            grid: Grid {
                lat: array![-70.0, 30.0],
                lon: array![0.0, 90.0],
                area: Array2::ones((2, 2)),
            },
        }
    }

    fn global() -> Vec<String> {
        vec!["global".to_string()]
    }

    #[test]
    fn composite_mask_is_union_of_variable_masks() {
        let model = MemoryModel::new("a")
            .with_variable(variable("tas", "K", 10, Some((0, 0))))
            .with_variable(variable("pr", "kg m-2 s-1", 10, Some((1, 1))));
        let specs = vec![VariableSpec::new(["tas", "pr"])];
        let units = UnitTable::default();
        let regions = Regions::new();
        let names = global();
        let extractor = Extractor::new(&specs, &units, &regions, &names);

        let outcome = extractor
            .extract_window(&model, &TimeWindow::from_years(1850, 1860))
            .unwrap();
        let WindowOutcome::Complete(win) = outcome else {
            panic!("expected a complete window, got {outcome:?}");
        };
        let labels: Vec<&str> = win.fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["mean(tas) [degC]", "mean(pr) [mm d-1]"]);
        assert_eq!(win.mask.view(), array![[true, false], [false, true]]);
    }

    #[test]
    fn region_exclusions_are_added() {
        let model = MemoryModel::new("a").with_variable(variable("tas", "K", 10, None));
        let specs = vec![VariableSpec::new(["tas"]).with_variability(true)];
        let units = UnitTable::default();
        let mut regions = Regions::new();
        regions.add_lat_lon_bounds(RegionBounds {
            name: "noant".into(),
            lat: [-60.0, 89.999],
            lon: [-179.999, 179.999],
        });
        let names = vec!["global".to_string(), "noant".to_string()];
        let extractor = Extractor::new(&specs, &units, &regions, &names);

        let WindowOutcome::Complete(win) = extractor
            .extract_window(&model, &TimeWindow::from_years(1850, 1860))
            .unwrap()
        else {
            panic!("expected a complete window");
        };
        assert_eq!(win.fields.len(), 2);
        assert_eq!(win.fields[1].label, "std(tas) [degC]");
        assert_eq!(win.mask.view(), array![[true, true], [false, false]]);
    }

    #[test]
    fn short_coverage_skips_window() {
        let model = MemoryModel::new("b").with_variable(variable("tas", "K", 5, None));
        let specs = vec![VariableSpec::new(["tas"])];
        let units = UnitTable::default();
        let regions = Regions::new();
        let names = global();
        let extractor = Extractor::new(&specs, &units, &regions, &names);

        let outcome = extractor
            .extract_window(&model, &TimeWindow::from_years(1850, 1860))
            .unwrap();
        assert!(matches!(
            outcome,
            WindowOutcome::Skipped(ExtractError::Incomplete { coverage, .. }) if coverage == 0.5
        ));
    }

    #[test]
    fn failed_conversion_and_missing_variable_skip_window() {
        let model = MemoryModel::new("c").with_variable(variable("tas", "degF", 10, None));
        let specs = vec![VariableSpec::new(["tas"])];
        let units = UnitTable::default();
        let regions = Regions::new();
        let names = global();
        let extractor = Extractor::new(&specs, &units, &regions, &names);
        let window = TimeWindow::from_years(1850, 1860);

        assert!(matches!(
            extractor.extract_window(&model, &window).unwrap(),
            WindowOutcome::Skipped(ExtractError::UnitConversion { .. })
        ));

        let specs = vec![VariableSpec::new(["gpp"])];
        let extractor = Extractor::new(&specs, &units, &regions, &names);
        assert!(matches!(
            extractor.extract_window(&model, &window).unwrap(),
            WindowOutcome::Skipped(ExtractError::MissingVariable(_))
        ));
    }

    #[test]
    fn mismatched_grids_skip_window() {
        let mut pr = variable("pr", "mm d-1", 10, None);
        pr.values = Array3::zeros((10, 1, 2));
        pr.mask = Array3::from_elem((10, 1, 2), false);
        pr.grid.lat = array![0.0];
        pr.grid.area = Array2::ones((1, 2));
        let model = MemoryModel::new("d")
            .with_variable(variable("tas", "K", 10, None))
            .with_variable(pr);
        let specs = vec![VariableSpec::new(["tas", "pr"])];
        let units = UnitTable::default();
        let regions = Regions::new();
        let names = global();
        let extractor = Extractor::new(&specs, &units, &regions, &names);

        assert!(matches!(
            extractor
                .extract_window(&model, &TimeWindow::from_years(1850, 1860))
                .unwrap(),
            WindowOutcome::Skipped(ExtractError::GridMismatch { .. })
        ));
    }

    #[test]
    fn no_requested_statistics_is_an_empty_window() {
        let model = MemoryModel::new("e").with_variable(variable("tas", "K", 10, None));
        let specs = vec![VariableSpec::new(["tas"]).with_mean(false)];
        let units = UnitTable::default();
        let regions = Regions::new();
        let names = global();
        let extractor = Extractor::new(&specs, &units, &regions, &names);

        assert!(matches!(
            extractor
                .extract_window(&model, &TimeWindow::from_years(1850, 1860))
                .unwrap(),
            WindowOutcome::Empty
        ));
    }
}
