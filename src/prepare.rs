//! The preparation path: extract, flatten and serialize every
//! (model, window) pair into the clustering input files.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::data::model::{windows_from_years, VariableSpec};
use crate::error::PipelineError;
use crate::extract::{Extractor, WindowOutcome};
use crate::flatten::{Flattener, RowBlock};
use crate::layout::CaseLayout;
use crate::regions::{RegionMasker, GLOBAL};
use crate::serialize::CaseWriter;
use crate::source::ModelSource;
use crate::units::UnitTable;

/// What to extract for every model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareRequest {
    pub variables: Vec<VariableSpec>,
    /// Window boundaries in years; window `i` is `[years[i], years[i + 1])`.
    pub years: Vec<i32>,
    /// Regions to restrict to. Empty means `global`.
    #[serde(default)]
    pub regions: Vec<String>,
}

impl PrepareRequest {
    pub fn region_names(&self) -> Vec<String> {
        if self.regions.is_empty() {
            vec![GLOBAL.to_string()]
        } else {
            self.regions.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedWindow {
    pub model: String,
    pub year: i64,
    pub row_offset: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedWindow {
    pub model: String,
    pub year: i64,
    pub reason: String,
    pub transient: bool,
}

/// Outcome of a whole preparation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareSummary {
    pub casename: String,
    pub accepted: Vec<AcceptedWindow>,
    pub skipped: Vec<SkippedWindow>,
    pub total_rows: usize,
    pub column_names: Vec<String>,
    /// Models whose retained cells differed between windows. Their
    /// coordinate file only matches the last accepted window.
    pub grid_changes: Vec<String>,
}

/// Build `obs.raw`, `coords.*`, `stack` and `names` for a case.
///
/// Window-level problems are recorded in the summary and skipped; only
/// configuration and I/O problems abort the run.
pub fn prepare_cluster(
    layout: &CaseLayout,
    models: &[&dyn ModelSource],
    request: &PrepareRequest,
    units: &UnitTable,
    regions: &dyn RegionMasker,
) -> Result<PrepareSummary, PipelineError> {
    validate_models(models)?;
    let region_names = request.region_names();
    regions.validate(&region_names)?;
    let windows = windows_from_years(&request.years)?;
    if !request.variables.iter().any(VariableSpec::requests_any) {
        log::warn!("no statistic was requested; every window will be empty");
    }

    let extractor = Extractor::new(&request.variables, units, regions, &region_names);
    let mut writer = CaseWriter::create(layout.clone())?;
    let mut flattener = Flattener::new();
    let mut accepted = Vec::new();
    let mut skipped = Vec::new();
    let mut grid_changes = BTreeSet::new();

    for model in models {
        let name = model.name();
        log::info!("processing {name}...");
        let mut last_coords: Option<RowBlock> = None;

        for window in &windows {
            let extracted = match extractor.extract_window(*model, window)? {
                WindowOutcome::Complete(extracted) => extracted,
                WindowOutcome::Skipped(reason) => {
                    if reason.is_transient() {
                        log::warn!("{name} {}: skipped, {reason}", window.year);
                    } else {
                        log::info!("{name} {}: skipped, {reason}", window.year);
                    }
                    skipped.push(SkippedWindow {
                        model: name.to_string(),
                        year: i64::from(window.year),
                        reason: reason.to_string(),
                        transient: reason.is_transient(),
                    });
                    continue;
                }
                WindowOutcome::Empty => {
                    log::debug!("{name} {}: no statistics requested", window.year);
                    skipped.push(SkippedWindow {
                        model: name.to_string(),
                        year: i64::from(window.year),
                        reason: "no statistics requested".to_string(),
                        transient: false,
                    });
                    continue;
                }
            };

            if extracted.mask.valid_count() == 0 {
                log::info!("{name} {}: skipped, every cell is masked", window.year);
                skipped.push(SkippedWindow {
                    model: name.to_string(),
                    year: i64::from(window.year),
                    reason: "every cell is masked".to_string(),
                    transient: false,
                });
                continue;
            }

            let block = flattener.flatten(name, &extracted);
            writer.push(&block)?;
            if let Some(previous) = &last_coords {
                if !same_cells(previous, &block) {
                    log::warn!(
                        "{name} {}: retained cells differ from the previous window; \
                         coords.{name} will only describe the last one",
                        window.year
                    );
                    grid_changes.insert(name.to_string());
                }
            }
            writer.write_coords(&block)?;
            log::debug!(
                "{name} {}: {} rows at offset {}",
                window.year,
                block.row_count(),
                block.provenance.row_offset
            );
            accepted.push(AcceptedWindow {
                model: name.to_string(),
                year: block.provenance.year,
                row_offset: block.provenance.row_offset,
                rows: block.row_count(),
            });
            last_coords = Some(RowBlock {
                columns: Vec::new(),
                ..block
            });
        }
    }

    let written = writer.finish()?;
    Ok(PrepareSummary {
        casename: layout.casename().to_string(),
        accepted,
        skipped,
        total_rows: written.rows,
        column_names: written.column_names,
        grid_changes: grid_changes.into_iter().collect(),
    })
}

fn same_cells(a: &RowBlock, b: &RowBlock) -> bool {
    a.lon == b.lon && a.lat == b.lat && a.area == b.area
}

fn validate_models(models: &[&dyn ModelSource]) -> Result<(), PipelineError> {
    let mut seen = BTreeSet::new();
    for model in models {
        let name = model.name();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(PipelineError::InvalidModelName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(PipelineError::DuplicateModel(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::Regions;
    use crate::source::MemoryModel;
    use tempfile::TempDir;

    fn request() -> PrepareRequest {
        PrepareRequest {
            variables: vec![VariableSpec::new(["tas"])],
            years: vec![1850, 1860],
            regions: Vec::new(),
        }
    }

    #[test]
    fn empty_regions_default_to_global() {
        assert_eq!(request().region_names(), ["global"]);
    }

    #[test]
    fn model_names_are_validated() {
        let dir = TempDir::new().unwrap();
        let layout = CaseLayout::new(dir.path(), "t");
        let spaced = MemoryModel::new("two words");
        let err = prepare_cluster(
            &layout,
            &[&spaced],
            &request(),
            &UnitTable::default(),
            &Regions::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidModelName(_)));

        let a = MemoryModel::new("A");
        let err = prepare_cluster(
            &layout,
            &[&a, &a],
            &request(),
            &UnitTable::default(),
            &Regions::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateModel(name) if name == "A"));
    }

    #[test]
    fn unknown_region_aborts_before_writing() {
        let dir = TempDir::new().unwrap();
        let layout = CaseLayout::new(dir.path(), "t");
        let mut req = request();
        req.regions = vec!["atlantis".into()];
        let err = prepare_cluster(
            &layout,
            &[&MemoryModel::new("A")],
            &req,
            &UnitTable::default(),
            &Regions::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownRegion(_)));
        assert!(!layout.data_dir().exists());
    }
}
