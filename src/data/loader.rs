use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, Float32Array, Float64Array, LargeListArray, ListArray, StringArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use ndarray::{Array1, Array2, Array3};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{Grid, GriddedVariable, TimeWindow};
use crate::error::ExtractError;
use crate::source::{slice_to_window, ModelSource};

// ---------------------------------------------------------------------------
// Parquet-backed model directory
// ---------------------------------------------------------------------------

/// File holding the grid of a model directory.
pub const GRID_FILE: &str = "grid.parquet";

/// A model stored as a directory of Parquet files.
///
/// Layout:
/// * `grid.parquet` – one row; `lat`, `lon` and `area` list columns, with
///   `area` flattened row-major over `lat × lon`
/// * `<variable>.parquet` – one row per time step; `time_start` and
///   `time_end` (days since 1850, Float64), `unit` (Utf8) and a `values`
///   list column flattened like `area`, with nulls for invalid cells
#[derive(Debug, Clone)]
pub struct ParquetModel {
    name: String,
    root: PathBuf,
    grid: Grid,
}

impl ParquetModel {
    /// Open a model directory and read its grid.
    pub fn open(name: impl Into<String>, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let grid = load_grid(&root.join(GRID_FILE))
            .with_context(|| format!("loading grid of {}", root.display()))?;
        Ok(ParquetModel {
            name: name.into(),
            root,
            grid,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn variable_path(&self, variable: &str) -> PathBuf {
        self.root.join(format!("{variable}.parquet"))
    }
}

impl ModelSource for ParquetModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, variable: &str, window: &TimeWindow) -> Result<GriddedVariable, ExtractError> {
        let path = self.variable_path(variable);
        if !path.is_file() {
            return Err(ExtractError::MissingVariable(variable.to_string()));
        }
        let var = load_variable(&path, variable, &self.grid)
            .map_err(|err| classify(variable, err))?;
        slice_to_window(&var, window)
    }
}

/// I/O anywhere in the chain is transient; everything else is bad data.
fn classify(variable: &str, err: anyhow::Error) -> ExtractError {
    match err.chain().find_map(|c| c.downcast_ref::<std::io::Error>()) {
        Some(io) => ExtractError::Read {
            variable: variable.to_string(),
            source: std::io::Error::new(io.kind(), format!("{err:#}")),
        },
        None => ExtractError::Malformed {
            variable: variable.to_string(),
            message: format!("{err:#}"),
        },
    }
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;
    reader
        .map(|batch| batch.context("reading parquet record batch"))
        .collect()
}

fn load_grid(path: &Path) -> Result<Grid> {
    let batches = read_batches(path)?;
    let batch = batches
        .iter()
        .find(|b| b.num_rows() > 0)
        .context("grid file has no rows")?;

    let lat = f64_list_column(batch, "lat", 0)?;
    let lon = f64_list_column(batch, "lon", 0)?;
    let area = f64_list_column(batch, "area", 0)?;
    let shape = (lat.len(), lon.len());
    if area.len() != shape.0 * shape.1 {
        bail!(
            "area has {} values for a {}x{} grid",
            area.len(),
            shape.0,
            shape.1
        );
    }

    Ok(Grid {
        lat: Array1::from(dense(lat, "lat")?),
        lon: Array1::from(dense(lon, "lon")?),
        area: Array2::from_shape_vec(shape, dense(area, "area")?)?,
    })
}

fn load_variable(path: &Path, variable: &str, grid: &Grid) -> Result<GriddedVariable> {
    let (nlat, nlon) = grid.shape();
    let cells = nlat * nlon;

    let mut unit: Option<String> = None;
    let mut time_bounds = Vec::new();
    let mut values = Vec::new();
    let mut mask = Vec::new();

    for batch in read_batches(path)? {
        let start = f64_column(&batch, "time_start")?;
        let end = f64_column(&batch, "time_end")?;
        let units = string_column(&batch, "unit")?;

        for row in 0..batch.num_rows() {
            let row_unit = units.value(row);
            if let Some(u) = &unit {
                if u != row_unit {
                    bail!("row {row}: unit [{row_unit}] differs from [{u}]");
                }
            } else {
                unit = Some(row_unit.to_string());
            }

            let step = f64_list_column(&batch, "values", row)
                .with_context(|| format!("row {row}: failed to read 'values'"))?;
            if step.len() != cells {
                bail!(
                    "row {row}: {} values for a {nlat}x{nlon} grid",
                    step.len()
                );
            }
            for v in step {
                values.push(v.unwrap_or(f64::NAN));
                mask.push(v.map_or(true, |x| !x.is_finite()));
            }
            time_bounds.push((start.value(row), end.value(row)));
        }
    }

    let unit = unit.context("variable file has no time steps")?;
    let steps = time_bounds.len();
    Ok(GriddedVariable {
        name: variable.to_string(),
        unit,
        values: Array3::from_shape_vec((steps, nlat, nlon), values)?,
        mask: Array3::from_shape_vec((steps, nlat, nlon), mask)?,
        time_bounds,
        grid: grid.clone(),
    })
}

// -- Arrow helpers --

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Arc<dyn Array>> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow::anyhow!("missing '{name}' column"))?;
    Ok(batch.column(idx))
}

fn f64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<Float64Array>()
        .with_context(|| format!("'{name}' is not Float64"))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<StringArray>()
        .with_context(|| format!("'{name}' is not Utf8"))
}

/// Extract the list at `row` of a List or LargeList column; nulls stay `None`.
fn f64_list_column(batch: &RecordBatch, name: &str, row: usize) -> Result<Vec<Option<f64>>> {
    let col = column(batch, name)?;
    if col.is_null(row) {
        bail!("null value in list column '{name}'");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column '{name}', got {other:?}"),
    };

    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.map(f64::from)).collect())
    } else {
        bail!(
            "'{name}' inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

fn dense(values: Vec<Option<f64>>, name: &str) -> Result<Vec<f64>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.with_context(|| format!("{name}[{i}] is null")))
        .collect()
}
