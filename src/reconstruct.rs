//! The post-processing path: turn the flat clustering outputs back into
//! tables keyed by model, time and grid cell.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use walkdir::WalkDir;

use crate::data::model::ProvenanceRecord;
use crate::data::text::{malformed_line, parse_i64, read_matrix, read_rows};
use crate::error::PipelineError;
use crate::layout::{file_name, k_label, parse_clusters_name, parse_seeds_name, CaseLayout};
use crate::serialize::read_names;

/// Compressed coordinates of one model, as stored in `coords.<model>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coords {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    pub area: Vec<f64>,
}

impl Coords {
    pub fn len(&self) -> usize {
        self.lat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lat.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Parse `stack.<casename>`.
pub fn read_stack(path: &Path) -> Result<Vec<ProvenanceRecord>, PipelineError> {
    read_rows(path)?
        .into_iter()
        .map(|line| {
            let [model, year, offset] = line.fields.as_slice() else {
                return Err(malformed_line(
                    path,
                    line.number,
                    format!("expected `model year row`, found {} fields", line.fields.len()),
                ));
            };
            let offset = parse_i64(path, line.number, offset)?;
            let row_offset = usize::try_from(offset).map_err(|_| {
                malformed_line(path, line.number, format!("negative row offset {offset}"))
            })?;
            Ok(ProvenanceRecord {
                model: model.clone(),
                year: parse_i64(path, line.number, year)?,
                row_offset,
            })
        })
        .collect()
}

/// Parse `coords.<model>`.
pub fn read_coords(path: &Path) -> Result<Coords, PipelineError> {
    let mut coords = Coords::default();
    for row in read_matrix(path, 3)? {
        coords.lon.push(row[0]);
        coords.lat.push(row[1]);
        coords.area.push(row[2]);
    }
    Ok(coords)
}

/// Every file under `dir` whose name `parse` recognises, ordered by `k`.
fn find_outputs(
    dir: &Path,
    parse: fn(&str) -> Result<Option<u32>, PipelineError>,
) -> Result<Vec<(u32, PathBuf)>, PipelineError> {
    let mut found: BTreeMap<u32, PathBuf> = BTreeMap::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = file_name(entry.path()) else {
            continue;
        };
        if let Some(k) = parse(name)? {
            if found.insert(k, entry.path().to_path_buf()).is_some() {
                return Err(PipelineError::DuplicateK(k));
            }
        }
    }
    Ok(found.into_iter().collect())
}

// ---------------------------------------------------------------------------
// Cluster assignments
// ---------------------------------------------------------------------------

/// One row per retained grid cell of every accepted window, with the
/// cluster label of each `clusters.out.<k>` found under the case.
///
/// Columns: `model`, `time`, `lon`, `lat`, `area`, then `k<k>` ascending.
pub fn build_cluster_dataframe(layout: &CaseLayout) -> Result<RecordBatch, PipelineError> {
    let stack_path = layout.stack();
    let stack = read_stack(&stack_path)?;

    let mut coords: BTreeMap<&str, Coords> = BTreeMap::new();
    for rec in &stack {
        if !coords.contains_key(rec.model.as_str()) {
            coords.insert(&rec.model, read_coords(&layout.coords(&rec.model))?);
        }
    }

    let mut model = Vec::new();
    let mut time = Vec::new();
    let mut lon = Vec::new();
    let mut lat = Vec::new();
    let mut area = Vec::new();
    for (i, rec) in stack.iter().enumerate() {
        let cells = &coords[rec.model.as_str()];
        let span = match stack.get(i + 1) {
            Some(next) => next.row_offset.checked_sub(rec.row_offset).ok_or_else(|| {
                malformed_line(
                    &stack_path,
                    i + 2,
                    format!(
                        "row offset {} precedes {}",
                        next.row_offset, rec.row_offset
                    ),
                )
            })?,
            None => cells.len(),
        };
        if span != cells.len() {
            return Err(PipelineError::SpanMismatch {
                model: rec.model.clone(),
                year: rec.year,
                span,
                coords: cells.len(),
            });
        }
        model.extend(std::iter::repeat(rec.model.as_str()).take(span));
        time.extend(std::iter::repeat(rec.year).take(span));
        lon.extend_from_slice(&cells.lon);
        lat.extend_from_slice(&cells.lat);
        area.extend_from_slice(&cells.area);
    }
    let rows = lat.len();

    let mut fields = vec![
        Field::new("model", DataType::Utf8, false),
        Field::new("time", DataType::Int64, false),
        Field::new("lon", DataType::Float64, false),
        Field::new("lat", DataType::Float64, false),
        Field::new("area", DataType::Float64, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(model)),
        Arc::new(Int64Array::from(time)),
        Arc::new(Float64Array::from(lon)),
        Arc::new(Float64Array::from(lat)),
        Arc::new(Float64Array::from(area)),
    ];

    for (k, path) in find_outputs(&layout.case_dir(), parse_clusters_name)? {
        let labels = read_labels(&path)?;
        if labels.len() != rows {
            return Err(PipelineError::RowCountMismatch {
                path,
                expected: rows,
                found: labels.len(),
            });
        }
        log::debug!("attached {} as {}", path.display(), k_label(k));
        fields.push(Field::new(k_label(k), DataType::Int64, false));
        columns.push(Arc::new(Int64Array::from(labels)));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

fn read_labels(path: &Path) -> Result<Vec<i64>, PipelineError> {
    read_rows(path)?
        .into_iter()
        .map(|line| match line.fields.as_slice() {
            [label] => parse_i64(path, line.number, label),
            other => Err(malformed_line(
                path,
                line.number,
                format!("expected one label, found {} fields", other.len()),
            )),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Centroids
// ---------------------------------------------------------------------------

/// Every `seeds.out.<k>.<tag>.unstd` found under the case, one row per
/// cluster centroid.
///
/// Columns: `cluster`, one per persisted column name, then `k`.
pub fn build_centroid_dataframe(layout: &CaseLayout) -> Result<RecordBatch, PipelineError> {
    let names_path = [layout.names(), layout.legacy_names()]
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| PipelineError::MissingFile(layout.names()))?;
    let names = read_names(&names_path)?;

    let mut cluster: Vec<i64> = Vec::new();
    let mut stats: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    let mut k_values: Vec<String> = Vec::new();

    for (k, path) in find_outputs(&layout.case_dir(), parse_seeds_name)? {
        let rows = read_matrix(&path, names.len() + 1)?;
        for (c, row) in rows.iter().enumerate() {
            cluster.push(c as i64);
            // the first field carries no statistic
            for (acc, &v) in stats.iter_mut().zip(&row[1..]) {
                acc.push(v);
            }
            k_values.push(k_label(k));
        }
        log::debug!("read {} centroids from {}", rows.len(), path.display());
    }

    let mut fields = vec![Field::new("cluster", DataType::Int64, false)];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(cluster))];
    for (name, values) in names.iter().zip(stats) {
        fields.push(Field::new(name.as_str(), DataType::Float64, false));
        columns.push(Arc::new(Float64Array::from(values)));
    }
    fields.push(Field::new("k", DataType::Utf8, false));
    columns.push(Arc::new(StringArray::from(k_values)));

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stack_lines_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.t");
        std::fs::write(&path, "A 1930 0\nA 1940 12\n\nB 1930 24").unwrap();
        let stack = read_stack(&path).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack[1].to_string(), "A 1940 12");
        assert_eq!(stack[2].row_offset, 24);
    }

    #[test]
    fn malformed_stack_line_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.t");
        std::fs::write(&path, "A 1930 0\nA 1940\n").unwrap();
        let err = read_stack(&path).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedLine { line: 2, .. }));

        std::fs::write(&path, "A 1930 -4\n").unwrap();
        assert!(read_stack(&path).is_err());
    }

    #[test]
    fn labels_must_be_single_integers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clusters.out.2");
        std::fs::write(&path, "0\n1\n1\n").unwrap();
        assert_eq!(read_labels(&path).unwrap(), vec![0, 1, 1]);
        std::fs::write(&path, "0\n1 2\n").unwrap();
        assert!(read_labels(&path).is_err());
        std::fs::write(&path, "0\n1.5\n").unwrap();
        assert!(read_labels(&path).is_err());
    }

    #[test]
    fn duplicate_k_across_directories_is_fatal() {
        let dir = TempDir::new().unwrap();
        for sub in ["run1", "run2"] {
            let d = dir.path().join(sub);
            std::fs::create_dir_all(&d).unwrap();
            std::fs::write(d.join("clusters.out.4"), "0\n").unwrap();
        }
        let err = find_outputs(dir.path(), parse_clusters_name).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateK(4)));
    }
}
