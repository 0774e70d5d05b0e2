//! Accumulates row blocks and writes the clustering input files.

use std::path::{Path, PathBuf};

use crate::data::model::ProvenanceRecord;
use crate::data::text::{format_f64, read_matrix, write_rows};
use crate::error::PipelineError;
use crate::flatten::RowBlock;
use crate::layout::CaseLayout;

/// Column-major accumulation of every accepted block of a run.
#[derive(Debug)]
pub struct CaseWriter {
    layout: CaseLayout,
    names: Option<Vec<String>>,
    columns: Vec<Vec<f64>>,
    stack: Vec<ProvenanceRecord>,
}

/// What [`CaseWriter::finish`] put on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenCase {
    pub rows: usize,
    pub column_names: Vec<String>,
    pub stack: Vec<ProvenanceRecord>,
}

impl CaseWriter {
    /// Create `<case>/data` and start an empty accumulation.
    pub fn create(layout: CaseLayout) -> Result<Self, PipelineError> {
        layout.create_data_dir()?;
        Ok(CaseWriter {
            layout,
            names: None,
            columns: Vec::new(),
            stack: Vec::new(),
        })
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Append a block's statistics and provenance.
    ///
    /// Every block must carry the same number of columns as the first one.
    pub fn push(&mut self, block: &RowBlock) -> Result<(), PipelineError> {
        let incoming = block.column_names();
        if let Some(names) = &self.names {
            if names.len() != incoming.len() {
                return Err(PipelineError::ColumnMismatch {
                    model: block.provenance.model.clone(),
                    year: block.provenance.year,
                    expected: names.len(),
                    found: incoming.len(),
                });
            }
            if *names != incoming {
                log::warn!(
                    "{} {}: column labels {:?} differ from {:?}; keeping the first",
                    block.provenance.model,
                    block.provenance.year,
                    incoming,
                    names
                );
            }
        } else {
            self.columns = vec![Vec::new(); incoming.len()];
            self.names = Some(incoming);
        }
        debug_assert_eq!(block.provenance.row_offset, self.rows());
        for (acc, column) in self.columns.iter_mut().zip(&block.columns) {
            debug_assert_eq!(column.values.len(), block.row_count());
            acc.extend_from_slice(&column.values);
        }
        self.stack.push(block.provenance.clone());
        Ok(())
    }

    /// Overwrite `coords.<model>` with this block's coordinates.
    pub fn write_coords(&self, block: &RowBlock) -> Result<PathBuf, PipelineError> {
        let path = self.layout.coords(&block.provenance.model);
        let rows = (0..block.row_count()).map(|r| {
            [
                format_f64(block.lon[r]),
                format_f64(block.lat[r]),
                format_f64(block.area[r]),
            ]
        });
        write_rows(&path, rows)?;
        Ok(path)
    }

    /// Write the matrix, the stack and the column names.
    pub fn finish(self) -> Result<WrittenCase, PipelineError> {
        let rows = self.rows();
        let column_names = self.names.unwrap_or_default();
        if self.stack.is_empty() {
            log::warn!(
                "no window of case {} was usable; writing empty outputs",
                self.layout.casename()
            );
        }

        let columns = &self.columns;
        write_rows(
            &self.layout.obs_raw(),
            (0..rows).map(|r| columns.iter().map(move |c| format_f64(c[r]))),
        )?;
        write_rows(
            &self.layout.stack(),
            self.stack.iter().map(|rec| {
                [
                    rec.model.clone(),
                    rec.year.to_string(),
                    rec.row_offset.to_string(),
                ]
            }),
        )?;
        write_names(&self.layout.names(), &column_names)?;

        log::info!(
            "case {}: {} rows x {} columns from {} windows",
            self.layout.casename(),
            rows,
            column_names.len(),
            self.stack.len()
        );
        Ok(WrittenCase {
            rows,
            column_names,
            stack: self.stack,
        })
    }
}

// ---------------------------------------------------------------------------
// Column-name list
// ---------------------------------------------------------------------------

pub fn write_names(path: &Path, names: &[String]) -> Result<(), PipelineError> {
    let bytes = bincode::serialize(names).map_err(|source| PipelineError::Names {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, bytes).map_err(|e| PipelineError::io(path, e))?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

pub fn read_names(path: &Path) -> Result<Vec<String>, PipelineError> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    bincode::deserialize(&bytes).map_err(|source| PipelineError::Names {
        path: path.to_path_buf(),
        source,
    })
}

/// Read `obs.raw.<casename>` back as rows of `width` values.
pub fn read_obs(layout: &CaseLayout, width: usize) -> Result<Vec<Vec<f64>>, PipelineError> {
    read_matrix(&layout.obs_raw(), width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Column;
    use tempfile::TempDir;

    fn block(model: &str, offset: usize, names: &[&str], rows: usize) -> RowBlock {
        RowBlock {
            provenance: ProvenanceRecord {
                model: model.into(),
                year: 1930,
                row_offset: offset,
            },
            columns: names
                .iter()
                .enumerate()
                .map(|(c, n)| Column {
                    name: n.to_string(),
                    values: (0..rows).map(|r| (offset + r) as f64 + c as f64 * 0.5).collect(),
                })
                .collect(),
            lon: vec![1.0; rows],
            lat: vec![2.0; rows],
            area: vec![3.0; rows],
        }
    }

    #[test]
    fn matrix_is_written_row_major() {
        let dir = TempDir::new().unwrap();
        let layout = CaseLayout::new(dir.path(), "t");
        let mut writer = CaseWriter::create(layout.clone()).unwrap();
        writer.push(&block("A", 0, &["a", "b"], 2)).unwrap();
        writer.push(&block("B", 2, &["a", "b"], 1)).unwrap();
        let written = writer.finish().unwrap();

        assert_eq!(written.rows, 3);
        assert_eq!(
            read_obs(&layout, 2).unwrap(),
            vec![vec![0.0, 0.5], vec![1.0, 1.5], vec![2.0, 2.5]]
        );
        let stack = std::fs::read_to_string(layout.stack()).unwrap();
        assert_eq!(stack, "A 1930 0\nB 1930 2\n");
        assert_eq!(read_names(&layout.names()).unwrap(), ["a", "b"]);
    }

    #[test]
    fn inconsistent_column_count_fails() {
        let dir = TempDir::new().unwrap();
        let mut writer = CaseWriter::create(CaseLayout::new(dir.path(), "t")).unwrap();
        writer.push(&block("A", 0, &["a", "b"], 2)).unwrap();
        let err = writer.push(&block("B", 2, &["a"], 2)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ColumnMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn coords_are_lon_lat_area() {
        let dir = TempDir::new().unwrap();
        let layout = CaseLayout::new(dir.path(), "t");
        let writer = CaseWriter::create(layout.clone()).unwrap();
        let path = writer.write_coords(&block("A", 0, &["a"], 2)).unwrap();
        assert_eq!(path, layout.coords("A"));
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "1e0 2e0 3e0\n1e0 2e0 3e0\n"
        );
    }

    #[test]
    fn empty_run_still_writes_every_file() {
        let dir = TempDir::new().unwrap();
        let layout = CaseLayout::new(dir.path(), "t");
        let written = CaseWriter::create(layout.clone()).unwrap().finish().unwrap();
        assert_eq!(written.rows, 0);
        assert!(layout.obs_raw().is_file());
        assert!(layout.stack().is_file());
        assert!(read_names(&layout.names()).unwrap().is_empty());
    }
}
