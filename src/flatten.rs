//! Compression of an extracted window into a dense block of rows.

use crate::data::filter::compress;
use crate::data::model::{Column, ProvenanceRecord};
use crate::extract::ExtractedWindow;

/// All compressed columns and coordinates of one (model, window).
///
/// Row `r` of every vector refers to the same grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBlock {
    pub provenance: ProvenanceRecord,
    pub columns: Vec<Column>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    pub area: Vec<f64>,
}

impl RowBlock {
    pub fn row_count(&self) -> usize {
        self.lat.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Hands out row offsets as blocks are produced.
#[derive(Debug, Default)]
pub struct Flattener {
    next_row: usize,
}

impl Flattener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flatten(&mut self, model: &str, extracted: &ExtractedWindow) -> RowBlock {
        let mask = &extracted.mask;
        let (lat_grid, lon_grid) = extracted.grid.cell_coordinates();

        let columns = extracted
            .fields
            .iter()
            .map(|field| Column {
                name: field.label.clone(),
                values: compress(field.values.view(), mask),
            })
            .collect();
        let block = RowBlock {
            provenance: ProvenanceRecord {
                model: model.to_string(),
                year: i64::from(extracted.window.year),
                row_offset: self.next_row,
            },
            columns,
            lon: compress(lon_grid.view(), mask),
            lat: compress(lat_grid.view(), mask),
            area: compress(extracted.grid.area.view(), mask),
        };
        self.next_row += block.row_count();
        block
    }
}
