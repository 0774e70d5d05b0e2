use std::fs::File;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use parquet::arrow::ArrowWriter;

use crate::error::PipelineError;

/// Write a reconstructed table to a Parquet file.
pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<(), PipelineError> {
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    log::info!("wrote {} rows to {}", batch.num_rows(), path.display());
    Ok(())
}

/// Render a table as an ASCII grid.
pub fn render(batch: &RecordBatch) -> Result<String, PipelineError> {
    Ok(pretty_format_batches(std::slice::from_ref(batch))?.to_string())
}
