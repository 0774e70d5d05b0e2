use std::path::Path;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Space-delimited text files
// ---------------------------------------------------------------------------

/// Shortest representation that parses back to the same `f64`.
pub fn format_f64(v: f64) -> String {
    format!("{v:e}")
}

/// Write `rows` as space-separated fields, one line per row.
pub fn write_rows<I, R>(path: &Path, rows: I) -> Result<(), PipelineError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .quote_style(csv::QuoteStyle::Never)
        .from_path(path)
        .map_err(|e| PipelineError::csv(path, e))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| PipelineError::csv(path, e))?;
    }
    writer
        .flush()
        .map_err(|e| PipelineError::io(path, e))?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

/// A parsed line together with its 1-based line number.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub number: usize,
    pub fields: Vec<String>,
}

/// Read every non-blank line of a whitespace-delimited file.
///
/// Runs of spaces and tabs both separate fields.
///
/// A missing file is reported as [`PipelineError::MissingFile`].
pub fn read_rows(path: &Path) -> Result<Vec<Line>, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::MissingFile(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| PipelineError::csv(path, e))?;

    let mut lines = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| PipelineError::csv(path, e))?;
        let number = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let fields: Vec<String> = record
            .iter()
            .flat_map(str::split_whitespace)
            .map(str::to_string)
            .collect();
        if !fields.is_empty() {
            lines.push(Line { number, fields });
        }
    }
    Ok(lines)
}

/// Read a numeric matrix whose rows all have `width` fields.
pub fn read_matrix(path: &Path, width: usize) -> Result<Vec<Vec<f64>>, PipelineError> {
    read_rows(path)?
        .into_iter()
        .map(|line| {
            if line.fields.len() != width {
                return Err(malformed_line(
                    path,
                    line.number,
                    format!("expected {width} fields, found {}", line.fields.len()),
                ));
            }
            line.fields
                .iter()
                .map(|f| parse_f64(path, line.number, f))
                .collect()
        })
        .collect()
}

pub fn parse_f64(path: &Path, line: usize, field: &str) -> Result<f64, PipelineError> {
    field
        .parse::<f64>()
        .map_err(|_| malformed_line(path, line, format!("`{field}` is not a number")))
}

pub fn parse_i64(path: &Path, line: usize, field: &str) -> Result<i64, PipelineError> {
    field
        .parse::<i64>()
        .map_err(|_| malformed_line(path, line, format!("`{field}` is not an integer")))
}

pub fn malformed_line(path: &Path, line: usize, message: String) -> PipelineError {
    PipelineError::MalformedLine {
        path: path.to_path_buf(),
        line,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn floats_round_trip_exactly() {
        for v in [0.1, -273.15, 1.0e-300, 6.02214076e23, 1.0 / 3.0] {
            assert_eq!(format_f64(v).parse::<f64>().unwrap(), v);
        }
    }

    #[test]
    fn rows_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m");
        let rows = vec![
            vec![format_f64(1.5), format_f64(-2.0)],
            vec![format_f64(0.25), format_f64(1e10)],
        ];
        write_rows(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1.5e0 -2e0\n2.5e-1 1e10\n");
        assert_eq!(
            read_matrix(&path, 2).unwrap(),
            vec![vec![1.5, -2.0], vec![0.25, 1e10]]
        );
    }

    #[test]
    fn blank_lines_are_skipped_and_widths_checked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m");
        std::fs::write(&path, "1 2\n\n3 4\n5\n").unwrap();
        let lines = read_rows(&path).unwrap();
        assert_eq!(lines.len(), 3);
        let err = read_matrix(&path, 2).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedLine { line: 4, .. }));
    }

    #[test]
    fn tabs_and_repeated_spaces_separate_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seeds");
        std::fs::write(&path, "0\t1.5\t2\n1   \t3.5  4\n").unwrap();
        assert_eq!(
            read_matrix(&path, 3).unwrap(),
            vec![vec![0.0, 1.5, 2.0], vec![1.0, 3.5, 4.0]]
        );
    }

    #[test]
    fn missing_file_is_reported_by_path() {
        let dir = TempDir::new().unwrap();
        let err = read_rows(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingFile(p) if p.ends_with("absent")));
    }
}
