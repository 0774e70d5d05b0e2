use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Window-level soft failures
// ---------------------------------------------------------------------------

/// Why a single (model, window) pair could not be used.
///
/// These never abort a run: the extractor converts them into a skipped
/// window and moves on to the next one.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("variable `{0}` is not provided by this model")]
    MissingVariable(String),

    #[error("no time steps of `{0}` overlap the window")]
    NoData(String),

    #[error("`{variable}` covers {:.1}% of the window (90% required)", .coverage * 100.0)]
    Incomplete { variable: String, coverage: f64 },

    #[error("`{variable}` is on a {found:?} grid, expected {expected:?}")]
    GridMismatch {
        variable: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("cannot convert `{variable}` from [{from}] to [{to}]")]
    UnitConversion {
        variable: String,
        from: String,
        to: String,
    },

    #[error("reading `{variable}`: {source}")]
    Read {
        variable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{variable}` is malformed: {message}")]
    Malformed { variable: String, message: String },
}

impl ExtractError {
    /// Whether running the same extraction again could plausibly succeed.
    ///
    /// Only I/O failures qualify; everything else describes the data itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractError::Read { .. })
    }
}

// ---------------------------------------------------------------------------
// Fatal pipeline failures
// ---------------------------------------------------------------------------

/// Errors that abort a preparation or reconstruction run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{} not found", .0.display())]
    MissingFile(PathBuf),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: {source}", .path.display())]
    Names {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("malformed file name `{name}`: expected {expected}")]
    MalformedFileName { name: String, expected: &'static str },

    #[error("{}:{line}: {message}", .path.display())]
    MalformedLine {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("block for {model} {year} has {found} columns, expected {expected}")]
    ColumnMismatch {
        model: String,
        year: i64,
        expected: usize,
        found: usize,
    },

    #[error("{} has {found} rows, expected {expected}", .path.display())]
    RowCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error(
        "stack entry {model} {year} spans {span} rows but coords.{model} has {coords}; \
         the grid of {model} changed between windows"
    )]
    SpanMismatch {
        model: String,
        year: i64,
        span: usize,
        coords: usize,
    },

    #[error("k = {0} appears in more than one output file")]
    DuplicateK(u32),

    #[error("model name `{0}` must be non-empty and contain no whitespace")]
    InvalidModelName(String),

    #[error("model `{0}` is listed more than once")]
    DuplicateModel(String),

    #[error("invalid time boundaries: {0}")]
    InvalidTimes(String),

    #[error("unknown region `{0}`")]
    UnknownRegion(String),

    #[error("config {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            PipelineError::MissingFile(path)
        } else {
            PipelineError::Io { path, source }
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        let path = path.into();
        match source.kind() {
            csv::ErrorKind::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                PipelineError::MissingFile(path)
            }
            _ => PipelineError::Csv { path, source },
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
