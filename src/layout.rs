//! On-disk layout of a case and the grammar of externally produced file
//! names.
//!
//! ```text
//! <root>/<casename>/
//!     job.sh, run_clustering.sh
//!     data/
//!         obs.raw.<casename>   matrix, one row per grid-cell sample
//!         coords.<model>       lon lat area, one row per retained cell
//!         stack.<casename>     "<model> <year> <row_offset>" per window
//!         names.<casename>     bincode list of column names
//!     **/clusters.out.<k>              (external) one label per row
//!     **/seeds.out.<k>.<tag>.unstd     (external) centroid matrix
//! ```

use std::path::{Path, PathBuf};

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseLayout {
    root: PathBuf,
    casename: String,
}

impl CaseLayout {
    /// A case living at `<root>/<casename>`.
    pub fn new(root: impl Into<PathBuf>, casename: impl Into<String>) -> Self {
        CaseLayout {
            root: root.into(),
            casename: casename.into(),
        }
    }

    pub fn casename(&self) -> &str {
        &self.casename
    }

    pub fn case_dir(&self) -> PathBuf {
        self.root.join(&self.casename)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.case_dir().join("data")
    }

    pub fn obs_raw(&self) -> PathBuf {
        self.data_dir().join(format!("obs.raw.{}", self.casename))
    }

    pub fn coords(&self, model: &str) -> PathBuf {
        self.data_dir().join(format!("coords.{model}"))
    }

    pub fn stack(&self) -> PathBuf {
        self.data_dir().join(format!("stack.{}", self.casename))
    }

    pub fn names(&self) -> PathBuf {
        self.data_dir().join(format!("names.{}", self.casename))
    }

    /// Older cases stored the column names under `name.<casename>`.
    pub fn legacy_names(&self) -> PathBuf {
        self.data_dir().join(format!("name.{}", self.casename))
    }

    pub fn create_data_dir(&self) -> Result<PathBuf, PipelineError> {
        let dir = self.data_dir();
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        Ok(dir)
    }
}

// ---------------------------------------------------------------------------
// File-name grammar for clustering outputs
// ---------------------------------------------------------------------------

pub const CLUSTERS_PREFIX: &str = "clusters.out.";
pub const SEEDS_PREFIX: &str = "seeds.out.";
pub const SEEDS_SUFFIX: &str = ".unstd";

const CLUSTERS_GRAMMAR: &str = "clusters.out.<k> with <k> a decimal integer";
const SEEDS_GRAMMAR: &str = "seeds.out.<k>.<tag>.unstd with <k> a decimal integer";

/// `k` of a label file.
///
/// Returns `Ok(None)` for names that are not label files at all and an
/// error for names that start like one but break the grammar.
pub fn parse_clusters_name(name: &str) -> Result<Option<u32>, PipelineError> {
    let Some(rest) = name.strip_prefix(CLUSTERS_PREFIX) else {
        return Ok(None);
    };
    parse_k(rest)
        .map(Some)
        .ok_or_else(|| malformed(name, CLUSTERS_GRAMMAR))
}

/// `k` of a centroid file, under the same conventions as
/// [`parse_clusters_name`].
pub fn parse_seeds_name(name: &str) -> Result<Option<u32>, PipelineError> {
    let Some(rest) = name.strip_prefix(SEEDS_PREFIX) else {
        return Ok(None);
    };
    let Some(middle) = rest.strip_suffix(SEEDS_SUFFIX) else {
        // seeds.out.* files without the suffix are standardised copies
        return Ok(None);
    };
    let (k, tag) = middle
        .split_once('.')
        .ok_or_else(|| malformed(name, SEEDS_GRAMMAR))?;
    if tag.is_empty() {
        return Err(malformed(name, SEEDS_GRAMMAR));
    }
    parse_k(k)
        .map(Some)
        .ok_or_else(|| malformed(name, SEEDS_GRAMMAR))
}

fn parse_k(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn malformed(name: &str, expected: &'static str) -> PipelineError {
    PipelineError::MalformedFileName {
        name: name.to_string(),
        expected,
    }
}

/// Label used for a `k` value in reconstructed tables.
pub fn k_label(k: u32) -> String {
    format!("k{k}")
}

/// File name of `path` as UTF-8, if it has one.
pub(crate) fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
