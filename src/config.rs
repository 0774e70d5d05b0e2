//! TOML description of a preparation run.
//!
//! ```toml
//! casename = "sample"
//! times = { start = 1930, end = 2011, step = 10 }
//! regions = ["global", "noant"]
//!
//! [[region]]
//! name = "noant"
//! lat = [-60.0, 89.999]
//! lon = [-179.999, 179.999]
//!
//! [[variables]]
//! vars = ["tas", "pr"]
//! variability = false
//!
//! [[models]]
//! name = "CESM2"
//! path = "models/CESM2"
//!
//! [units]
//! gpp = "g m-2 d-1"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::data::model::VariableSpec;
use crate::error::PipelineError;
use crate::layout::CaseLayout;
use crate::prepare::PrepareRequest;
use crate::regions::{RegionBounds, Regions};
use crate::units::UnitTable;

/// Boundary years, listed or generated like a Python `range`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Times {
    List(Vec<i32>),
    Range {
        start: i32,
        /// Exclusive.
        end: i32,
        #[serde(default = "default_step")]
        step: i32,
    },
}

fn default_step() -> i32 {
    1
}

impl Times {
    pub fn years(&self) -> Result<Vec<i32>, PipelineError> {
        match self {
            Times::List(years) => Ok(years.clone()),
            Times::Range { step, .. } if *step <= 0 => Err(PipelineError::InvalidTimes(
                format!("step must be positive, got {step}"),
            )),
            Times::Range { start, end, step } => {
                Ok((*start..*end).step_by(*step as usize).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    /// Directory of Parquet files; relative paths resolve against the
    /// config file's directory.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaseConfig {
    pub casename: String,
    /// Parent directory of the case; relative to the config file.
    #[serde(default)]
    pub root: Option<PathBuf>,
    pub times: Times,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default, rename = "region")]
    pub region_bounds: Vec<RegionBounds>,
    pub variables: Vec<VariableSpec>,
    pub models: Vec<ModelEntry>,
    #[serde(default)]
    pub units: BTreeMap<String, String>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl CaseConfig {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let mut config = Self::parse(&text).map_err(|message| PipelineError::Config {
            path: path.to_path_buf(),
            message,
        })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Parse TOML text; relative paths stay relative to the working directory.
    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn layout(&self) -> CaseLayout {
        let root = self.root.clone().unwrap_or_else(|| PathBuf::from("."));
        CaseLayout::new(self.resolve(&root), self.casename.clone())
    }

    pub fn model_paths(&self) -> Vec<(String, PathBuf)> {
        self.models
            .iter()
            .map(|m| (m.name.clone(), self.resolve(&m.path)))
            .collect()
    }

    pub fn request(&self) -> Result<PrepareRequest, PipelineError> {
        Ok(PrepareRequest {
            variables: self.variables.clone(),
            years: self.times.years()?,
            regions: self.regions.clone(),
        })
    }

    pub fn regions(&self) -> Regions {
        let mut regions = Regions::new();
        for bounds in &self.region_bounds {
            regions.add_lat_lon_bounds(bounds.clone());
        }
        regions
    }

    /// Default preferred units with the `[units]` table laid over them.
    pub fn units(&self) -> UnitTable {
        let mut table = UnitTable::default();
        table.merge(&self.units);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::RegionMasker;

    const SAMPLE: &str = r#"
casename = "sample"
times = { start = 1930, end = 2011, step = 10 }
regions = ["global", "noant"]

[[region]]
name = "noant"
lat = [-60.0, 89.999]
lon = [-179.999, 179.999]

[[variables]]
vars = ["tas", "pr"]
variability = false

[[models]]
name = "CESM2"
path = "models/CESM2"

[units]
tas = "K"
"#;

    #[test]
    fn sample_config_parses() {
        let config = CaseConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.casename, "sample");
        assert_eq!(
            config.times.years().unwrap(),
            vec![1930, 1940, 1950, 1960, 1970, 1980, 1990, 2000, 2010]
        );
        assert_eq!(config.variables, vec![VariableSpec::new(["tas", "pr"])]);
        assert_eq!(config.region_bounds[0].lat, [-60.0, 89.999]);
        assert_eq!(config.units().preferred("tas"), Some("K"));
        assert_eq!(config.units().preferred("pr"), Some("mm d-1"));
        assert!(config.regions().validate(&config.regions).is_ok());
    }

    #[test]
    fn explicit_year_list_and_defaults() {
        let config = CaseConfig::parse(
            r#"
casename = "c"
times = [1850, 1900]
[[variables]]
vars = ["gpp"]
mean = false
variability = true
[[models]]
name = "M"
path = "/data/M"
"#,
        )
        .unwrap();
        assert_eq!(config.times.years().unwrap(), vec![1850, 1900]);
        assert!(config.regions.is_empty());
        assert_eq!(config.request().unwrap().region_names(), ["global"]);
        assert!(!config.variables[0].compute_mean);
        assert_eq!(config.model_paths()[0].1, PathBuf::from("/data/M"));
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("case.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = CaseConfig::load(&path).unwrap();
        assert_eq!(config.model_paths()[0].1, dir.path().join("models/CESM2"));
        assert_eq!(config.layout().case_dir(), dir.path().join(".").join("sample"));
    }

    #[test]
    fn bad_config_is_reported_with_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("case.toml");
        std::fs::write(&path, "casename = 3").unwrap();
        assert!(matches!(
            CaseConfig::load(&path),
            Err(PipelineError::Config { .. })
        ));
        let zero_step = Times::Range {
            start: 1,
            end: 2,
            step: 0,
        };
        assert!(zero_step.years().is_err());
    }
}
