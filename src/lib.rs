//! Prepares masked climate-model grids for an external clustering tool and
//! rebuilds tables from what it writes back.
//!
//! The preparation path runs [`prepare::prepare_cluster`]: every model and
//! time window is extracted, masked, compressed and appended to
//! `<case>/data`. After clustering, [`reconstruct::build_cluster_dataframe`]
//! and [`reconstruct::build_centroid_dataframe`] map the flat outputs back to
//! model, time and grid cell.

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod extract;
pub mod flatten;
pub mod install;
pub mod layout;
pub mod prepare;
pub mod reconstruct;
pub mod regions;
pub mod serialize;
pub mod source;
pub mod units;

pub use data::loader::ParquetModel;
pub use data::model::{GriddedVariable, Grid, TimeWindow, VariableSpec};
pub use error::{ExtractError, PipelineError};
pub use layout::CaseLayout;
pub use prepare::{prepare_cluster, PrepareRequest, PrepareSummary};
pub use reconstruct::{build_centroid_dataframe, build_cluster_dataframe};
pub use regions::{RegionBounds, RegionMasker, Regions};
pub use source::{MemoryModel, ModelSource};
pub use units::UnitTable;
