use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data::model::Grid;
use crate::error::PipelineError;

/// Name of the built-in region that excludes nothing.
pub const GLOBAL: &str = "global";

/// Region-masking capability: which cells of `grid` fall outside `region`.
pub trait RegionMasker {
    /// Whether `region` can be evaluated at all.
    fn contains(&self, region: &str) -> bool;

    /// `true` for every cell outside the region.
    fn mask_for(&self, region: &str, grid: &Grid) -> Result<Array2<bool>, PipelineError>;

    /// Ensure every name in `requested` is known.
    fn validate(&self, requested: &[String]) -> Result<(), PipelineError> {
        match requested.iter().find(|r| !self.contains(r)) {
            Some(unknown) => Err(PipelineError::UnknownRegion(unknown.clone())),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Latitude/longitude box regions
// ---------------------------------------------------------------------------

/// An inclusive latitude/longitude box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub name: String,
    pub lat: [f64; 2],
    pub lon: [f64; 2],
}

impl RegionBounds {
    fn includes(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lat[0] && lat <= self.lat[1] && lon >= self.lon[0] && lon <= self.lon[1]
    }
}

/// The registry of known regions. `global` is always present.
#[derive(Debug, Clone, Default)]
pub struct Regions {
    boxes: BTreeMap<String, RegionBounds>,
}

impl Regions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a latitude/longitude box.
    pub fn add_lat_lon_bounds(&mut self, bounds: RegionBounds) {
        self.boxes.insert(bounds.name.clone(), bounds);
    }
}

impl RegionMasker for Regions {
    fn contains(&self, region: &str) -> bool {
        region == GLOBAL || self.boxes.contains_key(region)
    }

    fn mask_for(&self, region: &str, grid: &Grid) -> Result<Array2<bool>, PipelineError> {
        if region == GLOBAL {
            return Ok(Array2::from_elem(grid.shape(), false));
        }
        let bounds = self
            .boxes
            .get(region)
            .ok_or_else(|| PipelineError::UnknownRegion(region.to_string()))?;
        Ok(Array2::from_shape_fn(grid.shape(), |(i, j)| {
            !bounds.includes(grid.lat[i], grid.lon[j])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn grid() -> Grid {
        Grid {
            lat: array![-75.0, 0.0, 45.0],
            lon: array![-90.0, 90.0],
            area: Array2::ones((3, 2)),
        }
    }

    #[test]
    fn global_excludes_nothing() {
        let mask = Regions::new().mask_for(GLOBAL, &grid()).unwrap();
        assert!(mask.iter().all(|&m| !m));
    }

    #[test]
    fn box_excludes_cells_outside() {
        let mut regions = Regions::new();
        regions.add_lat_lon_bounds(RegionBounds {
            name: "noant".into(),
            lat: [-60.0, 89.999],
            lon: [-179.999, 179.999],
        });
        let mask = regions.mask_for("noant", &grid()).unwrap();
        assert_eq!(mask, array![[true, true], [false, false], [false, false]]);
    }

    #[test]
    fn unknown_region_is_rejected() {
        let regions = Regions::new();
        assert!(regions.validate(&["global".to_string()]).is_ok());
        let err = regions
            .validate(&["global".to_string(), "atlantis".to_string()])
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownRegion(name) if name == "atlantis"));
        assert!(regions.mask_for("atlantis", &grid()).is_err());
    }
}
