//! Preferred units and the conversions needed to reach them.
//!
//! The table is an ordinary value handed to the pipeline, so a run can swap
//! it out or extend it from the case configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::model::GriddedVariable;
use crate::error::ExtractError;

/// Variable name → unit every model should be converted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitTable {
    preferred: BTreeMap<String, String>,
}

impl Default for UnitTable {
    fn default() -> Self {
        let mut preferred = BTreeMap::new();
        preferred.insert("pr".to_string(), "mm d-1".to_string());
        preferred.insert("gpp".to_string(), "g m-2 d-1".to_string());
        for name in [
            "tas",
            "tasmin",
            "tasmax",
            "tasmaxQ10",
            "tasmaxQ30",
            "tasmaxQ50",
            "tasmaxQ70",
            "tasmaxQ90",
        ] {
            preferred.insert(name.to_string(), "degC".to_string());
        }
        UnitTable { preferred }
    }
}

impl UnitTable {
    /// A table with no preferences: every variable keeps its native unit.
    pub fn empty() -> Self {
        UnitTable {
            preferred: BTreeMap::new(),
        }
    }

    pub fn preferred(&self, variable: &str) -> Option<&str> {
        self.preferred.get(variable).map(String::as_str)
    }

    pub fn set(&mut self, variable: impl Into<String>, unit: impl Into<String>) {
        self.preferred.insert(variable.into(), unit.into());
    }

    /// Overlay `other` on top of this table.
    pub fn merge(&mut self, other: &BTreeMap<String, String>) {
        for (k, v) in other {
            self.preferred.insert(k.clone(), v.clone());
        }
    }

    /// Convert `var` in place when a preferred unit is configured for it.
    pub fn normalize(&self, var: &mut GriddedVariable) -> Result<(), ExtractError> {
        let Some(target) = self.preferred(&var.name) else {
            return Ok(());
        };
        let conversion =
            Affine::between(&var.unit, target).ok_or_else(|| ExtractError::UnitConversion {
                variable: var.name.clone(),
                from: var.unit.clone(),
                to: target.to_string(),
            })?;
        var.values.mapv_inplace(|x| conversion.apply(x));
        var.unit = target.to_string();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Affine conversions between known unit strings
// ---------------------------------------------------------------------------

const SECONDS_PER_DAY: f64 = 86_400.0;

/// `to = from * scale + offset`, for every pair listed here and its inverse.
const KNOWN: &[(&str, &str, f64, f64)] = &[
    ("K", "degC", 1.0, -273.15),
    ("kg m-2 s-1", "mm d-1", SECONDS_PER_DAY, 0.0),
    ("mm s-1", "mm d-1", SECONDS_PER_DAY, 0.0),
    ("kg m-2 s-1", "g m-2 d-1", SECONDS_PER_DAY * 1000.0, 0.0),
    ("g m-2 s-1", "g m-2 d-1", SECONDS_PER_DAY, 0.0),
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine {
    scale: f64,
    offset: f64,
}

impl Affine {
    const IDENTITY: Affine = Affine {
        scale: 1.0,
        offset: 0.0,
    };

    fn between(from: &str, to: &str) -> Option<Affine> {
        let from = normalize_unit(from);
        let to = normalize_unit(to);
        if from == to {
            return Some(Affine::IDENTITY);
        }
        KNOWN.iter().find_map(|&(a, b, scale, offset)| {
            if a == from && b == to {
                Some(Affine { scale, offset })
            } else if a == to && b == from {
                Some(Affine {
                    scale: 1.0 / scale,
                    offset: -offset / scale,
                })
            } else {
                None
            }
        })
    }

    fn apply(&self, x: f64) -> f64 {
        x * self.scale + self.offset
    }
}

fn normalize_unit(unit: &str) -> String {
    unit.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Grid;
    use ndarray::{array, Array2, Array3};

    fn variable(name: &str, unit: &str, value: f64) -> GriddedVariable {
        GriddedVariable {
            name: name.into(),
            unit: unit.into(),
            values: Array3::from_elem((1, 1, 1), value),
            mask: Array3::from_elem((1, 1, 1), false),
            time_bounds: vec![(0.0, 1.0)],
            grid: Grid {
                lat: array![0.0],
                lon: array![0.0],
                area: Array2::ones((1, 1)),
            },
        }
    }

    #[test]
    fn kelvin_to_celsius() {
        let mut tas = variable("tas", "K", 300.0);
        UnitTable::default().normalize(&mut tas).unwrap();
        assert_eq!(tas.unit, "degC");
        assert!((tas.values[[0, 0, 0]] - 26.85).abs() < 1e-9);
    }

    #[test]
    fn inverse_conversion_is_derived() {
        let mut table = UnitTable::empty();
        table.set("pr", "kg m-2 s-1");
        let mut pr = variable("pr", "mm  d-1", 86_400.0);
        table.normalize(&mut pr).unwrap();
        assert_eq!(pr.unit, "kg m-2 s-1");
        assert!((pr.values[[0, 0, 0]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unlisted_variable_keeps_native_unit() {
        let mut mrso = variable("mrso", "kg m-2", 5.0);
        UnitTable::default().normalize(&mut mrso).unwrap();
        assert_eq!(mrso.unit, "kg m-2");
        assert_eq!(mrso.values[[0, 0, 0]], 5.0);
    }

    #[test]
    fn unknown_pair_is_a_conversion_error() {
        let mut tas = variable("tas", "degF", 80.0);
        let err = UnitTable::default().normalize(&mut tas).unwrap_err();
        assert!(matches!(err, ExtractError::UnitConversion { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn merge_overrides_defaults() {
        let mut table = UnitTable::default();
        let mut overrides = BTreeMap::new();
        overrides.insert("tas".to_string(), "K".to_string());
        table.merge(&overrides);
        assert_eq!(table.preferred("tas"), Some("K"));
        assert_eq!(table.preferred("pr"), Some("mm d-1"));
    }
}
