//! Write a small synthetic case: two Parquet model directories and a
//! `case.toml` that prepares them.
//!
//! ```text
//! cargo run --bin generate_sample -- [output-dir]
//! clustergrid prepare --config <output-dir>/case.toml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clustergrid::data::sample::{write_model, SampleModel, SampleVariable};

const CASE_TOML: &str = r#"casename = "sample"
root = "cases"
times = { start = 1930, end = 2011, step = 10 }
regions = ["global", "noant"]

[[region]]
name = "noant"
lat = [-60.0, 89.999]
lon = [-179.999, 179.999]

[[variables]]
vars = ["tas", "pr"]
variability = true

[[models]]
name = "ModelA"
path = "models/ModelA"

[[models]]
name = "ModelB"
path = "models/ModelB"
"#;

fn variables() -> Vec<SampleVariable> {
    vec![
        SampleVariable {
            name: "tas".into(),
            unit: "K".into(),
            base: 288.0,
            amplitude: 12.0,
        },
        SampleVariable {
            name: "pr".into(),
            unit: "kg m-2 s-1".into(),
            base: 3.0e-5,
            amplitude: 1.5e-5,
        },
    ]
}

fn main() -> Result<()> {
    let out = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_case"));

    // ModelB stops in 1945, so its 1940s window is half covered and
    // everything after it has no data.
    let models = [
        SampleModel {
            name: "ModelA".into(),
            first_year: 1930,
            years: 80,
            nlat: 18,
            nlon: 36,
            variables: variables(),
            seed: 42,
        },
        SampleModel {
            name: "ModelB".into(),
            first_year: 1930,
            years: 15,
            nlat: 18,
            nlon: 36,
            variables: variables(),
            seed: 7,
        },
    ];

    for model in &models {
        let dir = out.join("models").join(&model.name);
        write_model(&dir, model)?;
        println!(
            "Wrote {} ({} years, {}x{} cells) to {}",
            model.name,
            model.years,
            model.nlat,
            model.nlon,
            dir.display()
        );
    }

    let config = out.join("case.toml");
    std::fs::write(&config, CASE_TOML).with_context(|| format!("writing {}", config.display()))?;
    println!("Wrote {}", config.display());
    Ok(())
}
