use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Float64Builder, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::loader::GRID_FILE;
use super::model::{DAYS_PER_YEAR, REFERENCE_YEAR};

const EARTH_RADIUS_M: f64 = 6.371e6;
const MONTH_DAYS: [f64; 12] = [
    31.0, 28.0, 31.0, 30.0, 31.0, 30.0, 31.0, 31.0, 30.0, 31.0, 30.0, 31.0,
];

// ---------------------------------------------------------------------------
// Synthetic model directories
// ---------------------------------------------------------------------------

/// One synthetic variable: a seasonal cycle around `base` plus noise.
#[derive(Debug, Clone)]
pub struct SampleVariable {
    pub name: String,
    pub unit: String,
    pub base: f64,
    pub amplitude: f64,
}

/// A synthetic model with monthly data on a regular global grid.
///
/// Cell `(0, 0)` is invalid at every time step.
#[derive(Debug, Clone)]
pub struct SampleModel {
    pub name: String,
    pub first_year: i32,
    pub years: u32,
    pub nlat: usize,
    pub nlon: usize,
    pub variables: Vec<SampleVariable>,
    pub seed: u64,
}

/// Write `grid.parquet` and one `<variable>.parquet` per variable into `dir`.
pub fn write_model(dir: &Path, model: &SampleModel) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let (lat, lon, area) = regular_grid(model.nlat, model.nlon);
    write_grid(&dir.join(GRID_FILE), &lat, &lon, &area)?;

    let mut rng = SimpleRng::new(model.seed);
    for var in &model.variables {
        let path = dir.join(format!("{}.parquet", var.name));
        write_variable(&path, model, var, &lat, &mut rng)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

/// Cell-centred axes and cell areas (m²) of an `nlat × nlon` global grid.
fn regular_grid(nlat: usize, nlon: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let dlat = 180.0 / nlat as f64;
    let dlon = 360.0 / nlon as f64;
    let lat: Vec<f64> = (0..nlat).map(|i| -90.0 + dlat * (i as f64 + 0.5)).collect();
    let lon: Vec<f64> = (0..nlon).map(|j| -180.0 + dlon * (j as f64 + 0.5)).collect();
    let mut area = Vec::with_capacity(nlat * nlon);
    for &la in &lat {
        let band = ((la + dlat / 2.0).to_radians().sin() - (la - dlat / 2.0).to_radians().sin())
            .abs();
        for _ in 0..nlon {
            area.push(EARTH_RADIUS_M.powi(2) * dlon.to_radians() * band);
        }
    }
    (lat, lon, area)
}

fn list_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )
}

fn list_of(values: &[Option<f64>]) -> ArrayRef {
    let mut builder = ListBuilder::new(Float64Builder::new());
    builder.values().extend(values.iter().copied());
    builder.append(true);
    Arc::new(builder.finish())
}

fn write_batch(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), None).context("creating parquet writer")?;
    writer.write(batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn write_grid(path: &Path, lat: &[f64], lon: &[f64], area: &[f64]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        list_field("lat"),
        list_field("lon"),
        list_field("area"),
    ]));
    let some = |v: &[f64]| v.iter().copied().map(Some).collect::<Vec<_>>();
    let batch = RecordBatch::try_new(
        schema,
        vec![list_of(&some(lat)), list_of(&some(lon)), list_of(&some(area))],
    )?;
    write_batch(path, &batch)
}

fn write_variable(
    path: &Path,
    model: &SampleModel,
    var: &SampleVariable,
    lat: &[f64],
    rng: &mut SimpleRng,
) -> Result<()> {
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    let mut values = ListBuilder::new(Float64Builder::new());

    let mut t = f64::from(model.first_year - REFERENCE_YEAR) * DAYS_PER_YEAR;
    for _ in 0..model.years {
        for (month, days) in MONTH_DAYS.iter().enumerate() {
            starts.push(t);
            ends.push(t + days);
            t += days;

            let season = (2.0 * std::f64::consts::PI * month as f64 / 12.0).sin();
            for (i, &la) in lat.iter().enumerate() {
                for j in 0..model.nlon {
                    if i == 0 && j == 0 {
                        values.values().append_null();
                    } else {
                        let signal = var.base + var.amplitude * season * la.to_radians().cos();
                        let noise = rng.gauss(0.0, var.amplitude * 0.05);
                        values.values().append_value(signal + noise);
                    }
                }
            }
            values.append(true);
        }
    }

    let steps = starts.len();
    let schema = Arc::new(Schema::new(vec![
        Field::new("time_start", DataType::Float64, false),
        Field::new("time_end", DataType::Float64, false),
        Field::new("unit", DataType::Utf8, false),
        list_field("values"),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Float64Array::from(starts)),
            Arc::new(Float64Array::from(ends)),
            Arc::new(StringArray::from(vec![var.unit.as_str(); steps])),
            Arc::new(values.finish()),
        ],
    )?;
    write_batch(path, &batch)
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}
