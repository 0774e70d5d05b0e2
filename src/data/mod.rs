/// Data layer: grid types, masking, text files and Parquet model sources.
///
/// Architecture:
/// ```text
///  <model>/grid.parquet, <model>/<var>.parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse files → GriddedVariable
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │    model      │  statistics → StatField
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  composite mask → compressed vectors
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   text    │  space-delimited files for the clustering tool
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod sample;
pub mod text;
