use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use clustergrid::config::CaseConfig;
use clustergrid::export::{render, write_parquet};
use clustergrid::install::install_scripts;
use clustergrid::{
    build_centroid_dataframe, build_cluster_dataframe, prepare_cluster, CaseLayout, ModelSource,
    ParquetModel,
};

#[derive(Debug, Parser)]
#[command(name = "clustergrid", version, about)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract, mask and flatten every model into the clustering input files.
    Prepare {
        /// Case description (TOML).
        #[arg(short, long)]
        config: PathBuf,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Write job.sh and run_clustering.sh into the case directory.
    Install {
        #[arg(long)]
        case: String,
        /// Directory holding the clustering executable.
        #[arg(long)]
        cluster_bin: PathBuf,
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Table of cluster labels per model, time and grid cell.
    Clusters {
        #[arg(long)]
        case: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Write Parquet here instead of printing.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Table of cluster centroids for every k.
    Centroids {
        #[arg(long)]
        case: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Command::Prepare { config, json } => prepare(&config, json),
        Command::Install {
            case,
            cluster_bin,
            root,
        } => {
            let layout = CaseLayout::new(root, case);
            for path in install_scripts(&layout, &cluster_bin)? {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Clusters { case, root, output } => {
            let table = build_cluster_dataframe(&CaseLayout::new(root, case))?;
            emit(&table, output.as_deref())
        }
        Command::Centroids { case, root, output } => {
            let table = build_centroid_dataframe(&CaseLayout::new(root, case))?;
            emit(&table, output.as_deref())
        }
    }
}

fn prepare(config_path: &Path, json: bool) -> Result<()> {
    let config = CaseConfig::load(config_path)?;
    let models: Vec<ParquetModel> = config
        .model_paths()
        .into_iter()
        .map(|(name, path)| {
            ParquetModel::open(&name, &path)
                .with_context(|| format!("opening model {name} at {}", path.display()))
        })
        .collect::<Result<_>>()?;
    let sources: Vec<&dyn ModelSource> = models.iter().map(|m| m as &dyn ModelSource).collect();

    let summary = prepare_cluster(
        &config.layout(),
        &sources,
        &config.request()?,
        &config.units(),
        &config.regions(),
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: {} windows accepted, {} skipped, {} rows, {} columns",
            summary.casename,
            summary.accepted.len(),
            summary.skipped.len(),
            summary.total_rows,
            summary.column_names.len()
        );
        for model in &summary.grid_changes {
            println!("warning: grid of {model} changed between windows");
        }
    }
    Ok(())
}

fn emit(table: &arrow::record_batch::RecordBatch, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => write_parquet(table, path)?,
        None => println!("{}", render(table)?),
    }
    Ok(())
}
