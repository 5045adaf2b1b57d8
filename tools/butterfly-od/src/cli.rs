//! CLI commands for butterfly-od

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::bench;
use crate::compact::compact_normalized;
use crate::config::OdConfig;
use crate::engine::QueryEngine;
use crate::filter::normalize;
use crate::formats::od_container::{ContainerReader, TimeUnit};
use crate::ingest::{read_points, MatrixCsv};
use crate::logging::LogFormat;
use crate::od_index::LoadOptions;
use crate::spatial::{Coord, LinearScanResolver, NearestPoint, RTreeResolver};

#[derive(Parser)]
#[command(name = "butterfly-od", version)]
#[command(about = "Compact OD travel-time matrices and answer point-to-point queries", long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Filter a raw OD table (CSV) and write a compact container
    Compact {
        /// Raw table with from_id,to_id,travel_time (seconds)
        #[arg(long)]
        matrix: PathBuf,

        /// Output container (.odmx)
        #[arg(short, long)]
        output: PathBuf,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stored time unit (seconds or minutes)
        #[arg(long)]
        unit: Option<TimeUnit>,

        /// Travel time value meaning "unreachable"
        #[arg(long, allow_hyphen_values = true)]
        sentinel: Option<f64>,

        /// Rows per compressed block
        #[arg(long)]
        block_rows: Option<u32>,

        /// zstd level (1-22)
        #[arg(long)]
        zstd_level: Option<i32>,
    },

    /// Print container layout and verify every checksum
    Inspect {
        /// Container (.odmx)
        container: PathBuf,
    },

    /// Travel time between two coordinates
    Query {
        /// Container (.odmx)
        #[arg(long)]
        container: PathBuf,

        /// Point table with id,x,y
        #[arg(long)]
        points: PathBuf,

        /// Origin coordinate (x,y)
        #[arg(long, allow_hyphen_values = true)]
        from: String,

        /// Destination coordinate (x,y)
        #[arg(long, allow_hyphen_values = true)]
        to: String,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Rows per load batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Measure query latency on random coordinates
    Bench {
        /// Container (.odmx)
        #[arg(long)]
        container: PathBuf,

        /// Point table with id,x,y
        #[arg(long)]
        points: PathBuf,

        /// Number of random queries
        #[arg(long, default_value = "10000")]
        queries: usize,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Also measure the linear-scan resolver
        #[arg(long)]
        with_linear_scan: bool,
    },
}

/// Parse "x,y"
pub fn parse_coord(s: &str) -> Result<Coord> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        anyhow::bail!("Coordinate must be in format 'x,y', got '{}'", s);
    }
    let x = parts[0].trim().parse::<f64>().context("invalid x")?;
    let y = parts[1].trim().parse::<f64>().context("invalid y")?;
    Ok(Coord::new(x, y))
}

fn load_config(path: Option<&Path>) -> Result<OdConfig> {
    match path {
        Some(path) => OdConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(OdConfig::default()),
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Compact {
            matrix,
            output,
            config,
            unit,
            sentinel,
            block_rows,
            zstd_level,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(unit) = unit {
                config.filter.unit = unit;
            }
            if sentinel.is_some() {
                config.filter.sentinel = sentinel;
            }
            if let Some(block_rows) = block_rows {
                config.compact.block_rows = block_rows;
            }
            if let Some(level) = zstd_level {
                config.compact.zstd_level = level;
            }
            config.validate()?;

            let start = Instant::now();
            let rows = MatrixCsv::from_path(&matrix)
                .with_context(|| format!("Failed to open {}", matrix.display()))?;
            let normalized = normalize(rows, &config.filter);
            let info = compact_normalized(&normalized, &output, &config.compact)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!(
                "✓ {} rows kept ({} unreachable, {} malformed, {} duplicate)",
                normalized.stats.kept,
                normalized.stats.unreachable,
                normalized.stats.malformed,
                normalized.stats.duplicates
            );
            println!(
                "✓ {} blocks, {} bytes written to {} in {:.2}s",
                info.n_blocks,
                info.file_len,
                output.display(),
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Inspect { container } => {
            let mut reader = ContainerReader::open(&container)
                .with_context(|| format!("Failed to open {}", container.display()))?;
            let info = reader.info().clone();
            println!("Container:   {}", container.display());
            println!("Version:     {}", info.version);
            println!("Rows:        {}", info.n_rows);
            println!("Blocks:      {} (≤ {} rows each)", info.n_blocks, info.block_rows);
            println!(
                "Columns:     ids {} bytes, times {} bytes ({:?})",
                info.layout.id_width.bytes(),
                info.layout.time_width.bytes(),
                info.layout.unit
            );
            println!(
                "Size:        {} bytes ({} compressed payload)",
                info.file_len, info.compressed_bytes
            );
            reader.verify().context("Verification failed")?;
            println!("✓ All checksums valid");
        }
        Commands::Query {
            container,
            points,
            from,
            to,
            config,
            batch_size,
        } => {
            let config = load_config(config.as_deref())?;
            let mut options = LoadOptions::from(&config.load);
            if let Some(batch_size) = batch_size {
                options.batch_size = batch_size;
            }
            let origin = parse_coord(&from)?;
            let destination = parse_coord(&to)?;

            let build_start = Instant::now();
            let points = read_points(&points)
                .with_context(|| format!("Failed to read points {}", points.display()))?;
            let engine: QueryEngine = QueryEngine::build(&container, &points, &options)
                .with_context(|| format!("Failed to build engine from {}", container.display()))?;
            println!("Engine built in {:.2}s", build_start.elapsed().as_secs_f64());

            let query_start = Instant::now();
            let from_id = engine.resolve(origin)?;
            let to_id = engine.resolve(destination)?;
            let result = engine.query_ids(from_id, to_id);
            let elapsed_us = query_start.elapsed().as_secs_f64() * 1e6;

            match result {
                Some(duration) => println!(
                    "{} -> {}: {}s ({:.1} min) [{:.1}µs]",
                    from_id,
                    to_id,
                    duration.as_secs(),
                    duration.as_secs_f64() / 60.0,
                    elapsed_us
                ),
                None => println!("{} -> {}: not found [{:.1}µs]", from_id, to_id, elapsed_us),
            }
        }
        Commands::Bench {
            container,
            points,
            queries,
            seed,
            with_linear_scan,
        } => {
            let points = read_points(&points)
                .with_context(|| format!("Failed to read points {}", points.display()))?;
            let pairs = bench::random_queries(&points, queries, seed)?;
            let options = LoadOptions::default();

            let build_start = Instant::now();
            let engine: QueryEngine<RTreeResolver> =
                QueryEngine::build(&container, &points, &options)?;
            println!("R-tree engine built in {:.2}s", build_start.elapsed().as_secs_f64());
            println!("R-tree:      {}", bench::measure(&engine, &pairs)?);

            if with_linear_scan {
                let scan_engine = QueryEngine::from_parts(
                    engine.index().clone(),
                    LinearScanResolver::build(&points)?,
                    &points,
                )?;
                println!("Linear scan: {}", bench::measure(&scan_engine, &pairs)?);
            }
        }
    }

    Ok(())
}
