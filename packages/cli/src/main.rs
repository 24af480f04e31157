#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line reverse geocoder.
//!
//! ```text
//! revgeo build [--config revgeo.toml] [--shapes shapes.csv] [--points DE.tab]
//!              [--geometry-dir downloads] [--index-dir indices]
//! revgeo search <INDEX_DIR> <LAT> <LON> [--json]
//! revgeo verify [--config revgeo.toml] [--shapes shapes.csv]
//!               [--geometry-dir downloads] [--index-dir indices]
//! ```
//!
//! Set `RUST_LOG=info` to see build phases.

mod output;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use revgeo_cli_utils::IndicatifProgress;
use revgeo_index::{
    BuildConfig, DirectorySource, IndexerConfig, SearcherCache, build_index, catalog, config,
    verify,
};

#[derive(Parser)]
#[command(name = "revgeo", about = "Reverse geocode coordinates to city names")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from a shape catalog, boundary files and a point file
    Build(BuildArgs),
    /// Resolve a coordinate against an index
    #[command(allow_negative_numbers = true)]
    Search {
        /// Index directory
        index_dir: PathBuf,
        /// Latitude (WGS84)
        lat: f64,
        /// Longitude (WGS84)
        lon: f64,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that every shape in the catalog resolves to itself
    Verify(SourceArgs),
}

/// Input and output locations, overriding the config file.
#[derive(Args)]
struct SourceArgs {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Shape catalog CSV
    #[arg(long)]
    shapes: Option<String>,
    /// Directory with one boundary file per shape
    #[arg(long)]
    geometry_dir: Option<String>,
    /// Index directory
    #[arg(long)]
    index_dir: Option<String>,
}

#[derive(Args)]
struct BuildArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Supplemental point file
    #[arg(long)]
    points: Option<String>,
}

impl SourceArgs {
    fn resolve(self) -> Result<IndexerConfig, Box<dyn std::error::Error>> {
        let mut resolved = match &self.config {
            Some(path) => config::load(path)?,
            None => IndexerConfig::default(),
        };
        if let Some(shapes) = self.shapes {
            resolved.shapes_csv = shapes;
        }
        if let Some(geometry_dir) = self.geometry_dir {
            resolved.geometry_dir = geometry_dir;
        }
        if let Some(index_dir) = self.index_dir {
            resolved.index_dir = index_dir;
        }
        Ok(resolved)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = revgeo_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => {
            let mut resolved = args.source.resolve()?;
            if let Some(points) = args.points {
                resolved.points_file = points;
            }

            log::info!(
                "Building index at {} from {} and {}",
                resolved.index_dir,
                resolved.shapes_csv,
                resolved.points_file
            );
            let progress = IndicatifProgress::build_bar(&multi, "Building index");
            let stats = tokio::task::spawn_blocking(move || {
                let shapes = catalog::load_shapes(Path::new(&resolved.shapes_csv))?;
                let points =
                    catalog::load_points(Path::new(&resolved.points_file), &resolved.point_format)?;
                let geometry = DirectorySource::new(&resolved.geometry_dir);

                build_index(
                    Path::new(&resolved.index_dir),
                    BuildConfig {
                        shapes: &shapes,
                        points: &points,
                        geometry: &geometry,
                        writer_heap_bytes: resolved.writer_heap_bytes,
                        progress,
                    },
                )
            })
            .await??;

            println!(
                "Indexed {} shapes and {} points ({} shapes without anchor, {} points covered)",
                stats.shapes_indexed,
                stats.points_indexed,
                stats.shapes_without_anchor,
                stats.points_skipped
            );
        }
        Commands::Search {
            index_dir,
            lat,
            lon,
            json,
        } => {
            log::debug!("Searching {} at ({lat}, {lon})", index_dir.display());
            let cache = SearcherCache::new();
            let searcher = cache.get_or_open(&index_dir)?;
            let result = searcher.search_async(lat, lon).await?;
            drop(searcher);
            cache.close_all();

            if json {
                println!("{}", output::to_json(&result)?);
            } else {
                println!("{}", output::describe(&result));
            }
        }
        Commands::Verify(args) => {
            let resolved = args.resolve()?;
            let shapes = catalog::load_shapes(Path::new(&resolved.shapes_csv))?;
            let geometry = DirectorySource::new(&resolved.geometry_dir);

            let cache = SearcherCache::new();
            let searcher = cache.get_or_open(&resolved.index_dir)?;
            let report = verify::verify_shapes(&searcher, &shapes, &geometry)?;
            drop(searcher);
            cache.close_all();

            for failure in report.failures() {
                let probe = failure
                    .probe
                    .map_or_else(|| "-".to_string(), |p| format!("{}, {}", p.lat, p.lon));
                println!(
                    "FAIL {} ({probe}): {}",
                    failure.shape,
                    failure.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
            println!("{}/{} probes passed", report.passed, report.total);

            if !report.all_passed() {
                log::error!(
                    "{} of {} verification points failed",
                    report.total - report.passed,
                    report.total
                );
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
