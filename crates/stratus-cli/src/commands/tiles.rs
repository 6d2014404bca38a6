use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;

use stratus_config::legend::parse_legend_config;
use stratus_config::tiling::get_tiling_config;
use stratus_core::proj::TileCrs;
use stratus_core::ExponentialBackoff;
use stratus_cube::DataCube;
use stratus_tiles::{
    CubeTileWorker, TileFormat, TileJob, TileRenderConfig, TileRenderer, TileScheduler,
};

use super::print_json;

#[derive(Parser)]
pub struct TilesArgs {
    /// Data cube path (.zarr directory or .nc file)
    #[arg(long)]
    pub cube: PathBuf,

    /// Variable to render
    #[arg(long)]
    pub variable: String,

    /// Legend JSON path
    #[arg(long)]
    pub legend: PathBuf,

    /// Layer prefix in the output tree (defaults to the variable name)
    #[arg(long)]
    pub layer: Option<String>,

    /// Level keys to render (sfc or numeric levels)
    #[arg(long, value_delimiter = ',', default_value = "sfc")]
    pub levels: Vec<String>,

    /// Tiling config path (defaults to the resolved tiling.yaml)
    #[arg(long)]
    pub tiling_config: Option<PathBuf>,

    /// Output formats
    #[arg(long, value_delimiter = ',', default_value = "png")]
    pub formats: Vec<String>,

    /// Layer opacity in [0, 1]
    #[arg(long, default_value_t = 1.0)]
    pub opacity: f64,

    /// Parallel workers
    #[arg(long, default_value_t = 4)]
    pub max_workers: usize,

    /// Retries per tile job
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Output directory root
    #[arg(long)]
    pub output_dir: PathBuf,
}

pub async fn execute(args: TilesArgs) -> Result<()> {
    let cube = DataCube::open(&args.cube)
        .with_context(|| format!("cannot open cube {}", args.cube.display()))?;
    if !cube.has_variable(&args.variable) {
        bail!(
            "variable {:?} not present in cube (has: {:?})",
            args.variable,
            cube.variables().keys().collect::<Vec<_>>()
        );
    }

    let legend_raw = std::fs::read(&args.legend)
        .with_context(|| format!("cannot read legend {}", args.legend.display()))?;
    let legend = parse_legend_config(&legend_raw)?;

    let tiling = get_tiling_config(args.tiling_config.as_deref())
        .context("cannot load tiling config")?;
    let crs = match tiling.parsed.crs.as_str() {
        "EPSG:4326" => TileCrs::Epsg4326,
        other => bail!("unsupported tiling CRS: {other}"),
    };

    let formats = args
        .formats
        .iter()
        .map(|f| f.parse::<TileFormat>())
        .collect::<stratus_tiles::Result<Vec<_>>>()?;

    let render_config = TileRenderConfig {
        crs,
        tile_size: tiling.parsed.tile_size,
        min_zoom: tiling.parsed.global_range.min_zoom,
        max_zoom: tiling.parsed.global_range.max_zoom,
        formats,
        opacity: args.opacity,
    };
    let renderer = Arc::new(TileRenderer::new(legend, render_config)?);

    let layer = args.layer.clone().unwrap_or_else(|| args.variable.clone());
    let run_id = uuid::Uuid::new_v4().simple().to_string();

    let mut jobs = Vec::new();
    for time in cube.time() {
        for level in &args.levels {
            jobs.push(TileJob {
                run_id: run_id.clone(),
                variable: args.variable.clone(),
                level: level.clone(),
                time: time.to_rfc3339(),
            });
        }
    }

    let worker = CubeTileWorker::new(
        Arc::new(cube),
        renderer,
        layer.clone(),
        &args.output_dir,
        args.max_retries,
        ExponentialBackoff::default(),
    );
    let scheduler = TileScheduler::new(args.max_workers, 10)?;
    let summary = scheduler.run(&run_id, jobs, &worker)?;

    let mut times: Vec<String> = summary
        .results
        .iter()
        .filter_map(|r| r.metadata.get("time_key").and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect();
    times.sort();
    times.dedup();

    print_json(&json!({
        "run_id": summary.run_id,
        "layer": layer,
        "variable": args.variable,
        "total_jobs": summary.total_jobs,
        "succeeded": summary.succeeded,
        "failed": summary.failed,
        "duration_s": summary.duration_s,
        "times": times,
    }))?;

    if summary.failed > 0 {
        bail!("{} tile jobs failed", summary.failed);
    }
    Ok(())
}
