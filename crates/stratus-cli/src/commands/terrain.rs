use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use stratus_core::GeoRect;
use stratus_terrain::tileset::{planned_tile_count, ConstantHeight};
use stratus_terrain::{build_layer_json, generate_tileset, write_layer_json, TilesetOptions};

use super::print_json;

#[derive(Parser)]
pub struct TerrainArgs {
    /// Region bounds in degrees: west south east north
    #[arg(long, num_args = 4, value_names = ["WEST", "SOUTH", "EAST", "NORTH"],
          default_values_t = [116.0, 39.0, 117.0, 40.0])]
    pub bbox: Vec<f64>,

    /// Minimum zoom level
    #[arg(long, default_value_t = 0)]
    pub min_zoom: u32,

    /// Maximum zoom level
    #[arg(long, default_value_t = 12)]
    pub max_zoom: u32,

    /// Samples per tile edge
    #[arg(long, default_value_t = 65)]
    pub grid_size: usize,

    /// Constant elevation in meters for the synthetic sampler
    #[arg(long, default_value_t = 0.0)]
    pub height: f32,

    /// Gzip-wrap terrain payloads
    #[arg(long)]
    pub gzip: bool,

    /// Layer name for layer.json
    #[arg(long, default_value = "stratus-terrain")]
    pub name: String,

    /// Attribution string for layer.json
    #[arg(long, default_value = "")]
    pub attribution: String,

    /// Print planned tile counts without generating files
    #[arg(long)]
    pub dry_run: bool,

    /// Output directory for layer.json + {z}/{x}/{y}.terrain
    #[arg(long)]
    pub out_dir: PathBuf,
}

pub async fn execute(args: TerrainArgs) -> Result<()> {
    let rect = GeoRect::new(args.bbox[0], args.bbox[1], args.bbox[2], args.bbox[3])
        .context("invalid --bbox")?;

    if args.dry_run {
        let tile_count = planned_tile_count(&rect, args.min_zoom, args.max_zoom)?;
        return print_json(&json!({
            "bbox": rect.to_array(),
            "min_zoom": args.min_zoom,
            "max_zoom": args.max_zoom,
            "grid_size": args.grid_size,
            "tile_count": tile_count,
        }));
    }

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("cannot create {}", args.out_dir.display()))?;

    let options = TilesetOptions {
        min_zoom: args.min_zoom,
        max_zoom: args.max_zoom,
        grid_size: args.grid_size,
        gzip: args.gzip,
    };
    let stats = generate_tileset(&ConstantHeight(args.height), &rect, &args.out_dir, &options)
        .context("terrain generation failed")?;

    let layer = build_layer_json(
        &rect,
        args.min_zoom,
        args.max_zoom,
        &args.name,
        &args.attribution,
    )?;
    write_layer_json(&args.out_dir.join("layer.json"), &layer)?;

    print_json(&json!({
        "bbox": rect.to_array(),
        "min_zoom": args.min_zoom,
        "max_zoom": args.max_zoom,
        "grid_size": args.grid_size,
        "gzip": args.gzip,
        "tiles_written": stats.tiles_written,
        "bytes_written": stats.bytes_written,
        "duration_s": stats.duration_s,
        "avg_bytes_per_tile": stats.avg_bytes_per_tile(),
    }))
}
