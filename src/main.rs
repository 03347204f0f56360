mod args;

use anyhow::Context;
use args::{RunCommand, ScenesCommand, Subaction, TairCliArgs};
use clap::Parser;
use tairmap::io::scene_archive::SceneArchive;
use tairmap::io::stations::StationFields;
use tairmap::{FileSource, GeoTiffWriter, Pipeline, PipelineConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = TairCliArgs::parse();
    match args.subcmd {
        Subaction::Run(cmd) => run(cmd),
        Subaction::Scenes(cmd) => list_scenes(cmd),
    }
}

fn run(cmd: RunCommand) -> anyhow::Result<()> {
    let mut config = PipelineConfig::default().with_radius(cmd.radius);
    config.response_field = cmd.response;
    config.id_field = cmd.id;
    config.scale = cmd.scale;
    config.epsg = cmd.epsg;
    config.max_cloud_percentage = cmd.max_cloud;
    config.include_distance_to_coast = cmd.distance_to_coast;
    config.forest.n_trees = cmd.trees;
    config.forest.seed = cmd.seed;
    if let Some(start) = cmd.start {
        config.start_date = start;
    }
    if let Some(end) = cmd.end {
        config.end_date = end;
    }

    let source = FileSource {
        stations_path: cmd.stations,
        fields: StationFields {
            id: config.id_field.clone(),
            response: config.response_field.clone(),
            period: config.period_field.clone(),
        },
        elevation_path: cmd.elevation,
        fallback_elevation_path: cmd.fallback_elevation,
        land_cover_path: cmd.land_cover,
        scene_dir: cmd.scenes,
    };

    let display_range = config.display_range;
    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    let output = pipeline.run(&source).context("pipeline run failed")?;

    for (name, importance) in output.model.importance() {
        log::info!("Importance {:>12}: {:.4}", name, importance);
    }

    GeoTiffWriter::write_surface(&output.surface, &cmd.output, Some(display_range))
        .with_context(|| format!("failed to write {}", cmd.output.display()))?;
    Ok(())
}

fn list_scenes(cmd: ScenesCommand) -> anyhow::Result<()> {
    let entries = SceneArchive::new(&cmd.dir)
        .entries()
        .with_context(|| format!("failed to scan {}", cmd.dir.display()))?;
    for entry in entries {
        println!("{}\t{}\t{}", entry.id, entry.spacecraft, entry.acquired);
    }
    Ok(())
}
