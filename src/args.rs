use chrono::NaiveDate;
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[clap(author, version, about)]
pub struct TairCliArgs {
    #[clap(subcommand)]
    pub subcmd: Subaction,
}

#[derive(Debug, Subcommand)]
pub enum Subaction {
    /// extracts station predictors, trains the forest and writes the
    /// water-masked temperature surface
    Run(RunCommand),

    /// lists the scenes of an archive directory that pass the date and cloud filters
    Scenes(ScenesCommand),
}

#[derive(Debug, Args)]
pub struct RunCommand {
    /// station point layer (any OGR format)
    #[clap(long)]
    pub stations: PathBuf,

    /// primary elevation raster
    #[clap(long)]
    pub elevation: PathBuf,

    /// elevation raster used where the primary one has no data
    #[clap(long)]
    pub fallback_elevation: PathBuf,

    /// land-cover class raster
    #[clap(long)]
    pub land_cover: PathBuf,

    /// directory of Sentinel-2 L2A scene GeoTIFFs
    #[clap(long)]
    pub scenes: PathBuf,

    /// output GeoTIFF
    #[clap(short, long)]
    pub output: PathBuf,

    /// first imagery day (inclusive)
    #[clap(long)]
    pub start: Option<NaiveDate>,

    /// last imagery day (exclusive)
    #[clap(long)]
    pub end: Option<NaiveDate>,

    /// station attribute holding the response
    #[clap(long, default_value = "ta")]
    pub response: String,

    /// station attribute holding the station ID
    #[clap(long, default_value = "ID")]
    pub id: String,

    /// buffer and neighborhood radius in map units
    #[clap(short, long, default_value_t = 100.0)]
    pub radius: f64,

    /// working resolution in map units per pixel
    #[clap(short, long, default_value_t = 30.0)]
    pub scale: f64,

    /// number of trees in the forest
    #[clap(long, default_value_t = 50)]
    pub trees: usize,

    /// scenes at or above this cloud percentage are skipped
    #[clap(long, default_value_t = 30.0)]
    pub max_cloud: f32,

    /// EPSG code of the working grid
    #[clap(long)]
    pub epsg: Option<u32>,

    /// forest seed
    #[clap(long, default_value_t = 0)]
    pub seed: u64,

    /// add the distance-to-coast predictor
    #[clap(long)]
    pub distance_to_coast: bool,
}

#[derive(Debug, Args)]
pub struct ScenesCommand {
    /// directory of Sentinel-2 L2A scene GeoTIFFs
    pub dir: PathBuf,
}
