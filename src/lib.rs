//! tairmap: Near-surface air temperature mapping from weather stations
//!
//! Stations are joined with terrain and Sentinel-2 predictors averaged over a
//! buffer, a random forest is fitted on the joined table, and the model is
//! applied to a moving-window version of the same predictor stack to produce a
//! continuous, water-masked temperature surface.

pub mod config;
pub mod core;
pub mod io;
pub mod pipeline;
pub mod types;

// Re-export main types and functions for easier access
pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineOutput};
pub use types::{
    Band, BoundingBox, GeoTransform, GridSpec, PredictionSurface, PredictorStack, RasterImage,
    Scene, StationObservation, TairError, TairResult, TrainingFeature,
};

pub use io::{DataSource, FileSource, GeoTiffReader, GeoTiffWriter, MemorySource, SceneQuery};
