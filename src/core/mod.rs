//! Core raster and model processing modules

pub mod aggregate;
pub mod cloud_mask;
pub mod composite;
pub mod distance;
pub mod mosaic;
pub mod random_forest;
pub mod spectral;
pub mod terrain;
pub mod water_mask;

// Re-export main types
pub use aggregate::{AggregationParams, SpatialAggregator};
pub use cloud_mask::{mask_clouds, QaBits};
pub use composite::median_composite;
pub use distance::distance_to_coast;
pub use mosaic::{daily_mosaics, MosaicOrder};
pub use random_forest::{RandomForestParams, RandomForestTrainer, RegressionTree, TrainedModel};
pub use spectral::{add_indices, select_bands};
pub use terrain::{TerrainParams, TerrainProcessor};
pub use water_mask::{mask_water, LandCoverScheme};
