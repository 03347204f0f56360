//! Run configuration threaded through every pipeline stage

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::cloud_mask::QaBits;
use crate::core::mosaic::MosaicOrder;
use crate::core::random_forest::RandomForestParams;
use crate::core::water_mask::LandCoverScheme;
use crate::types::{BoundingBox, TairError, TairResult};

/// Complete configuration for one extract -> train -> predict run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Station attribute holding the response (e.g. mean air temperature)
    pub response_field: String,
    /// Station attribute holding the unique station ID
    pub id_field: String,
    /// Optional station attribute naming the aggregation period
    pub period_field: Option<String>,
    /// Working extent; defaults to the station bounds grown by the neighborhood radius
    pub extent: Option<BoundingBox>,
    /// EPSG code of the working spatial reference
    pub epsg: Option<u32>,
    /// First day of the imagery window (inclusive)
    pub start_date: NaiveDate,
    /// Last day of the imagery window (exclusive)
    pub end_date: NaiveDate,
    /// Scenes at or above this scene-level cloud percentage are skipped
    pub max_cloud_percentage: f32,
    /// Station buffer radius used for training extraction (map units)
    pub buffer_radius: f64,
    /// Moving-window radius used for the prediction stack (map units)
    pub neighborhood_radius: f64,
    /// Working resolution in map units per pixel
    pub scale: f64,
    /// Station fan-out granularity for point extraction
    pub tile_scale: usize,
    /// Square window (pixels, odd) for terrain ruggedness
    pub ruggedness_window: usize,
    pub qa_bits: QaBits,
    pub land_cover: LandCoverScheme,
    pub forest: RandomForestParams,
    pub mosaic_order: MosaicOrder,
    /// Adds the `distCoast` predictor; expensive on large grids
    pub include_distance_to_coast: bool,
    /// Expected response range, used for visualization metadata only
    pub display_range: (f64, f64),
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            response_field: "ta".to_string(),
            id_field: "ID".to_string(),
            period_field: None,
            extent: None,
            epsg: None,
            start_date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2018, 2, 1).unwrap_or(NaiveDate::MIN),
            max_cloud_percentage: 30.0,
            buffer_radius: 100.0,
            neighborhood_radius: 100.0,
            scale: 30.0,
            tile_scale: 4,
            ruggedness_window: 3,
            qa_bits: QaBits::default(),
            land_cover: LandCoverScheme::default(),
            forest: RandomForestParams::default(),
            mosaic_order: MosaicOrder::FirstValid,
            include_distance_to_coast: false,
            display_range: (7.0, 10.0),
        }
    }
}

impl PipelineConfig {
    /// Set both the training buffer and the prediction neighborhood radius
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.buffer_radius = radius;
        self.neighborhood_radius = radius;
        self
    }

    /// Check parameter consistency before any data is touched
    pub fn validate(&self) -> TairResult<()> {
        if self.response_field.is_empty() || self.id_field.is_empty() {
            return Err(TairError::Config(
                "Response and ID field names must not be empty".to_string(),
            ));
        }
        if !(self.buffer_radius > 0.0) || !(self.neighborhood_radius > 0.0) {
            return Err(TairError::Config(format!(
                "Radii must be positive (buffer {}, neighborhood {})",
                self.buffer_radius, self.neighborhood_radius
            )));
        }
        if (self.buffer_radius - self.neighborhood_radius).abs() > f64::EPSILON {
            return Err(TairError::Config(format!(
                "Training buffer radius {} differs from prediction neighborhood radius {}",
                self.buffer_radius, self.neighborhood_radius
            )));
        }
        if !(self.scale > 0.0) {
            return Err(TairError::Config(format!("Scale must be positive, got {}", self.scale)));
        }
        if self.end_date <= self.start_date {
            return Err(TairError::Config(format!(
                "Empty date range {} .. {}",
                self.start_date, self.end_date
            )));
        }
        if self.ruggedness_window == 0 || self.ruggedness_window % 2 == 0 {
            return Err(TairError::Config(format!(
                "Ruggedness window must be odd, got {}",
                self.ruggedness_window
            )));
        }
        if self.tile_scale == 0 {
            return Err(TairError::Config("Tile scale must be at least 1".to_string()));
        }
        if let Some(extent) = &self.extent {
            if extent.width() <= 0.0 || extent.height() <= 0.0 {
                return Err(TairError::Config(format!("Degenerate extent {:?}", extent)));
            }
        }
        self.forest.validate()?;
        Ok(())
    }
}
