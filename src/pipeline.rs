//! Linear extract -> train -> predict run over one data source

use crate::config::PipelineConfig;
use crate::core::aggregate::{AggregationParams, SpatialAggregator};
use crate::core::cloud_mask::mask_clouds;
use crate::core::composite::median_composite;
use crate::core::distance::distance_to_coast;
use crate::core::mosaic::daily_mosaics;
use crate::core::random_forest::{RandomForestTrainer, TrainedModel};
use crate::core::spectral::{add_indices, select_bands, NDBI_BAND, NDVI_BAND, SENTINEL2_BANDS};
use crate::core::terrain::TerrainProcessor;
use crate::core::water_mask::mask_water;
use crate::io::source::{DataSource, SceneQuery};
use crate::io::stations::report_duplicate_ids;
use crate::types::{
    BoundingBox, GridSpec, PredictionSurface, PredictorStack, RasterImage, StationObservation,
    TairError, TairResult, TrainingFeature,
};

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub surface: PredictionSurface,
    pub training_features: Vec<TrainingFeature>,
    pub model: TrainedModel,
}

/// Air temperature interpolation pipeline
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> TairResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Names of the bands the imagery composite always carries
    pub fn imagery_band_names() -> Vec<String> {
        SENTINEL2_BANDS
            .iter()
            .map(|(_, name)| name.to_string())
            .chain([NDVI_BAND.to_string(), NDBI_BAND.to_string()])
            .collect()
    }

    /// Working grid from the configured extent, or the station bounds grown
    /// by the neighborhood radius
    pub fn working_grid(&self, stations: &[StationObservation]) -> TairResult<GridSpec> {
        let extent = match self.config.extent {
            Some(extent) => extent,
            None => BoundingBox::from_points(stations.iter().map(|s| (s.x, s.y)))
                .ok_or_else(|| TairError::InvalidFormat("No stations to derive an extent from".to_string()))?
                .expand(self.config.neighborhood_radius),
        };
        GridSpec::from_extent(&extent, self.config.scale, self.config.epsg)
    }

    /// Elevation, slope and ruggedness
    pub fn build_terrain(&self, source: &dyn DataSource, grid: &GridSpec) -> TairResult<PredictorStack> {
        let (primary, fallback) = source.elevation(grid)?;
        TerrainProcessor::for_grid(grid, self.config.ruggedness_window)
            .build_terrain_stack(&primary, &fallback, grid)
    }

    /// Cloud-masked, index-enriched, daily-mosaicked median composite
    pub fn build_imagery(&self, source: &dyn DataSource, grid: &GridSpec) -> TairResult<PredictorStack> {
        let query = SceneQuery::from_config(&self.config, grid.bounds());
        let scenes = source.scenes(&query, grid)?;
        log::info!(
            "{} scenes between {} and {} below {}% cloud",
            scenes.len(),
            query.start,
            query.end,
            query.max_cloud_percentage
        );

        let mut prepared = Vec::with_capacity(scenes.len());
        for scene in scenes {
            let scene = mask_clouds(scene, &self.config.qa_bits);
            let mut scene = select_bands(scene, &SENTINEL2_BANDS)?;
            add_indices(&mut scene.stack)?;
            prepared.push(scene);
        }

        let mosaics = daily_mosaics(&prepared, self.config.mosaic_order)?;
        median_composite(&mosaics, grid, &Self::imagery_band_names())
    }

    /// Full predictor stack on the working grid
    pub fn build_predictors(
        &self,
        source: &dyn DataSource,
        grid: &GridSpec,
        land_cover: &RasterImage,
    ) -> TairResult<PredictorStack> {
        let terrain = self.build_terrain(source, grid)?;
        let imagery = self.build_imagery(source, grid)?;
        let mut stack = terrain.stack(imagery)?;

        if self.config.include_distance_to_coast {
            stack.add_band(distance_to_coast(land_cover, grid, &self.config.land_cover)?)?;
        }

        log::info!("Combined predictor stack: {:?}", stack.band_names());
        Ok(stack)
    }

    /// Run every stage; the first failing stage aborts the run
    pub fn run(&self, source: &dyn DataSource) -> TairResult<PipelineOutput> {
        log::info!("Starting air temperature interpolation run");
        log::debug!("Configuration: {:?}", self.config);

        let stations = source.stations()?;
        report_duplicate_ids(&stations);

        let grid = self.working_grid(&stations)?;
        log::info!(
            "Working grid {}x{} at {} units/pixel",
            grid.width,
            grid.height,
            self.config.scale
        );

        let land_cover = source.land_cover(&grid)?;
        let stack = self.build_predictors(source, &grid, &land_cover)?;
        let predictors = stack.band_names();

        let training_aggregator = SpatialAggregator::new(AggregationParams {
            radius: self.config.buffer_radius,
            tile_scale: self.config.tile_scale,
        });
        let training_features =
            training_aggregator.reduce_regions(&stack, &stations, &self.config.response_field)?;

        let model = RandomForestTrainer::new(self.config.forest.clone()).train(
            &training_features,
            &self.config.response_field,
            &predictors,
        )?;

        let prediction_aggregator = SpatialAggregator::new(AggregationParams {
            radius: self.config.neighborhood_radius,
            tile_scale: self.config.tile_scale,
        });
        let smoothed = prediction_aggregator.focal_mean(&stack)?;

        let surface = model.predict(&smoothed)?;
        let surface = mask_water(&surface, &land_cover, &self.config.land_cover)?;

        log::info!(
            "Prediction surface complete: {} of {} pixels valid",
            surface.valid_count(),
            surface.data.len()
        );

        Ok(PipelineOutput {
            surface,
            training_features,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_rejected_before_run() {
        let mut config = PipelineConfig::default();
        config.buffer_radius = 50.0;
        assert!(matches!(Pipeline::new(config), Err(TairError::Config(_))));
    }

    #[test]
    fn test_default_extent_from_station_bounds() {
        let config = PipelineConfig {
            scale: 10.0,
            ..PipelineConfig::default()
        }
        .with_radius(20.0);
        let pipeline = Pipeline::new(config).unwrap();
        let stations = vec![
            StationObservation::new("a", 100.0, 200.0, Some(8.0)),
            StationObservation::new("b", 160.0, 240.0, Some(9.0)),
        ];

        let grid = pipeline.working_grid(&stations).unwrap();
        assert_eq!(grid.transform.top_left_x, 80.0);
        assert_eq!(grid.transform.top_left_y, 260.0);
        assert_eq!((grid.width, grid.height), (10, 8));
    }

    #[test]
    fn test_no_stations_no_extent() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        assert!(pipeline.working_grid(&[]).is_err());
    }

    #[test]
    fn test_imagery_band_names() {
        assert_eq!(
            Pipeline::imagery_band_names(),
            vec!["blue", "green", "red", "nir", "swir1", "swir2", "ndvi", "NDBI"]
        );
    }
}
