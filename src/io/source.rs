//! Data-access boundary: stations, terrain, land cover and imagery

use crate::config::PipelineConfig;
use crate::io::geotiff::{resample_nearest, GeoTiffReader};
use crate::io::scene_archive::SceneArchive;
use crate::io::stations::{StationFields, StationReader};
use crate::types::{
    BoundingBox, GridSpec, RasterImage, Scene, StationObservation, TairError, TairResult,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;

/// Filter applied to the multispectral archive
#[derive(Debug, Clone, PartialEq)]
pub struct SceneQuery {
    /// Inclusive
    pub start: NaiveDate,
    /// Exclusive
    pub end: NaiveDate,
    pub bounds: BoundingBox,
    /// Scenes must be strictly below this cloud percentage
    pub max_cloud_percentage: f32,
}

impl SceneQuery {
    pub fn from_config(config: &PipelineConfig, bounds: BoundingBox) -> Self {
        Self {
            start: config.start_date,
            end: config.end_date,
            bounds,
            max_cloud_percentage: config.max_cloud_percentage,
        }
    }

    pub fn matches_date(&self, acquired: DateTime<Utc>) -> bool {
        let day = acquired.date_naive();
        day >= self.start && day < self.end
    }

    pub fn matches_cloud(&self, cloud_percentage: f32) -> bool {
        cloud_percentage < self.max_cloud_percentage
    }

    pub fn matches_bounds(&self, bounds: &BoundingBox) -> bool {
        self.bounds.intersects(bounds)
    }

    pub fn matches(&self, scene: &Scene) -> bool {
        self.matches_date(scene.acquired)
            && self.matches_cloud(scene.cloud_percentage)
            && self.matches_bounds(&scene.stack.grid.bounds())
    }
}

/// Provider of every external input the pipeline consumes.
///
/// Rasters come back aligned to the requested working grid.
pub trait DataSource {
    fn stations(&self) -> TairResult<Vec<StationObservation>>;

    /// (primary, fallback) elevation
    fn elevation(&self, grid: &GridSpec) -> TairResult<(RasterImage, RasterImage)>;

    /// Land-cover class codes
    fn land_cover(&self, grid: &GridSpec) -> TairResult<RasterImage>;

    /// Scenes passing the query, in archive order
    fn scenes(&self, query: &SceneQuery, grid: &GridSpec) -> TairResult<Vec<Scene>>;
}

/// Data source over arrays already held in memory
#[derive(Debug, Clone)]
pub struct MemorySource {
    pub grid: GridSpec,
    pub stations: Vec<StationObservation>,
    pub elevation: RasterImage,
    pub fallback_elevation: RasterImage,
    pub land_cover: RasterImage,
    pub scenes: Vec<Scene>,
}

impl MemorySource {
    fn aligned(&self, data: &RasterImage, grid: &GridSpec) -> TairResult<RasterImage> {
        resample_nearest(data, &self.grid, grid)
    }
}

impl DataSource for MemorySource {
    fn stations(&self) -> TairResult<Vec<StationObservation>> {
        Ok(self.stations.clone())
    }

    fn elevation(&self, grid: &GridSpec) -> TairResult<(RasterImage, RasterImage)> {
        Ok((
            self.aligned(&self.elevation, grid)?,
            self.aligned(&self.fallback_elevation, grid)?,
        ))
    }

    fn land_cover(&self, grid: &GridSpec) -> TairResult<RasterImage> {
        self.aligned(&self.land_cover, grid)
    }

    fn scenes(&self, query: &SceneQuery, grid: &GridSpec) -> TairResult<Vec<Scene>> {
        let mut out = Vec::new();
        for scene in self.scenes.iter().filter(|s| query.matches(s)) {
            if !scene.stack.grid.is_aligned_with(grid) {
                return Err(TairError::GridMismatch {
                    expected: format!("{:?}", grid),
                    found: format!("{:?} (scene {})", scene.stack.grid, scene.id),
                });
            }
            out.push(scene.clone());
        }
        Ok(out)
    }
}

/// GDAL-backed data source over files on disk
#[derive(Debug, Clone)]
pub struct FileSource {
    pub stations_path: PathBuf,
    pub fields: StationFields,
    pub elevation_path: PathBuf,
    pub fallback_elevation_path: PathBuf,
    pub land_cover_path: PathBuf,
    pub scene_dir: PathBuf,
}

impl DataSource for FileSource {
    fn stations(&self) -> TairResult<Vec<StationObservation>> {
        StationReader::read(&self.stations_path, &self.fields)
    }

    fn elevation(&self, grid: &GridSpec) -> TairResult<(RasterImage, RasterImage)> {
        Ok((
            GeoTiffReader::read_aligned(&self.elevation_path, 1, grid)?,
            GeoTiffReader::read_aligned(&self.fallback_elevation_path, 1, grid)?,
        ))
    }

    fn land_cover(&self, grid: &GridSpec) -> TairResult<RasterImage> {
        GeoTiffReader::read_aligned(&self.land_cover_path, 1, grid)
    }

    fn scenes(&self, query: &SceneQuery, grid: &GridSpec) -> TairResult<Vec<Scene>> {
        SceneArchive::new(&self.scene_dir).query(query, grid)
    }
}
