use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raster cell value. Missing cells are `NaN`.
pub type Cell = f32;

/// 2D raster grid (row x column)
pub type RasterImage = Array2<Cell>;

/// Geospatial bounding box in map units of the working spatial reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Smallest box containing all points, or `None` for an empty input
    pub fn from_points<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let mut bbox = Self::new(x0, y0, x0, y0);
        for (x, y) in iter {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }

    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Geospatial transformation parameters (GDAL affine layout)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square-ish pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Pixel spacing as positive (x, y) distances
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// World coordinates of a pixel center
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }

    /// Fractional (row, col) position of a world coordinate. Rotation terms are ignored.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.top_left_x) / self.pixel_width;
        let row = (y - self.top_left_y) / self.pixel_height;
        (row, col)
    }
}

/// Grid geometry shared by every band of a stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub epsg: Option<u32>,
}

impl GridSpec {
    pub fn new(width: usize, height: usize, transform: GeoTransform, epsg: Option<u32>) -> Self {
        Self { width, height, transform, epsg }
    }

    /// Grid covering `extent` at `scale` map units per pixel
    pub fn from_extent(extent: &BoundingBox, scale: f64, epsg: Option<u32>) -> TairResult<Self> {
        if !(scale > 0.0) {
            return Err(TairError::Config(format!("Scale must be positive, got {}", scale)));
        }
        if extent.width() < 0.0 || extent.height() < 0.0 {
            return Err(TairError::Config(format!("Inverted extent: {:?}", extent)));
        }

        let width = ((extent.width() / scale).ceil() as usize).max(1);
        let height = ((extent.height() / scale).ceil() as usize).max(1);
        let transform = GeoTransform::north_up(extent.min_x, extent.max_y, scale, scale);

        Ok(Self::new(width, height, transform, epsg))
    }

    /// Array shape as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn bounds(&self) -> BoundingBox {
        let t = &self.transform;
        let x1 = t.top_left_x + self.width as f64 * t.pixel_width;
        let y1 = t.top_left_y + self.height as f64 * t.pixel_height;
        BoundingBox::new(
            t.top_left_x.min(x1),
            t.top_left_y.min(y1),
            t.top_left_x.max(x1),
            t.top_left_y.max(y1),
        )
    }

    /// Same size, origin and spacing within a small tolerance
    pub fn is_aligned_with(&self, other: &GridSpec) -> bool {
        const EPS: f64 = 1e-9;
        let a = self.transform.to_gdal();
        let b = other.transform.to_gdal();
        self.width == other.width
            && self.height == other.height
            && self.epsg == other.epsg
            && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= EPS * x.abs().max(1.0))
    }
}

/// A named scalar raster band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub data: RasterImage,
}

impl Band {
    pub fn new(name: impl Into<String>, data: RasterImage) -> Self {
        Self { name: name.into(), data }
    }

    /// Band with every cell missing
    pub fn missing(name: impl Into<String>, shape: (usize, usize)) -> Self {
        Self::new(name, Array2::from_elem(shape, Cell::NAN))
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }
}

/// Ordered set of uniquely named bands sharing one grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorStack {
    pub grid: GridSpec,
    bands: Vec<Band>,
}

impl PredictorStack {
    pub fn new(grid: GridSpec) -> Self {
        Self { grid, bands: Vec::new() }
    }

    pub fn from_bands(grid: GridSpec, bands: Vec<Band>) -> TairResult<Self> {
        let mut stack = Self::new(grid);
        for band in bands {
            stack.add_band(band)?;
        }
        Ok(stack)
    }

    /// Append a band; names must be unique and the shape must match the grid
    pub fn add_band(&mut self, band: Band) -> TairResult<()> {
        if self.bands.iter().any(|b| b.name == band.name) {
            return Err(TairError::DuplicateBand(band.name));
        }
        if band.data.dim() != self.grid.shape() {
            return Err(TairError::GridMismatch {
                expected: format!("{:?}", self.grid.shape()),
                found: format!("{:?} (band '{}')", band.data.dim(), band.name),
            });
        }
        self.bands.push(band);
        Ok(())
    }

    /// Replace a band's data in place, or append it if absent
    pub fn set_band(&mut self, band: Band) -> TairResult<()> {
        match self.bands.iter().position(|b| b.name == band.name) {
            Some(idx) => {
                if band.data.dim() != self.grid.shape() {
                    return Err(TairError::GridMismatch {
                        expected: format!("{:?}", self.grid.shape()),
                        found: format!("{:?} (band '{}')", band.data.dim(), band.name),
                    });
                }
                self.bands[idx] = band;
                Ok(())
            }
            None => self.add_band(band),
        }
    }

    /// Concatenate the bands of `other`, which must sit on the same grid
    pub fn stack(mut self, other: PredictorStack) -> TairResult<Self> {
        if !self.grid.is_aligned_with(&other.grid) {
            return Err(TairError::GridMismatch {
                expected: format!("{:?}", self.grid),
                found: format!("{:?}", other.grid),
            });
        }
        for band in other.bands {
            self.add_band(band)?;
        }
        Ok(self)
    }

    /// Subset of bands in the requested order
    pub fn select(&self, names: &[&str]) -> TairResult<Self> {
        let mut out = Self::new(self.grid.clone());
        for name in names {
            let band = self.band(name).ok_or_else(|| {
                TairError::Processing(format!("Band '{}' not present in stack", name))
            })?;
            out.add_band(band.clone())?;
        }
        Ok(out)
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn remove_band(&mut self, name: &str) -> Option<Band> {
        let idx = self.bands.iter().position(|b| b.name == name)?;
        Some(self.bands.remove(idx))
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

/// One satellite capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub acquired: DateTime<Utc>,
    /// Scene-level cloud cover in percent (e.g. CLOUDY_PIXEL_PERCENTAGE)
    pub cloud_percentage: f32,
    pub properties: BTreeMap<String, String>,
    pub stack: PredictorStack,
}

impl Scene {
    pub fn new(id: impl Into<String>, acquired: DateTime<Utc>, stack: PredictorStack) -> Self {
        Self {
            id: id.into(),
            acquired,
            cloud_percentage: 0.0,
            properties: BTreeMap::new(),
            stack,
        }
    }

    pub fn with_cloud_percentage(mut self, cloud_percentage: f32) -> Self {
        self.cloud_percentage = cloud_percentage;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A point-based monitoring station observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationObservation {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub response: Option<f64>,
    pub period: Option<String>,
}

impl StationObservation {
    pub fn new(id: impl Into<String>, x: f64, y: f64, response: Option<f64>) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            response,
            period: None,
        }
    }
}

/// Station joined with the buffer means of every predictor band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingFeature {
    pub station_id: String,
    pub x: f64,
    pub y: f64,
    /// Response under its field name plus one entry per predictor band
    pub properties: BTreeMap<String, Option<f64>>,
}

impl TrainingFeature {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.properties.get(name).copied().flatten()
    }

    /// Value vector in the given order, or `None` if any entry is missing
    pub fn values(&self, names: &[String]) -> Option<Vec<f64>> {
        names
            .iter()
            .map(|n| self.get(n).filter(|v| v.is_finite()))
            .collect()
    }
}

/// Final single-band gridded model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSurface {
    pub name: String,
    pub grid: GridSpec,
    pub data: RasterImage,
}

impl PredictionSurface {
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }
}

/// Error types for the interpolation pipeline
#[derive(Debug, thiserror::Error)]
pub enum TairError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Grid mismatch: expected {expected}, found {found}")]
    GridMismatch { expected: String, found: String },

    #[error("Duplicate band name: {0}")]
    DuplicateBand(String),

    #[error("Predictor schema mismatch: model trained on {expected:?}, stack has {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for pipeline operations
pub type TairResult<T> = Result<T, TairError>;
