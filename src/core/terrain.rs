use crate::types::{Band, Cell, GridSpec, PredictorStack, RasterImage, TairError, TairResult};
use ndarray::{Array2, Zip};

pub const ELEVATION_BAND: &str = "elevation";
pub const SLOPE_BAND: &str = "slope";
pub const RUGGEDNESS_BAND: &str = "elev_rugged";

/// Parameters for terrain predictor computation
#[derive(Debug, Clone)]
pub struct TerrainParams {
    /// Pixel spacing in map units (x, y)
    pub pixel_spacing: (f64, f64),
    /// Square ruggedness window in pixels (must be odd)
    pub ruggedness_window: usize,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            pixel_spacing: (30.0, 30.0), // SRTM 1 arc-second
            ruggedness_window: 3,        // 3x3 neighborhood
        }
    }
}

/// Builds the {elevation, slope, ruggedness} predictor bands
pub struct TerrainProcessor {
    params: TerrainParams,
}

impl TerrainProcessor {
    pub fn new(params: TerrainParams) -> Self {
        Self { params }
    }

    /// Processor whose pixel spacing follows the grid
    pub fn for_grid(grid: &GridSpec, ruggedness_window: usize) -> Self {
        Self::new(TerrainParams {
            pixel_spacing: grid.transform.pixel_size(),
            ruggedness_window,
        })
    }

    /// Merge both elevation sources and derive the terrain stack
    pub fn build_terrain_stack(
        &self,
        primary: &RasterImage,
        fallback: &RasterImage,
        grid: &GridSpec,
    ) -> TairResult<PredictorStack> {
        log::info!("Building terrain predictors on {}x{} grid", grid.width, grid.height);
        log::debug!("Terrain parameters: {:?}", self.params);

        let elevation = merge_elevation(primary, fallback)?;
        let slope = self.compute_slope(&elevation)?;
        let rugged = self.compute_ruggedness(&elevation)?;

        PredictorStack::from_bands(
            grid.clone(),
            vec![
                Band::new(ELEVATION_BAND, elevation),
                Band::new(SLOPE_BAND, slope),
                Band::new(RUGGEDNESS_BAND, rugged),
            ],
        )
    }

    /// Slope in degrees from central differences.
    ///
    /// Falls back to a one-sided difference where one neighbor is missing or
    /// off-grid; a pixel with no usable neighbor along an axis is missing.
    pub fn compute_slope(&self, dem: &RasterImage) -> TairResult<RasterImage> {
        let (rows, cols) = dem.dim();
        let (dx, dy) = self.params.pixel_spacing;
        if !(dx > 0.0) || !(dy > 0.0) {
            return Err(TairError::Processing(format!(
                "Invalid pixel spacing {:?}",
                self.params.pixel_spacing
            )));
        }

        let get = |i: isize, j: isize| -> Option<f64> {
            if i < 0 || j < 0 || i >= rows as isize || j >= cols as isize {
                return None;
            }
            let v = dem[[i as usize, j as usize]];
            v.is_finite().then_some(v as f64)
        };

        let mut slope = Array2::<Cell>::from_elem((rows, cols), Cell::NAN);
        Zip::indexed(&mut slope).par_for_each(|(i, j), out| {
            let (i, j) = (i as isize, j as isize);
            let Some(center) = get(i, j) else {
                return;
            };

            let dz_dx = axis_gradient(get(i, j - 1), center, get(i, j + 1), dx);
            let dz_dy = axis_gradient(get(i - 1, j), center, get(i + 1, j), dy);

            if let (Some(gx), Some(gy)) = (dz_dx, dz_dy) {
                *out = (gx * gx + gy * gy).sqrt().atan().to_degrees() as Cell;
            }
        });

        Ok(slope)
    }

    /// Terrain ruggedness: sqrt of the summed squared elevation differences
    /// between a pixel and every cell of its square window.
    ///
    /// Off-grid and missing neighbors are skipped; a missing center stays missing.
    pub fn compute_ruggedness(&self, dem: &RasterImage) -> TairResult<RasterImage> {
        let window = self.params.ruggedness_window;
        if window == 0 || window % 2 == 0 {
            return Err(TairError::Processing(
                "Window size must be odd".to_string()
            ));
        }

        let (rows, cols) = dem.dim();
        let half = (window / 2) as isize;
        let mut rugged = Array2::<Cell>::from_elem((rows, cols), Cell::NAN);

        Zip::indexed(&mut rugged).par_for_each(|(i, j), out| {
            let center = dem[[i, j]];
            if !center.is_finite() {
                return;
            }

            let mut sum_sq = 0.0f64;
            for di in -half..=half {
                for dj in -half..=half {
                    let ii = i as isize + di;
                    let jj = j as isize + dj;
                    if ii < 0 || jj < 0 || ii >= rows as isize || jj >= cols as isize {
                        continue;
                    }
                    let neighbor = dem[[ii as usize, jj as usize]];
                    if neighbor.is_finite() {
                        let diff = (center - neighbor) as f64;
                        sum_sq += diff * diff;
                    }
                }
            }

            *out = sum_sq.sqrt() as Cell;
        });

        Ok(rugged)
    }
}

/// Fill the primary elevation from the fallback where the primary is missing
pub fn merge_elevation(primary: &RasterImage, fallback: &RasterImage) -> TairResult<RasterImage> {
    if primary.dim() != fallback.dim() {
        return Err(TairError::GridMismatch {
            expected: format!("{:?}", primary.dim()),
            found: format!("{:?}", fallback.dim()),
        });
    }

    let mut merged = primary.clone();
    let mut filled = 0usize;
    Zip::from(&mut merged).and(fallback).for_each(|m, &f| {
        if !m.is_finite() {
            *m = f;
            if f.is_finite() {
                filled += 1;
            }
        }
    });

    log::debug!("Filled {} elevation pixels from fallback source", filled);
    Ok(merged)
}

fn axis_gradient(before: Option<f64>, center: f64, after: Option<f64>, spacing: f64) -> Option<f64> {
    match (before, after) {
        (Some(b), Some(a)) => Some((a - b) / (2.0 * spacing)),
        (None, Some(a)) => Some((a - center) / spacing),
        (Some(b), None) => Some((center - b) / spacing),
        (None, None) => None,
    }
}
