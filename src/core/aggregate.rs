//! Area-weighted band means around stations (training) and around every
//! pixel (prediction), sharing one disk coverage model so both modes see the
//! same spatial support.

use crate::types::{
    Band, Cell, PredictorStack, StationObservation, TairError, TairResult, TrainingFeature,
};
use ndarray::{Array2, Zip};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Sub-pixel samples per axis when a pixel straddles the disk boundary
const COVERAGE_SUBSAMPLES: usize = 10;

/// Aggregation parameters
#[derive(Debug, Clone)]
pub struct AggregationParams {
    /// Buffer / neighborhood radius in map units
    pub radius: f64,
    /// Station fan-out: higher values split extraction into more, smaller batches
    pub tile_scale: usize,
}

impl Default for AggregationParams {
    fn default() -> Self {
        Self {
            radius: 100.0,
            tile_scale: 4,
        }
    }
}

/// Fraction of a `w` x `h` pixel centered at (`dx`, `dy`) that lies inside
/// the disk of `radius` centered at the origin
pub fn disk_coverage(dx: f64, dy: f64, w: f64, h: f64, radius: f64) -> f64 {
    let (x0, x1) = (dx - w / 2.0, dx + w / 2.0);
    let (y0, y1) = (dy - h / 2.0, dy + h / 2.0);
    let r2 = radius * radius;

    // Nearest and farthest points of the pixel from the disk center
    let near_x = if x0 > 0.0 { x0 } else if x1 < 0.0 { x1 } else { 0.0 };
    let near_y = if y0 > 0.0 { y0 } else if y1 < 0.0 { y1 } else { 0.0 };
    if near_x * near_x + near_y * near_y > r2 {
        return 0.0;
    }
    let far_x = x0.abs().max(x1.abs());
    let far_y = y0.abs().max(y1.abs());
    if far_x * far_x + far_y * far_y <= r2 {
        return 1.0;
    }

    let n = COVERAGE_SUBSAMPLES;
    let mut inside = 0usize;
    for si in 0..n {
        let sy = y0 + (si as f64 + 0.5) * h / n as f64;
        for sj in 0..n {
            let sx = x0 + (sj as f64 + 0.5) * w / n as f64;
            if sx * sx + sy * sy <= r2 {
                inside += 1;
            }
        }
    }
    inside as f64 / (n * n) as f64
}

/// Spatial aggregator for point (buffer) and raster (moving window) modes
pub struct SpatialAggregator {
    params: AggregationParams,
}

impl SpatialAggregator {
    pub fn new(params: AggregationParams) -> Self {
        Self { params }
    }

    pub fn radius(&self) -> f64 {
        self.params.radius
    }

    /// Join every station with the buffer mean of each stack band.
    ///
    /// Stations are split into batches evaluated in parallel; output order
    /// follows the input order.
    pub fn reduce_regions(
        &self,
        stack: &PredictorStack,
        stations: &[StationObservation],
        response_field: &str,
    ) -> TairResult<Vec<TrainingFeature>> {
        self.check_radius()?;
        if stack.band(response_field).is_some() {
            return Err(TairError::Processing(format!(
                "Response field '{}' collides with a predictor band",
                response_field
            )));
        }

        let batches = (self.params.tile_scale.max(1) * rayon::current_num_threads()).max(1);
        let batch_size = ((stations.len() + batches - 1) / batches).max(1);
        log::info!(
            "Extracting {} bands for {} stations (radius {}, batch size {})",
            stack.len(),
            stations.len(),
            self.params.radius,
            batch_size
        );

        let names = stack.band_names();
        let features: Vec<TrainingFeature> = stations
            .par_chunks(batch_size)
            .map(|batch| {
                batch
                    .iter()
                    .map(|station| {
                        let means = self.buffer_means(stack, station.x, station.y);
                        let mut properties = BTreeMap::new();
                        properties.insert(response_field.to_string(), station.response);
                        for (name, mean) in names.iter().zip(means) {
                            properties.insert(name.clone(), mean);
                        }
                        TrainingFeature {
                            station_id: station.id.clone(),
                            x: station.x,
                            y: station.y,
                            properties,
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        Ok(features)
    }

    /// Coverage-weighted mean of each band within the disk around (x, y).
    /// `None` where the disk holds no valid pixel of that band.
    pub fn buffer_means(&self, stack: &PredictorStack, x: f64, y: f64) -> Vec<Option<f64>> {
        let grid = &stack.grid;
        let t = &grid.transform;
        let (w, h) = t.pixel_size();
        let r = self.params.radius;

        let (ra, ca) = t.world_to_pixel(x - r, y + r);
        let (rb, cb) = t.world_to_pixel(x + r, y - r);
        let row_lo = ra.min(rb).floor().max(0.0) as usize;
        let row_hi = (ra.max(rb).ceil().max(0.0) as usize).min(grid.height);
        let col_lo = ca.min(cb).floor().max(0.0) as usize;
        let col_hi = (ca.max(cb).ceil().max(0.0) as usize).min(grid.width);

        let mut weights = Vec::new();
        for i in row_lo..row_hi {
            for j in col_lo..col_hi {
                let (px, py) = t.pixel_center(i, j);
                let weight = disk_coverage(px - x, py - y, w, h, r);
                if weight > 0.0 {
                    weights.push((i, j, weight));
                }
            }
        }

        stack
            .bands()
            .iter()
            .map(|band| weighted_mean(weights.iter().map(|&(i, j, wt)| (band.data[[i, j]], wt))))
            .collect()
    }

    /// Moving-window mean of every band over a disk of the same radius,
    /// evaluated at each pixel center.
    pub fn focal_mean(&self, stack: &PredictorStack) -> TairResult<PredictorStack> {
        self.check_radius()?;
        let kernel = self.kernel(stack);
        log::info!(
            "Focal mean over {} bands with {}-cell circular kernel",
            stack.len(),
            kernel.len()
        );

        let (rows, cols) = stack.grid.shape();
        let mut out = PredictorStack::new(stack.grid.clone());
        for band in stack.bands() {
            let mut smoothed = Array2::<Cell>::from_elem((rows, cols), Cell::NAN);
            Zip::indexed(&mut smoothed).par_for_each(|(i, j), o| {
                let samples = kernel.iter().filter_map(|&(di, dj, wt)| {
                    let ii = i as isize + di;
                    let jj = j as isize + dj;
                    if ii < 0 || jj < 0 || ii >= rows as isize || jj >= cols as isize {
                        None
                    } else {
                        Some((band.data[[ii as usize, jj as usize]], wt))
                    }
                });
                if let Some(mean) = weighted_mean(samples) {
                    *o = mean as Cell;
                }
            });
            out.add_band(Band::new(band.name.clone(), smoothed))?;
        }

        Ok(out)
    }

    /// Pixel offsets (row, col) and coverage weights of the disk around a pixel center
    fn kernel(&self, stack: &PredictorStack) -> Vec<(isize, isize, f64)> {
        let (w, h) = stack.grid.transform.pixel_size();
        let r = self.params.radius;
        let reach_x = (r / w).ceil() as isize + 1;
        let reach_y = (r / h).ceil() as isize + 1;

        let mut kernel = Vec::new();
        for di in -reach_y..=reach_y {
            for dj in -reach_x..=reach_x {
                let weight = disk_coverage(dj as f64 * w, di as f64 * h, w, h, r);
                if weight > 0.0 {
                    kernel.push((di, dj, weight));
                }
            }
        }
        kernel
    }

    fn check_radius(&self) -> TairResult<()> {
        if !(self.params.radius > 0.0) {
            return Err(TairError::Processing(format!(
                "Aggregation radius must be positive, got {}",
                self.params.radius
            )));
        }
        Ok(())
    }
}

fn weighted_mean<I: Iterator<Item = (Cell, f64)>>(samples: I) -> Option<f64> {
    let mut sum = 0.0f64;
    let mut weight = 0.0f64;
    for (v, w) in samples {
        if v.is_finite() {
            sum += v as f64 * w;
            weight += w;
        }
    }
    (weight > 0.0).then(|| sum / weight)
}
