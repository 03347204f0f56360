//! Distance-to-coast predictor from the land-cover water class

use crate::core::water_mask::LandCoverScheme;
use crate::types::{Band, Cell, GridSpec, RasterImage, TairError, TairResult};
use ndarray::{Array2, Axis};
use rayon::prelude::*;

pub const DIST_COAST_BAND: &str = "distCoast";

/// Exact Euclidean distance (km) from each pixel to the nearest water pixel.
///
/// Every pixel is missing when the land cover holds no water at all.
pub fn distance_to_coast(
    land_cover: &RasterImage,
    grid: &GridSpec,
    scheme: &LandCoverScheme,
) -> TairResult<Band> {
    if land_cover.dim() != grid.shape() {
        return Err(TairError::GridMismatch {
            expected: format!("{:?}", grid.shape()),
            found: format!("{:?} (land cover)", land_cover.dim()),
        });
    }

    let (w, h) = grid.transform.pixel_size();
    let mut sq = land_cover.mapv(|c| if scheme.is_water(c) { 0.0 } else { f64::INFINITY });
    let water = sq.iter().filter(|v| v.is_finite()).count();
    log::info!("Distance transform from {} water pixels", water);

    if water == 0 {
        log::warn!("No water pixels in land cover; {} is entirely missing", DIST_COAST_BAND);
        return Ok(Band::missing(DIST_COAST_BAND, grid.shape()));
    }

    sq.axis_iter_mut(Axis(0)).into_par_iter().for_each(|mut row| {
        let line: Vec<f64> = row.iter().copied().collect();
        for (out, d) in row.iter_mut().zip(squared_distance_1d(&line, w)) {
            *out = d;
        }
    });
    sq.axis_iter_mut(Axis(1)).into_par_iter().for_each(|mut col| {
        let line: Vec<f64> = col.iter().copied().collect();
        for (out, d) in col.iter_mut().zip(squared_distance_1d(&line, h)) {
            *out = d;
        }
    });

    let km: Array2<Cell> = sq.mapv(|d| (d.sqrt() / 1000.0) as Cell);
    Ok(Band::new(DIST_COAST_BAND, km))
}

/// Lower envelope of parabolas (Felzenszwalb & Huttenlocher) over samples
/// spaced `spacing` apart; infinite entries are not sources.
fn squared_distance_1d(f: &[f64], spacing: f64) -> Vec<f64> {
    let n = f.len();
    let pos = |q: usize| q as f64 * spacing;
    let mut vertices: Vec<usize> = Vec::with_capacity(n);
    let mut bounds: Vec<f64> = Vec::with_capacity(n);

    for q in (0..n).filter(|&q| f[q].is_finite()) {
        loop {
            match vertices.last() {
                None => {
                    vertices.push(q);
                    bounds.push(f64::NEG_INFINITY);
                    break;
                }
                Some(&v) => {
                    let s = ((f[q] + pos(q) * pos(q)) - (f[v] + pos(v) * pos(v)))
                        / (2.0 * (pos(q) - pos(v)));
                    if bounds.last().map_or(false, |&b| s <= b) {
                        vertices.pop();
                        bounds.pop();
                    } else {
                        vertices.push(q);
                        bounds.push(s);
                        break;
                    }
                }
            }
        }
    }

    if vertices.is_empty() {
        return vec![f64::INFINITY; n];
    }

    let mut k = 0;
    (0..n)
        .map(|q| {
            let p = pos(q);
            while k + 1 < vertices.len() && bounds[k + 1] < p {
                k += 1;
            }
            let v = vertices[k];
            (p - pos(v)).powi(2) + f[v]
        })
        .collect()
}
