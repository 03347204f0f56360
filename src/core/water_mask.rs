use crate::types::{Cell, PredictionSurface, RasterImage, TairError, TairResult};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Land-cover coding used to decide which pixels are in the valid domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandCoverScheme {
    /// Codes treated as water (GlobeLand30: 60)
    pub water_codes: Vec<i32>,
    /// Inclusive range of defined class codes; anything else (e.g. 255) is invalid
    pub valid_range: (i32, i32),
}

impl Default for LandCoverScheme {
    fn default() -> Self {
        Self {
            water_codes: vec![60],
            valid_range: (10, 100),
        }
    }
}

impl LandCoverScheme {
    pub fn is_water(&self, code: Cell) -> bool {
        code.is_finite() && self.water_codes.contains(&(code.round() as i32))
    }

    /// Defined, non-water land-cover class
    pub fn is_valid_land(&self, code: Cell) -> bool {
        if !code.is_finite() {
            return false;
        }
        let c = code.round() as i32;
        c >= self.valid_range.0 && c <= self.valid_range.1 && !self.water_codes.contains(&c)
    }
}

/// Set every surface pixel that is water or outside the land-cover scheme to
/// missing. Other pixels are left untouched, so the operation is idempotent.
pub fn mask_water(
    surface: &PredictionSurface,
    land_cover: &RasterImage,
    scheme: &LandCoverScheme,
) -> TairResult<PredictionSurface> {
    if surface.data.dim() != land_cover.dim() {
        return Err(TairError::GridMismatch {
            expected: format!("{:?}", surface.data.dim()),
            found: format!("{:?} (land cover)", land_cover.dim()),
        });
    }

    let mut masked = surface.clone();
    let mut removed = 0usize;
    Zip::from(&mut masked.data).and(land_cover).for_each(|v, &code| {
        if !scheme.is_valid_land(code) {
            if v.is_finite() {
                removed += 1;
            }
            *v = Cell::NAN;
        }
    });

    log::info!("Water/invalid-domain mask removed {} pixels", removed);
    Ok(masked)
}
