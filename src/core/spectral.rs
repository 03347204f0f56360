//! Band selection and spectral indices for multispectral scenes

use crate::types::{Band, Cell, PredictorStack, RasterImage, Scene, TairResult};
use ndarray::Zip;

pub const NDVI_BAND: &str = "ndvi";
pub const NDBI_BAND: &str = "NDBI";

/// Sentinel-2 surface reflectance bands and the names used as predictors
pub const SENTINEL2_BANDS: [(&str, &str); 6] = [
    ("B2", "blue"),
    ("B3", "green"),
    ("B4", "red"),
    ("B8", "nir"),
    ("B11", "swir1"),
    ("B12", "swir2"),
];

/// Keep only the mapped source bands, renamed to their predictor names.
///
/// A source band absent from the scene becomes a fully missing band so every
/// scene carries the same band set.
pub fn select_bands(mut scene: Scene, mapping: &[(&str, &str)]) -> TairResult<Scene> {
    let shape = scene.stack.grid.shape();
    let mut selected = PredictorStack::new(scene.stack.grid.clone());

    for (source, target) in mapping {
        let band = match scene.stack.remove_band(source) {
            Some(band) => Band::new(*target, band.data),
            None => {
                log::debug!("Scene {} lacks band {}", scene.id, source);
                Band::missing(*target, shape)
            }
        };
        selected.add_band(band)?;
    }

    scene.stack = selected;
    Ok(scene)
}

/// (a - b) / (a + b); missing where either input is missing or the sum is zero
pub fn normalized_difference(a: &RasterImage, b: &RasterImage) -> RasterImage {
    let mut out = RasterImage::from_elem(a.dim(), Cell::NAN);
    Zip::from(&mut out).and(a).and(b).for_each(|o, &x, &y| {
        let sum = x + y;
        if x.is_finite() && y.is_finite() && sum != 0.0 {
            *o = (x - y) / sum;
        }
    });
    out
}

/// Append NDVI (nir vs red) and NDBI (swir1 vs nir) bands.
///
/// Missing source bands yield fully missing index bands.
pub fn add_indices(stack: &mut PredictorStack) -> TairResult<()> {
    let shape = stack.grid.shape();

    let ndvi = match (stack.band("nir"), stack.band("red")) {
        (Some(nir), Some(red)) => Band::new(NDVI_BAND, normalized_difference(&nir.data, &red.data)),
        _ => Band::missing(NDVI_BAND, shape),
    };
    let ndbi = match (stack.band("swir1"), stack.band("nir")) {
        (Some(swir), Some(nir)) => Band::new(NDBI_BAND, normalized_difference(&swir.data, &nir.data)),
        _ => Band::missing(NDBI_BAND, shape),
    };

    stack.add_band(ndvi)?;
    stack.add_band(ndbi)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, GridSpec};
    use approx::assert_abs_diff_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn grid() -> GridSpec {
        GridSpec::new(2, 1, GeoTransform::north_up(0.0, 10.0, 10.0, 10.0), None)
    }

    #[test]
    fn test_ndvi_values() {
        let mut stack = PredictorStack::from_bands(
            grid(),
            vec![
                Band::new("red", Array2::from_shape_vec((1, 2), vec![1000.0, f32::NAN]).unwrap()),
                Band::new("nir", Array2::from_shape_vec((1, 2), vec![3000.0, 2000.0]).unwrap()),
                Band::new("swir1", Array2::from_shape_vec((1, 2), vec![1000.0, 2000.0]).unwrap()),
            ],
        )
        .unwrap();

        add_indices(&mut stack).unwrap();

        let ndvi = &stack.band(NDVI_BAND).unwrap().data;
        assert_abs_diff_eq!(ndvi[[0, 0]], 0.5, epsilon = 1e-6);
        assert!(ndvi[[0, 1]].is_nan());

        let ndbi = &stack.band(NDBI_BAND).unwrap().data;
        assert_abs_diff_eq!(ndbi[[0, 0]], -0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(ndbi[[0, 1]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_sum_is_missing() {
        let a = Array2::from_elem((1, 1), 0.0f32);
        assert!(normalized_difference(&a, &a)[[0, 0]].is_nan());
    }

    #[test]
    fn test_missing_source_band_propagates() {
        let mut stack = PredictorStack::new(grid());
        stack.add_band(Band::new("red", Array2::from_elem((1, 2), 1.0))).unwrap();
        add_indices(&mut stack).unwrap();
        assert_eq!(stack.band(NDVI_BAND).unwrap().valid_count(), 0);
    }

    #[test]
    fn test_select_bands_renames_and_fills() {
        let stack = PredictorStack::from_bands(
            grid(),
            vec![
                Band::new("B4", Array2::from_elem((1, 2), 7.0)),
                Band::new("B8", Array2::from_elem((1, 2), 9.0)),
            ],
        )
        .unwrap();
        let scene = Scene::new("s", Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap(), stack);

        let scene = select_bands(scene, &SENTINEL2_BANDS).unwrap();
        assert_eq!(
            scene.stack.band_names(),
            vec!["blue", "green", "red", "nir", "swir1", "swir2"]
        );
        assert_eq!(scene.stack.band("red").unwrap().data[[0, 0]], 7.0);
        assert_eq!(scene.stack.band("blue").unwrap().valid_count(), 0);
    }
}
