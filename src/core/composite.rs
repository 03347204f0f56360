use crate::types::{Band, Cell, GridSpec, PredictorStack, Scene, TairError, TairResult};
use ndarray::{Array2, Zip};
use num_traits::Float;

/// Median of the finite values, averaging the middle pair for even counts
pub fn median<T: Float>(values: &mut Vec<T>) -> Option<T> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        let two = T::one() + T::one();
        Some((values[mid - 1] + values[mid]) / two)
    }
}

/// Reduce daily mosaics to one band set by a per-pixel median across days.
///
/// The output carries exactly `band_names`, in that order. Pixels without a
/// valid value on any day stay missing.
pub fn median_composite(
    mosaics: &[Scene],
    grid: &GridSpec,
    band_names: &[String],
) -> TairResult<PredictorStack> {
    log::info!(
        "Median compositing {} daily mosaics over {} bands",
        mosaics.len(),
        band_names.len()
    );

    for scene in mosaics {
        if !scene.stack.grid.is_aligned_with(grid) {
            return Err(TairError::GridMismatch {
                expected: format!("{:?}", grid),
                found: format!("{:?} (mosaic {})", scene.stack.grid, scene.id),
            });
        }
    }

    let mut stack = PredictorStack::new(grid.clone());
    for name in band_names {
        let layers: Vec<&Array2<Cell>> = mosaics
            .iter()
            .filter_map(|s| s.stack.band(name).map(|b| &b.data))
            .collect();

        let mut out = Array2::<Cell>::from_elem(grid.shape(), Cell::NAN);
        Zip::indexed(&mut out).par_for_each(|idx, o| {
            let mut values: Vec<Cell> = layers.iter().map(|l| l[idx]).collect();
            if let Some(m) = median(&mut values) {
                *o = m;
            }
        });

        let band = Band::new(name.clone(), out);
        if band.valid_count() == 0 {
            log::warn!("Composite band '{}' is entirely missing", name);
        }
        stack.add_band(band)?;
    }

    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use chrono::{TimeZone, Utc};

    fn grid() -> GridSpec {
        GridSpec::new(2, 1, GeoTransform::north_up(0.0, 10.0, 10.0, 10.0), None)
    }

    fn mosaic(day: u32, values: Vec<f32>) -> Scene {
        let stack = PredictorStack::from_bands(
            grid(),
            vec![Band::new("nir", Array2::from_shape_vec((1, 2), values).unwrap())],
        )
        .unwrap();
        Scene::new(format!("d{}", day), Utc.with_ymd_and_hms(2018, 1, day, 0, 0, 0).unwrap(), stack)
    }

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&mut vec![3.0f32, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut vec![4.0f64, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut vec![f32::NAN, 5.0]), Some(5.0));
        assert_eq!(median::<f32>(&mut vec![]), None);
    }

    #[test]
    fn test_composite_ignores_missing_days() {
        let mosaics = vec![
            mosaic(1, vec![100.0, f32::NAN]),
            mosaic(2, vec![900.0, f32::NAN]),
            mosaic(3, vec![200.0, f32::NAN]),
        ];
        let names = vec!["nir".to_string(), "red".to_string()];
        let stack = median_composite(&mosaics, &grid(), &names).unwrap();

        let nir = &stack.band("nir").unwrap().data;
        assert_eq!(nir[[0, 0]], 200.0);
        assert!(nir[[0, 1]].is_nan());
        assert_eq!(stack.band("red").unwrap().valid_count(), 0);
    }

    #[test]
    fn test_composite_of_nothing_keeps_schema() {
        let names = vec!["nir".to_string()];
        let stack = median_composite(&[], &grid(), &names).unwrap();
        assert_eq!(stack.band_names(), names);
    }
}
