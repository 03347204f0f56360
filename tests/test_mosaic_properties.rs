use chrono::{Datelike, TimeZone, Timelike, Utc};
use ndarray::Array2;
use std::collections::BTreeSet;
use tairmap::core::composite::median_composite;
use tairmap::core::mosaic::{daily_mosaics, MosaicOrder, SCENE_COUNT_PROPERTY};
use tairmap::types::{Band, GeoTransform, GridSpec, PredictorStack, Scene};

fn grid() -> GridSpec {
    GridSpec::new(3, 2, GeoTransform::north_up(500.0, 1000.0, 20.0, 20.0), Some(32633))
}

/// Scene whose `red` band is `base + pixel index`, with one pixel missing
fn scene(day: u32, hour: u32, base: f32, hole: usize) -> Scene {
    let g = grid();
    let data = Array2::from_shape_fn(g.shape(), |(i, j)| {
        let k = i * 3 + j;
        if k == hole {
            f32::NAN
        } else {
            base + k as f32
        }
    });
    let stack = PredictorStack::from_bands(g, vec![Band::new("red", data)]).unwrap();
    Scene::new(
        format!("S2A_{}_{}", day, hour),
        Utc.with_ymd_and_hms(2018, 1, day, hour, 30, 0).unwrap(),
        stack,
    )
}

fn archive() -> Vec<Scene> {
    vec![
        scene(9, 10, 100.0, 1),
        scene(3, 10, 10.0, 0),
        scene(3, 11, 20.0, 5),
        scene(9, 10, 200.0, 2),
        scene(17, 9, 30.0, 9),
    ]
}

#[test]
fn test_one_mosaic_per_distinct_day() {
    let scenes = archive();
    let mosaics = daily_mosaics(&scenes, MosaicOrder::FirstValid).unwrap();

    let days: BTreeSet<_> = scenes.iter().map(|s| s.acquired.date_naive()).collect();
    assert_eq!(mosaics.len(), days.len());

    let ids: Vec<&str> = mosaics.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["20180103", "20180109", "20180117"]);
    for m in &mosaics {
        assert_eq!(m.acquired.hour(), 0);
        assert_eq!(m.acquired.minute(), 0);
    }
    assert_eq!(mosaics[0].acquired.day(), 3);
    assert_eq!(mosaics[0].properties[SCENE_COUNT_PROPERTY], "2");
    assert_eq!(mosaics[2].properties[SCENE_COUNT_PROPERTY], "1");
}

#[test]
fn test_mosaics_fill_holes_from_later_captures() {
    let mosaics = daily_mosaics(&archive(), MosaicOrder::FirstValid).unwrap();
    let red = &mosaics[0].stack.band("red").unwrap().data;

    // First capture on day 3 lacks pixel 0; the second capture supplies it
    assert_eq!(red[[0, 0]], 20.0);
    assert_eq!(red[[0, 1]], 11.0);
    assert_eq!(red[[1, 2]], 15.0);
}

#[test]
fn test_most_recent_order_prefers_later_capture() {
    let mosaics = daily_mosaics(&archive(), MosaicOrder::MostRecent).unwrap();
    let red = &mosaics[0].stack.band("red").unwrap().data;

    assert_eq!(red[[0, 1]], 21.0);
    // Later capture lacks pixel 5, so the earlier one fills it
    assert_eq!(red[[1, 2]], 15.0);
}

#[test]
fn test_mosaicking_is_idempotent() {
    let once = daily_mosaics(&archive(), MosaicOrder::FirstValid).unwrap();
    let twice = daily_mosaics(&once, MosaicOrder::FirstValid).unwrap();

    assert_eq!(once.len(), twice.len());
    for (a, b) in once.iter().zip(&twice) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.acquired, b.acquired);
        let (x, y) = (&a.stack.band("red").unwrap().data, &b.stack.band("red").unwrap().data);
        for (u, v) in x.iter().zip(y.iter()) {
            assert!((u.is_nan() && v.is_nan()) || u == v);
        }
    }
}

#[test]
fn test_median_over_daily_mosaics() {
    let mosaics = daily_mosaics(&archive(), MosaicOrder::FirstValid).unwrap();
    let names = vec!["red".to_string(), "nir".to_string()];
    let composite = median_composite(&mosaics, &grid(), &names).unwrap();

    assert_eq!(composite.band_names(), names);
    // Pixel 3 on days 3, 9 and 17: 13, 103, 33
    assert_eq!(composite.band("red").unwrap().data[[1, 0]], 33.0);
    assert_eq!(composite.band("nir").unwrap().valid_count(), 0);
}

#[test]
fn test_misaligned_scene_rejected() {
    let mut scenes = archive();
    let shifted = GridSpec::new(3, 2, GeoTransform::north_up(510.0, 1000.0, 20.0, 20.0), Some(32633));
    let stack = PredictorStack::from_bands(
        shifted,
        vec![Band::new("red", Array2::zeros((2, 3)))],
    )
    .unwrap();
    scenes.push(Scene::new("odd", Utc.with_ymd_and_hms(2018, 1, 4, 0, 0, 0).unwrap(), stack));

    assert!(daily_mosaics(&scenes, MosaicOrder::FirstValid).is_err());
}
