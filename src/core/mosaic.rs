use crate::types::{Band, Cell, PredictorStack, Scene, TairError, TairResult};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property recording how many captures went into a daily mosaic
pub const SCENE_COUNT_PROPERTY: &str = "scene_count";

/// Per-pixel precedence among captures of the same day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MosaicOrder {
    /// Input order; the first valid pixel and the first scene's metadata win
    FirstValid,
    /// Latest acquisition first
    MostRecent,
}

/// Acquisition time truncated to midnight UTC
pub fn day_timestamp(acquired: DateTime<Utc>) -> DateTime<Utc> {
    acquired
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(acquired)
}

/// Collapse same-day captures into one scene per calendar day.
///
/// Days come out in ascending order. Within a day each pixel of each band is
/// taken from the first scene (by `order`) holding a valid value there; the
/// day's properties and band set come from that same first scene.
pub fn daily_mosaics(scenes: &[Scene], order: MosaicOrder) -> TairResult<Vec<Scene>> {
    let Some(first) = scenes.first() else {
        log::warn!("No scenes to mosaic");
        return Ok(Vec::new());
    };

    for scene in scenes {
        if !scene.stack.grid.is_aligned_with(&first.stack.grid) {
            return Err(TairError::GridMismatch {
                expected: format!("{:?}", first.stack.grid),
                found: format!("{:?} (scene {})", scene.stack.grid, scene.id),
            });
        }
    }

    let mut days: BTreeMap<NaiveDate, Vec<&Scene>> = BTreeMap::new();
    for scene in scenes {
        days.entry(scene.acquired.date_naive()).or_default().push(scene);
    }

    log::info!(
        "Mosaicking {} scenes into {} daily composites",
        scenes.len(),
        days.len()
    );

    let mut mosaics = Vec::with_capacity(days.len());
    for (day, mut members) in days {
        if order == MosaicOrder::MostRecent {
            // Stable sort keeps input order among identical timestamps
            members.sort_by(|a, b| b.acquired.cmp(&a.acquired));
        }
        mosaics.push(mosaic_day(day, &members)?);
    }

    Ok(mosaics)
}

fn mosaic_day(day: NaiveDate, members: &[&Scene]) -> TairResult<Scene> {
    let representative = members[0];
    let grid = representative.stack.grid.clone();
    let shape = grid.shape();

    let mut stack = PredictorStack::new(grid);
    for band in representative.stack.bands() {
        let mut data = Array2::<Cell>::from_elem(shape, Cell::NAN);
        for scene in members {
            if let Some(source) = scene.stack.band(&band.name) {
                Zip::from(&mut data).and(&source.data).for_each(|out, &v| {
                    if !out.is_finite() && v.is_finite() {
                        *out = v;
                    }
                });
            }
        }
        stack.add_band(Band::new(band.name.clone(), data))?;
    }

    log::debug!("{}: merged {} scenes", day, members.len());

    let mut properties = representative.properties.clone();
    properties.insert(SCENE_COUNT_PROPERTY.to_string(), members.len().to_string());

    Ok(Scene {
        id: day.format("%Y%m%d").to_string(),
        acquired: day_timestamp(representative.acquired),
        cloud_percentage: representative.cloud_percentage,
        properties,
        stack,
    })
}
