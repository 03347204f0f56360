use crate::types::{StationObservation, TairError, TairResult};
use gdal::vector::LayerAccess;
use gdal::Dataset;
use std::collections::BTreeMap;
use std::path::Path;

/// Field names to pull from the station layer
#[derive(Debug, Clone)]
pub struct StationFields {
    pub id: String,
    pub response: String,
    pub period: Option<String>,
}

/// Station observation reader for any OGR point layer
pub struct StationReader;

impl StationReader {
    /// Read point stations from the first layer of a vector dataset.
    ///
    /// Features without a point geometry or ID are skipped; a missing
    /// response is kept as `None` so the station still shows up downstream.
    pub fn read<P: AsRef<Path>>(path: P, fields: &StationFields) -> TairResult<Vec<StationObservation>> {
        log::info!("Reading stations from: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let mut layer = dataset.layer(0)?;

        let mut stations = Vec::new();
        let mut skipped = 0usize;
        for feature in layer.features() {
            let Ok(geometry) = feature.geometry_by_index(0) else {
                skipped += 1;
                continue;
            };
            let (x, y, _) = geometry.get_point(0);

            let Some(id) = feature.field_as_string_by_name(&fields.id)? else {
                skipped += 1;
                continue;
            };
            let response = feature.field_as_double_by_name(&fields.response)?;
            let period = match &fields.period {
                Some(name) => feature.field_as_string_by_name(name)?,
                None => None,
            };

            stations.push(StationObservation {
                id,
                x,
                y,
                response,
                period,
            });
        }

        if skipped > 0 {
            log::warn!("Skipped {} station features without geometry or ID", skipped);
        }
        if stations.is_empty() {
            return Err(TairError::InvalidFormat(format!(
                "No usable stations in {}",
                path.as_ref().display()
            )));
        }

        log::info!("Read {} stations", stations.len());
        Ok(stations)
    }
}

/// Count observations per station ID, logging any ID seen more than once
pub fn report_duplicate_ids(stations: &[StationObservation]) -> usize {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for station in stations {
        *counts.entry(station.id.as_str()).or_insert(0) += 1;
    }

    let duplicates: Vec<(&str, usize)> = counts
        .iter()
        .filter(|entry| *entry.1 > 1)
        .map(|(id, n)| (*id, *n))
        .collect();
    for (id, n) in &duplicates {
        log::warn!("Station ID {} appears {} times", id, n);
    }
    log::info!("{} distinct station IDs", counts.len());
    duplicates.len()
}
