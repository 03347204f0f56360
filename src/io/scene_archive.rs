use crate::io::geotiff::{resample_nearest, GeoTiffReader};
use crate::io::source::SceneQuery;
use crate::types::{Band, GridSpec, PredictorStack, Scene, TairError, TairResult};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use gdal::{Dataset, Metadata};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Scene-level cloud cover metadata item
pub const CLOUD_METADATA_KEY: &str = "CLOUDY_PIXEL_PERCENTAGE";

/// Identity of one archived scene, parsed from its file name
#[derive(Debug, Clone, PartialEq)]
pub struct SceneEntry {
    pub id: String,
    pub spacecraft: String,
    pub acquired: DateTime<Utc>,
    pub path: PathBuf,
}

/// Parse a Sentinel-2 product name such as
/// `S2A_MSIL2A_20180105T103421_N0206_R108_T32VNM_20180105T124839`
pub fn parse_product_name(name: &str) -> TairResult<(String, DateTime<Utc>)> {
    let re = Regex::new(r"^(S2[AB])_MSIL2A_(\d{8}T\d{6})")
        .map_err(|e| TairError::Processing(format!("Failed to compile product regex: {}", e)))?;

    let caps = re
        .captures(name)
        .ok_or_else(|| TairError::InvalidFormat(format!("Not a Sentinel-2 L2A product name: {}", name)))?;

    let naive = NaiveDateTime::parse_from_str(&caps[2], "%Y%m%dT%H%M%S")
        .map_err(|e| TairError::InvalidFormat(format!("Bad acquisition time in {}: {}", name, e)))?;

    Ok((caps[1].to_string(), Utc.from_utc_datetime(&naive)))
}

/// Directory of multi-band scene GeoTIFFs
pub struct SceneArchive {
    root: PathBuf,
}

impl SceneArchive {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// All recognizable scenes, ordered by file name
    pub fn entries(&self) -> TairResult<Vec<SceneEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_tiff = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"));
            if !is_tiff {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match parse_product_name(stem) {
                Ok((spacecraft, acquired)) => entries.push(SceneEntry {
                    id: stem.to_string(),
                    spacecraft,
                    acquired,
                    path: path.clone(),
                }),
                Err(e) => log::debug!("Skipping {}: {}", path.display(), e),
            }
        }

        entries.sort_by(|a, b| a.id.cmp(&b.id));
        log::debug!("Found {} scenes in {}", entries.len(), self.root.display());
        Ok(entries)
    }

    /// Load every scene passing the query, resampled onto `grid`
    pub fn query(&self, query: &SceneQuery, grid: &GridSpec) -> TairResult<Vec<Scene>> {
        let mut scenes = Vec::new();
        for entry in self.entries()? {
            if !query.matches_date(entry.acquired) {
                continue;
            }

            let dataset = Dataset::open(&entry.path)?;
            let cloud = dataset
                .metadata_item(CLOUD_METADATA_KEY, "")
                .and_then(|v| v.trim().parse::<f32>().ok())
                .unwrap_or(0.0);
            let source_grid = GeoTiffReader::grid_of(&dataset)?;
            if !query.matches_cloud(cloud) || !query.matches_bounds(&source_grid.bounds()) {
                log::debug!("Scene {} rejected by query (cloud {}%)", entry.id, cloud);
                continue;
            }

            let mut stack = PredictorStack::new(grid.clone());
            for (name, data) in GeoTiffReader::read_all_bands(&dataset, &source_grid)? {
                let aligned = resample_nearest(&data, &source_grid, grid)?;
                stack.add_band(Band::new(name, aligned))?;
            }

            scenes.push(
                Scene::new(entry.id.clone(), entry.acquired, stack)
                    .with_cloud_percentage(cloud)
                    .with_property("SPACECRAFT_NAME", entry.spacecraft.clone())
                    .with_property("PRODUCT_ID", entry.id.clone()),
            );
        }

        log::info!("Scene query returned {} scenes", scenes.len());
        Ok(scenes)
    }
}
