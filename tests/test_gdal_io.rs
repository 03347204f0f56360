use gdal::raster::Buffer;
use gdal::{DriverManager, Metadata};
use ndarray::Array2;
use std::path::Path;
use tairmap::io::scene_archive::{SceneArchive, CLOUD_METADATA_KEY};
use tairmap::io::source::SceneQuery;
use tairmap::io::stations::{StationFields, StationReader};
use tairmap::types::{BoundingBox, GeoTransform, GridSpec, PredictionSurface};
use tairmap::{GeoTiffReader, GeoTiffWriter};

fn write_scene(path: &Path, grid: &GridSpec, bands: &[(&str, f32)], cloud: f32) {
    let driver = DriverManager::get_driver_by_name("GTiff").expect("GTiff driver");
    let mut dataset = driver
        .create_with_band_type::<f32, _>(path, grid.width as isize, grid.height as isize, bands.len() as isize)
        .expect("Failed to create scene");
    dataset.set_geo_transform(&grid.transform.to_gdal()).unwrap();
    dataset
        .set_metadata_item(CLOUD_METADATA_KEY, &cloud.to_string(), "")
        .unwrap();

    for (index, (name, value)) in bands.iter().enumerate() {
        let mut band = dataset.rasterband(index as isize + 1).unwrap();
        band.set_description(name).unwrap();
        let buffer = Buffer::new((grid.width, grid.height), vec![*value; grid.width * grid.height]);
        band.write((0, 0), (grid.width, grid.height), &buffer).unwrap();
    }
}

#[test]
fn test_surface_geotiff_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ta.tif");

    let grid = GridSpec::new(4, 3, GeoTransform::north_up(600000.0, 5400000.0, 30.0, 30.0), Some(32633));
    let mut data = Array2::from_shape_fn((3, 4), |(i, j)| 7.0 + (i * 4 + j) as f32 * 0.25);
    data[[2, 3]] = f32::NAN;
    let surface = PredictionSurface {
        name: "ta".to_string(),
        grid: grid.clone(),
        data: data.clone(),
    };

    GeoTiffWriter::write_surface(&surface, &path, Some((7.0, 10.0))).expect("Failed to write surface");

    let (read, read_grid) = GeoTiffReader::read_band(&path, 1).expect("Failed to read surface");
    assert_eq!(read_grid.width, 4);
    assert_eq!(read_grid.height, 3);
    assert_eq!(read_grid.transform, grid.transform);
    assert_eq!(read_grid.epsg, Some(32633));
    assert!(read[[2, 3]].is_nan());
    assert_eq!(read[[0, 0]], 7.0);
    assert_eq!(read[[1, 2]], data[[1, 2]]);

    let dataset = gdal::Dataset::open(&path).unwrap();
    let min: f64 = dataset.metadata_item("DISPLAY_MIN", "").unwrap().parse().unwrap();
    let max: f64 = dataset.metadata_item("DISPLAY_MAX", "").unwrap().parse().unwrap();
    assert_eq!((min, max), (7.0, 10.0));
    assert_eq!(dataset.rasterband(1).unwrap().description().unwrap(), "ta");
}

#[test]
fn test_scene_archive_query_filters_and_names_bands() {
    let dir = tempfile::tempdir().unwrap();
    let grid = GridSpec::new(5, 5, GeoTransform::north_up(0.0, 50.0, 10.0, 10.0), None);
    let bands = [("B4", 0.125f32), ("B8", 0.375), ("QA60", 0.0)];

    write_scene(
        &dir.path().join("S2A_MSIL2A_20180105T103421_N0206_R108_T32VNM_20180105T124839.tif"),
        &grid,
        &bands,
        12.0,
    );
    write_scene(
        &dir.path().join("S2B_MSIL2A_20180110T103421_N0206_R108_T32VNM_20180110T124839.tif"),
        &grid,
        &bands,
        85.0,
    );
    write_scene(
        &dir.path().join("S2A_MSIL2A_20180301T103421_N0206_R108_T32VNM_20180301T124839.tif"),
        &grid,
        &bands,
        0.0,
    );
    std::fs::write(dir.path().join("notes.txt"), "not a scene").unwrap();

    let archive = SceneArchive::new(dir.path());
    assert_eq!(archive.entries().unwrap().len(), 3);

    let query = SceneQuery {
        start: chrono::NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
        end: chrono::NaiveDate::from_ymd_opt(2018, 2, 1).unwrap(),
        bounds: BoundingBox::new(0.0, 0.0, 50.0, 50.0),
        max_cloud_percentage: 30.0,
    };
    let scenes = archive.query(&query, &grid).unwrap();

    assert_eq!(scenes.len(), 1);
    let scene = &scenes[0];
    assert!(scene.id.starts_with("S2A_MSIL2A_20180105"));
    assert_eq!(scene.cloud_percentage, 12.0);
    assert_eq!(scene.stack.band_names(), vec!["B4", "B8", "QA60"]);
    assert_eq!(scene.stack.band("B8").unwrap().data[[2, 2]], 0.375);
}

#[test]
fn test_station_reader_reads_geojson_points() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stations.geojson");
    std::fs::write(
        &path,
        r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"ID": "A1", "ta": 8.5},
     "geometry": {"type": "Point", "coordinates": [10.0, 20.0]}},
    {"type": "Feature", "properties": {"ID": "B2", "ta": null},
     "geometry": {"type": "Point", "coordinates": [30.0, 40.0]}},
    {"type": "Feature", "properties": {"ID": "C3", "ta": 9.25},
     "geometry": {"type": "Point", "coordinates": [50.0, 60.0]}}
  ]
}"#,
    )
    .unwrap();

    let fields = StationFields {
        id: "ID".to_string(),
        response: "ta".to_string(),
        period: None,
    };
    let stations = StationReader::read(&path, &fields).expect("Failed to read stations");

    assert_eq!(stations.len(), 3);
    assert_eq!(stations[0].id, "A1");
    assert_eq!((stations[0].x, stations[0].y), (10.0, 20.0));
    assert_eq!(stations[0].response, Some(8.5));
    assert_eq!(stations[1].response, None);
    assert_eq!(stations[2].response, Some(9.25));
}
