//! Data access: GDAL rasters, OGR station layers, scene archives

pub mod geotiff;
pub mod scene_archive;
pub mod source;
pub mod stations;

pub use geotiff::{GeoTiffReader, GeoTiffWriter};
pub use scene_archive::SceneArchive;
pub use source::{DataSource, FileSource, MemorySource, SceneQuery};
pub use stations::{StationFields, StationReader};
