use crate::types::{
    Cell, GeoTransform, GridSpec, PredictionSurface, RasterImage, TairError, TairResult,
};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use std::path::Path;

/// GeoTIFF (or any GDAL raster) reader
pub struct GeoTiffReader;

impl GeoTiffReader {
    /// Grid geometry of a raster dataset
    pub fn grid_of(dataset: &Dataset) -> TairResult<GridSpec> {
        let (width, height) = dataset.raster_size();
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let epsg = dataset
            .spatial_ref()
            .ok()
            .and_then(|srs| srs.auth_code().ok())
            .and_then(|code| u32::try_from(code).ok());
        Ok(GridSpec::new(width, height, transform, epsg))
    }

    /// Read one band (1-based) as `f32`, nodata converted to missing
    pub fn read_band<P: AsRef<Path>>(path: P, band_index: isize) -> TairResult<(RasterImage, GridSpec)> {
        log::info!("Reading raster from: {}", path.as_ref().display());
        let dataset = Dataset::open(path.as_ref())?;
        let grid = Self::grid_of(&dataset)?;
        let data = Self::read_dataset_band(&dataset, band_index, &grid)?;
        Ok((data, grid))
    }

    /// Read one band and resample it onto the working grid
    pub fn read_aligned<P: AsRef<Path>>(path: P, band_index: isize, grid: &GridSpec) -> TairResult<RasterImage> {
        let (data, source_grid) = Self::read_band(path, band_index)?;
        resample_nearest(&data, &source_grid, grid)
    }

    /// Read every band with its description (or `B<n>` when unnamed)
    pub fn read_all_bands(dataset: &Dataset, grid: &GridSpec) -> TairResult<Vec<(String, RasterImage)>> {
        let count = dataset.raster_count();
        let mut bands = Vec::with_capacity(count.max(0) as usize);
        for index in 1..=count {
            let band = dataset.rasterband(index)?;
            let name = band
                .description()
                .ok()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| format!("B{}", index));
            bands.push((name, Self::read_dataset_band(dataset, index, grid)?));
        }
        Ok(bands)
    }

    fn read_dataset_band(dataset: &Dataset, band_index: isize, grid: &GridSpec) -> TairResult<RasterImage> {
        let (width, height) = (grid.width, grid.height);
        let band = dataset.rasterband(band_index)?;
        let no_data = band.no_data_value();
        let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        let mut data = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| TairError::Processing(format!("Failed to reshape raster data: {}", e)))?;

        if let Some(nd) = no_data.filter(|v| !v.is_nan()) {
            let nd = nd as Cell;
            data.mapv_inplace(|v| if v == nd { Cell::NAN } else { v });
        }
        Ok(data)
    }
}

/// Nearest-neighbour resampling between grids of the same spatial reference
pub fn resample_nearest(data: &RasterImage, source: &GridSpec, target: &GridSpec) -> TairResult<RasterImage> {
    if let (Some(a), Some(b)) = (source.epsg, target.epsg) {
        if a != b {
            return Err(TairError::GridMismatch {
                expected: format!("EPSG:{}", b),
                found: format!("EPSG:{}", a),
            });
        }
    }
    if data.dim() != source.shape() {
        return Err(TairError::GridMismatch {
            expected: format!("{:?}", source.shape()),
            found: format!("{:?}", data.dim()),
        });
    }

    let aligned = source.width == target.width
        && source.height == target.height
        && source.transform == target.transform;
    if aligned {
        return Ok(data.clone());
    }

    log::debug!(
        "Resampling {}x{} raster onto {}x{} grid",
        source.width,
        source.height,
        target.width,
        target.height
    );

    Ok(Array2::from_shape_fn(target.shape(), |(i, j)| {
        let (x, y) = target.transform.pixel_center(i, j);
        let (r, c) = source.transform.world_to_pixel(x, y);
        if r < 0.0 || c < 0.0 {
            return Cell::NAN;
        }
        let (r, c) = (r.floor() as usize, c.floor() as usize);
        if r < source.height && c < source.width {
            data[[r, c]]
        } else {
            Cell::NAN
        }
    }))
}

/// Single-band Float32 GeoTIFF writer for prediction surfaces
pub struct GeoTiffWriter;

impl GeoTiffWriter {
    pub fn write_surface<P: AsRef<Path>>(
        surface: &PredictionSurface,
        output_path: P,
        display_range: Option<(f64, f64)>,
    ) -> TairResult<()> {
        log::info!("Saving prediction surface as GeoTIFF: {}", output_path.as_ref().display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = surface.data.dim();

        let mut dataset = driver.create_with_band_type::<f32, _>(
            output_path.as_ref(),
            width as isize,
            height as isize,
            1,
        )?;

        dataset.set_geo_transform(&surface.grid.transform.to_gdal())?;
        if let Some(epsg) = surface.grid.epsg {
            dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;
        }
        if let Some((min, max)) = display_range {
            dataset.set_metadata_item("DISPLAY_MIN", &min.to_string(), "")?;
            dataset.set_metadata_item("DISPLAY_MAX", &max.to_string(), "")?;
        }

        let mut rasterband = dataset.rasterband(1)?;
        rasterband.set_description(&surface.name)?;
        let flat_data: Vec<f32> = surface.data.iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;
        rasterband.set_no_data_value(Some(f64::NAN))?;

        log::info!("GeoTIFF saved ({} valid pixels)", surface.valid_count());
        Ok(())
    }
}
