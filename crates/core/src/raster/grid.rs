//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{Bounds, GeoTransform};
use ndarray::{Array2, ArrayView2};

/// A georeferenced single-band raster layer.
///
/// Cells are `f64`. `nodata` is the sentinel declared by the source file;
/// it is kept as metadata and is distinct from NaN, which is the missing
/// marker used by every feature matrix built from the layer.
///
/// # Example
///
/// ```ignore
/// use ecosdm_core::Raster;
///
/// let mut layer = Raster::new(100, 100).with_name("bio1");
/// layer.set(10, 20, 24.5)?;
/// let value = layer.get(10, 20)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster {
    /// Layer identifier (file stem for layers read from disk)
    name: String,
    /// Cell values in row-major order (row, col)
    data: Array2<f64>,
    /// Affine transformation
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// Declared no-data sentinel
    nodata: Option<f64>,
}

impl Raster {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        Ok(Self::from_array(Array2::from_shape_vec((rows, cols), data)?))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<f64>) -> Self {
        Self {
            name: String::new(),
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Same georeferencing, new cell values
    pub fn with_same_meta(&self, data: Array2<f64>) -> Result<Self> {
        if data.dim() != self.shape() {
            let (ar, ac) = data.dim();
            return Err(Error::SizeMismatch {
                er: self.rows(),
                ec: self.cols(),
                ar,
                ac,
            });
        }
        Ok(Self {
            name: self.name.clone(),
            data,
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: Some(f64::NAN),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    // Dimensions

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> f64 {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Value at (row, col) with the no-data sentinel mapped to NaN
    pub fn masked(&self, row: usize, col: usize) -> Result<f64> {
        self.get(row, col).map(|v| self.mask_value(v))
    }

    /// Map the no-data sentinel to NaN
    #[inline]
    pub fn mask_value(&self, value: f64) -> f64 {
        if self.is_nodata(value) {
            f64::NAN
        } else {
            value
        }
    }

    /// Copy of the cell values with no-data mapped to NaN
    pub fn masked_array(&self) -> Array2<f64> {
        self.data.mapv(|v| self.mask_value(v))
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }

    pub fn into_array(self) -> Array2<f64> {
        self.data
    }

    // Metadata

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    /// Pixel size as positive (x, y)
    pub fn resolution(&self) -> (f64, f64) {
        self.transform.resolution()
    }

    /// Geographic bounds of the full grid
    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.cols(), self.rows())
    }

    // Coordinate conversion

    /// Pixel (row, col) covering (x, y), if inside the grid
    pub fn index_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        self.transform.geo_to_index(x, y, self.rows(), self.cols())
    }

    /// Geographic coordinates of a pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Whether a value is missing: NaN, or within tolerance of the sentinel
    pub fn is_nodata(&self, value: f64) -> bool {
        if value.is_nan() {
            return true;
        }
        match self.nodata {
            Some(nd) if nd.is_nan() => false,
            Some(nd) => (value - nd).abs() <= f64::EPSILON * 100.0 * nd.abs().max(1.0),
            None => false,
        }
    }

    // Statistics

    /// Basic statistics over valid cells
    pub fn statistics(&self) -> RasterStatistics {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut count = 0usize;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }
            min = min.min(value);
            max = max.max(value);
            sum += value;
            count += 1;
        }

        let (min, max, mean) = if count > 0 {
            (Some(min), Some(max), Some(sum / count as f64))
        } else {
            (None, None, None)
        };

        RasterStatistics {
            min,
            max,
            mean,
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster = Raster::new(100, 200).with_name("bio1");
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
        assert_eq!(raster.name(), "bio1");
    }

    #[test]
    fn test_raster_access() {
        let mut raster = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_nodata_masking() {
        let mut raster = Raster::from_vec(vec![1.0, -9999.0, f64::NAN, 4.0], 2, 2).unwrap();
        raster.set_nodata(Some(-9999.0));

        assert_eq!(raster.get(0, 1).unwrap(), -9999.0);
        assert!(raster.masked(0, 1).unwrap().is_nan());
        assert!(raster.masked(1, 0).unwrap().is_nan());
        assert_eq!(raster.masked(1, 1).unwrap(), 4.0);

        let stats = raster.statistics();
        assert_eq!(stats.valid_count, 2);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(4.0));
        assert_eq!(stats.mean, Some(2.5));
    }

    #[test]
    fn test_large_sentinel() {
        let mut raster = Raster::from_vec(vec![-3.3999999521443642e38, 0.5], 1, 2).unwrap();
        raster.set_nodata(Some(-3.3999999521443642e38));
        assert!(raster.masked(0, 0).unwrap().is_nan());
        assert_eq!(raster.masked(0, 1).unwrap(), 0.5);
    }

    #[test]
    fn test_with_same_meta_checks_shape() {
        let raster = Raster::new(2, 3);
        assert!(raster.with_same_meta(Array2::zeros((3, 2))).is_err());
        let out = raster.with_same_meta(Array2::zeros((2, 3))).unwrap();
        assert!(out.nodata().unwrap().is_nan());
    }
}
