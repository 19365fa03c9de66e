//! Georeferencing profile handed to the raster writer

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use serde::{Deserialize, Serialize};

/// Everything the writer needs to persist a single-band result surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterProfile {
    pub driver: String,
    pub dtype: String,
    pub nodata: Option<f64>,
    pub width: usize,
    pub height: usize,
    pub count: usize,
    pub crs: Option<CRS>,
    pub transform: GeoTransform,
}

/// No-data sentinel of float32 environmental layers (-FLT_MAX rounded)
pub const FLOAT32_NODATA: f64 = -3.3999999521443642e38;

impl RasterProfile {
    /// Profile matching the extent, georeferencing and no-data value of
    /// `raster`. Rasters without a no-data value get [`FLOAT32_NODATA`].
    pub fn for_raster(raster: &Raster) -> Self {
        Self {
            nodata: raster.nodata().or(Some(FLOAT32_NODATA)),
            width: raster.cols(),
            height: raster.rows(),
            crs: raster.crs().cloned(),
            transform: *raster.transform(),
            ..Self::default()
        }
    }

    /// Profile for a grid of `height` x `width` cells
    pub fn for_extent(height: usize, width: usize, transform: GeoTransform, crs: Option<CRS>) -> Self {
        Self {
            width,
            height,
            crs,
            transform,
            ..Self::default()
        }
    }

    /// Check the profile can be written by the native writer and fits `raster`
    pub fn validate_for(&self, raster: &Raster) -> Result<()> {
        if !self.driver.eq_ignore_ascii_case("GTiff") {
            return Err(Error::InvalidParameter {
                name: "driver",
                value: self.driver.clone(),
                reason: "only GTiff is supported".into(),
            });
        }
        if self.dtype != "float32" {
            return Err(Error::InvalidParameter {
                name: "dtype",
                value: self.dtype.clone(),
                reason: "only float32 is supported".into(),
            });
        }
        if self.count != 1 {
            return Err(Error::InvalidParameter {
                name: "count",
                value: self.count.to_string(),
                reason: "result surfaces are single-band".into(),
            });
        }
        if (self.height, self.width) != raster.shape() {
            return Err(Error::SizeMismatch {
                er: self.height,
                ec: self.width,
                ar: raster.rows(),
                ac: raster.cols(),
            });
        }
        Ok(())
    }
}

impl Default for RasterProfile {
    /// 2.5 arc-minute grid over Brazil, north-west corner at (-74.0, 5.25)
    fn default() -> Self {
        let resolution = 0.04167;
        Self {
            driver: "GTiff".to_string(),
            dtype: "float32".to_string(),
            nodata: Some(FLOAT32_NODATA),
            width: 943,
            height: 937,
            count: 1,
            crs: Some(CRS::wgs84()),
            transform: GeoTransform::new(-74.0, 5.25, resolution, -resolution),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let p = RasterProfile::default();
        assert_eq!((p.height, p.width), (937, 943));
        assert_eq!(p.transform.origin_x, -74.0);
        assert_eq!(p.crs, Some(CRS::Epsg(4326)));
    }

    #[test]
    fn test_for_raster_keeps_nodata() {
        let mut raster = Raster::new(2, 2);
        assert_eq!(RasterProfile::for_raster(&raster).nodata, Some(FLOAT32_NODATA));

        raster.set_nodata(Some(f64::NAN));
        assert!(RasterProfile::for_raster(&raster).nodata.unwrap().is_nan());
    }

    #[test]
    fn test_validate_for() {
        let raster = Raster::new(3, 4);
        let mut p = RasterProfile::for_raster(&raster);
        assert!(p.validate_for(&raster).is_ok());

        p.count = 2;
        assert!(p.validate_for(&raster).is_err());

        let other = RasterProfile::for_raster(&Raster::new(4, 3));
        assert!(matches!(
            other.validate_for(&raster),
            Err(Error::SizeMismatch { .. })
        ));
    }
}
