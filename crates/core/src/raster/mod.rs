//! Raster layers, georeferencing and bounds

mod bounds;
mod geotransform;
mod grid;

pub use bounds::Bounds;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
