//! I/O operations for reading and writing georeferenced layers

mod native;
mod profile;

pub use native::{read_geotiff, write_geotiff};
pub use profile::{RasterProfile, FLOAT32_NODATA};

// Buffer-based I/O (no filesystem dependency)
pub use native::{read_geotiff_from_buffer, write_geotiff_to_buffer};
