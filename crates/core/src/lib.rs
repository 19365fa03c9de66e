//! # EcoSDM Core
//!
//! Core types and I/O for species distribution modeling.
//!
//! This crate provides:
//! - `Raster`: georeferenced single-band environmental layer
//! - `LayerStack`: aligned set of layers loaded from GeoTIFF files
//! - `OccurrenceSet`: presence/absence records with sampled covariates
//! - `GeoTransform`, `Bounds` and `CRS` for georeferencing
//! - `SdmContext`: logging handle for one modeling run
//! - GeoTIFF reading and writing

pub mod context;
pub mod crs;
pub mod error;
pub mod io;
pub mod occurrence;
pub mod raster;
pub mod stack;

pub use context::SdmContext;
pub use crs::CRS;
pub use error::{Error, ErrorCategory, Result};
pub use io::RasterProfile;
pub use occurrence::{ColumnNames, GeoPoint, Occurrence, OccurrenceSet};
pub use raster::{Bounds, GeoTransform, Raster};
pub use stack::{aggregate_bounds, load_stack, LayerStack, RasterSource};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::context::SdmContext;
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::io::RasterProfile;
    pub use crate::occurrence::{ColumnNames, GeoPoint, Occurrence, OccurrenceSet};
    pub use crate::raster::{Bounds, GeoTransform, Raster};
    pub use crate::stack::{LayerStack, RasterSource};
}
