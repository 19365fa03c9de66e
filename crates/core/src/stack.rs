//! Raster source resolution and layer stacks
//!
//! A modeling run works on an ordered set of environmental layers. The
//! order fixed here is the column order of every feature matrix built
//! later, so it must be reproducible: directory listings are sorted by
//! file name, explicit lists keep the caller's order.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::read_geotiff;
use crate::raster::{Bounds, GeoTransform, Raster};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File extensions accepted when scanning a directory (case-insensitive)
pub const RASTER_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

/// Tolerance used when comparing layer transforms
const TRANSFORM_TOLERANCE: f64 = 1e-9;

/// Where the layers of a run come from.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterSource {
    /// Every `.tif`/`.tiff` file directly inside a directory
    Directory(PathBuf),
    /// A single raster file
    File(PathBuf),
    /// An explicit ordered list of raster files
    Files(Vec<PathBuf>),
}

impl RasterSource {
    /// Classify an existing path as a directory or a single file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            Ok(RasterSource::Directory(path.to_path_buf()))
        } else if path.is_file() {
            Ok(RasterSource::File(path.to_path_buf()))
        } else {
            Err(Error::InvalidInput(format!(
                "raster source must be a directory, a raster file or a list of files: {}",
                path.display()
            )))
        }
    }

    /// Build a source from command-line style arguments: one argument is
    /// classified with [`RasterSource::from_path`], several form a list.
    pub fn from_args(paths: &[PathBuf]) -> Result<Self> {
        match paths {
            [] => Err(Error::NoInput("no raster source given".into())),
            [single] => Self::from_path(single),
            many => Ok(RasterSource::Files(many.to_vec())),
        }
    }

    /// Ordered list of raster files this source designates.
    pub fn resolve(&self) -> Result<Vec<PathBuf>> {
        let files = match self {
            RasterSource::Directory(dir) => {
                let mut files = Vec::new();
                for entry in fs::read_dir(dir)? {
                    let path = entry?.path();
                    if path.is_file() && has_raster_extension(&path) {
                        files.push(path);
                    }
                }
                files.sort();
                files
            }
            RasterSource::File(path) => {
                if !path.is_file() {
                    return Err(Error::InvalidInput(format!(
                        "raster file not found: {}",
                        path.display()
                    )));
                }
                vec![path.clone()]
            }
            RasterSource::Files(paths) => paths.clone(),
        };

        if files.is_empty() {
            return Err(Error::NoInput(format!("no raster layers found in {}", self)));
        }
        Ok(files)
    }
}

impl std::fmt::Display for RasterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RasterSource::Directory(p) => write!(f, "directory {}", p.display()),
            RasterSource::File(p) => write!(f, "file {}", p.display()),
            RasterSource::Files(ps) => write!(f, "list of {} files", ps.len()),
        }
    }
}

impl From<Vec<PathBuf>> for RasterSource {
    fn from(paths: Vec<PathBuf>) -> Self {
        RasterSource::Files(paths)
    }
}

fn has_raster_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| RASTER_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Ordered, aligned set of environmental layers.
///
/// Every layer has the same shape and the same transform as the first
/// one. The stack is never mutated after construction.
#[derive(Debug, Clone)]
pub struct LayerStack {
    layers: Vec<Raster>,
}

impl LayerStack {
    /// Validate alignment and build the stack.
    pub fn new(layers: Vec<Raster>) -> Result<Self> {
        let first = layers
            .first()
            .ok_or_else(|| Error::NoInput("layer stack is empty".into()))?;

        for layer in &layers[1..] {
            if layer.shape() != first.shape() {
                return Err(Error::LayerMismatch {
                    layer: layer.name().to_string(),
                    reason: format!(
                        "shape {:?} differs from {:?} of '{}'",
                        layer.shape(),
                        first.shape(),
                        first.name()
                    ),
                });
            }
            if !layer.transform().approx_eq(first.transform(), TRANSFORM_TOLERANCE) {
                return Err(Error::LayerMismatch {
                    layer: layer.name().to_string(),
                    reason: format!("transform differs from '{}'", first.name()),
                });
            }
            match (layer.crs(), first.crs()) {
                (Some(a), Some(b)) if !a.is_equivalent(b) => {
                    warn!(layer = layer.name(), "CRS {} differs from {}", a, b);
                }
                _ => {}
            }
        }

        Ok(Self { layers })
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Raster] {
        &self.layers
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Raster> {
        self.layers.iter()
    }

    pub fn into_layers(self) -> Vec<Raster> {
        self.layers
    }

    /// Layer identifiers in stack order
    pub fn names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name().to_string()).collect()
    }

    /// Reference layer for shared metadata
    pub fn first(&self) -> &Raster {
        &self.layers[0]
    }

    /// Common (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.first().shape()
    }

    /// Pixel size of the first layer
    pub fn resolution(&self) -> (f64, f64) {
        self.first().resolution()
    }

    pub fn transform(&self) -> &GeoTransform {
        self.first().transform()
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.first().crs()
    }

    /// Union of every layer's bounds
    pub fn bounds(&self) -> Bounds {
        aggregate_bounds(&self.layers)
    }
}

impl<'a> IntoIterator for &'a LayerStack {
    type Item = &'a Raster;
    type IntoIter = std::slice::Iter<'a, Raster>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}

/// Union of the bounds of `layers`.
///
/// The result can exceed the coverage of any single layer when layers
/// are offset from each other.
pub fn aggregate_bounds(layers: &[Raster]) -> Bounds {
    layers
        .iter()
        .fold(Bounds::empty(), |acc, layer| acc.union(&layer.bounds()))
}

/// Resolve `source` and read every layer. Any unreadable layer is fatal.
pub fn load_stack(source: &RasterSource) -> Result<LayerStack> {
    let files = source.resolve()?;
    info!("Loading {} raster layers from {}", files.len(), source);

    let mut layers = Vec::with_capacity(files.len());
    for path in &files {
        let layer = read_geotiff(path)?;
        debug!(
            layer = layer.name(),
            rows = layer.rows(),
            cols = layer.cols(),
            "read {}",
            path.display()
        );
        layers.push(layer);
    }

    LayerStack::new(layers)
}
