//! Point value extraction
//!
//! Samples every layer at a list of coordinates, producing a
//! [points x layers] matrix. Samples falling outside a layer, on a
//! no-data cell, or in a layer that cannot be read are NaN; a bad sample
//! never aborts the batch.

use crate::matrix::SpatialFeatureGrid;
use ecosdm_core::io::read_geotiff;
use ecosdm_core::occurrence::{GeoPoint, OccurrenceSet};
use ecosdm_core::raster::Raster;
use ecosdm_core::stack::{LayerStack, RasterSource};
use ecosdm_core::{Result, SdmContext};
use ndarray::Array2;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Value of `layer` at a coordinate, using the layer's own transform.
pub fn sample_layer(layer: &Raster, point: GeoPoint) -> f64 {
    match layer.index_of(point.lon, point.lat) {
        // SAFETY: index_of only returns in-range indices
        Some((row, col)) => layer.mask_value(unsafe { layer.get_unchecked(row, col) }),
        None => f64::NAN,
    }
}

/// Feature vector of one coordinate across `layers`
pub fn sample_point(layers: &[Raster], point: GeoPoint) -> Vec<f64> {
    layers.iter().map(|layer| sample_layer(layer, point)).collect()
}

/// Sample in-memory layers at every coordinate.
pub fn extract_from_layers(points: &[GeoPoint], layers: &[Raster]) -> Array2<f64> {
    let mut out = Array2::from_elem((points.len(), layers.len()), f64::NAN);
    for (i, &point) in points.iter().enumerate() {
        for (j, layer) in layers.iter().enumerate() {
            out[(i, j)] = sample_layer(layer, point);
        }
    }
    out
}

/// Sample raster files at every coordinate.
///
/// A file that fails to read contributes a NaN column and a warning;
/// the remaining layers are still sampled.
pub fn extract_from_files(points: &[GeoPoint], files: &[PathBuf]) -> Array2<f64> {
    let mut out = Array2::from_elem((points.len(), files.len()), f64::NAN);
    for (j, path) in files.iter().enumerate() {
        let layer = match read_geotiff(path) {
            Ok(layer) => layer,
            Err(e) => {
                warn!("could not sample {}: {}", path.display(), e);
                continue;
            }
        };
        for (i, &point) in points.iter().enumerate() {
            out[(i, j)] = sample_layer(&layer, point);
        }
    }
    out
}

/// Resolve `source` and sample its files
pub fn extract_from_source(
    points: &[GeoPoint],
    source: &RasterSource,
    ctx: &SdmContext,
) -> Result<Array2<f64>> {
    ctx.scope("extract", || {
        let files = source.resolve()?;
        Ok(extract_from_files(points, &files))
    })
}

/// Sample an in-memory grid using its bounds and resolution.
///
/// `col = floor((lon - min_x) / res_x)`, `row = floor((max_y - lat) / res_y)`.
/// Coordinates outside the (inclusive) bounds, or mapping to an index
/// past the last row or column, are NaN.
pub fn extract_from_grid(points: &[GeoPoint], grid: &SpatialFeatureGrid) -> Array2<f64> {
    let bounds = grid.bounds();
    let (res_x, res_y) = grid.resolution();
    let (rows, cols) = grid.shape();
    let mut out = Array2::from_elem((points.len(), grid.n_layers()), f64::NAN);

    for (i, point) in points.iter().enumerate() {
        if !bounds.contains(point.lon, point.lat) {
            continue;
        }
        let col = ((point.lon - bounds.min_x) / res_x).floor();
        let row = ((bounds.max_y - point.lat) / res_y).floor();
        if !(col >= 0.0 && row >= 0.0) || col as usize >= cols || row as usize >= rows {
            continue;
        }
        out.row_mut(i).assign(&grid.feature(row as usize, col as usize));
    }
    out
}

/// Append one covariate column per layer, named after the layer.
pub fn augment_occurrences(
    occurrences: &mut OccurrenceSet,
    stack: &LayerStack,
    ctx: &SdmContext,
) -> Result<()> {
    ctx.scope("extract", || {
        let values = extract_from_layers(&occurrences.coordinates(), stack.layers());
        for (j, layer) in stack.iter().enumerate() {
            occurrences.add_covariate(layer.name(), values.column(j).to_vec())?;
        }
        let missing = values.iter().filter(|v| v.is_nan()).count();
        debug!(
            points = occurrences.len(),
            layers = stack.len(),
            missing,
            "augmented occurrences"
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::stack_to_grid;
    use ecosdm_core::io::{write_geotiff, RasterProfile};
    use ecosdm_core::GeoTransform;

    fn layer(name: &str, values: Vec<f64>) -> Raster {
        Raster::from_vec(values, 2, 2)
            .unwrap()
            .with_name(name)
            .with_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0))
    }

    fn stack() -> LayerStack {
        LayerStack::new(vec![
            layer("a", vec![1.0, 2.0, 3.0, 4.0]),
            layer("b", vec![10.0, 20.0, 30.0, 40.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_extract_from_layers() {
        let points = [
            GeoPoint::new(0.5, 1.5),
            GeoPoint::new(1.5, 0.5),
            GeoPoint::new(5.0, 5.0),
        ];
        let m = extract_from_layers(&points, stack().layers());
        assert_eq!(m.row(0).to_vec(), vec![1.0, 10.0]);
        assert_eq!(m.row(1).to_vec(), vec![4.0, 40.0]);
        assert!(m.row(2).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_extract_from_grid_edges() {
        let grid = stack_to_grid(&stack()).unwrap();
        let points = [
            GeoPoint::new(0.0, 2.0),  // top-left corner
            GeoPoint::new(2.0, 1.5),  // right edge: col == cols
            GeoPoint::new(-0.1, 1.0), // outside
            GeoPoint::new(1.2, 0.3),
        ];
        let m = extract_from_grid(&points, &grid);
        assert_eq!(m.row(0).to_vec(), vec![1.0, 10.0]);
        assert!(m[(1, 0)].is_nan());
        assert!(m[(2, 1)].is_nan());
        assert_eq!(m.row(3).to_vec(), vec![4.0, 40.0]);
    }

    #[test]
    fn test_unreadable_file_is_nan_column() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.tif");
        let raster = layer("a", vec![1.0, 2.0, 3.0, 4.0]);
        write_geotiff(&raster, &good, &RasterProfile::for_raster(&raster)).unwrap();
        let bad = dir.path().join("missing.tif");

        let m = extract_from_files(&[GeoPoint::new(1.5, 1.5)], &[good, bad]);
        assert_eq!(m[(0, 0)], 2.0);
        assert!(m[(0, 1)].is_nan());
    }

    #[test]
    fn test_extract_from_empty_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = RasterSource::from_path(dir.path()).unwrap();
        let err = extract_from_source(&[GeoPoint::new(0.5, 0.5)], &source, &SdmContext::default())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_augment_occurrences() {
        let mut occ = OccurrenceSet::from_coordinates(&[GeoPoint::new(0.5, 0.5)]);
        augment_occurrences(&mut occ, &stack(), &SdmContext::default()).unwrap();
        assert_eq!(occ.covariate("a"), Some(&[3.0][..]));
        assert_eq!(occ.covariate("b"), Some(&[30.0][..]));
    }
}
