//! Raster-to-matrix conversion
//!
//! Two views of a layer stack:
//! - [`SpatialFeatureGrid`]: (rows, cols, layers) cube keeping the full
//!   extent, one feature vector per pixel. Used for prediction.
//! - [`FlatFeatureMatrix`]: [layers x pixels] matrix with the pixels that
//!   are missing in *every* layer dropped. Pixels missing in only some
//!   layers are kept.
//!
//! Prediction paths instead drop pixels missing in *any* layer, see
//! [`complete_rows`]. The two policies are deliberately separate.

use ecosdm_core::io::RasterProfile;
use ecosdm_core::raster::{Bounds, GeoTransform, Raster};
use ecosdm_core::stack::{load_stack, LayerStack, RasterSource};
use ecosdm_core::{Error, Result, SdmContext, CRS};
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use tracing::debug;

/// Full-extent feature cube of a layer stack.
#[derive(Debug, Clone)]
pub struct SpatialFeatureGrid {
    data: Array3<f64>,
    names: Vec<String>,
    resolution: (f64, f64),
    bounds: Bounds,
    transform: GeoTransform,
    crs: Option<CRS>,
}

impl SpatialFeatureGrid {
    /// Build a grid from an in-memory cube.
    ///
    /// Resolution and bounds are derived from `transform`.
    pub fn from_parts(
        data: Array3<f64>,
        names: Vec<String>,
        transform: GeoTransform,
        crs: Option<CRS>,
    ) -> Result<Self> {
        let (rows, cols, layers) = data.dim();
        if names.len() != layers {
            return Err(Error::InvalidInput(format!(
                "{} layer names for {} layers",
                names.len(),
                layers
            )));
        }
        if rows == 0 || cols == 0 || layers == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        Ok(Self {
            data,
            names,
            resolution: transform.resolution(),
            bounds: transform.bounds(cols, rows),
            transform,
            crs,
        })
    }

    pub fn rows(&self) -> usize {
        self.data.dim().0
    }

    pub fn cols(&self) -> usize {
        self.data.dim().1
    }

    pub fn n_layers(&self) -> usize {
        self.data.dim().2
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Pixel size of the first layer as (x, y)
    pub fn resolution(&self) -> (f64, f64) {
        self.resolution
    }

    /// Union of the bounds of the source layers
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn data(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    /// Feature vector of one pixel
    pub fn feature(&self, row: usize, col: usize) -> ArrayView1<'_, f64> {
        self.data.slice(s![row, col, ..])
    }

    /// All pixels as a [pixels x layers] matrix in row-major pixel order
    pub fn pixel_matrix(&self) -> Array2<f64> {
        let (rows, cols, layers) = self.data.dim();
        let flat: Vec<f64> = self.data.iter().copied().collect();
        // Standard layout iteration order is (row, col, layer)
        Array2::from_shape_vec((rows * cols, layers), flat)
            .unwrap_or_else(|_| Array2::zeros((0, layers)))
    }

    /// One layer as a 2D view
    pub fn layer(&self, index: usize) -> Option<ArrayView2<'_, f64>> {
        (index < self.n_layers()).then(|| self.data.index_axis(Axis(2), index))
    }

    /// Writer profile for result surfaces of this grid (no-data NaN)
    pub fn profile(&self) -> RasterProfile {
        RasterProfile {
            nodata: Some(f64::NAN),
            ..RasterProfile::for_extent(self.rows(), self.cols(), self.transform, self.crs.clone())
        }
    }

    /// Wrap a (rows, cols) result array as a raster with this grid's
    /// georeferencing. NaN is the no-data marker of the result.
    pub fn surface(&self, name: &str, data: Array2<f64>) -> Result<Raster> {
        if data.dim() != self.shape() {
            let (ar, ac) = data.dim();
            return Err(Error::SizeMismatch {
                er: self.rows(),
                ec: self.cols(),
                ar,
                ac,
            });
        }
        let mut raster = Raster::from_array(data)
            .with_name(name)
            .with_transform(self.transform);
        raster.set_crs(self.crs.clone());
        raster.set_nodata(Some(f64::NAN));
        Ok(raster)
    }
}

/// Stack every layer (no-data mapped to NaN) along a trailing axis.
pub fn stack_to_grid(stack: &LayerStack) -> Result<SpatialFeatureGrid> {
    let masked: Vec<Array2<f64>> = stack.iter().map(Raster::masked_array).collect();
    let views: Vec<ArrayView2<'_, f64>> = masked.iter().map(|a| a.view()).collect();
    let data = ndarray::stack(Axis(2), &views)?;

    let (rows, cols, layers) = data.dim();
    debug!(rows, cols, layers, "built spatial feature grid");

    Ok(SpatialFeatureGrid {
        data,
        names: stack.names(),
        resolution: stack.resolution(),
        bounds: stack.bounds(),
        transform: *stack.transform(),
        crs: stack.crs().cloned(),
    })
}

/// Load `source` and build its feature grid
pub fn raster_to_grid(source: &RasterSource, ctx: &SdmContext) -> Result<SpatialFeatureGrid> {
    ctx.scope("raster to grid", || stack_to_grid(&load_stack(source)?))
}

/// [layers x pixels] matrix with globally empty pixels removed.
#[derive(Debug, Clone)]
pub struct FlatFeatureMatrix {
    /// One row per layer, one column per kept pixel
    pub data: Array2<f64>,
    /// Row-major pixel index of every kept column
    pub pixels: Vec<usize>,
    pub names: Vec<String>,
}

/// Flatten a stack, keeping each pixel with data in at least one layer.
pub fn flatten_stack(stack: &LayerStack, ctx: &SdmContext) -> Result<FlatFeatureMatrix> {
    ctx.scope("raster to matrix", || flatten(stack))
}

fn flatten(stack: &LayerStack) -> Result<FlatFeatureMatrix> {
    let masked: Vec<Array2<f64>> = stack.iter().map(Raster::masked_array).collect();
    let n_pixels = masked.first().map_or(0, |a| a.len());

    let pixels: Vec<usize> = (0..n_pixels)
        .filter(|&p| {
            masked
                .iter()
                .any(|layer| layer.as_slice().map_or(false, |d| !d[p].is_nan()))
        })
        .collect();

    if pixels.is_empty() {
        return Err(Error::NoData("every pixel is missing in every layer".into()));
    }

    let mut data = Array2::from_elem((masked.len(), pixels.len()), f64::NAN);
    for (i, layer) in masked.iter().enumerate() {
        let values = layer.as_slice().unwrap_or(&[]);
        for (j, &p) in pixels.iter().enumerate() {
            data[(i, j)] = values[p];
        }
    }

    debug!(
        layers = masked.len(),
        kept = pixels.len(),
        dropped = n_pixels - pixels.len(),
        "flattened layer stack"
    );

    Ok(FlatFeatureMatrix {
        data,
        pixels,
        names: stack.names(),
    })
}

/// Load `source` and flatten it
pub fn raster_to_matrix(source: &RasterSource, ctx: &SdmContext) -> Result<FlatFeatureMatrix> {
    ctx.scope("raster to matrix", || flatten(&load_stack(source)?))
}

/// Rows of a [samples x features] matrix without any NaN.
///
/// Returns the complete rows and their original indices.
pub fn complete_rows(matrix: ArrayView2<'_, f64>) -> (Array2<f64>, Vec<usize>) {
    let keep: Vec<usize> = matrix
        .outer_iter()
        .enumerate()
        .filter(|(_, row)| row.iter().all(|v| !v.is_nan()))
        .map(|(i, _)| i)
        .collect();
    (matrix.select(Axis(0), &keep), keep)
}

/// Place `values` at `indices` of a NaN-filled vector of length `len`
pub fn scatter(values: &[f64], indices: &[usize], len: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; len];
    for (&i, &v) in indices.iter().zip(values) {
        if i < len {
            out[i] = v;
        }
    }
    out
}
