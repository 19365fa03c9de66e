//! Principal component analysis of a layer stack
//!
//! Pixels missing in any layer are left out of the fit and come back as
//! NaN in every component raster. Components are computed from the SVD of
//! the centered [pixels x layers] matrix; the sign of each component is
//! fixed so that its largest loading is positive.

use crate::matrix::{complete_rows, scatter, SpatialFeatureGrid};
use ecosdm_core::raster::Raster;
use ecosdm_core::{Error, Result, SdmContext};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Parameters for PCA
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaParams {
    /// Number of components to keep (default: 3)
    pub n_components: usize,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self { n_components: 3 }
    }
}

/// Result of PCA
#[derive(Debug, Clone)]
pub struct PcaResult {
    /// Component rasters, named `pca_component_1`, `pca_component_2`, ...
    pub components: Vec<Raster>,
    /// [components x layers] unit loading vectors
    pub loadings: Array2<f64>,
    /// Variance of each component's scores (ddof = 1)
    pub explained_variance: Vec<f64>,
    /// Share of the total variance carried by each component
    pub explained_variance_ratio: Vec<f64>,
    /// Number of complete pixels used in the fit
    pub n_samples: usize,
}

/// Project the complete pixels of `grid` onto its first principal components.
pub fn pca(grid: &SpatialFeatureGrid, params: &PcaParams, ctx: &SdmContext) -> Result<PcaResult> {
    ctx.scope("pca", || decompose(grid, params))
}

fn decompose(grid: &SpatialFeatureGrid, params: &PcaParams) -> Result<PcaResult> {
    let pixels = grid.pixel_matrix();
    let (samples, kept) = complete_rows(pixels.view());
    let (n, p) = samples.dim();
    if n == 0 {
        return Err(Error::NoData(
            "no pixel has a value in every layer; nothing to decompose".into(),
        ));
    }

    let k = params.n_components;
    if k == 0 || k > n.min(p) {
        return Err(Error::InvalidParameter {
            name: "n_components",
            value: k.to_string(),
            reason: format!("must be between 1 and min({} pixels, {} layers)", n, p),
        });
    }

    let means: Array1<f64> = samples.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(p));
    let centered = &samples - &means;

    let x = DMatrix::from_row_slice(n, p, &centered.iter().copied().collect::<Vec<_>>());
    let svd = x.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| Error::Algorithm("SVD did not return right singular vectors".into()))?;
    let singular = svd.singular_values;

    let mut order: Vec<usize> = (0..singular.len()).collect();
    order.sort_by(|&a, &b| singular[b].total_cmp(&singular[a]));

    let total: f64 = singular.iter().map(|s| s * s).sum();
    let ddof = (n.max(2) - 1) as f64;

    let mut loadings = Array2::zeros((k, p));
    let mut explained_variance = Vec::with_capacity(k);
    let mut explained_variance_ratio = Vec::with_capacity(k);
    for (c, &i) in order.iter().take(k).enumerate() {
        let mut v: Vec<f64> = v_t.row(i).iter().copied().collect();
        let pivot = v.iter().copied().fold(0.0_f64, |m, x| if x.abs() > m.abs() { x } else { m });
        if pivot < 0.0 {
            v.iter_mut().for_each(|x| *x = -*x);
        }
        loadings.row_mut(c).assign(&Array1::from(v));

        let s2 = singular[i] * singular[i];
        explained_variance.push(s2 / ddof);
        explained_variance_ratio.push(if total > 0.0 { s2 / total } else { 0.0 });
    }

    let scores = centered.dot(&loadings.t());
    let (rows, cols) = grid.shape();
    let components = scores
        .axis_iter(Axis(1))
        .enumerate()
        .map(|(c, column)| {
            let full = scatter(&column.to_vec(), &kept, rows * cols);
            let data = Array2::from_shape_vec((rows, cols), full)?;
            grid.surface(&format!("pca_component_{}", c + 1), data)
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(samples = n, layers = p, "fitted principal components");
    info!(
        "PCA: {} components explain {:.1}% of the variance",
        k,
        100.0 * explained_variance_ratio.iter().sum::<f64>()
    );

    Ok(PcaResult {
        components,
        loadings,
        explained_variance,
        explained_variance_ratio,
        n_samples: n,
    })
}
