//! Sample covariance and its inverse for Mahalanobis scoring

use crate::matrix::complete_rows;
use ecosdm_core::{Error, Result};
use nalgebra::DMatrix;
use ndarray::ArrayView2;

/// Reciprocal condition number below which a covariance is treated as singular
pub const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Sample covariance (ddof = 1) of the complete rows of a
/// [points x layers] matrix.
pub fn covariance(features: ArrayView2<'_, f64>) -> Result<DMatrix<f64>> {
    let (complete, _) = complete_rows(features);
    let (n, p) = complete.dim();
    if n < 2 {
        return Err(Error::InvalidInput(format!(
            "covariance needs at least 2 complete feature vectors, got {}",
            n
        )));
    }

    let means: Vec<f64> = (0..p).map(|j| complete.column(j).sum() / n as f64).collect();

    let mut cov = DMatrix::zeros(p, p);
    for i in 0..p {
        for j in i..p {
            let s: f64 = complete
                .outer_iter()
                .map(|row| (row[i] - means[i]) * (row[j] - means[j]))
                .sum();
            let v = s / (n - 1) as f64;
            cov[(i, j)] = v;
            cov[(j, i)] = v;
        }
    }
    Ok(cov)
}

/// Inverse of a covariance matrix.
///
/// Singular or near-singular input is a numerical error tagged with
/// `context`.
pub fn invert_covariance(cov: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    let singular = || Error::SingularMatrix {
        context: context.to_string(),
    };

    let sv = cov.clone().singular_values();
    let max = sv.max();
    let min = sv.min();
    if !(max > 0.0) || !max.is_finite() || min / max < SINGULARITY_TOLERANCE {
        return Err(singular());
    }

    cov.clone().try_inverse().ok_or_else(singular)
}

/// Inverse covariance of occurrence features, for Mahalanobis distance
pub fn inverse_covariance(features: ArrayView2<'_, f64>) -> Result<DMatrix<f64>> {
    invert_covariance(&covariance(features)?, "Mahalanobis distance")
}
