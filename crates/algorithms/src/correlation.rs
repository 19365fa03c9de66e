//! Layer correlation and collinearity filtering
//!
//! Correlations are computed over the pixels valid in both layers of each
//! pair. Highly correlated layers are then removed one at a time, always
//! dropping the layer with the most partners above the threshold.

use crate::matrix::SpatialFeatureGrid;
use ecosdm_core::{Error, Result, SdmContext};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Correlation coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
}

impl FromStr for CorrelationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pearson" => Ok(Self::Pearson),
            "spearman" => Ok(Self::Spearman),
            _ => Err(Error::UnknownMethod {
                kind: "correlation method",
                given: s.to_string(),
                expected: "pearson, spearman",
            }),
        }
    }
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pearson => f.write_str("pearson"),
            Self::Spearman => f.write_str("spearman"),
        }
    }
}

/// Parameters for the collinearity filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationParams {
    pub method: CorrelationMethod,
    /// Absolute correlation above which a pair is collinear (default: 0.75)
    pub threshold: f64,
}

impl Default for CorrelationParams {
    fn default() -> Self {
        Self {
            method: CorrelationMethod::Pearson,
            threshold: 0.75,
        }
    }
}

/// Outcome of the collinearity filter
#[derive(Debug, Clone)]
pub struct CorrelationReport {
    pub names: Vec<String>,
    /// Full correlation matrix, in `names` order
    pub matrix: Array2<f64>,
    /// Indices of the retained layers
    pub kept: Vec<usize>,
    /// Indices of the removed layers, in removal order
    pub removed: Vec<usize>,
}

impl CorrelationReport {
    pub fn kept_names(&self) -> Vec<&str> {
        self.kept.iter().map(|&i| self.names[i].as_str()).collect()
    }

    pub fn removed_names(&self) -> Vec<&str> {
        self.removed.iter().map(|&i| self.names[i].as_str()).collect()
    }
}

/// Pearson correlation of paired samples; NaN when undefined
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx.sqrt() * syy.sqrt())
}

/// 1-based ranks with ties given their average rank
pub fn rank(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Spearman correlation: Pearson of the ranks
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    pearson(&rank(x), &rank(y))
}

/// Correlation matrix of the columns of a [samples x variables] matrix,
/// each pair using only rows valid in both columns.
pub fn correlation_matrix(samples: ArrayView2<'_, f64>, method: CorrelationMethod) -> Array2<f64> {
    let p = samples.ncols();
    let mut out = Array2::from_elem((p, p), f64::NAN);
    for i in 0..p {
        for j in i..p {
            let (x, y): (Vec<f64>, Vec<f64>) = samples
                .column(i)
                .iter()
                .zip(samples.column(j).iter())
                .filter(|(a, b)| !a.is_nan() && !b.is_nan())
                .map(|(&a, &b)| (a, b))
                .unzip();
            let r = if i == j && x.len() >= 2 {
                1.0
            } else {
                match method {
                    CorrelationMethod::Pearson => pearson(&x, &y),
                    CorrelationMethod::Spearman => spearman(&x, &y),
                }
            };
            out[(i, j)] = r;
            out[(j, i)] = r;
        }
    }
    out
}

/// Iteratively drop collinear variables.
///
/// While any pair among the remaining variables has |r| > threshold,
/// remove the variable with the most entries above the threshold in its
/// column (first one on ties). Returns (kept, removed) indices.
pub fn filter_correlated(matrix: &Array2<f64>, threshold: f64) -> (Vec<usize>, Vec<usize>) {
    let mut kept: Vec<usize> = (0..matrix.nrows()).collect();
    let mut removed = Vec::new();
    let above = |i: usize, j: usize| matrix[(i, j)].abs() > threshold;

    loop {
        let collinear = kept
            .iter()
            .enumerate()
            .any(|(a, &i)| kept[a + 1..].iter().any(|&j| above(i, j)));
        if !collinear {
            break;
        }

        let mut worst = 0;
        let mut worst_count = 0;
        for (pos, &i) in kept.iter().enumerate() {
            let count = kept.iter().filter(|&&j| above(i, j)).count();
            if count > worst_count {
                worst = pos;
                worst_count = count;
            }
        }
        removed.push(kept.remove(worst));
    }

    (kept, removed)
}

/// Correlate the layers of `grid` and select a non-collinear subset.
pub fn select_layers(
    grid: &SpatialFeatureGrid,
    params: &CorrelationParams,
    ctx: &SdmContext,
) -> Result<CorrelationReport> {
    ctx.scope("correlation filter", || correlate_layers(grid, params))
}

fn correlate_layers(grid: &SpatialFeatureGrid, params: &CorrelationParams) -> Result<CorrelationReport> {
    if !(params.threshold >= 0.0 && params.threshold <= 1.0) {
        return Err(Error::InvalidParameter {
            name: "threshold",
            value: params.threshold.to_string(),
            reason: "must be in [0, 1]".into(),
        });
    }

    let pixels = grid.pixel_matrix();
    let matrix = correlation_matrix(pixels.view(), params.method);
    debug!(layers = grid.n_layers(), method = %params.method, "computed correlation matrix");

    let (kept, removed) = filter_correlated(&matrix, params.threshold);
    let report = CorrelationReport {
        names: grid.names().to_vec(),
        matrix,
        kept,
        removed,
    };
    info!(
        "Kept {} of {} layers (removed: {})",
        report.kept.len(),
        report.names.len(),
        report.removed_names().join(", ")
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ecosdm_core::GeoTransform;
    use ndarray::{array, Array3};

    #[test]
    fn test_pearson_and_spearman() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(pearson(&x, &[2.0, 4.0, 6.0, 8.0]), 1.0, epsilon = 1e-12);
        assert_relative_eq!(pearson(&x, &[4.0, 3.0, 2.0, 1.0]), -1.0, epsilon = 1e-12);
        // Monotone but not linear
        assert_relative_eq!(spearman(&x, &[1.0, 8.0, 27.0, 64.0]), 1.0, epsilon = 1e-12);
        assert!(pearson(&x, &[1.0, 1.0, 1.0, 1.0]).is_nan());
    }

    #[test]
    fn test_rank_ties() {
        assert_eq!(rank(&[10.0, 20.0, 10.0, 5.0]), vec![2.5, 4.0, 2.5, 1.0]);
    }

    #[test]
    fn test_pairwise_valid_rows() {
        let m = array![[1.0, 2.0], [2.0, f64::NAN], [3.0, 6.0], [4.0, 8.0]];
        let c = correlation_matrix(m.view(), CorrelationMethod::Pearson);
        assert_relative_eq!(c[(0, 1)], 1.0, epsilon = 1e-12);
        assert_eq!(c[(0, 0)], 1.0);
    }

    #[test]
    fn test_filter_removes_most_connected() {
        // a~b, a~c, b and c independent: only a goes
        let m = array![[1.0, 0.9, 0.8], [0.9, 1.0, 0.1], [0.8, 0.1, 1.0]];
        let (kept, removed) = filter_correlated(&m, 0.75);
        assert_eq!(kept, vec![1, 2]);
        assert_eq!(removed, vec![0]);
    }

    #[test]
    fn test_filter_first_on_ties() {
        let m = array![[1.0, -0.95], [-0.95, 1.0]];
        let (kept, removed) = filter_correlated(&m, 0.75);
        assert_eq!(kept, vec![1]);
        assert_eq!(removed, vec![0]);
    }

    #[test]
    fn test_select_layers() {
        let data = Array3::from_shape_fn((3, 3, 3), |(r, c, l)| {
            let v = (r * 3 + c) as f64;
            match l {
                0 => v,
                1 => 2.0 * v + 1.0,
                _ => ((r * 7 + c * 5) % 4) as f64,
            }
        });
        let grid = SpatialFeatureGrid::from_parts(
            data,
            vec!["bio1".into(), "bio5".into(), "soil".into()],
            GeoTransform::default(),
            None,
        )
        .unwrap();
        let report = select_layers(&grid, &CorrelationParams::default(), &SdmContext::default()).unwrap();
        assert_eq!(report.removed_names(), vec!["bio1"]);
        assert_eq!(report.kept_names(), vec!["bio5", "soil"]);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let grid = SpatialFeatureGrid::from_parts(
            Array3::from_elem((2, 2, 1), 1.0),
            vec!["bio1".into()],
            GeoTransform::default(),
            None,
        )
        .unwrap();
        let params = CorrelationParams {
            threshold: 1.5,
            ..Default::default()
        };
        let err = select_layers(&grid, &params, &SdmContext::default()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_unknown_method() {
        assert!("kendall-x".parse::<CorrelationMethod>().unwrap_err().is_validation());
    }
}
