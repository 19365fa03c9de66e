//! Distance scoring against a central point
//!
//! Every pixel of a [`SpatialFeatureGrid`] is scored by its distance to
//! the niche centroid. Pixels with any missing layer value are NaN.
//!
//! | Metric      | Formula                              |
//! |-------------|--------------------------------------|
//! | Euclidean   | sqrt(Σ(x−c)²)                        |
//! | Manhattan   | Σ\|x−c\|                             |
//! | Chebyshev   | max \|x−c\|                          |
//! | Canberra    | Σ\|x−c\| / (\|x\|+\|c\|), 0/0 → 0    |
//! | Cosine      | 1 − x·c / (‖x‖‖c‖)                   |
//! | Minkowski   | (Σ\|x−c\|^p)^(1/p)                   |
//! | Mahalanobis | sqrt((x−c)ᵀ S⁻¹ (x−c))               |

use crate::covariance::inverse_covariance;
use crate::matrix::SpatialFeatureGrid;
use crate::maybe_rayon::*;
use ecosdm_core::{Error, Result, SdmContext};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported distance metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
    Chebyshev,
    Canberra,
    Cosine,
    Minkowski,
    Mahalanobis,
}

impl DistanceMetric {
    pub const NAMES: &'static str =
        "euclidean, manhattan, chebyshev, canberra, cosine, minkowski, mahalanobis";

    pub const ALL: [DistanceMetric; 7] = [
        DistanceMetric::Euclidean,
        DistanceMetric::Manhattan,
        DistanceMetric::Chebyshev,
        DistanceMetric::Canberra,
        DistanceMetric::Cosine,
        DistanceMetric::Minkowski,
        DistanceMetric::Mahalanobis,
    ];
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "manhattan" | "cityblock" => Ok(Self::Manhattan),
            "chebyshev" => Ok(Self::Chebyshev),
            "canberra" => Ok(Self::Canberra),
            "cosine" => Ok(Self::Cosine),
            "minkowski" => Ok(Self::Minkowski),
            "mahalanobis" => Ok(Self::Mahalanobis),
            _ => Err(Error::UnknownMethod {
                kind: "distance metric",
                given: s.to_string(),
                expected: Self::NAMES,
            }),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Euclidean => "euclidean",
            Self::Manhattan => "manhattan",
            Self::Chebyshev => "chebyshev",
            Self::Canberra => "canberra",
            Self::Cosine => "cosine",
            Self::Minkowski => "minkowski",
            Self::Mahalanobis => "mahalanobis",
        };
        f.write_str(name)
    }
}

pub fn euclidean(x: &[f64], c: &[f64]) -> f64 {
    x.iter()
        .zip(c)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt()
}

pub fn manhattan(x: &[f64], c: &[f64]) -> f64 {
    x.iter().zip(c).map(|(a, b)| (a - b).abs()).sum()
}

pub fn chebyshev(x: &[f64], c: &[f64]) -> f64 {
    x.iter()
        .zip(c)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

pub fn canberra(x: &[f64], c: &[f64]) -> f64 {
    x.iter()
        .zip(c)
        .map(|(a, b)| {
            let denom = a.abs() + b.abs();
            if denom == 0.0 {
                0.0
            } else {
                (a - b).abs() / denom
            }
        })
        .sum()
}

/// Cosine distance; NaN when either vector has zero norm
pub fn cosine(x: &[f64], c: &[f64]) -> f64 {
    let dot: f64 = x.iter().zip(c).map(|(a, b)| a * b).sum();
    let nx = x.iter().map(|a| a * a).sum::<f64>().sqrt();
    let nc = c.iter().map(|b| b * b).sum::<f64>().sqrt();
    if nx == 0.0 || nc == 0.0 {
        return f64::NAN;
    }
    1.0 - dot / (nx * nc)
}

pub fn minkowski(x: &[f64], c: &[f64], p: f64) -> f64 {
    x.iter()
        .zip(c)
        .map(|(a, b)| (a - b).abs().powf(p))
        .sum::<f64>()
        .powf(1.0 / p)
}

/// Mahalanobis distance given the inverse covariance `vi`
pub fn mahalanobis(x: &[f64], c: &[f64], vi: &DMatrix<f64>) -> f64 {
    let d: Vec<f64> = x.iter().zip(c).map(|(a, b)| a - b).collect();
    let mut q = 0.0;
    for i in 0..d.len() {
        for j in 0..d.len() {
            q += d[i] * vi[(i, j)] * d[j];
        }
    }
    // Rounding can push a zero quadratic form slightly negative
    q.max(0.0).sqrt()
}

/// Parameters for distance scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceParams {
    pub metric: DistanceMetric,
    /// Minkowski order (default: 3)
    pub p: f64,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            p: 3.0,
        }
    }
}

/// Distance to a fixed central point.
#[derive(Debug, Clone)]
pub struct DistanceScorer {
    metric: DistanceMetric,
    center: Array1<f64>,
    p: f64,
    inverse_cov: Option<DMatrix<f64>>,
}

impl DistanceScorer {
    /// Build a scorer. Mahalanobis uses the covariance of
    /// `occurrence_features` ([points x layers]); other metrics ignore it.
    pub fn new(
        params: &DistanceParams,
        center: Array1<f64>,
        occurrence_features: ArrayView2<'_, f64>,
        ctx: &SdmContext,
    ) -> Result<Self> {
        ctx.scope("distance scorer", || Self::build(params, center, occurrence_features))
    }

    fn build(
        params: &DistanceParams,
        center: Array1<f64>,
        occurrence_features: ArrayView2<'_, f64>,
    ) -> Result<Self> {
        if params.metric == DistanceMetric::Minkowski && !(params.p > 0.0 && params.p.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "p",
                value: params.p.to_string(),
                reason: "Minkowski order must be a positive finite number".into(),
            });
        }
        if center.is_empty() {
            return Err(Error::InvalidInput("central point is empty".into()));
        }

        let inverse_cov = if params.metric == DistanceMetric::Mahalanobis {
            if occurrence_features.ncols() != center.len() {
                return Err(Error::InvalidInput(format!(
                    "occurrence features have {} layers, central point has {}",
                    occurrence_features.ncols(),
                    center.len()
                )));
            }
            Some(inverse_covariance(occurrence_features)?)
        } else {
            None
        };

        Ok(Self {
            metric: params.metric,
            center,
            p: params.p,
            inverse_cov,
        })
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn center(&self) -> &Array1<f64> {
        &self.center
    }

    /// Distance of one feature vector; NaN if any component is missing
    pub fn distance(&self, x: &[f64]) -> f64 {
        if x.len() != self.center.len() || x.iter().any(|v| v.is_nan()) {
            return f64::NAN;
        }
        let c = match self.center.as_slice() {
            Some(c) => c,
            None => return f64::NAN,
        };
        match self.metric {
            DistanceMetric::Euclidean => euclidean(x, c),
            DistanceMetric::Manhattan => manhattan(x, c),
            DistanceMetric::Chebyshev => chebyshev(x, c),
            DistanceMetric::Canberra => canberra(x, c),
            DistanceMetric::Cosine => cosine(x, c),
            DistanceMetric::Minkowski => minkowski(x, c, self.p),
            DistanceMetric::Mahalanobis => match &self.inverse_cov {
                Some(vi) => mahalanobis(x, c, vi),
                None => f64::NAN,
            },
        }
    }

    /// Score every pixel of `grid`
    pub fn score_grid(&self, grid: &SpatialFeatureGrid) -> Result<Array2<f64>> {
        if grid.n_layers() != self.center.len() {
            return Err(Error::InvalidInput(format!(
                "grid has {} layers, central point has {}",
                grid.n_layers(),
                self.center.len()
            )));
        }

        let (rows, cols) = grid.shape();
        let layers = grid.n_layers();

        let output_data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![f64::NAN; cols];
                let mut x = vec![0.0; layers];
                for (col, out) in row_data.iter_mut().enumerate() {
                    for (dst, src) in x.iter_mut().zip(grid.feature(row, col).iter()) {
                        *dst = *src;
                    }
                    *out = self.distance(&x);
                }
                row_data
            })
            .collect();

        Ok(Array2::from_shape_vec((rows, cols), output_data)?)
    }
}
