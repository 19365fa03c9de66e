//! Bioclim climatic envelope
//!
//! For each layer the envelope is the [min, max] range of the occurrence
//! values. A pixel scores 1 on a layer when its value lies inside the
//! range and 0 when it is a valid value outside it. Per-layer scores are
//! summed and divided by the layer count. A pixel missing on any layer
//! has a NaN sum and stays NaN in every output.

use crate::matrix::SpatialFeatureGrid;
use crate::maybe_rayon::*;
use ecosdm_core::{Error, Result, SdmContext};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Occurrence range of one layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min: f64,
    pub max: f64,
}

impl Envelope {
    /// 1 inside the range, 0 for a valid value outside, NaN for missing
    #[inline]
    pub fn score(&self, value: f64) -> f64 {
        if value.is_nan() {
            f64::NAN
        } else if value >= self.min && value <= self.max {
            1.0
        } else {
            0.0
        }
    }
}

/// Bioclim outputs
#[derive(Debug, Clone)]
pub struct BioclimResult {
    /// Fraction of layers inside their envelope, in [0, 1]
    pub suitability: Array2<f64>,
    /// 1 where every layer is inside its envelope, else 0
    pub full_envelope: Array2<f64>,
    pub envelopes: Vec<Envelope>,
}

/// Per-layer NaN-ignoring [min, max] of a [points x layers] matrix.
///
/// At least one occurrence must have a value on every layer. Partial
/// rows still widen the layers they have values for.
pub fn envelopes(occurrence_features: ArrayView2<'_, f64>) -> Result<Vec<Envelope>> {
    if occurrence_features.nrows() == 0 {
        return Err(Error::InvalidInput(
            "bioclim envelope needs at least one occurrence".into(),
        ));
    }
    let complete = occurrence_features
        .axis_iter(Axis(0))
        .any(|row| row.iter().all(|v| !v.is_nan()));
    if !complete {
        return Err(Error::NoData(
            "no occurrence has a value in every layer".into(),
        ));
    }

    Ok(occurrence_features
        .axis_iter(Axis(1))
        .map(|column| {
            let (min, max) = column
                .iter()
                .filter(|v| !v.is_nan())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            if min > max {
                Envelope {
                    min: f64::NAN,
                    max: f64::NAN,
                }
            } else {
                Envelope { min, max }
            }
        })
        .collect())
}

/// Score every pixel of `grid` against the occurrence envelopes.
pub fn bioclim(
    grid: &SpatialFeatureGrid,
    occurrence_features: ArrayView2<'_, f64>,
    ctx: &SdmContext,
) -> Result<BioclimResult> {
    ctx.scope("bioclim", || score_envelopes(grid, occurrence_features))
}

fn score_envelopes(
    grid: &SpatialFeatureGrid,
    occurrence_features: ArrayView2<'_, f64>,
) -> Result<BioclimResult> {
    if occurrence_features.ncols() != grid.n_layers() {
        return Err(Error::InvalidInput(format!(
            "occurrence features have {} layers, grid has {}",
            occurrence_features.ncols(),
            grid.n_layers()
        )));
    }

    let envelopes = envelopes(occurrence_features)?;
    let (rows, cols) = grid.shape();
    let n_layers = grid.n_layers() as f64;

    // Stage 1: per-layer scores summed with NaN propagation
    let sums: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                *out = grid
                    .feature(row, col)
                    .iter()
                    .zip(&envelopes)
                    .map(|(&v, env)| env.score(v))
                    .sum();
            }
            row_data
        })
        .collect();

    // Stage 2: outputs derived from the sum, missing where the sum is
    let suitability: Vec<f64> = sums.iter().map(|&s| s / n_layers).collect();
    let full_envelope: Vec<f64> = sums
        .iter()
        .map(|&s| {
            if s.is_nan() {
                f64::NAN
            } else if s >= n_layers {
                1.0
            } else {
                0.0
            }
        })
        .collect();

    Ok(BioclimResult {
        suitability: Array2::from_shape_vec((rows, cols), suitability)?,
        full_envelope: Array2::from_shape_vec((rows, cols), full_envelope)?,
        envelopes,
    })
}
