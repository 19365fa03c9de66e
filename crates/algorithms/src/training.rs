//! Training-data contract for external learners
//!
//! Model fitting (SVM, random forest, neural networks, GAM, GLM, Maxent)
//! lives in other libraries. This module prepares what they consume:
//! labelled complete feature rows, a seeded train/test split, feature
//! standardization, and the scatter of per-pixel predictions back onto
//! the grid.

use crate::matrix::{complete_rows, scatter, SpatialFeatureGrid};
use ecosdm_core::{Error, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Labelled [samples x layers] feature matrix
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub features: Array2<f64>,
    pub labels: Vec<u8>,
}

impl TrainingSet {
    pub fn new(features: Array2<f64>, labels: Vec<u8>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(Error::InvalidInput(format!(
                "{} feature rows for {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    /// Keep only rows without missing values
    pub fn complete(features: ArrayView2<'_, f64>, labels: &[u8]) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(Error::InvalidInput(format!(
                "{} feature rows for {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        let (kept, idx) = complete_rows(features);
        let labels = idx.iter().map(|&i| labels[i]).collect();
        Self::new(kept, labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

/// Parameters for the train/test split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitParams {
    /// Fraction of samples held out for testing (default: 0.3)
    pub test_fraction: f64,
    /// Shuffle seed (default: 42)
    pub seed: u64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            test_fraction: 0.3,
            seed: 42,
        }
    }
}

/// Shuffle and split into (train, test).
///
/// The test set has `ceil(test_fraction * n)` samples; both sides must
/// end up non-empty.
pub fn train_test_split(set: &TrainingSet, params: &SplitParams) -> Result<(TrainingSet, TrainingSet)> {
    if !(params.test_fraction > 0.0 && params.test_fraction < 1.0) {
        return Err(Error::InvalidParameter {
            name: "test_fraction",
            value: params.test_fraction.to_string(),
            reason: "must be in (0, 1)".into(),
        });
    }

    let n = set.len();
    let n_test = (params.test_fraction * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(Error::InvalidInput(format!(
            "cannot split {} samples with test fraction {}",
            n, params.test_fraction
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(params.seed));
    let (test_idx, train_idx) = order.split_at(n_test);

    Ok((set.select(train_idx), set.select(test_idx)))
}

/// Zero-mean, unit-variance feature scaling fitted on training rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Column means and population standard deviations of `features`.
    /// Constant columns get a scale of 1.
    pub fn fit(features: ArrayView2<'_, f64>) -> Result<Self> {
        let n = features.nrows();
        if n == 0 {
            return Err(Error::InvalidInput("cannot fit a scaler on zero samples".into()));
        }
        let mean: Array1<f64> = features.sum_axis(Axis(0)) / n as f64;
        let scale = features
            .axis_iter(Axis(1))
            .zip(mean.iter())
            .map(|(col, &m)| {
                let var = col.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n as f64;
                let sd = var.sqrt();
                if sd == 0.0 || !sd.is_finite() {
                    1.0
                } else {
                    sd
                }
            })
            .collect();
        Ok(Self {
            mean: mean.to_vec(),
            scale,
        })
    }

    pub fn transform(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if features.ncols() != self.mean.len() {
            return Err(Error::InvalidInput(format!(
                "scaler fitted on {} features, got {}",
                self.mean.len(),
                features.ncols()
            )));
        }
        let mut out = features.to_owned();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            col.mapv_inplace(|v| (v - self.mean[j]) / self.scale[j]);
        }
        Ok(out)
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }
}

/// An unfitted learner provided by an external library
pub trait Estimator {
    type Fitted: FittedModel;

    fn fit(&self, features: ArrayView2<'_, f64>, labels: &[u8]) -> Result<Self::Fitted>;
}

/// A fitted learner able to score [samples x layers] rows
pub trait FittedModel {
    /// Predicted 0/1 labels
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Vec<u8>>;

    /// Probability of presence; defaults to the hard labels
    fn predict_proba(&self, features: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        Ok(self
            .predict(features)?
            .into_iter()
            .map(f64::from)
            .collect())
    }
}

/// Score every complete pixel of `grid` with `model`.
///
/// Pixels missing any layer are NaN in the result.
pub fn predict_surface<M: FittedModel + ?Sized>(
    model: &M,
    grid: &SpatialFeatureGrid,
    scaler: Option<&StandardScaler>,
) -> Result<Array2<f64>> {
    let (rows, cols) = grid.shape();
    let pixels = grid.pixel_matrix();
    let (complete, idx) = complete_rows(pixels.view());

    let scores = if complete.nrows() == 0 {
        Vec::new()
    } else {
        let input = match scaler {
            Some(s) => s.transform(complete.view())?,
            None => complete,
        };
        let scores = model.predict_proba(input.view())?;
        if scores.len() != input.nrows() {
            return Err(Error::Algorithm(format!(
                "model returned {} scores for {} pixels",
                scores.len(),
                input.nrows()
            )));
        }
        scores
    };

    Ok(Array2::from_shape_vec(
        (rows, cols),
        scatter(&scores, &idx, rows * cols),
    )?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ecosdm_core::GeoTransform;
    use ndarray::{array, Array3};

    /// Nearest class centroid; stands in for an external learner
    pub(crate) struct NearestCentroid;

    pub(crate) struct Centroids {
        presence: Vec<f64>,
        absence: Vec<f64>,
    }

    fn centroid(features: ArrayView2<'_, f64>, labels: &[u8], class: u8) -> Vec<f64> {
        let idx: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        let rows = features.select(Axis(0), &idx);
        (0..rows.ncols())
            .map(|j| rows.column(j).sum() / idx.len().max(1) as f64)
            .collect()
    }

    impl Estimator for NearestCentroid {
        type Fitted = Centroids;

        fn fit(&self, features: ArrayView2<'_, f64>, labels: &[u8]) -> Result<Centroids> {
            Ok(Centroids {
                presence: centroid(features, labels, 1),
                absence: centroid(features, labels, 0),
            })
        }
    }

    impl FittedModel for Centroids {
        fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Vec<u8>> {
            Ok(self
                .predict_proba(features)?
                .into_iter()
                .map(|p| u8::from(p >= 0.5))
                .collect())
        }

        fn predict_proba(&self, features: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
            Ok(features
                .outer_iter()
                .map(|row| {
                    let x = row.to_vec();
                    let dp = crate::distance::euclidean(&x, &self.presence);
                    let da = crate::distance::euclidean(&x, &self.absence);
                    if dp + da == 0.0 {
                        0.5
                    } else {
                        da / (dp + da)
                    }
                })
                .collect())
        }
    }

    #[test]
    fn test_complete_drops_incomplete_rows() {
        let f = array![[1.0, 2.0], [f64::NAN, 1.0], [3.0, 4.0]];
        let set = TrainingSet::complete(f.view(), &[1, 0, 0]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.labels, vec![1, 0]);
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let f = Array2::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f64);
        let set = TrainingSet::new(f, (0..10).map(|i| (i % 2) as u8).collect()).unwrap();

        let (train, test) = train_test_split(&set, &SplitParams::default()).unwrap();
        assert_eq!((train.len(), test.len()), (7, 3));

        let (train2, _) = train_test_split(&set, &SplitParams::default()).unwrap();
        assert_eq!(train.features, train2.features);

        let mut all: Vec<f64> = train
            .features
            .column(0)
            .iter()
            .chain(test.features.column(0).iter())
            .copied()
            .collect();
        all.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(all, (0..10).map(|i| (i * 2) as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_too_small() {
        let set = TrainingSet::new(array![[1.0]], vec![1]).unwrap();
        assert!(train_test_split(&set, &SplitParams::default()).is_err());
    }

    #[test]
    fn test_scaler() {
        let f = array![[1.0, 5.0], [3.0, 5.0]];
        let s = StandardScaler::fit(f.view()).unwrap();
        assert_eq!(s.mean(), &[2.0, 5.0]);
        assert_eq!(s.scale(), &[1.0, 1.0]);

        let t = s.transform(array![[4.0, 6.0]].view()).unwrap();
        assert_relative_eq!(t[(0, 0)], 2.0);
        assert_relative_eq!(t[(0, 1)], 1.0);
    }

    #[test]
    fn test_predict_surface_scatters_nan() {
        let values = [[1.0, 1.0], [f64::NAN, 2.0], [9.0, 9.0], [1.2, 0.8]];
        let data = Array3::from_shape_fn((2, 2, 2), |(r, c, l)| values[r * 2 + c][l]);
        let grid = SpatialFeatureGrid::from_parts(
            data,
            vec!["a".into(), "b".into()],
            GeoTransform::new(0.0, 2.0, 1.0, -1.0),
            None,
        )
        .unwrap();

        let train = array![[1.0, 1.0], [9.0, 9.0]];
        let model = NearestCentroid.fit(train.view(), &[1, 0]).unwrap();
        let out = predict_surface(&model, &grid, None).unwrap();

        assert_relative_eq!(out[(0, 0)], 1.0);
        assert!(out[(0, 1)].is_nan());
        assert_relative_eq!(out[(1, 0)], 0.0);
        assert!(out[(1, 1)] > 0.5);
    }
}
