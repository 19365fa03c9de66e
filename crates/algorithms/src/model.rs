//! Model kinds and the uniform model interface
//!
//! Every model, whether distance-based, envelope-based or an external
//! learner, runs through [`run_model`]: occurrence features are sampled
//! from the stack, the model produces one or more result surfaces, and
//! failures are logged through the run's [`SdmContext`] before they are
//! returned.

use crate::bioclim::bioclim;
use crate::central::{central_point, CentralMethod};
use crate::distance::{DistanceMetric, DistanceParams, DistanceScorer};
use crate::evaluation::{evaluate, Evaluation};
use crate::extract::extract_from_layers;
use crate::matrix::{stack_to_grid, SpatialFeatureGrid};
use crate::sampling::{add_pseudo_absences, PseudoAbsenceParams};
use crate::training::{
    predict_surface, train_test_split, Estimator, FittedModel, SplitParams, StandardScaler,
    TrainingSet,
};
use ecosdm_core::io::RasterProfile;
use ecosdm_core::occurrence::OccurrenceSet;
use ecosdm_core::stack::LayerStack;
use ecosdm_core::{Error, Raster, Result, SdmContext};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Identity of a model, carried with its output for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Bioclim,
    Mahalanobis,
    Manhattan,
    Euclidean,
    Canberra,
    Chebyshev,
    Cosine,
    Minkowski,
    Svm,
    RandomForest,
    Ann,
    Gam,
    Glm,
    Maxent,
}

impl ModelKind {
    pub const ALL: [ModelKind; 14] = [
        ModelKind::Bioclim,
        ModelKind::Mahalanobis,
        ModelKind::Manhattan,
        ModelKind::Euclidean,
        ModelKind::Canberra,
        ModelKind::Chebyshev,
        ModelKind::Cosine,
        ModelKind::Minkowski,
        ModelKind::Svm,
        ModelKind::RandomForest,
        ModelKind::Ann,
        ModelKind::Gam,
        ModelKind::Glm,
        ModelKind::Maxent,
    ];

    const NAMES: &'static str = "bioclim, mahalanobis, manhattan, euclidean, canberra, \
                                 chebyshev, cosine, minkowski, svm, random_forest, ann, gam, glm, maxent";

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Bioclim => "bioclim",
            ModelKind::Mahalanobis => "mahalanobis",
            ModelKind::Manhattan => "manhattan",
            ModelKind::Euclidean => "euclidean",
            ModelKind::Canberra => "canberra",
            ModelKind::Chebyshev => "chebyshev",
            ModelKind::Cosine => "cosine",
            ModelKind::Minkowski => "minkowski",
            ModelKind::Svm => "svm",
            ModelKind::RandomForest => "random_forest",
            ModelKind::Ann => "ann",
            ModelKind::Gam => "gam",
            ModelKind::Glm => "glm",
            ModelKind::Maxent => "maxent",
        }
    }

    /// Metric of a distance-based kind
    pub fn distance_metric(&self) -> Option<DistanceMetric> {
        match self {
            ModelKind::Mahalanobis => Some(DistanceMetric::Mahalanobis),
            ModelKind::Manhattan => Some(DistanceMetric::Manhattan),
            ModelKind::Euclidean => Some(DistanceMetric::Euclidean),
            ModelKind::Canberra => Some(DistanceMetric::Canberra),
            ModelKind::Chebyshev => Some(DistanceMetric::Chebyshev),
            ModelKind::Cosine => Some(DistanceMetric::Cosine),
            ModelKind::Minkowski => Some(DistanceMetric::Minkowski),
            _ => None,
        }
    }

    /// Kinds fitted by an external learning library
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            ModelKind::Svm
                | ModelKind::RandomForest
                | ModelKind::Ann
                | ModelKind::Gam
                | ModelKind::Glm
                | ModelKind::Maxent
        )
    }
}

impl From<DistanceMetric> for ModelKind {
    fn from(metric: DistanceMetric) -> Self {
        match metric {
            DistanceMetric::Euclidean => ModelKind::Euclidean,
            DistanceMetric::Manhattan => ModelKind::Manhattan,
            DistanceMetric::Chebyshev => ModelKind::Chebyshev,
            DistanceMetric::Canberra => ModelKind::Canberra,
            DistanceMetric::Cosine => ModelKind::Cosine,
            DistanceMetric::Minkowski => ModelKind::Minkowski,
            DistanceMetric::Mahalanobis => ModelKind::Mahalanobis,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let kind = match key.as_str() {
            "rf" | "randomforest" => Some(ModelKind::RandomForest),
            "neural_network" | "mlp" => Some(ModelKind::Ann),
            _ => ModelKind::ALL.iter().copied().find(|k| k.name() == key),
        };
        kind.ok_or_else(|| Error::UnknownMethod {
            kind: "model",
            given: s.to_string(),
            expected: Self::NAMES,
        })
    }
}

/// Inputs shared by every model of one run
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub grid: SpatialFeatureGrid,
    /// [records x layers] features of every occurrence record
    pub features: Array2<f64>,
    /// Presence flag of every record
    pub labels: Vec<u8>,
}

impl PreparedData {
    /// Build the feature grid and sample every occurrence record.
    pub fn prepare(stack: &LayerStack, occurrences: &OccurrenceSet) -> Result<Self> {
        if occurrences.is_empty() {
            return Err(Error::InvalidInput("occurrence set is empty".into()));
        }
        let grid = stack_to_grid(stack)?;
        let features = extract_from_layers(&occurrences.coordinates(), stack.layers());
        Ok(Self {
            grid,
            features,
            labels: occurrences.labels(),
        })
    }

    /// Features of the presence records only.
    ///
    /// At least one presence must have a value on every layer, otherwise
    /// there is nothing to model (e.g. every point lies outside the stack).
    pub fn presence_features(&self) -> Result<Array2<f64>> {
        let idx: Vec<usize> = (0..self.labels.len())
            .filter(|&i| self.labels[i] == 1)
            .collect();
        if idx.is_empty() {
            return Err(Error::InvalidInput("no presence records".into()));
        }
        let features = self.features.select(Axis(0), &idx);
        let complete = features
            .outer_iter()
            .any(|row| row.iter().all(|v| !v.is_nan()));
        if !complete {
            return Err(Error::NoData(format!(
                "none of the {} presence records has a value in every layer",
                idx.len()
            )));
        }
        Ok(features)
    }

    /// Writer profile of the result surfaces
    pub fn profile(&self) -> RasterProfile {
        self.grid.profile()
    }
}

/// Result of one model run
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub kind: ModelKind,
    /// Main result surface
    pub surface: Raster,
    /// Secondary surfaces (e.g. the Bioclim full-envelope map)
    pub extras: Vec<Raster>,
    /// Held-out evaluation of trained models
    pub evaluation: Option<Evaluation>,
}

impl ModelOutput {
    fn single(kind: ModelKind, surface: Raster) -> Self {
        Self {
            kind,
            surface,
            extras: Vec::new(),
            evaluation: None,
        }
    }
}

/// Uniform interface of every species distribution model
pub trait SpeciesModel {
    fn kind(&self) -> ModelKind;

    /// Background sampling needed before training, if any
    fn pseudo_absences(&self) -> Option<&PseudoAbsenceParams> {
        None
    }

    fn predict(&self, data: &PreparedData, ctx: &SdmContext) -> Result<ModelOutput>;
}

/// Run `model` on `stack` and `occurrences`.
///
/// Occurrences are copied; pseudo-absences requested by the model are
/// added to the copy when the input has no absence records.
pub fn run_model<M: SpeciesModel + ?Sized>(
    model: &M,
    stack: &LayerStack,
    occurrences: &OccurrenceSet,
    ctx: &SdmContext,
) -> Result<ModelOutput> {
    let kind = model.kind();
    ctx.scope(kind.name(), || {
        info!(model = %kind, layers = stack.len(), records = occurrences.len(), "running model");

        let mut occurrences = occurrences.clone();
        if let Some(params) = model.pseudo_absences() {
            if occurrences.presence_count() == occurrences.len() {
                add_pseudo_absences(&mut occurrences, stack, params, ctx)?;
            }
        }
        let data = PreparedData::prepare(stack, &occurrences)?;
        model.predict(&data, ctx)
    })
}

/// Distance to the occurrence centroid under any supported metric
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistanceModel {
    pub distance: DistanceParams,
    pub central: CentralMethod,
}

impl DistanceModel {
    pub fn new(metric: DistanceMetric, central: CentralMethod) -> Self {
        Self {
            distance: DistanceParams {
                metric,
                ..Default::default()
            },
            central,
        }
    }
}

impl SpeciesModel for DistanceModel {
    fn kind(&self) -> ModelKind {
        self.distance.metric.into()
    }

    fn predict(&self, data: &PreparedData, ctx: &SdmContext) -> Result<ModelOutput> {
        let presences = data.presence_features()?;
        let center = central_point(presences.view(), self.central, ctx)?;
        info!(central = %self.central, "central point: {:?}", center.to_vec());

        let scorer = DistanceScorer::new(&self.distance, center, presences.view(), ctx)?;
        let scores = scorer.score_grid(&data.grid)?;
        let surface = data.grid.surface(self.kind().name(), scores)?;
        Ok(ModelOutput::single(self.kind(), surface))
    }
}

/// Bioclim climatic envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct BioclimModel;

impl SpeciesModel for BioclimModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Bioclim
    }

    fn predict(&self, data: &PreparedData, ctx: &SdmContext) -> Result<ModelOutput> {
        let presences = data.presence_features()?;
        let result = bioclim(&data.grid, presences.view(), ctx)?;
        Ok(ModelOutput {
            kind: ModelKind::Bioclim,
            surface: data.grid.surface("bioclim", result.suitability)?,
            extras: vec![data
                .grid
                .surface("bioclim_full_envelope", result.full_envelope)?],
            evaluation: None,
        })
    }
}

/// Adapter running an external learner through the uniform interface.
///
/// Records are split into train/test sets, features are standardized on
/// the training rows, the held-out set is evaluated and every complete
/// pixel is scored with the presence probability.
#[derive(Debug, Clone)]
pub struct ExternalModel<E> {
    kind: ModelKind,
    estimator: E,
    pub split: SplitParams,
    pub pseudo_absence: PseudoAbsenceParams,
    pub standardize: bool,
}

impl<E: Estimator> ExternalModel<E> {
    pub fn new(kind: ModelKind, estimator: E) -> Result<Self> {
        if !kind.is_external() {
            return Err(Error::InvalidParameter {
                name: "kind",
                value: kind.to_string(),
                reason: "not a learner-backed model".into(),
            });
        }
        Ok(Self {
            kind,
            estimator,
            split: SplitParams::default(),
            pseudo_absence: PseudoAbsenceParams::default(),
            standardize: true,
        })
    }
}

impl<E: Estimator> SpeciesModel for ExternalModel<E> {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn pseudo_absences(&self) -> Option<&PseudoAbsenceParams> {
        Some(&self.pseudo_absence)
    }

    fn predict(&self, data: &PreparedData, _ctx: &SdmContext) -> Result<ModelOutput> {
        let set = TrainingSet::complete(data.features.view(), &data.labels)?;
        if !set.labels.contains(&0) || !set.labels.contains(&1) {
            return Err(Error::InvalidInput(
                "training needs both presence and absence records".into(),
            ));
        }
        let (train, test) = train_test_split(&set, &self.split)?;

        let scaler = if self.standardize {
            Some(StandardScaler::fit(train.features.view())?)
        } else {
            None
        };
        let scale = |x: &Array2<f64>| match &scaler {
            Some(s) => s.transform(x.view()),
            None => Ok(x.clone()),
        };

        let fitted = self.estimator.fit(scale(&train.features)?.view(), &train.labels)?;

        let test_x = scale(&test.features)?;
        let predicted = fitted.predict(test_x.view())?;
        let scores = fitted.predict_proba(test_x.view())?;
        let evaluation = evaluate(&test.labels, &predicted, Some(&scores))?;
        info!(model = %self.kind, "held-out evaluation\n{}", evaluation);

        let surface = predict_surface(&fitted, &data.grid, scaler.as_ref())?;
        Ok(ModelOutput {
            kind: self.kind,
            surface: data.grid.surface(self.kind.name(), surface)?,
            extras: Vec::new(),
            evaluation: Some(evaluation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::tests::NearestCentroid;
    use approx::assert_relative_eq;
    use ecosdm_core::occurrence::GeoPoint;
    use ecosdm_core::GeoTransform;

    fn stack() -> LayerStack {
        let t = GeoTransform::new(0.0, 2.0, 1.0, -1.0);
        let a = Raster::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2)
            .unwrap()
            .with_name("a")
            .with_transform(t);
        let b = Raster::from_vec(vec![10.0, 20.0, 30.0, 40.0], 2, 2)
            .unwrap()
            .with_name("b")
            .with_transform(t);
        LayerStack::new(vec![a, b]).unwrap()
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
        assert_eq!("rf".parse::<ModelKind>().unwrap(), ModelKind::RandomForest);
        assert!("lasso".parse::<ModelKind>().is_err());
        assert_eq!(ModelKind::from(DistanceMetric::Cosine), ModelKind::Cosine);
    }

    #[test]
    fn test_distance_model_end_to_end() {
        let occ = OccurrenceSet::from_coordinates(&[GeoPoint::new(0.5, 1.5)]);
        let model = DistanceModel::new(DistanceMetric::Euclidean, CentralMethod::Mean);
        let out = run_model(&model, &stack(), &occ, &SdmContext::new("test")).unwrap();

        assert_eq!(out.kind, ModelKind::Euclidean);
        let s = out.surface.data();
        assert_relative_eq!(s[(0, 0)], 0.0);
        assert_relative_eq!(s[(0, 1)], 101f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(s[(1, 0)], 404f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(s[(1, 1)], 909f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_bioclim_model_outputs() {
        let occ = OccurrenceSet::from_coordinates(&[GeoPoint::new(0.5, 1.5), GeoPoint::new(1.5, 1.5)]);
        let out = run_model(&BioclimModel, &stack(), &occ, &SdmContext::default()).unwrap();
        assert_eq!(out.surface.data()[(0, 1)], 1.0);
        assert_eq!(out.surface.data()[(1, 1)], 0.0);
        assert_eq!(out.extras[0].name(), "bioclim_full_envelope");
    }

    #[test]
    fn test_empty_occurrences_is_validation() {
        let err = run_model(&BioclimModel, &stack(), &OccurrenceSet::new(), &SdmContext::default())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_occurrences_outside_stack_are_no_data() {
        let occ = OccurrenceSet::from_coordinates(&[GeoPoint::new(-40.0, 60.0), GeoPoint::new(7.5, -3.0)]);
        let ctx = SdmContext::new("outside");

        let err = run_model(&BioclimModel, &stack(), &occ, &ctx).unwrap_err();
        assert!(matches!(err, Error::NoData(_)));

        let model = DistanceModel::new(DistanceMetric::Euclidean, CentralMethod::Mean);
        let err = run_model(&model, &stack(), &occ, &ctx).unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
        assert!(err.is_validation());
    }

    #[test]
    fn test_singular_mahalanobis_is_numerical() {
        // Two points: both layers move together, covariance is rank one
        let occ = OccurrenceSet::from_coordinates(&[GeoPoint::new(0.5, 1.5), GeoPoint::new(1.5, 1.5)]);
        let model = DistanceModel::new(DistanceMetric::Mahalanobis, CentralMethod::Mean);
        let err = run_model(&model, &stack(), &occ, &SdmContext::default()).unwrap_err();
        assert!(err.is_numerical());
    }

    #[test]
    fn test_external_model() {
        let t = GeoTransform::new(0.0, 10.0, 1.0, -1.0);
        let a = Raster::from_array(Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f64))
            .with_name("a")
            .with_transform(t);
        let b = Raster::from_array(Array2::from_shape_fn((10, 10), |(r, c)| ((r + c) % 3) as f64))
            .with_name("b")
            .with_transform(t);
        let stack = LayerStack::new(vec![a, b]).unwrap();

        let points: Vec<_> = (0..10)
            .map(|i| GeoPoint::new(0.5 + i as f64 * 0.9, 9.5))
            .collect();
        let occ = OccurrenceSet::from_coordinates(&points);

        let mut model = ExternalModel::new(ModelKind::Glm, NearestCentroid).unwrap();
        model.pseudo_absence = PseudoAbsenceParams {
            count: Some(10),
            seed: Some(5),
            ..Default::default()
        };

        let out = run_model(&model, &stack, &occ, &SdmContext::default()).unwrap();
        assert_eq!(out.kind, ModelKind::Glm);
        assert_eq!(out.surface.shape(), (10, 10));
        assert!(out.evaluation.is_some());
        assert!(out.surface.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_external_kind_checked() {
        assert!(ExternalModel::new(ModelKind::Bioclim, NearestCentroid).is_err());
    }
}
