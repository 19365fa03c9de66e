//! # EcoSDM Algorithms
//!
//! The modeling core of EcoSDM.
//!
//! ## Modules
//!
//! - **matrix**: layer stack to feature grid / flattened matrix
//! - **extract**: per-point layer sampling
//! - **central**: niche centroid (mean, median, mode)
//! - **covariance**: sample covariance and inverse
//! - **distance**: per-pixel distance scoring (seven metrics)
//! - **bioclim**: climatic envelope suitability
//! - **sampling**: pseudo-absence rejection sampling
//! - **training**: data contract for external learners
//! - **evaluation**: classification metrics
//! - **correlation**: collinear layer filtering
//! - **pca**: principal components of a layer stack
//! - **model**: model kinds and the uniform model interface

pub mod bioclim;
pub mod central;
pub mod correlation;
pub mod covariance;
pub mod distance;
pub mod evaluation;
pub mod extract;
pub mod matrix;
pub mod model;
pub mod pca;
pub mod sampling;
pub mod training;

pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bioclim::{bioclim, BioclimResult, Envelope};
    pub use crate::central::{central_point, CentralMethod};
    pub use crate::correlation::{select_layers, CorrelationMethod, CorrelationParams, CorrelationReport};
    pub use crate::distance::{DistanceMetric, DistanceParams, DistanceScorer};
    pub use crate::evaluation::{evaluate, Evaluation};
    pub use crate::extract::{augment_occurrences, extract_from_grid, extract_from_layers};
    pub use crate::matrix::{
        flatten_stack, raster_to_grid, raster_to_matrix, stack_to_grid, FlatFeatureMatrix,
        SpatialFeatureGrid,
    };
    pub use crate::model::{
        run_model, BioclimModel, DistanceModel, ExternalModel, ModelKind, ModelOutput,
        PreparedData, SpeciesModel,
    };
    pub use crate::pca::{pca, PcaParams, PcaResult};
    pub use crate::sampling::{add_pseudo_absences, generate_pseudo_absences, PseudoAbsenceParams};
    pub use crate::training::{
        predict_surface, train_test_split, Estimator, FittedModel, SplitParams, StandardScaler,
        TrainingSet,
    };
    pub use ecosdm_core::prelude::*;
}
