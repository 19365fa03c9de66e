//! Pseudo-absence generation by rejection sampling
//!
//! Candidates are drawn uniformly inside the union bounds of the layer
//! stack. A candidate is kept when it does not coincide with a known
//! occurrence and every layer has a value under it. Kept points carry
//! presence 0.

use crate::extract::sample_point;
use ecosdm_core::occurrence::{GeoPoint, OccurrenceSet};
use ecosdm_core::stack::LayerStack;
use ecosdm_core::{Error, Result, SdmContext};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Relative tolerance of the coordinate coincidence test
pub const COINCIDENCE_RTOL: f64 = 1e-5;
/// Absolute tolerance of the coordinate coincidence test
pub const COINCIDENCE_ATOL: f64 = 1e-8;

/// Parameters for pseudo-absence generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PseudoAbsenceParams {
    /// Number of points to generate; `None` uses `ratio` of the occurrences
    pub count: Option<usize>,
    /// Fraction of the occurrence count generated when `count` is unset (default: 0.3)
    pub ratio: f64,
    /// Candidate draws before giving up (default: 10 million); `None` never gives up
    pub max_attempts: Option<u64>,
    /// Random seed; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for PseudoAbsenceParams {
    fn default() -> Self {
        Self {
            count: None,
            ratio: 0.3,
            max_attempts: Some(10_000_000),
            seed: None,
        }
    }
}

impl PseudoAbsenceParams {
    /// Number of points to generate for `n_occurrences` records
    pub fn target(&self, n_occurrences: usize) -> usize {
        self.count
            .unwrap_or_else(|| (n_occurrences as f64 * self.ratio) as usize)
    }
}

/// numpy-style `isclose`: |a - b| <= atol + rtol * |b|
#[inline]
pub fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= COINCIDENCE_ATOL + COINCIDENCE_RTOL * b.abs()
}

fn coincides(candidate: GeoPoint, occurrences: &[GeoPoint]) -> bool {
    occurrences
        .iter()
        .any(|o| is_close(candidate.lat, o.lat) && is_close(candidate.lon, o.lon))
}

/// Draw background points for `occurrences` inside `stack`.
///
/// Returns exactly the target number of points, or
/// [`Error::SamplingExhausted`] when `max_attempts` draws were not enough.
pub fn generate_pseudo_absences(
    occurrences: &OccurrenceSet,
    stack: &LayerStack,
    params: &PseudoAbsenceParams,
    ctx: &SdmContext,
) -> Result<Vec<GeoPoint>> {
    ctx.scope("pseudo-absence", || sample_background(occurrences, stack, params))
}

fn sample_background(
    occurrences: &OccurrenceSet,
    stack: &LayerStack,
    params: &PseudoAbsenceParams,
) -> Result<Vec<GeoPoint>> {
    if !(params.ratio >= 0.0 && params.ratio.is_finite()) {
        return Err(Error::InvalidParameter {
            name: "ratio",
            value: params.ratio.to_string(),
            reason: "must be a non-negative number".into(),
        });
    }

    let requested = params.target(occurrences.len());
    if requested == 0 {
        return Ok(Vec::new());
    }

    if !has_complete_pixel(stack) {
        return Err(Error::NoData(
            "no pixel has a value in every layer; no pseudo-absence can be accepted".into(),
        ));
    }

    let bounds = stack.bounds();
    let known = occurrences.coordinates();
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut accepted = Vec::with_capacity(requested);
    let mut attempts: u64 = 0;

    while accepted.len() < requested {
        if let Some(max) = params.max_attempts {
            if attempts >= max {
                return Err(Error::SamplingExhausted {
                    accepted: accepted.len(),
                    requested,
                    attempts,
                });
            }
        }
        attempts += 1;

        let candidate = GeoPoint::new(
            rng.gen_range(bounds.min_x..=bounds.max_x),
            rng.gen_range(bounds.min_y..=bounds.max_y),
        );

        if coincides(candidate, &known) {
            continue;
        }
        if sample_point(stack.layers(), candidate).iter().any(|v| v.is_nan()) {
            continue;
        }
        accepted.push(candidate);
    }

    info!(
        "Generated {} pseudo-absences in {} draws",
        accepted.len(),
        attempts
    );
    Ok(accepted)
}

/// Generate pseudo-absences and append them to `occurrences`.
///
/// Returns the number of appended records.
pub fn add_pseudo_absences(
    occurrences: &mut OccurrenceSet,
    stack: &LayerStack,
    params: &PseudoAbsenceParams,
    ctx: &SdmContext,
) -> Result<usize> {
    ctx.scope("pseudo-absence", || {
        let points = sample_background(occurrences, stack, params)?;
        occurrences.append_pseudo_absences(&points);
        debug!(total = occurrences.len(), "appended pseudo-absences");
        Ok(points.len())
    })
}

fn has_complete_pixel(stack: &LayerStack) -> bool {
    let (rows, cols) = stack.shape();
    (0..rows).any(|row| {
        (0..cols).any(|col| {
            stack.iter().all(|layer| {
                // SAFETY: every layer of a stack shares the (rows, cols) shape
                !layer.is_nodata(unsafe { layer.get_unchecked(row, col) })
            })
        })
    })
}
