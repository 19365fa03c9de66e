//! Binary classification metrics for presence/absence models

use crate::correlation::rank;
use ecosdm_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Metrics of one held-out evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// [[tn, fp], [fn, tp]]
    pub confusion: [[usize; 2]; 2],
    /// Area under the ROC curve, when scores were given and both classes are present
    pub roc_auc: Option<f64>,
}

/// Compare predicted labels (and optional presence scores) against truth.
///
/// Ratios with a zero denominator are 0.
pub fn evaluate(truth: &[u8], predicted: &[u8], scores: Option<&[f64]>) -> Result<Evaluation> {
    if truth.is_empty() {
        return Err(Error::InvalidInput("no samples to evaluate".into()));
    }
    if truth.len() != predicted.len() {
        return Err(Error::InvalidInput(format!(
            "{} true labels for {} predictions",
            truth.len(),
            predicted.len()
        )));
    }

    let mut confusion = [[0usize; 2]; 2];
    for (&t, &p) in truth.iter().zip(predicted) {
        confusion[usize::from(t != 0)][usize::from(p != 0)] += 1;
    }
    let [[tn, fp], [fne, tp]] = confusion;

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fne);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    let roc_auc = match scores {
        Some(s) if s.len() != truth.len() => {
            return Err(Error::InvalidInput(format!(
                "{} scores for {} labels",
                s.len(),
                truth.len()
            )))
        }
        Some(s) => {
            let auc = roc_auc(truth, s);
            if auc.is_none() {
                warn!("ROC AUC undefined: only one class present in the test labels");
            }
            auc
        }
        None => None,
    };

    Ok(Evaluation {
        accuracy: ratio(tn + tp, truth.len()),
        precision,
        recall,
        f1,
        confusion,
        roc_auc,
    })
}

/// ROC AUC via the rank-sum statistic, ties given average ranks.
///
/// `None` when only one class is present.
pub fn roc_auc(truth: &[u8], scores: &[f64]) -> Option<f64> {
    let n_pos = truth.iter().filter(|&&t| t != 0).count();
    let n_neg = truth.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let ranks = rank(scores);

    let pos_rank_sum: f64 = truth
        .iter()
        .zip(&ranks)
        .filter(|&(&t, _)| t != 0)
        .map(|(_, &r)| r)
        .sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "accuracy:  {:.4}", self.accuracy)?;
        writeln!(f, "precision: {:.4}", self.precision)?;
        writeln!(f, "recall:    {:.4}", self.recall)?;
        writeln!(f, "f1:        {:.4}", self.f1)?;
        if let Some(auc) = self.roc_auc {
            writeln!(f, "roc auc:   {:.4}", auc)?;
        }
        let [[tn, fp], [fne, tp]] = self.confusion;
        write!(f, "confusion: [[{}, {}], [{}, {}]]", tn, fp, fne, tp)
    }
}
