//! Central point (niche centroid) of occurrence feature vectors

use ecosdm_core::{Error, Result, SdmContext};
use ndarray::{Array1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reduction applied to every layer column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CentralMethod {
    #[default]
    Mean,
    Median,
    /// Most frequent value; ties resolve to the smallest value
    Mode,
}

impl CentralMethod {
    pub const NAMES: &'static str = "mean, median, mode";
}

impl FromStr for CentralMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "mode" => Ok(Self::Mode),
            _ => Err(Error::UnknownMethod {
                kind: "central point method",
                given: s.to_string(),
                expected: Self::NAMES,
            }),
        }
    }
}

impl fmt::Display for CentralMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
        };
        f.write_str(name)
    }
}

/// Reduce a [points x layers] matrix to one feature vector.
///
/// NaN values are excluded per component. A layer with no valid value
/// yields NaN for that component.
pub fn central_point(
    features: ArrayView2<'_, f64>,
    method: CentralMethod,
    ctx: &SdmContext,
) -> Result<Array1<f64>> {
    ctx.scope("central point", || reduce(features, method))
}

fn reduce(features: ArrayView2<'_, f64>, method: CentralMethod) -> Result<Array1<f64>> {
    if features.nrows() == 0 {
        return Err(Error::InvalidInput(
            "central point needs at least one feature vector".into(),
        ));
    }

    let center = features
        .axis_iter(Axis(1))
        .map(|column| {
            let mut values: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
            if values.is_empty() {
                return f64::NAN;
            }
            match method {
                CentralMethod::Mean => values.iter().sum::<f64>() / values.len() as f64,
                CentralMethod::Median => median(&mut values),
                CentralMethod::Mode => mode(&mut values),
            }
        })
        .collect();

    Ok(center)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn mode(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));

    let mut best = values[0];
    let mut best_count = 0;
    let mut i = 0;
    while i < values.len() {
        let v = values[i];
        let mut j = i;
        while j < values.len() && values[j] == v {
            j += 1;
        }
        // Strictly greater keeps the smallest value on ties
        if j - i > best_count {
            best = v;
            best_count = j - i;
        }
        i = j;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mean_excludes_nan() {
        let m = array![[1.0, 2.0], [3.0, 4.0], [f64::NAN, 6.0]];
        let c = central_point(m.view(), CentralMethod::Mean, &SdmContext::default()).unwrap();
        assert_eq!(c.to_vec(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_median() {
        let m = array![[1.0, 5.0], [7.0, f64::NAN], [3.0, 1.0], [100.0, 3.0]];
        let c = central_point(m.view(), CentralMethod::Median, &SdmContext::default()).unwrap();
        assert_eq!(c.to_vec(), vec![5.0, 3.0]);
    }

    #[test]
    fn test_mode_ties_pick_smallest() {
        let m = array![[2.0, 1.0], [2.0, 9.0], [1.0, 9.0], [1.0, f64::NAN], [3.0, 1.0]];
        let c = central_point(m.view(), CentralMethod::Mode, &SdmContext::default()).unwrap();
        assert_eq!(c.to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_all_nan_column() {
        let m = array![[f64::NAN, 1.0]];
        let c = central_point(m.view(), CentralMethod::Mean, &SdmContext::default()).unwrap();
        assert!(c[0].is_nan());
        assert_eq!(c[1], 1.0);
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("Median".parse::<CentralMethod>().unwrap(), CentralMethod::Median);
        let err = "average".parse::<CentralMethod>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("mean, median, mode"));
    }

    #[test]
    fn test_empty_matrix() {
        let m = ndarray::Array2::<f64>::zeros((0, 3));
        assert!(central_point(m.view(), CentralMethod::Mean, &SdmContext::default()).is_err());
    }
}
