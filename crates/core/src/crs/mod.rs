//! Coordinate Reference System identifiers

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coordinate reference system attached to a layer.
///
/// Layers in one modeling run are compared by identifier only; no
/// reprojection happens anywhere in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CRS {
    /// EPSG registry code
    Epsg(u32),
    /// Free-form definition (WKT or PROJ string)
    Custom(String),
}

impl CRS {
    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        CRS::Epsg(4326)
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            CRS::Epsg(code) => Some(*code),
            CRS::Custom(_) => None,
        }
    }

    /// Geographic (lat/lon) codes live in the 4000..5000 EPSG block
    pub fn is_geographic(&self) -> bool {
        matches!(self, CRS::Epsg(code) if (4000..5000).contains(code))
    }

    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self, other) {
            (CRS::Epsg(a), CRS::Epsg(b)) => a == b,
            (CRS::Custom(a), CRS::Custom(b)) => a.trim() == b.trim(),
            _ => false,
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CRS::Epsg(code) => write!(f, "EPSG:{}", code),
            CRS::Custom(def) => {
                let short: String = def.chars().take(50).collect();
                write!(f, "{}", short)
            }
        }
    }
}

impl FromStr for CRS {
    type Err = Error;

    /// Accepts `EPSG:4326`, `epsg:4326` or a bare code; anything else is
    /// kept verbatim as a custom definition.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidInput("empty CRS identifier".into()));
        }
        let code = s
            .strip_prefix("EPSG:")
            .or_else(|| s.strip_prefix("epsg:"))
            .unwrap_or(s);
        match code.parse::<u32>() {
            Ok(code) => Ok(CRS::Epsg(code)),
            Err(_) => Ok(CRS::Custom(s.to_string())),
        }
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}
