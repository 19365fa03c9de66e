//! Species occurrence records
//!
//! Occurrences are read from and written to CSV tables whose coordinate
//! and presence column names are chosen by the caller. Columns the
//! pipeline does not interpret are carried through untouched.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// A geographic coordinate (longitude, latitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Names of the columns holding latitude, longitude and presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub latitude: String,
    pub longitude: String,
    pub presence: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            latitude: "decimalLatitude".to_string(),
            longitude: "decimalLongitude".to_string(),
            presence: "presence".to_string(),
        }
    }
}

/// One occurrence record.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub lat: f64,
    pub lon: f64,
    /// 1 for an observed presence, 0 for an absence or pseudo-absence
    pub presence: u8,
    /// Values of the pass-through columns, aligned with
    /// [`OccurrenceSet::extra_columns`]
    pub attributes: Vec<String>,
}

impl Occurrence {
    pub fn presence(lon: f64, lat: f64) -> Self {
        Self {
            lat,
            lon,
            presence: 1,
            attributes: Vec::new(),
        }
    }

    pub fn absence(lon: f64, lat: f64) -> Self {
        Self {
            presence: 0,
            ..Self::presence(lon, lat)
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lon, self.lat)
    }
}

/// Ordered occurrence table.
///
/// Records are only ever appended. Covariate columns (one per sampled
/// layer) always have one value per record.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceSet {
    records: Vec<Occurrence>,
    extra_columns: Vec<String>,
    covariates: Vec<(String, Vec<f64>)>,
}

impl OccurrenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presence records at the given coordinates
    pub fn from_coordinates(points: &[GeoPoint]) -> Self {
        Self::from_records(
            points
                .iter()
                .map(|p| Occurrence::presence(p.lon, p.lat))
                .collect(),
        )
    }

    /// Records without pass-through columns
    pub fn from_records(records: Vec<Occurrence>) -> Self {
        let records = records
            .into_iter()
            .map(|mut r| {
                r.attributes.clear();
                r
            })
            .collect();
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Occurrence] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Occurrence> {
        self.records.iter()
    }

    pub fn coordinates(&self) -> Vec<GeoPoint> {
        self.records.iter().map(Occurrence::point).collect()
    }

    /// Presence flags in record order
    pub fn labels(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.presence).collect()
    }

    /// Number of records flagged as present
    pub fn presence_count(&self) -> usize {
        self.records.iter().filter(|r| r.presence == 1).count()
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    pub fn covariates(&self) -> &[(String, Vec<f64>)] {
        &self.covariates
    }

    pub fn covariate(&self, name: &str) -> Option<&[f64]> {
        self.covariates
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Attach one value per record under `name`, replacing a previous
    /// column of the same name.
    pub fn add_covariate(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.records.len() {
            return Err(Error::InvalidInput(format!(
                "covariate '{}' has {} values for {} records",
                name,
                values.len(),
                self.records.len()
            )));
        }

        // A sampled layer supersedes a pass-through column with its name
        if let Some(idx) = self.extra_columns.iter().position(|c| *c == name) {
            self.extra_columns.remove(idx);
            for record in &mut self.records {
                if idx < record.attributes.len() {
                    record.attributes.remove(idx);
                }
            }
        }

        match self.covariates.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values,
            None => self.covariates.push((name, values)),
        }
        Ok(())
    }

    /// Append background points with presence 0.
    ///
    /// Pass-through attributes are left empty and covariates are NaN
    /// until the set is sampled again.
    pub fn append_pseudo_absences(&mut self, points: &[GeoPoint]) {
        let width = self.extra_columns.len();
        for p in points {
            self.records.push(Occurrence {
                attributes: vec![String::new(); width],
                ..Occurrence::absence(p.lon, p.lat)
            });
        }
        for (_, values) in &mut self.covariates {
            values.resize(self.records.len(), f64::NAN);
        }
    }

    // CSV

    pub fn read_csv<P: AsRef<Path>>(path: P, columns: &ColumnNames) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let set = Self::from_reader(file, columns)?;
        debug!(
            records = set.len(),
            "read occurrences from {}",
            path.as_ref().display()
        );
        Ok(set)
    }

    /// Parse a CSV table with a header row.
    pub fn from_reader<R: Read>(reader: R, columns: &ColumnNames) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = rdr.headers()?.clone();

        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let lat_idx = find(&columns.latitude).ok_or_else(|| {
            Error::InvalidInput(format!("latitude column '{}' not found", columns.latitude))
        })?;
        let lon_idx = find(&columns.longitude).ok_or_else(|| {
            Error::InvalidInput(format!("longitude column '{}' not found", columns.longitude))
        })?;
        let presence_idx = find(&columns.presence);
        if presence_idx.is_none() {
            warn!(
                "presence column '{}' not found, assuming presence = 1",
                columns.presence
            );
        }

        let extra_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != lat_idx && i != lon_idx && Some(i) != presence_idx)
            .collect();
        let extra_columns = extra_idx.iter().map(|&i| headers[i].to_string()).collect();

        let mut records = Vec::new();
        for (line, row) in rdr.records().enumerate() {
            let row = row?;
            let field = |idx: usize, name: &str| -> Result<f64> {
                let raw = row.get(idx).unwrap_or("").trim();
                raw.parse::<f64>().map_err(|_| {
                    Error::InvalidInput(format!(
                        "record {}: column '{}' is not numeric: '{}'",
                        line + 1,
                        name,
                        raw
                    ))
                })
            };

            let lat = field(lat_idx, &columns.latitude)?;
            let lon = field(lon_idx, &columns.longitude)?;
            let presence = match presence_idx {
                Some(idx) => parse_presence(field(idx, &columns.presence)?, line + 1)?,
                None => 1,
            };
            let attributes = extra_idx
                .iter()
                .map(|&i| row.get(i).unwrap_or("").to_string())
                .collect();

            records.push(Occurrence {
                lat,
                lon,
                presence,
                attributes,
            });
        }

        Ok(Self {
            records,
            extra_columns,
            covariates: Vec::new(),
        })
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P, columns: &ColumnNames) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.to_writer(file, columns)
    }

    /// Write the table: coordinates and presence, pass-through columns,
    /// then one column per covariate. Missing covariates are empty cells.
    pub fn to_writer<W: Write>(&self, writer: W, columns: &ColumnNames) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec![
            columns.latitude.as_str(),
            columns.longitude.as_str(),
            columns.presence.as_str(),
        ];
        header.extend(self.extra_columns.iter().map(String::as_str));
        header.extend(self.covariates.iter().map(|(n, _)| n.as_str()));
        wtr.write_record(&header)?;

        for (i, record) in self.records.iter().enumerate() {
            let mut row = vec![
                record.lat.to_string(),
                record.lon.to_string(),
                record.presence.to_string(),
            ];
            row.extend(record.attributes.iter().cloned());
            row.extend(self.covariates.iter().map(|(_, values)| format_value(values[i])));
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a OccurrenceSet {
    type Item = &'a Occurrence;
    type IntoIter = std::slice::Iter<'a, Occurrence>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn parse_presence(value: f64, line: usize) -> Result<u8> {
    if value == 1.0 {
        Ok(1)
    } else if value == 0.0 {
        Ok(0)
    } else {
        Err(Error::InvalidInput(format!(
            "record {}: presence must be 0 or 1, got {}",
            line, value
        )))
    }
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "species,decimalLatitude,decimalLongitude\n\
                         Panthera onca,-10.5,-55.25\n\
                         Panthera onca,-3.0,-60.0\n";

    #[test]
    fn test_missing_presence_defaults_to_one() {
        let set = OccurrenceSet::from_reader(TABLE.as_bytes(), &ColumnNames::default()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.labels(), vec![1, 1]);
        assert_eq!(set.extra_columns(), &["species".to_string()]);
        assert_eq!(set.coordinates()[0], GeoPoint::new(-55.25, -10.5));
    }

    #[test]
    fn test_custom_columns() {
        let csv = "lat,lon,occ\n1.0,2.0,0\n3.0,4.0,1\n";
        let columns = ColumnNames {
            latitude: "lat".into(),
            longitude: "lon".into(),
            presence: "occ".into(),
        };
        let set = OccurrenceSet::from_reader(csv.as_bytes(), &columns).unwrap();
        assert_eq!(set.labels(), vec![0, 1]);
        assert_eq!(set.presence_count(), 1);
    }

    #[test]
    fn test_missing_coordinate_column() {
        let csv = "lat,decimalLongitude\n1.0,2.0\n";
        let err = OccurrenceSet::from_reader(csv.as_bytes(), &ColumnNames::default()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_bad_presence_value() {
        let csv = "decimalLatitude,decimalLongitude,presence\n1.0,2.0,3\n";
        assert!(OccurrenceSet::from_reader(csv.as_bytes(), &ColumnNames::default()).is_err());
    }

    #[test]
    fn test_append_pseudo_absences() {
        let mut set = OccurrenceSet::from_reader(TABLE.as_bytes(), &ColumnNames::default()).unwrap();
        set.add_covariate("bio1", vec![25.0, 27.5]).unwrap();
        set.append_pseudo_absences(&[GeoPoint::new(-50.0, -8.0)]);

        assert_eq!(set.len(), 3);
        assert_eq!(set.labels(), vec![1, 1, 0]);
        assert_eq!(set.records()[2].attributes, vec![String::new()]);
        assert!(set.covariate("bio1").unwrap()[2].is_nan());
    }

    #[test]
    fn test_covariate_length_checked() {
        let mut set = OccurrenceSet::from_coordinates(&[GeoPoint::new(0.0, 0.0)]);
        assert!(set.add_covariate("bio1", vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_write_roundtrip() {
        let mut set = OccurrenceSet::from_reader(TABLE.as_bytes(), &ColumnNames::default()).unwrap();
        set.add_covariate("bio12", vec![1800.0, f64::NAN]).unwrap();

        let mut out = Vec::new();
        set.to_writer(&mut out, &ColumnNames::default()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("decimalLatitude,decimalLongitude,presence,species,bio12")
        );
        assert_eq!(lines.next(), Some("-10.5,-55.25,1,Panthera onca,1800"));
        assert_eq!(lines.next(), Some("-3,-60,1,Panthera onca,"));

        let back = OccurrenceSet::from_reader(text.as_bytes(), &ColumnNames::default()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.extra_columns().len(), 2);
    }
}
