//! Sexagesimal survey coordinates (`"D;M;S"`) to decimal degrees.
//!
//! No hemisphere handling: every surveyed coordinate is taken as a positive
//! degree value. Negative or cross-hemisphere input is undefined.

use std::num::ParseFloatError;

use serde::Deserialize;
use utoipa::ToSchema;

const FIELD_SEPARATOR: char = ';';

/// A user-selected location in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, ToSchema)]
pub struct QueryPoint {
    pub lat: f64,
    #[serde(alias = "lng")]
    pub lon: f64,
}

impl QueryPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CoordinateParseError {
    #[error("expected 3 fields separated by ';', found {0}")]
    FieldCount(usize),
    #[error("field {index} ({value:?}) is not a number: {source}")]
    NotANumber {
        index: usize,
        value: String,
        source: ParseFloatError,
    },
    #[error("coordinate does not resolve to a finite value")]
    NotFinite,
}

/// Parse `"D;M;S"` into `D + M/60 + S/3600`.
pub fn try_parse_dms(raw: &str) -> Result<f64, CoordinateParseError> {
    let fields: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
    if fields.len() != 3 {
        return Err(CoordinateParseError::FieldCount(fields.len()));
    }

    let mut parts = [0.0_f64; 3];
    for (index, field) in fields.iter().enumerate() {
        parts[index] =
            field
                .trim()
                .parse::<f64>()
                .map_err(|source| CoordinateParseError::NotANumber {
                    index,
                    value: field.to_string(),
                    source,
                })?;
    }

    let [degrees, minutes, seconds] = parts;
    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    if !decimal.is_finite() {
        return Err(CoordinateParseError::NotFinite);
    }
    Ok(decimal)
}

/// Lenient form used while loading survey rows: malformed input is `None`.
pub fn parse_dms(raw: &str) -> Option<f64> {
    try_parse_dms(raw).ok()
}
