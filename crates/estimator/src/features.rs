//! Packs visual indices and conditions into the regressor's input order.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ResolvedEnvironment;

/// Column names, in order, exactly as the model was trained on them
pub const FEATURE_NAMES: [&str; 6] = [
    "SVF",
    "GVI",
    "BVI",
    "AirTemperature",
    "Humidity",
    "WindSpeed",
];

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("{name} override must be within [0.0, 1.0], got {value}")]
pub struct InvalidOverride {
    pub name: &'static str,
    pub value: f64,
}

/// Sky View Factor, Green View Index, Building View Index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct VisualIndices {
    pub svf: f64,
    pub gvi: f64,
    pub bvi: f64,
}

/// Indices as recorded for a site; blank cells are `None`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoredIndices {
    pub svf: Option<f64>,
    pub gvi: Option<f64>,
    pub bvi: Option<f64>,
}

impl From<VisualIndices> for StoredIndices {
    fn from(indices: VisualIndices) -> Self {
        Self {
            svf: Some(indices.svf),
            gvi: Some(indices.gvi),
            bvi: Some(indices.bvi),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum IndexError {
    #[error(transparent)]
    InvalidOverride(#[from] InvalidOverride),
    /// Stored index is blank and the caller gave no override
    #[error("no recorded {0} and no override given")]
    Missing(&'static str),
}

/// Caller adjustments; each index is overridable on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, ToSchema)]
pub struct IndexOverrides {
    pub svf: Option<f64>,
    pub gvi: Option<f64>,
    pub bvi: Option<f64>,
}

impl IndexOverrides {
    /// Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), InvalidOverride> {
        for (name, value) in [("SVF", self.svf), ("GVI", self.gvi), ("BVI", self.bvi)] {
            match value {
                Some(value) if !(0.0..=1.0).contains(&value) => {
                    return Err(InvalidOverride { name, value })
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Overrides win over stored values. A bad override is reported before
    /// any blank stored index.
    pub fn apply(&self, stored: StoredIndices) -> Result<VisualIndices, IndexError> {
        self.validate()?;
        Ok(VisualIndices {
            svf: pick("SVF", self.svf, stored.svf)?,
            gvi: pick("GVI", self.gvi, stored.gvi)?,
            bvi: pick("BVI", self.bvi, stored.bvi)?,
        })
    }
}

fn pick(name: &'static str, value: Option<f64>, stored: Option<f64>) -> Result<f64, IndexError> {
    value.or(stored).ok_or(IndexError::Missing(name))
}

/// `(SVF, GVI, BVI, AirTemperature, Humidity, WindSpeed)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct FeatureVector {
    #[serde(rename = "SVF")]
    pub svf: f64,
    #[serde(rename = "GVI")]
    pub gvi: f64,
    #[serde(rename = "BVI")]
    pub bvi: f64,
    #[serde(rename = "AirTemperature")]
    pub air_temperature: f64,
    #[serde(rename = "Humidity")]
    pub humidity: f64,
    #[serde(rename = "WindSpeed")]
    pub wind_speed: f64,
}

impl FeatureVector {
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.svf,
            self.gvi,
            self.bvi,
            self.air_temperature,
            self.humidity,
            self.wind_speed,
        ]
    }

    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FEATURE_NAMES.into_iter().zip(self.as_array())
    }
}

/// Pure packaging; units are already normalized by the resolver.
pub fn assemble(indices: VisualIndices, environment: &ResolvedEnvironment) -> FeatureVector {
    FeatureVector {
        svf: indices.svf,
        gvi: indices.gvi,
        bvi: indices.bvi,
        air_temperature: environment.air_temperature,
        humidity: environment.humidity,
        wind_speed: environment.wind_speed,
    }
}
