//! Live atmospheric conditions, falling back to the nearest site's survey record.
//!
//! Live failures never reach the prediction path. They are logged and reported
//! back as the fallback reason; the site's recorded values are used instead.
//! Only a fallback onto a site with blank weather cells fails the request.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, warn};
use pet_estimator_core::{OpenWeatherClient, Reading, WeatherError, WeatherSnapshot};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{MissingMeasurement, QueryPoint, SurveySite};

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("live weather timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to read weather snapshot {path}: {source}")]
    Snapshot {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Weather(#[from] WeatherError),
    #[error("live weather source is disabled")]
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentSource {
    Live,
    Fallback,
}

/// Conditions fed to the model: Celsius, percent, m/s
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ResolvedEnvironment {
    pub air_temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub source: EnvironmentSource,
    /// Why the live source was not used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl ResolvedEnvironment {
    pub fn live(reading: Reading) -> Self {
        Self {
            air_temperature: reading.air_temperature,
            humidity: reading.humidity,
            wind_speed: reading.wind_speed,
            source: EnvironmentSource::Live,
            fallback_reason: None,
        }
    }

    pub fn fallback(reading: Reading, reason: String) -> Self {
        Self {
            air_temperature: reading.air_temperature,
            humidity: reading.humidity,
            wind_speed: reading.wind_speed,
            source: EnvironmentSource::Fallback,
            fallback_reason: Some(reason),
        }
    }
}

/// Anything that can report current conditions for a point
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self, point: QueryPoint) -> Result<Reading, FetchError>;
}

/// Pre-fetched snapshot for one fixed region; every point gets the same reading.
///
/// The file is re-read on every call so the daemon's refreshes are picked up.
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl WeatherSource for SnapshotFile {
    async fn current(&self, _point: QueryPoint) -> Result<Reading, FetchError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FetchError::Snapshot {
                path: self.path.display().to_string(),
                source,
            })?;
        let snapshot = WeatherSnapshot::parse(&content)?;
        Ok(snapshot.reading()?)
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current(&self, point: QueryPoint) -> Result<Reading, FetchError> {
        Ok(OpenWeatherClient::current(self, point.lat, point.lon).await?)
    }
}

/// Used when no live source is configured; every request falls back.
pub struct Disabled;

#[async_trait]
impl WeatherSource for Disabled {
    async fn current(&self, _point: QueryPoint) -> Result<Reading, FetchError> {
        Err(FetchError::Disabled)
    }
}

pub struct EnvironmentResolver {
    source: Arc<dyn WeatherSource>,
    timeout: Duration,
}

impl EnvironmentResolver {
    pub fn new(source: Arc<dyn WeatherSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// One live attempt bounded by the timeout, no retries.
    pub async fn resolve(
        &self,
        point: &QueryPoint,
        site: &SurveySite,
    ) -> Result<ResolvedEnvironment, MissingMeasurement> {
        let reason = match self.fetch_live(point).await {
            Ok(reading) => {
                debug!(
                    "live weather for {},{}: {}°C {}% {}m/s",
                    point.lat, point.lon, reading.air_temperature, reading.humidity, reading.wind_speed
                );
                return Ok(ResolvedEnvironment::live(reading));
            }
            Err(FetchError::Disabled) => FetchError::Disabled.to_string(),
            Err(e) => {
                warn!(
                    "live weather unavailable for {},{}, using survey record of {}: {}",
                    point.lat,
                    point.lon,
                    site.name(),
                    e
                );
                e.to_string()
            }
        };
        Ok(ResolvedEnvironment::fallback(site.historical_reading()?, reason))
    }

    async fn fetch_live(&self, point: &QueryPoint) -> Result<Reading, FetchError> {
        tokio::time::timeout(self.timeout, self.source.current(*point))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }
}
