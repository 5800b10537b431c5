//! Weather wire types shared by the estimator and the snapshot daemon.
//!
//! Everything leaving this module is normalized to Celsius, percent relative
//! humidity and meters per second, whatever units the upstream service used.

use std::{fmt, str::FromStr, time::Duration};

use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};

const KELVIN_OFFSET: f64 = 273.15;
const MPH_TO_MPS: f64 = 0.44704;

#[derive(thiserror::Error, Debug)]
pub enum WeatherError {
    #[error("error sending request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("weather service responded with status {0}")]
    Status(StatusCode),
    #[error("weather payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("weather payload is missing field: {0}")]
    MissingField(&'static str),
    #[error("weather payload has a non-finite value for field: {0}")]
    InvalidField(&'static str),
}

/// Unit systems understood by the OpenWeather `units` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Kelvin, m/s
    Standard,
    /// Celsius, m/s
    #[default]
    Metric,
    /// Fahrenheit, mph
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Standard => "standard",
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    pub fn temperature_to_celsius(&self, value: f64) -> f64 {
        match self {
            Units::Standard => value - KELVIN_OFFSET,
            Units::Metric => value,
            Units::Imperial => (value - 32.0) * 5.0 / 9.0,
        }
    }

    pub fn wind_speed_to_mps(&self, value: f64) -> f64 {
        match self {
            Units::Standard | Units::Metric => value,
            Units::Imperial => value * MPH_TO_MPS,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "kelvin" => Ok(Units::Standard),
            "metric" | "celsius" => Ok(Units::Metric),
            "imperial" | "fahrenheit" => Ok(Units::Imperial),
            other => Err(format!("unknown units: {}", other)),
        }
    }
}

/// A complete atmospheric reading in Celsius, percent and m/s
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub air_temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
}

fn require(value: Option<f64>, field: &'static str) -> Result<f64, WeatherError> {
    let value = value.ok_or(WeatherError::MissingField(field))?;
    if !value.is_finite() {
        return Err(WeatherError::InvalidField(field));
    }
    Ok(value)
}

/// Snapshot file for one fixed region, written by the daemon and read by the estimator.
///
/// Numeric fields also accept numeric strings, since hand-exported snapshots
/// often quote their values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WeatherSnapshot {
    #[serde(default, deserialize_with = "number_or_string")]
    pub airtemperature: Option<f64>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub humidity: Option<f64>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub windspeed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl WeatherSnapshot {
    pub fn from_reading(reading: Reading, observed_at: String, latitude: f64, longitude: f64) -> Self {
        Self {
            airtemperature: Some(reading.air_temperature),
            humidity: Some(reading.humidity),
            windspeed: Some(reading.wind_speed),
            observed_at: Some(observed_at),
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }

    pub fn parse(json: &str) -> Result<Self, WeatherError> {
        Ok(serde_json::from_str(json)?)
    }

    /// All three readings, or the first one that is missing
    pub fn reading(&self) -> Result<Reading, WeatherError> {
        Ok(Reading {
            air_temperature: require(self.airtemperature, "airtemperature")?,
            humidity: require(self.humidity, "humidity")?,
            wind_speed: require(self.windspeed, "windspeed")?,
        })
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid number {:?}: {}", s, e))),
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenWeatherResponse {
    pub main: Option<MainGroup>,
    pub wind: Option<WindGroup>,
}

#[derive(Debug, Deserialize)]
pub struct MainGroup {
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct WindGroup {
    pub speed: Option<f64>,
}

impl OpenWeatherResponse {
    pub fn into_reading(self, units: Units) -> Result<Reading, WeatherError> {
        let main = self.main.ok_or(WeatherError::MissingField("main"))?;
        let wind = self.wind.ok_or(WeatherError::MissingField("wind"))?;
        let temp = require(main.temp, "main.temp")?;
        let humidity = require(main.humidity, "main.humidity")?;
        let speed = require(wind.speed, "wind.speed")?;

        Ok(Reading {
            air_temperature: units.temperature_to_celsius(temp),
            humidity,
            wind_speed: units.wind_speed_to_mps(speed),
        })
    }
}

/// Client for the OpenWeather "current weather" endpoint.
///
/// Single attempt per call; the configured timeout covers the whole request.
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
    units: Units,
}

impl OpenWeatherClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        units: Units,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            units,
        })
    }

    pub fn units(&self) -> Units {
        self.units
    }

    pub async fn current(&self, latitude: f64, longitude: f64) -> Result<Reading, WeatherError> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        debug!(
            "requesting current weather: {} lat={} lon={} units={}",
            url, latitude, longitude, self.units
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("appid", self.api_key.clone()),
                ("units", self.units.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status()));
        }

        let body = response.text().await?;
        let parsed: OpenWeatherResponse = serde_json::from_str(&body)?;
        parsed.into_reading(self.units)
    }
}
