use anyhow::{anyhow, Context};
use pet_estimator_core::{OpenWeatherClient, WeatherSnapshot};
use slog::{debug, error, info, Logger};
use std::{
    fs,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::create_folder;

pub struct SnapshotService {
    logger: Logger,
    client: OpenWeatherClient,
    latitude: f64,
    longitude: f64,
    snapshot_file: PathBuf,
}

impl SnapshotService {
    pub fn new(
        logger: Logger,
        client: OpenWeatherClient,
        latitude: f64,
        longitude: f64,
        snapshot_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            logger,
            client,
            latitude,
            longitude,
            snapshot_file: snapshot_file.into(),
        }
    }

    /// Fetch current conditions for the region center and replace the snapshot.
    /// The existing file is only touched once a complete reading is in hand.
    pub async fn refresh(&self) -> Result<WeatherSnapshot, anyhow::Error> {
        let reading = self
            .client
            .current(self.latitude, self.longitude)
            .await
            .map_err(|e| anyhow!("error fetching current weather: {}", e))?;
        debug!(self.logger, "reading: {:?}", reading);

        let observed_at = OffsetDateTime::now_utc().format(&Rfc3339)?;
        let snapshot =
            WeatherSnapshot::from_reading(reading, observed_at, self.latitude, self.longitude);

        if let Some(parent) = self.snapshot_file.parent() {
            if !parent.as_os_str().is_empty() {
                create_folder(parent, &self.logger);
            }
        }
        write_snapshot(&self.snapshot_file, &snapshot)?;
        info!(
            self.logger,
            "snapshot written to {}: {:.1}°C, {:.0}%, {:.1} m/s",
            self.snapshot_file.display(),
            reading.air_temperature,
            reading.humidity,
            reading.wind_speed
        );

        Ok(snapshot)
    }

    /// Refresh on every tick until `shutdown` resolves. A failed refresh is
    /// logged and the previous snapshot stays in place.
    pub async fn run(&self, period: Duration, shutdown: impl Future<Output = ()>) {
        info!(
            self.logger,
            "Wait time between snapshot refreshes: {} seconds",
            period.as_secs()
        );
        tokio::pin!(shutdown);

        let mut refresh_interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(self.logger, "Shutting down");
                    break;
                }
                _ = refresh_interval.tick() => {
                    match self.refresh().await {
                        Ok(_) => info!(self.logger, "Snapshot refreshed, waiting {} seconds for next run", period.as_secs()),
                        Err(err) => error!(
                            self.logger,
                            "Error refreshing snapshot, keeping {}: {:#}",
                            self.snapshot_file.display(),
                            err
                        ),
                    }
                }
            }
        }
    }
}

/// Write to a sibling temp file, then rename over the target so readers
/// never see a half-written snapshot.
pub fn write_snapshot(path: &Path, snapshot: &WeatherSnapshot) -> Result<(), anyhow::Error> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("snapshot path {} has no file name", path.display()))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let body = serde_json::to_vec_pretty(snapshot)?;
    fs::write(&tmp_path, body)
        .with_context(|| format!("error writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "error moving {} to {}",
            tmp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pet_estimator_core::{Reading, Units};
    use slog::o;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn client(base_url: &str) -> OpenWeatherClient {
        OpenWeatherClient::new(
            base_url,
            "test-key".to_string(),
            Units::Metric,
            Duration::from_secs(2),
            "daemon-test",
        )
        .unwrap()
    }

    #[test]
    fn written_snapshot_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("latest.json");
        let snapshot = WeatherSnapshot::from_reading(
            Reading {
                air_temperature: 18.5,
                humidity: 71.0,
                wind_speed: 3.2,
            },
            "2026-07-01T03:00:00Z".to_string(),
            35.233,
            129.08,
        );

        write_snapshot(&target, &snapshot).unwrap();

        let text = fs::read_to_string(&target).unwrap();
        let parsed = WeatherSnapshot::parse(&text).unwrap();
        assert_eq!(parsed.reading().unwrap().air_temperature, 18.5);
        assert_eq!(parsed.observed_at.as_deref(), Some("2026-07-01T03:00:00Z"));
        assert!(!dir.path().join(".latest.json.tmp").exists());
    }

    #[tokio::test]
    async fn refresh_replaces_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("lat", "35.233"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"main": {"temp": 27.4, "humidity": 66}, "wind": {"speed": 2.1}}"#,
            ))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("latest.json");
        let service = SnapshotService::new(logger(), client(&server.uri()), 35.233, 129.08, &target);

        let snapshot = service.refresh().await.unwrap();

        assert_eq!(snapshot.airtemperature, Some(27.4));
        let on_disk = WeatherSnapshot::parse(&fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(on_disk.humidity, Some(66.0));
        assert_eq!(on_disk.windspeed, Some(2.1));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("latest.json");
        fs::write(&target, r#"{"airtemperature": 20, "humidity": 55, "windspeed": 1}"#).unwrap();
        let service = SnapshotService::new(logger(), client(&server.uri()), 35.233, 129.08, &target);

        assert!(service.refresh().await.is_err());

        let kept = WeatherSnapshot::parse(&fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(kept.airtemperature, Some(20.0));
    }

    #[tokio::test]
    async fn run_refreshes_until_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"main": {"temp": 19.0, "humidity": 80}, "wind": {"speed": 4.0}}"#,
            ))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("latest.json");
        let service = SnapshotService::new(logger(), client(&server.uri()), 35.233, 129.08, &target);

        let stopped = tokio::time::timeout(
            Duration::from_secs(5),
            service.run(
                Duration::from_secs(3600),
                tokio::time::sleep(Duration::from_millis(300)),
            ),
        )
        .await;

        assert!(stopped.is_ok());
        let on_disk = WeatherSnapshot::parse(&fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(on_disk.airtemperature, Some(19.0));
    }
}
