//! PET Estimator Core Library
//!
//! Shared pieces for the estimator and snapshot daemon:
//! - Configuration loading (XDG-compliant)
//! - File system utilities
//! - Weather wire types and the OpenWeather client

mod config;
pub mod fs;
pub mod weather;

pub use config::{find_config_file, load_config, ConfigSource};
pub use fs::{create_dir_all, path_exists};
pub use weather::{OpenWeatherClient, Reading, Units, WeatherError, WeatherSnapshot};

/// Application name used for XDG paths
pub const APP_NAME: &str = "pet-estimator";

/// Default estimator port
pub const DEFAULT_ESTIMATOR_PORT: u16 = 9810;

/// Default daemon refresh interval (10 minutes)
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 600;

/// Default bound on a single live weather request, in seconds
pub const DEFAULT_WEATHER_TIMEOUT: u64 = 4;

/// Default snapshot file shared by the daemon (writer) and the estimator (reader)
pub const DEFAULT_SNAPSHOT_FILE: &str = "./kma_latest_weather.json";

/// Default OpenWeather endpoint root
pub const DEFAULT_WEATHER_API_URL: &str = "https://api.openweathermap.org";
