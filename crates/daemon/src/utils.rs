use anyhow::anyhow;
use clap::Parser;
use pet_estimator_core::{
    create_dir_all, find_config_file, load_config, path_exists, ConfigSource, Units,
    DEFAULT_SNAPSHOT_FILE, DEFAULT_SNAPSHOT_INTERVAL, DEFAULT_WEATHER_API_URL,
    DEFAULT_WEATHER_TIMEOUT,
};
use slog::{error, info, o, Drain, Level, Logger};
use std::{env, path::Path, time::Duration};
use tokio::signal;

/// Center of the surveyed campus, used when no region is configured
pub const DEFAULT_LATITUDE: f64 = 35.233;
pub const DEFAULT_LONGITUDE: f64 = 129.08;

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "PET Daemon - Keeps the regional weather snapshot fresh for the estimator"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $PET_DAEMON_CONFIG, ./daemon.toml,
    /// $XDG_CONFIG_HOME/pet-estimator/daemon.toml, /etc/pet-estimator/daemon.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "PET_DAEMON_LEVEL")]
    pub level: Option<String>,

    /// Snapshot JSON to (re)write
    #[arg(short = 'f', long, env = "PET_DAEMON_SNAPSHOT_FILE")]
    pub snapshot_file: Option<String>,

    /// Latitude of the region center
    #[arg(long, env = "PET_DAEMON_LATITUDE")]
    pub latitude: Option<f64>,

    /// Longitude of the region center
    #[arg(long, env = "PET_DAEMON_LONGITUDE")]
    pub longitude: Option<f64>,

    /// Refresh interval in seconds
    #[arg(short, long, env = "PET_DAEMON_SLEEP_INTERVAL")]
    pub sleep_interval: Option<u64>,

    /// OpenWeather API root
    #[arg(long, env = "PET_DAEMON_WEATHER_API_URL")]
    pub weather_api_url: Option<String>,

    /// OpenWeather API key
    #[arg(short = 'k', long, env = "PET_DAEMON_WEATHER_API_KEY")]
    pub weather_api_key: Option<String>,

    /// Units requested from OpenWeather: standard, metric, imperial
    #[arg(long, env = "PET_DAEMON_WEATHER_UNITS")]
    pub weather_units: Option<Units>,

    /// Seconds to wait for one weather request
    #[arg(short = 't', long, env = "PET_DAEMON_WEATHER_TIMEOUT")]
    pub weather_timeout: Option<u64>,

    /// HTTP User-Agent header for weather API requests
    #[arg(short, long, env = "PET_DAEMON_USER_AGENT")]
    pub user_agent: Option<String>,
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn snapshot_file(&self) -> String {
        self.snapshot_file
            .clone()
            .unwrap_or_else(|| DEFAULT_SNAPSHOT_FILE.to_string())
    }

    pub fn latitude(&self) -> f64 {
        self.latitude.unwrap_or(DEFAULT_LATITUDE)
    }

    pub fn longitude(&self) -> f64 {
        self.longitude.unwrap_or(DEFAULT_LONGITUDE)
    }

    pub fn sleep_interval(&self) -> u64 {
        self.sleep_interval.unwrap_or(DEFAULT_SNAPSHOT_INTERVAL)
    }

    /// Tick period for the refresh loop; zero is rejected since the loop would spin
    pub fn refresh_interval(&self) -> Result<Duration, anyhow::Error> {
        match self.sleep_interval() {
            0 => Err(anyhow!("sleep_interval must be at least 1 second")),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    pub fn weather_api_url(&self) -> String {
        self.weather_api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_WEATHER_API_URL.to_string())
    }

    pub fn weather_units(&self) -> Units {
        self.weather_units.unwrap_or_default()
    }

    pub fn weather_timeout(&self) -> Duration {
        Duration::from_secs(self.weather_timeout.unwrap_or(DEFAULT_WEATHER_TIMEOUT))
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| "pet-estimator-daemon/1.0".to_string())
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("PET_DAEMON_CONFIG", "daemon.toml")
    };

    let file_config: Cli = load_config(&source).unwrap_or_default();

    merge_config(cli_args, file_config)
}

/// CLI args override file config (env vars are handled by clap)
pub fn merge_config(cli_args: Cli, file_config: Cli) -> Cli {
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        snapshot_file: cli_args.snapshot_file.or(file_config.snapshot_file),
        latitude: cli_args.latitude.or(file_config.latitude),
        longitude: cli_args.longitude.or(file_config.longitude),
        sleep_interval: cli_args.sleep_interval.or(file_config.sleep_interval),
        weather_api_url: cli_args.weather_api_url.or(file_config.weather_api_url),
        weather_api_key: cli_args.weather_api_key.or(file_config.weather_api_key),
        weather_units: cli_args.weather_units.or(file_config.weather_units),
        weather_timeout: cli_args.weather_timeout.or(file_config.weather_timeout),
        user_agent: cli_args.user_agent.or(file_config.user_agent),
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    }
}

pub fn setup_logger(cli: &Cli) -> Logger {
    let log_level = match cli.level.as_ref() {
        Some(level) => parse_level(level),
        None => parse_level(&env::var("RUST_LOG").unwrap_or_default()),
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(log_level).fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

pub fn create_folder(root_path: &Path, logger: &Logger) {
    if path_exists(root_path) {
        return;
    }
    match create_dir_all(root_path) {
        Ok(()) => info!(logger, "folder created: {}", root_path.display()),
        Err(err) => error!(logger, "error creating folder: {}", err),
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_fills_gaps_left_by_cli() {
        let cli = Cli {
            latitude: Some(35.1),
            ..Default::default()
        };
        let file: Cli = toml::from_str(
            r#"
            latitude = 37.5
            longitude = 127.0
            sleep_interval = 300
            weather_units = "imperial"
            "#,
        )
        .unwrap();

        let merged = merge_config(cli, file);
        assert_eq!(merged.latitude(), 35.1);
        assert_eq!(merged.longitude(), 127.0);
        assert_eq!(merged.sleep_interval(), 300);
        assert_eq!(merged.weather_units(), Units::Imperial);
    }

    #[test]
    fn defaults_point_at_the_survey_region() {
        let cli = Cli::default();
        assert_eq!((cli.latitude(), cli.longitude()), (35.233, 129.08));
        assert_eq!(cli.sleep_interval(), DEFAULT_SNAPSHOT_INTERVAL);
        assert_eq!(cli.snapshot_file(), DEFAULT_SNAPSHOT_FILE);
    }

    #[test]
    fn level_names_map_to_slog_levels() {
        assert_eq!(parse_level("WARN"), Level::Warning);
        assert_eq!(parse_level("trace"), Level::Trace);
        assert_eq!(parse_level(""), Level::Info);
    }

    #[test]
    fn zero_refresh_interval_is_rejected() {
        let cli: Cli = toml::from_str("sleep_interval = 0").unwrap();
        assert!(cli.refresh_interval().is_err());

        let cli: Cli = toml::from_str("sleep_interval = 90").unwrap();
        assert_eq!(cli.refresh_interval().unwrap(), Duration::from_secs(90));
        assert_eq!(
            Cli::default().refresh_interval().unwrap(),
            Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL)
        );
    }
}
