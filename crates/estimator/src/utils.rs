use clap::{Parser, ValueEnum};
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};
use log::LevelFilter;
use pet_estimator_core::{
    find_config_file, load_config, ConfigSource, Units, DEFAULT_ESTIMATOR_PORT,
    DEFAULT_SNAPSHOT_FILE, DEFAULT_WEATHER_API_URL, DEFAULT_WEATHER_TIMEOUT,
};
use std::{env, time::Duration};
use time::{format_description::well_known::Iso8601, OffsetDateTime};

/// Where live conditions come from before falling back to survey records
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherSourceKind {
    /// Snapshot JSON for one fixed region, refreshed by the daemon
    #[default]
    Snapshot,
    /// Per-point OpenWeather current conditions
    Openweather,
    /// No live source, always use survey records
    None,
}

impl std::fmt::Display for WeatherSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WeatherSourceKind::Snapshot => "snapshot",
            WeatherSourceKind::Openweather => "openweather",
            WeatherSourceKind::None => "none",
        };
        f.write_str(name)
    }
}

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "PET Estimator - Thermal comfort estimates from survey sites and live weather"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $PET_ESTIMATOR_CONFIG, ./estimator.toml,
    /// $XDG_CONFIG_HOME/pet-estimator/estimator.toml, /etc/pet-estimator/estimator.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "PET_ESTIMATOR_LEVEL")]
    pub level: Option<String>,

    /// Host to listen on (use 0.0.0.0 for all interfaces)
    #[arg(long, env = "PET_ESTIMATOR_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PET_ESTIMATOR_PORT")]
    pub port: Option<String>,

    /// Survey dataset (.xlsx/.xls/.ods workbook or .csv export)
    #[arg(short, long, env = "PET_ESTIMATOR_SURVEY_FILE")]
    pub survey_file: Option<String>,

    /// Worksheet holding the GPS-tagged rows; first worksheet when unset
    #[arg(long, env = "PET_ESTIMATOR_SURVEY_SHEET")]
    pub survey_sheet: Option<String>,

    /// Random forest exported as JSON
    #[arg(short, long, env = "PET_ESTIMATOR_MODEL_FILE")]
    pub model_file: Option<String>,

    /// Live weather source: snapshot, openweather or none
    #[arg(short, long, env = "PET_ESTIMATOR_WEATHER_SOURCE")]
    pub weather_source: Option<WeatherSourceKind>,

    /// Snapshot JSON read by the snapshot weather source
    #[arg(long, env = "PET_ESTIMATOR_WEATHER_SNAPSHOT")]
    pub weather_snapshot: Option<String>,

    /// OpenWeather API root
    #[arg(long, env = "PET_ESTIMATOR_WEATHER_API_URL")]
    pub weather_api_url: Option<String>,

    /// OpenWeather API key
    #[arg(long, env = "PET_ESTIMATOR_WEATHER_API_KEY")]
    pub weather_api_key: Option<String>,

    /// Units requested from OpenWeather: standard, metric, imperial
    #[arg(long, env = "PET_ESTIMATOR_WEATHER_UNITS")]
    pub weather_units: Option<Units>,

    /// Seconds to wait for live weather before falling back
    #[arg(short = 't', long, env = "PET_ESTIMATOR_WEATHER_TIMEOUT")]
    pub weather_timeout: Option<u64>,
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn host(&self) -> String {
        self.host.clone().unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn port(&self) -> String {
        self.port
            .clone()
            .unwrap_or_else(|| DEFAULT_ESTIMATOR_PORT.to_string())
    }

    pub fn survey_file(&self) -> String {
        self.survey_file
            .clone()
            .unwrap_or_else(|| "./survey_sites.xlsx".to_string())
    }

    pub fn model_file(&self) -> String {
        self.model_file
            .clone()
            .unwrap_or_else(|| "./pet_forest.json".to_string())
    }

    pub fn weather_source(&self) -> WeatherSourceKind {
        self.weather_source.unwrap_or_default()
    }

    pub fn weather_snapshot(&self) -> String {
        self.weather_snapshot
            .clone()
            .unwrap_or_else(|| DEFAULT_SNAPSHOT_FILE.to_string())
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
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("PET_ESTIMATOR_CONFIG", "estimator.toml")
    };

    let file_config: Cli = match load_config(&source) {
        Ok(config) => config,
        Err(e) => {
            // logger isn't installed yet
            eprintln!("ignoring config file {}: {:#}", source, e);
            Cli::default()
        }
    };

    merge_config(cli_args, file_config)
}

/// CLI args override file config (env vars are handled by clap)
pub fn merge_config(cli_args: Cli, file_config: Cli) -> Cli {
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        host: cli_args.host.or(file_config.host),
        port: cli_args.port.or(file_config.port),
        survey_file: cli_args.survey_file.or(file_config.survey_file),
        survey_sheet: cli_args.survey_sheet.or(file_config.survey_sheet),
        model_file: cli_args.model_file.or(file_config.model_file),
        weather_source: cli_args.weather_source.or(file_config.weather_source),
        weather_snapshot: cli_args.weather_snapshot.or(file_config.weather_snapshot),
        weather_api_url: cli_args.weather_api_url.or(file_config.weather_api_url),
        weather_api_key: cli_args.weather_api_key.or(file_config.weather_api_key),
        weather_units: cli_args.weather_units.or(file_config.weather_units),
        weather_timeout: cli_args.weather_timeout.or(file_config.weather_timeout),
    }
}

pub fn get_log_level(cli: &Cli) -> LevelFilter {
    let level_str = cli
        .level
        .clone()
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    match level_str.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

pub fn setup_logger() -> Dispatch {
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                now,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .chain(std::io::stdout())
}
