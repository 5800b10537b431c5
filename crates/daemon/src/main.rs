use anyhow::anyhow;
use daemon::{get_config_info, setup_logger, shutdown_signal, Cli, SnapshotService};
use pet_estimator_core::OpenWeatherClient;
use slog::{info, Logger};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = get_config_info();
    let logger = setup_logger(&cli);

    info!(logger, "PET Daemon starting...");
    info!(logger, "  Snapshot file: {}", cli.snapshot_file());
    info!(
        logger,
        "  Region center: {},{}",
        cli.latitude(),
        cli.longitude()
    );
    info!(logger, "  Fetch interval: {} seconds", cli.sleep_interval());

    let period = cli.refresh_interval()?;
    let service = build_service(&cli, logger)?;

    service.run(period, shutdown_signal()).await;
    Ok(())
}

fn build_service(cli: &Cli, logger: Logger) -> Result<SnapshotService, anyhow::Error> {
    let api_key = cli
        .weather_api_key
        .clone()
        .ok_or_else(|| anyhow!("weather_api_key is required"))?;
    let client = OpenWeatherClient::new(
        &cli.weather_api_url(),
        api_key,
        cli.weather_units(),
        cli.weather_timeout(),
        &cli.user_agent(),
    )
    .map_err(|e| anyhow!("error building weather client: {}", e))?;

    Ok(SnapshotService::new(
        logger,
        client,
        cli.latitude(),
        cli.longitude(),
        cli.snapshot_file(),
    ))
}
