use crate::{
    environment::Disabled, estimate, health, routes, sites, Cli, EnvironmentResolver,
    ForestModel, PetEstimator, PredictionService, SnapshotFile, SurveyIndex, WeatherSource,
    WeatherSourceKind,
};
use anyhow::{anyhow, Context};
use axum::{
    body::Body,
    extract::Request,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use hyper::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use log::info;
use pet_estimator_core::OpenWeatherClient;
use std::{path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

#[derive(Clone)]
pub struct AppState {
    pub estimator: Arc<PetEstimator>,
    pub weather_source: WeatherSourceKind,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::estimate::estimate,
        routes::sites::sites,
        routes::sites::health,
    ),
    components(
        schemas(
            crate::EstimateRequest,
            crate::Estimate,
            crate::MatchedSite,
            crate::ResolvedEnvironment,
            crate::EnvironmentSource,
            crate::FeatureVector,
            routes::sites::SiteMarker,
            routes::sites::Health,
            routes::ErrorBody,
        )
    ),
    tags(
        (name = "pet estimator api", description = "Physiological Equivalent Temperature estimates for any point near the surveyed sites")
    )
)]
struct ApiDoc;

pub fn build_weather_source(cli: &Cli) -> Result<Arc<dyn WeatherSource>, anyhow::Error> {
    let source: Arc<dyn WeatherSource> = match cli.weather_source() {
        WeatherSourceKind::Snapshot => Arc::new(SnapshotFile::new(cli.weather_snapshot())),
        WeatherSourceKind::Openweather => {
            let api_key = cli
                .weather_api_key
                .clone()
                .ok_or_else(|| anyhow!("weather_api_key is required for the openweather source"))?;
            Arc::new(
                OpenWeatherClient::new(
                    &cli.weather_api_url(),
                    api_key,
                    cli.weather_units(),
                    cli.weather_timeout(),
                    concat!("pet-estimator/", env!("CARGO_PKG_VERSION")),
                )
                .map_err(|e| anyhow!("error building weather client: {}", e))?,
            )
        }
        WeatherSourceKind::None => Arc::new(Disabled),
    };
    Ok(source)
}

/// Load the survey table and model once; everything else borrows them read-only.
pub fn build_app_state(cli: &Cli) -> Result<AppState, anyhow::Error> {
    let survey_file = cli.survey_file();
    let survey = SurveyIndex::load(Path::new(&survey_file), cli.survey_sheet.as_deref())
        .with_context(|| format!("error loading survey dataset {}", survey_file))?;
    if survey.geocoded_count() == 0 {
        log::warn!(
            "survey dataset {} has no site with valid coordinates, every estimate will fail",
            survey_file
        );
    }

    let model_file = cli.model_file();
    let model = ForestModel::load(Path::new(&model_file))
        .with_context(|| format!("error loading model {}", model_file))?;

    let resolver = EnvironmentResolver::new(build_weather_source(cli)?, cli.weather_timeout());
    let estimator = PetEstimator::new(
        Arc::new(survey),
        resolver,
        PredictionService::new(Arc::new(model)),
    );

    Ok(AppState {
        estimator: Arc::new(estimator),
        weather_source: cli.weather_source(),
    })
}

pub fn app(app_state: AppState) -> Router {
    let api_docs = ApiDoc::openapi();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/api/v1/estimate", post(estimate))
        .route("/api/v1/sites", get(sites))
        .route("/api/v1/health", get(health))
        .with_state(Arc::new(app_state))
        .layer(middleware::from_fn(log_request))
        .merge(Scalar::with_url("/docs", api_docs))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}
