use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::AppState;

/// A locatable survey site, for drawing markers. Blank indices are `null`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SiteMarker {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub svf: Option<f64>,
    pub gvi: Option<f64>,
    pub bvi: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Health {
    pub status: String,
    pub sites: usize,
    pub geocoded_sites: usize,
    pub weather_source: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/sites",
    responses(
        (status = OK, description = "Surveyed sites with valid coordinates", body = Vec<SiteMarker>)
    ))]
pub async fn sites(State(state): State<Arc<AppState>>) -> Json<Vec<SiteMarker>> {
    let markers = state
        .estimator
        .survey()
        .geocoded()
        .filter_map(|site| {
            let (lat, lon) = site.coordinates()?;
            Some(SiteMarker {
                name: site.name().to_string(),
                lat,
                lon,
                svf: site.svf,
                gvi: site.gvi,
                bvi: site.bvi,
            })
        })
        .collect();
    Json(markers)
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = OK, description = "Loaded dataset summary", body = Health)
    ))]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    let survey = state.estimator.survey();
    Json(Health {
        status: "ok".to_string(),
        sites: survey.sites().len(),
        geocoded_sites: survey.geocoded_count(),
        weather_source: state.weather_source.to_string(),
    })
}
