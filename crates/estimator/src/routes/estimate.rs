use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use log::{error, warn};
use std::sync::Arc;

use crate::{pipeline, routes::error_response, AppState, ErrorBody, Estimate, EstimateRequest};

#[utoipa::path(
    post,
    path = "/api/v1/estimate",
    request_body = EstimateRequest,
    responses(
        (status = OK, description = "PET estimate for the nearest surveyed site", body = Estimate),
        (status = BAD_REQUEST, description = "Invalid coordinates or index override", body = ErrorBody),
        (status = UNPROCESSABLE_ENTITY, description = "Body is JSON but not an estimate request", body = ErrorBody),
        (status = SERVICE_UNAVAILABLE, description = "No locatable site, or the nearest site lacks a needed value", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Model inference failed", body = ErrorBody)
    ))]
pub async fn estimate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EstimateRequest>, JsonRejection>,
) -> Result<Json<Estimate>, (StatusCode, Json<ErrorBody>)> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("rejected estimate body: {}", rejection.body_text());
        error_response(rejection.status(), rejection.body_text())
    })?;

    state
        .estimator
        .estimate(&request)
        .await
        .map(Json)
        .map_err(|e| {
            let status = match &e {
                pipeline::Error::InvalidQueryPoint { .. } | pipeline::Error::InvalidOverride(_) => {
                    warn!("rejected estimate request: {}", e);
                    StatusCode::BAD_REQUEST
                }
                pipeline::Error::NoValidSites(_) | pipeline::Error::IncompleteSite(_) => {
                    error!("cannot estimate: {}", e);
                    StatusCode::SERVICE_UNAVAILABLE
                }
                pipeline::Error::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, e.to_string())
        })
}
