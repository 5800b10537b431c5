//! Location-to-PET resolution: nearest site, conditions, features, prediction.

use std::sync::Arc;

use log::{error, info};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    assemble, model, EnvironmentResolver, FeatureVector, IndexError, IndexOverrides,
    InvalidOverride, MissingMeasurement, NoValidSites, PredictionService, QueryPoint,
    ResolvedEnvironment, SurveyIndex,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("query point ({lat}, {lon}) is not a valid latitude/longitude")]
    InvalidQueryPoint { lat: f64, lon: f64 },
    #[error(transparent)]
    InvalidOverride(#[from] InvalidOverride),
    #[error(transparent)]
    NoValidSites(#[from] NoValidSites),
    /// The nearest site lacks a value this request needed; never substituted
    /// by a farther site
    #[error(transparent)]
    IncompleteSite(#[from] MissingMeasurement),
    #[error("PET inference failed: {0}")]
    Inference(#[from] model::Error),
}

/// A map click plus optional slider adjustments
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, ToSchema)]
pub struct EstimateRequest {
    #[serde(flatten)]
    pub point: QueryPoint,
    #[serde(flatten)]
    pub overrides: IndexOverrides,
}

/// The survey site whose indices were used
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MatchedSite {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Planar distance from the query point, in degrees
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Estimate {
    /// Physiological Equivalent Temperature, °C
    pub pet: f64,
    /// `pet` rounded to two decimals for display
    pub pet_formatted: String,
    pub site: MatchedSite,
    pub environment: ResolvedEnvironment,
    pub features: FeatureVector,
}

pub fn format_pet(pet: f64) -> String {
    format!("{:.2}", pet)
}

/// Process-wide handles, built once at startup and only ever read afterwards
pub struct PetEstimator {
    survey: Arc<SurveyIndex>,
    resolver: EnvironmentResolver,
    predictor: PredictionService,
}

impl PetEstimator {
    pub fn new(
        survey: Arc<SurveyIndex>,
        resolver: EnvironmentResolver,
        predictor: PredictionService,
    ) -> Self {
        Self {
            survey,
            resolver,
            predictor,
        }
    }

    pub fn survey(&self) -> &SurveyIndex {
        &self.survey
    }

    pub async fn estimate(&self, request: &EstimateRequest) -> Result<Estimate, Error> {
        let point = request.point;
        if !point.is_valid() {
            return Err(Error::InvalidQueryPoint {
                lat: point.lat,
                lon: point.lon,
            });
        }

        let nearest = self.survey.nearest(&point)?;
        let site = nearest.site;
        // overrides are checked before the live fetch so a bad request costs nothing
        let indices = request
            .overrides
            .apply(site.indices())
            .map_err(|e| match e {
                IndexError::InvalidOverride(e) => Error::InvalidOverride(e),
                IndexError::Missing(field) => Error::IncompleteSite(site.missing(field)),
            })?;

        let environment = self.resolver.resolve(&point, site).await?;
        let features = assemble(indices, &environment);

        let pet = self.predictor.predict(&features).map_err(|e| {
            error!(
                "PET inference failed for {},{} at {}: {}",
                point.lat,
                point.lon,
                site.name(),
                e
            );
            e
        })?;

        info!(
            "estimated PET {} at {},{} (site {}, {:?} weather)",
            format_pet(pet),
            point.lat,
            point.lon,
            site.name(),
            environment.source
        );

        let (lat, lon) = site.coordinates().unwrap_or((point.lat, point.lon));
        Ok(Estimate {
            pet,
            pet_formatted: format_pet(pet),
            site: MatchedSite {
                name: site.name().to_string(),
                lat,
                lon,
                distance: nearest.distance,
            },
            environment,
            features,
        })
    }
}
