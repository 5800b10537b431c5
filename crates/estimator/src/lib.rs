pub mod coordinates;
pub mod environment;
pub mod features;
pub mod model;
pub mod pipeline;
mod routes;
mod startup;
pub mod survey;
mod utils;

pub use coordinates::{parse_dms, try_parse_dms, CoordinateParseError, QueryPoint};
pub use environment::{
    EnvironmentResolver, EnvironmentSource, FetchError, ResolvedEnvironment, SnapshotFile,
    WeatherSource,
};
pub use features::{
    assemble, FeatureVector, IndexError, IndexOverrides, InvalidOverride, StoredIndices,
    VisualIndices, FEATURE_NAMES,
};
pub use model::{ForestModel, PredictionService, Regressor};
pub use pipeline::{format_pet, Estimate, EstimateRequest, MatchedSite, PetEstimator};
pub use routes::*;
pub use startup::*;
pub use survey::{
    normalize_column_name, MissingMeasurement, NoValidSites, RawTable, SurveyIndex, SurveySite,
};
pub use utils::*;
