use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use estimator::{
    app, model, AppState, EnvironmentResolver, FeatureVector, FetchError, PetEstimator,
    PredictionService, QueryPoint, RawTable, Regressor, SurveyIndex, WeatherSource,
    WeatherSourceKind,
};
use hyper::{header, Method};
use mockall::mock;
use pet_estimator_core::Reading;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

mock! {
    pub LiveWeather {}

    #[async_trait]
    impl WeatherSource for LiveWeather {
        async fn current(&self, point: QueryPoint) -> Result<Reading, FetchError>;
    }
}

mock! {
    pub Model {}

    impl Regressor for Model {
        fn predict(&self, features: &FeatureVector) -> Result<f64, model::Error>;
    }
}

pub const HEADER: &str =
    "location_name,lat,lon,SVF,GVI,BVI,AirTemperature,Humidity,WindSpeed";

/// One site at (35.2330, 129.0800): svf 0.5, gvi 0.3, bvi 0.2, recorded 22.0°C / 60% / 1.5 m/s
pub const PLAZA: &str = "Plaza,35;13;58.8,129;4;48,0.5,0.3,0.2,22.0,60,1.5";

pub struct TestApp {
    pub app: Router,
}

pub async fn spawn_app(rows: &str, weather: MockLiveWeather, model: MockModel) -> TestApp {
    let csv = format!("{}\n{}\n", HEADER, rows);
    let survey = SurveyIndex::build(RawTable::from_csv_reader(csv.as_bytes()).unwrap()).unwrap();

    let estimator = PetEstimator::new(
        Arc::new(survey),
        EnvironmentResolver::new(Arc::new(weather), Duration::from_secs(1)),
        PredictionService::new(Arc::new(model)),
    );
    let app_state = AppState {
        estimator: Arc::new(estimator),
        weather_source: WeatherSourceKind::Openweather,
    };

    TestApp { app: app(app_state) }
}

impl TestApp {
    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_raw(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request.");

        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }
}
