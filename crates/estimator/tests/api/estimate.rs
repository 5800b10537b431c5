use crate::helpers::{spawn_app, MockLiveWeather, MockModel, PLAZA};
use axum::http::StatusCode;
use estimator::{model, FetchError};
use pet_estimator_core::{Reading, WeatherError};
use serde_json::json;

fn failing_weather(times: usize) -> MockLiveWeather {
    let mut weather = MockLiveWeather::new();
    weather
        .expect_current()
        .times(times)
        .returning(|_| Err(FetchError::Weather(WeatherError::MissingField("wind"))));
    weather
}

/// Live source down: the site's recorded weather feeds the model
#[tokio::test]
async fn falls_back_to_site_weather_when_live_source_fails() {
    let mut model = MockModel::new();
    model
        .expect_predict()
        .withf(|features| features.as_array() == [0.5, 0.3, 0.2, 22.0, 60.0, 1.5])
        .times(1)
        .returning(|_| Ok(30.0));

    let test_app = spawn_app(PLAZA, failing_weather(1), model).await;
    let (status, body) = test_app
        .post_json(
            "/api/v1/estimate",
            json!({ "lat": 35.2331, "lng": 129.0801 }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pet"], json!(30.0));
    assert_eq!(body["pet_formatted"], json!("30.00"));
    assert_eq!(body["site"]["name"], json!("Plaza"));
    assert_eq!(body["environment"]["source"], json!("fallback"));
    assert_eq!(body["environment"]["air_temperature"], json!(22.0));
    assert_eq!(body["environment"]["humidity"], json!(60.0));
    assert_eq!(body["environment"]["wind_speed"], json!(1.5));
    assert!(body["environment"]["fallback_reason"]
        .as_str()
        .unwrap()
        .contains("wind"));
}

/// Live source up: its reading replaces the recorded weather
#[tokio::test]
async fn live_weather_overrides_site_weather() {
    let mut weather = MockLiveWeather::new();
    weather
        .expect_current()
        .withf(|point| point.lat == 35.2331 && point.lon == 129.0801)
        .times(1)
        .returning(|_| {
            Ok(Reading {
                air_temperature: 25.0,
                humidity: 50.0,
                wind_speed: 2.0,
            })
        });

    let mut model = MockModel::new();
    model
        .expect_predict()
        .withf(|features| features.as_array() == [0.5, 0.3, 0.2, 25.0, 50.0, 2.0])
        .times(1)
        .returning(|_| Ok(33.417));

    let test_app = spawn_app(PLAZA, weather, model).await;
    let (status, body) = test_app
        .post_json("/api/v1/estimate", json!({ "lat": 35.2331, "lon": 129.0801 }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pet_formatted"], json!("33.42"));
    assert_eq!(body["environment"]["source"], json!("live"));
    assert!(body["environment"].get("fallback_reason").is_none());
    assert_eq!(body["features"]["AirTemperature"], json!(25.0));
}

/// Slider value wins over the stored index
#[tokio::test]
async fn svf_override_reaches_the_model() {
    let mut model = MockModel::new();
    model
        .expect_predict()
        .withf(|features| features.as_array() == [0.9, 0.3, 0.2, 22.0, 60.0, 1.5])
        .times(1)
        .returning(|_| Ok(31.0));

    let test_app = spawn_app(PLAZA, failing_weather(1), model).await;
    let (status, body) = test_app
        .post_json(
            "/api/v1/estimate",
            json!({ "lat": 35.2331, "lng": 129.0801, "svf": 0.9 }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["features"]["SVF"], json!(0.9));
    assert_eq!(body["features"]["GVI"], json!(0.3));
    assert_eq!(body["features"]["BVI"], json!(0.2));
}

#[tokio::test]
async fn no_locatable_sites_is_unavailable() {
    let mut model = MockModel::new();
    model.expect_predict().times(0);

    let test_app = spawn_app(
        "Plaza,35.2330,129.0800,0.5,0.3,0.2,22.0,60,1.5",
        failing_weather(0),
        model,
    )
    .await;
    let (status, body) = test_app
        .post_json(
            "/api/v1/estimate",
            json!({ "lat": 35.2331, "lng": 129.0801 }),
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body["error"],
        json!("no surveyed site has valid coordinates")
    );
}

#[tokio::test]
async fn out_of_range_override_is_rejected_before_fetching_weather() {
    let mut model = MockModel::new();
    model.expect_predict().times(0);

    let test_app = spawn_app(PLAZA, failing_weather(0), model).await;
    let (status, body) = test_app
        .post_json(
            "/api/v1/estimate",
            json!({ "lat": 35.2331, "lng": 129.0801, "gvi": 1.5 }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("GVI"));
}

#[tokio::test]
async fn out_of_range_coordinates_are_rejected() {
    let mut model = MockModel::new();
    model.expect_predict().times(0);

    let test_app = spawn_app(PLAZA, failing_weather(0), model).await;
    let (status, _) = test_app
        .post_json("/api/v1/estimate", json!({ "lat": 95.0, "lng": 129.0801 }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// A failing model yields no number at all
#[tokio::test]
async fn inference_failure_is_a_server_error() {
    let mut model = MockModel::new();
    model
        .expect_predict()
        .times(1)
        .returning(|_| Err(model::Error::Inference("bad input".to_string())));

    let test_app = spawn_app(PLAZA, failing_weather(1), model).await;
    let (status, body) = test_app
        .post_json(
            "/api/v1/estimate",
            json!({ "lat": 35.2331, "lng": 129.0801 }),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.get("pet").is_none());
    assert!(body["error"].as_str().unwrap().contains("bad input"));
}

#[tokio::test]
async fn malformed_bodies_get_the_error_shape() {
    let mut model = MockModel::new();
    model.expect_predict().times(0);

    let test_app = spawn_app(PLAZA, failing_weather(0), model).await;

    let (status, body) = test_app
        .post_json("/api/v1/estimate", json!({ "svf": 0.4 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("lat"));

    let (status, body) = test_app
        .post_json(
            "/api/v1/estimate",
            json!({ "lat": "north", "lng": 129.0801 }),
        )
        .await;
    assert!(status.is_client_error());
    assert!(body["error"].is_string());

    let (status, body) = test_app.post_raw("/api/v1/estimate", "{\"lat\": 35.2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

/// The nearest site is never swapped for a farther one when it has a blank cell
#[tokio::test]
async fn blank_weather_on_nearest_site_is_unavailable_not_rerouted() {
    let mut model = MockModel::new();
    model.expect_predict().times(0);

    let rows = "Near,35;13;58.8,129;4;48,0.5,0.3,0.2,22.0,60,\n\
                Far,36;0;0,130;0;0,0.1,0.1,0.1,20,50,1";
    let test_app = spawn_app(rows, failing_weather(1), model).await;
    let (status, body) = test_app
        .post_json(
            "/api/v1/estimate",
            json!({ "lat": 35.2331, "lng": 129.0801 }),
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("Near"));
    assert!(message.contains("WindSpeed"));
}
