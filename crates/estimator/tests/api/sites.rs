use crate::helpers::{spawn_app, MockLiveWeather, MockModel, PLAZA};
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn lists_only_locatable_sites() {
    let rows = format!(
        "{}\nUnmapped,35.2330,129.0800,0.1,0.1,0.1,20,50,1\nGarden,35;14;0,129;5;0,,0.7,0.1,21,55,",
        PLAZA
    );
    let test_app = spawn_app(&rows, MockLiveWeather::new(), MockModel::new()).await;

    let (status, body) = test_app.get_json("/api/v1/sites").await;

    assert_eq!(status, StatusCode::OK);
    let sites = body.as_array().unwrap();
    assert_eq!(sites.len(), 2);
    assert_eq!(sites[0]["name"], json!("Plaza"));
    assert_eq!(sites[1]["name"], json!("Garden"));
    assert_eq!(sites[1]["gvi"], json!(0.7));
    assert_eq!(sites[1]["svf"], json!(null));
}

#[tokio::test]
async fn health_reports_loaded_dataset() {
    let rows = format!("{}\nUnmapped,35.2330,129.0800,0.1,0.1,0.1,20,50,1", PLAZA);
    let test_app = spawn_app(&rows, MockLiveWeather::new(), MockModel::new()).await;

    let (status, body) = test_app.get_json("/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["sites"], json!(2));
    assert_eq!(body["geocoded_sites"], json!(1));
    assert_eq!(body["weather_source"], json!("openweather"));
}
