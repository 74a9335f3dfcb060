mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{read_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn api_requests_are_limited_per_client() -> Result<()> {
    let app = TestApp::with_config(|config| config.rate_limit_requests = 3).await?;

    for _ in 0..3 {
        let response = app
            .post_json("/api/login", &json!({ "device_name": "phone" }), None)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app
        .post_json("/api/login", &json!({ "device_name": "phone" }), None)
        .await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = read_json(response).await?;
    assert!(body["error"].is_string());

    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.get("/share/unknown", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}
