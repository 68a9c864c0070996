use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use locus::server::{router, AppState};
use locus::DB;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_full_lifecycle() {
    let app = router(AppState::new(Arc::new(DB::memory().unwrap())));

    let (status, created) = call(
        &app,
        Method::POST,
        "/addresses/",
        Some(json!({"name": "Depot", "latitude": 52.52, "longitude": 13.405})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_u64().unwrap();

    let (status, list) = call(&app, Method::GET, "/addresses/get-list", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!({"addresses": [created.clone()]}));

    let (status, nearby) = call(
        &app,
        Method::GET,
        "/addresses/?latitude=52.5201&longitude=13.4051&distance=0.5",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(nearby, json!([created]));

    let (status, updated) = call(
        &app,
        Method::PUT,
        &format!("/addresses/{}", id),
        Some(json!({"latitude": 48.8566, "longitude": 2.3522})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Depot");
    assert_eq!(updated["latitude"], 48.8566);

    // Moved out of the old neighbourhood
    let (_, nearby) = call(
        &app,
        Method::GET,
        "/addresses/?latitude=52.52&longitude=13.405",
        None,
    )
    .await;
    assert_eq!(nearby, json!([]));

    let (status, message) = call(&app, Method::DELETE, &format!("/addresses/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message, json!({"message": "Address deleted successfully"}));

    let (status, detail) = call(&app, Method::DELETE, &format!("/addresses/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(detail, json!({"detail": "Address not found"}));
}

#[tokio::test]
async fn test_served_store_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("served.aof");

    {
        let db = DB::open(&db_path).unwrap();
        let app = router(AppState::new(Arc::new(db.clone())));
        for (name, lat, lon) in [("a", 1.0, 1.0), ("b", 2.0, 2.0)] {
            let (status, _) = call(
                &app,
                Method::POST,
                "/addresses",
                Some(json!({"name": name, "latitude": lat, "longitude": lon})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        db.close().unwrap();
    }

    let app = router(AppState::new(Arc::new(DB::open(&db_path).unwrap())));
    let (_, list) = call(&app, Method::GET, "/addresses/get-list", None).await;
    let names: Vec<_> = list["addresses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["a", "b"]);

    let (_, created) = call(
        &app,
        Method::POST,
        "/addresses/",
        Some(json!({"name": "c", "latitude": 3.0, "longitude": 3.0})),
    )
    .await;
    assert_eq!(created["id"], 3);
}

#[tokio::test]
async fn test_unknown_fields_and_wrong_types() {
    let app = router(AppState::new(Arc::new(DB::memory().unwrap())));

    let (status, _) = call(
        &app,
        Method::POST,
        "/addresses/",
        Some(json!({"name": "x", "latitude": "ten", "longitude": 0.0})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = call(
        &app,
        Method::POST,
        "/addresses/",
        Some(json!({"name": "x", "latitude": 1.0, "longitude": 2.0, "note": "ignored"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/addresses/1",
        Some(json!({"latitude": [1, 2]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
