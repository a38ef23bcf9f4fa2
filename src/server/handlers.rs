//! Axum handlers for the record API.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::engine::RecordEngine;
use crate::errors::Result;
use crate::query::collect_params;
use crate::record::{NewRecord, Record};
use crate::server::{ApiError, AppState, CreatedResponse, HealthResponse};

/// Run blocking engine work off the async runtime.
async fn blocking<T, F>(state: &AppState, work: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&RecordEngine) -> Result<T> + Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || work(&engine))
        .await
        .map_err(|e| ApiError::internal(format!("worker failed: {e}")))?
        .map_err(ApiError::from)
}

/// Bad JSON of any shape is a 400; a body that could not be read keeps its
/// own status (413 when over the size limit).
fn body_rejection(rejection: JsonRejection) -> ApiError {
    let status = match &rejection {
        JsonRejection::BytesRejection(_) => rejection.status(),
        _ => StatusCode::BAD_REQUEST,
    };
    ApiError {
        status,
        message: rejection.body_text(),
    }
}

/// `POST /record`
pub async fn create_record(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewRecord>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let Json(new) = payload.map_err(body_rejection)?;
    let id = blocking(&state, move |engine| engine.create(&new)).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { success: true, id })))
}

/// `GET /record/:id`
pub async fn get_record(
    State(state): State<AppState>,
    id: std::result::Result<Path<i64>, PathRejection>,
) -> std::result::Result<Json<Record>, ApiError> {
    let Path(id) = id.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let record = blocking(&state, move |engine| engine.get(id)).await?;
    Ok(Json(record))
}

/// `GET /search`
pub async fn search_records(
    State(state): State<AppState>,
    pairs: std::result::Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> std::result::Result<Json<Vec<Record>>, ApiError> {
    let Query(pairs) = pairs.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let params = collect_params(pairs)?;
    let records = blocking(&state, move |engine| engine.search(&params)).await?;
    Ok(Json(records))
}

/// `GET /health`
pub async fn health_check(
    State(state): State<AppState>,
) -> std::result::Result<Json<HealthResponse>, ApiError> {
    let records = blocking(&state, |engine| engine.count()).await?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        records,
    }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use axum::response::{IntoResponse, Response};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let store = SqliteStore::open(dir.path().join("records.db"), Duration::from_secs(1))
            .expect("store should open");
        AppState::new(RecordEngine::new(store).expect("engine should start"))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    fn new_record(body: Value) -> std::result::Result<Json<NewRecord>, JsonRejection> {
        Ok(Json(serde_json::from_value(body).expect("valid NewRecord JSON")))
    }

    fn query(pairs: &[(&str, &str)]) -> std::result::Result<Query<Vec<(String, String)>>, QueryRejection> {
        Ok(Query(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    async fn create(state: &AppState, body: Value) -> Response {
        create_record(State(state.clone()), new_record(body))
            .await
            .into_response()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let response = create(
            &state,
            json!({"data_filename": "d.bin", "metadata_filename": "m.json", "extra_metadata": {"user": "alex"}}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        let id = body["id"].as_i64().expect("id should be an integer");

        let response = get_record(State(state), Ok(Path(id))).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "id": id,
                "data_filename": "d.bin",
                "metadata_filename": "m.json",
                "extra_metadata": {"user": "alex"}
            })
        );
    }

    #[tokio::test]
    async fn test_create_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let response = create(&state, json!({"data_filename": "d.bin"})).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("metadata_filename"));
        assert_eq!(state.engine.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let response = get_record(State(state), Ok(Path(404))).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({"error": "Record not found"}));
    }

    #[tokio::test]
    async fn test_search_by_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        create(
            &state,
            json!({"data_filename": "a", "metadata_filename": "a.m", "extra_metadata": {"user": "alex"}}),
        )
        .await;
        create(&state, json!({"data_filename": "b", "metadata_filename": "b.m"})).await;

        let response = search_records(State(state.clone()), query(&[("user", "alex")]))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let hits = body.as_array().expect("search returns an array");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["data_filename"], json!("a"));

        let response = search_records(State(state), query(&[("user", "sam")]))
            .await
            .into_response();
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_search_without_params() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let response = search_records(State(state), query(&[])).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"error": "no search parameters provided"})
        );
    }

    #[tokio::test]
    async fn test_search_repeated_key() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let response = search_records(State(state), query(&[("user", "alex"), ("user", "sam")]))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"error": "repeated search parameter: user"})
        );
    }

    #[tokio::test]
    async fn test_search_bad_range() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let response = search_records(State(state), query(&[("end_id", "tomorrow")]))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_hostile_key() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        create(
            &state,
            json!({"data_filename": "a", "metadata_filename": "a.m", "extra_metadata": {"user": "alex"}}),
        )
        .await;

        let response = search_records(State(state), query(&[("user'); DROP TABLE records; --", "alex")]))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        create(&state, json!({"data_filename": "a", "metadata_filename": "a.m"})).await;

        let response = health_check(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["records"], json!(1));
    }
}
