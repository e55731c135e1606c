use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;

use super::reply::{ApiError, ApiReply, respond, success};
use super::state::AppState;
use crate::access;
use crate::error::StoreError;
use crate::store::EndpointStore;
use crate::tester::{TestOutcome, TestRequest};

#[derive(Debug, Deserialize)]
pub struct FolderRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent: Option<String>,
}

/// Run a store call on the blocking pool.
async fn blocking<T, F>(state: &Arc<AppState>, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&EndpointStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || call(&store))
        .await
        .map_err(|err| ApiError::Internal(format!("store task failed: {err}")))?
        .map_err(ApiError::from)
}

async fn ensure_can_edit(state: &AppState, host: Option<&str>) -> Result<(), ApiError> {
    let allow_external_edit = state.config.read().await.allow_external_edit;
    if access::can_edit(host, allow_external_edit) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

pub async fn get_config(
    host: Option<String>,
    state: Arc<AppState>,
) -> Result<ApiReply, Infallible> {
    respond(config_reply(&state, host.as_deref()).await)
}

async fn config_reply(state: &AppState, host: Option<&str>) -> Result<ApiReply, ApiError> {
    let config = state.config.read().await;
    let mut data = match serde_json::to_value(&*config)
        .map_err(|err| ApiError::Internal(err.to_string()))?
    {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    data.insert(
        "canEdit".to_string(),
        json!(access::can_edit(host, config.allow_external_edit)),
    );
    data.insert("mountPath".to_string(), json!(config.mount_path()));
    Ok(success(StatusCode::OK, &data))
}

pub async fn update_config(
    host: Option<String>,
    update: Map<String, Value>,
    state: Arc<AppState>,
) -> Result<ApiReply, Infallible> {
    respond(apply_config_update(&state, host.as_deref(), update).await)
}

async fn apply_config_update(
    state: &AppState,
    host: Option<&str>,
    update: Map<String, Value>,
) -> Result<ApiReply, ApiError> {
    ensure_can_edit(state, host).await?;

    let mut config = state.config.write().await;
    let updated = config
        .merged_with(update)
        .map_err(|err| ApiError::BadRequest(format!("Invalid configuration: {err}")))?;
    if let Some(path) = &state.config_file {
        updated.save(path)?;
    }
    *config = updated;
    Ok(success(StatusCode::OK, &*config))
}

pub async fn list_endpoints(state: Arc<AppState>) -> Result<ApiReply, Infallible> {
    respond(
        blocking(&state, |store| Ok(store.list_all()))
            .await
            .map(|endpoints| success(StatusCode::OK, &endpoints)),
    )
}

pub async fn get_endpoint(id: String, state: Arc<AppState>) -> Result<ApiReply, Infallible> {
    respond(
        blocking(&state, move |store| store.find_by_id(&id))
            .await
            .map(|endpoint| success(StatusCode::OK, &endpoint)),
    )
}

pub async fn create_endpoint(
    host: Option<String>,
    body: Map<String, Value>,
    state: Arc<AppState>,
) -> Result<ApiReply, Infallible> {
    respond(create_endpoint_inner(&state, host.as_deref(), body).await)
}

async fn create_endpoint_inner(
    state: &Arc<AppState>,
    host: Option<&str>,
    mut body: Map<String, Value>,
) -> Result<ApiReply, ApiError> {
    ensure_can_edit(state, host).await?;

    let folder = match body.remove("folder") {
        Some(Value::String(folder)) => folder,
        _ => String::new(),
    };
    let filename = match body.remove("filename") {
        Some(Value::String(filename)) if !filename.trim().is_empty() => filename,
        _ => return Err(ApiError::BadRequest("Filename is required".to_string())),
    };

    let created = blocking(state, move |store| store.create(&folder, &filename, body)).await?;
    Ok(success(StatusCode::CREATED, &created))
}

pub async fn update_endpoint(
    id: String,
    host: Option<String>,
    patch: Map<String, Value>,
    state: Arc<AppState>,
) -> Result<ApiReply, Infallible> {
    respond(update_endpoint_inner(&state, id, host.as_deref(), patch).await)
}

async fn update_endpoint_inner(
    state: &Arc<AppState>,
    id: String,
    host: Option<&str>,
    patch: Map<String, Value>,
) -> Result<ApiReply, ApiError> {
    ensure_can_edit(state, host).await?;
    let updated = blocking(state, move |store| store.update_by_id(&id, patch)).await?;
    Ok(success(StatusCode::OK, &updated))
}

pub async fn delete_endpoint(
    id: String,
    host: Option<String>,
    state: Arc<AppState>,
) -> Result<ApiReply, Infallible> {
    respond(delete_endpoint_inner(&state, id, host.as_deref()).await)
}

async fn delete_endpoint_inner(
    state: &Arc<AppState>,
    id: String,
    host: Option<&str>,
) -> Result<ApiReply, ApiError> {
    ensure_can_edit(state, host).await?;
    blocking(state, move |store| store.delete_by_id(&id)).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({
            "success": true,
            "message": "Endpoint deleted successfully"
        })),
        StatusCode::OK,
    ))
}

pub async fn create_folder(
    host: Option<String>,
    request: FolderRequest,
    state: Arc<AppState>,
) -> Result<ApiReply, Infallible> {
    respond(create_folder_inner(&state, host.as_deref(), request).await)
}

async fn create_folder_inner(
    state: &Arc<AppState>,
    host: Option<&str>,
    request: FolderRequest,
) -> Result<ApiReply, ApiError> {
    ensure_can_edit(state, host).await?;

    let name = request
        .name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Folder name is required".to_string()))?;
    let parent = request.parent.unwrap_or_default();

    let (folder_name, folder_parent) = (name.clone(), parent.clone());
    let path = blocking(state, move |store| {
        store.create_folder(&folder_parent, &folder_name)
    })
    .await?;
    Ok(success(
        StatusCode::CREATED,
        &json!({ "name": name, "parent": parent, "path": path }),
    ))
}

pub async fn get_structure(state: Arc<AppState>) -> Result<ApiReply, Infallible> {
    respond(
        blocking(&state, |store| Ok(store.structure()))
            .await
            .map(|structure| success(StatusCode::OK, &structure)),
    )
}

/// Always answers 200; `success` tells whether the upstream call went through.
pub async fn test_endpoint(body: Value, state: Arc<AppState>) -> Result<ApiReply, Infallible> {
    let request: TestRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(err) => {
            return Ok(warp::reply::with_status(
                warp::reply::json(&json!({
                    "success": false,
                    "message": "Request failed",
                    "error": err.to_string()
                })),
                StatusCode::OK,
            ));
        }
    };

    let payload = match state.tester.execute(&request).await {
        TestOutcome::Completed(response) => json!({ "success": true, "data": response }),
        TestOutcome::Failed { error } => json!({
            "success": false,
            "message": "Request failed",
            "error": error
        }),
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&payload),
        StatusCode::OK,
    ))
}

pub async fn health(host: Option<String>, state: Arc<AppState>) -> Result<ApiReply, Infallible> {
    let config = state.config.read().await;
    let data = json!({
        "timestamp": Utc::now(),
        "uptime": state.started.elapsed().as_secs_f64(),
        "config": {
            "name": config.name,
            "version": config.version,
            "path": config.path,
        },
        "canEdit": access::can_edit(host.as_deref(), config.allow_external_edit),
    });
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({
            "success": true,
            "message": "API Docs Creator is running",
            "data": data
        })),
        StatusCode::OK,
    ))
}
