use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shared::protocol::{KNOWN_COLUMNS, TABLE_KINDS};
use shared::types::{AnnotationDocument, ServiceEntry};

use crate::config::SnapshotConfig;
use crate::error::{SnapshotError, StoreError};
use crate::snapshot::interfaces::{snapshot_interfaces, InterfaceFilter};
use crate::snapshot::ports::{find_free_ports, range_from_preset, MAX_WINDOW};
use crate::snapshot::sockets::{parse_socket_table, SocketSource};
use crate::store::AnnotationData;
use crate::store_manager::StoreHandle;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub sockets: Arc<dyn SocketSource>,
    pub filter: Arc<InterfaceFilter>,
    pub http: reqwest::Client,
    pub snapshot: Arc<SnapshotConfig>,
}

/// A socket-table row joined with its annotations
#[derive(Serialize)]
pub struct ServiceView {
    #[serde(flatten)]
    pub entry: ServiceEntry,
    pub service_id: String,
    pub display_name: String,
    pub url_path: String,
}

#[derive(Serialize)]
pub struct InterfaceView {
    pub name: String,
    pub ip: String,
    pub show_links: bool,
}

#[derive(Deserialize)]
pub struct FreePortsQuery {
    pub count: Option<usize>,
    pub range: Option<String>,
}

#[derive(Deserialize)]
pub struct SaveServiceName {
    pub service_id: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct SaveInterfaceLinks {
    pub name: String,
    pub show_links: bool,
}

#[derive(Deserialize)]
pub struct SaveUrlPath {
    pub service_id: String,
    pub path: String,
}

#[derive(Deserialize)]
pub struct SaveColumns {
    pub column_configs: HashMap<String, bool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/services", get(get_services))
        .route("/v1/interfaces", get(get_interfaces))
        .route("/v1/free-ports", get(get_free_ports))
        .route("/v1/annotations", get(get_annotations))
        .route("/v1/annotations/columns/:table", get(get_table_columns))
        .route("/v1/annotations/service-name", post(save_service_name))
        .route("/v1/annotations/interface-links", post(save_interface_links))
        .route("/v1/annotations/url-path", post(save_url_path))
        .route("/v1/annotations/columns", post(save_columns))
        .with_state(state)
}

async fn get_services(
    State(state): State<AppState>,
) -> Result<Json<Vec<ServiceView>>, StatusCode> {
    let sockets = state.sockets.clone();
    let raw = tokio::task::spawn_blocking(move || sockets.socket_table())
        .await
        .map_err(|e| {
            tracing::error!("Socket snapshot task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            tracing::error!("Failed to read socket table: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let entries = parse_socket_table(&raw);
    let data = state.store.fetch().await.map_err(store_error)?;

    Ok(Json(annotate_services(entries, &data)))
}

async fn get_interfaces(
    State(state): State<AppState>,
) -> Result<Json<Vec<InterfaceView>>, StatusCode> {
    let entries = snapshot_interfaces(&state.filter, &state.http, &state.snapshot.public_ip_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to snapshot interfaces: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let data = state.store.fetch().await.map_err(store_error)?;
    let views = entries
        .into_iter()
        .map(|entry| InterfaceView {
            show_links: data.show_links(&entry.name),
            name: entry.name,
            ip: entry.ip,
        })
        .collect();

    Ok(Json(views))
}

async fn get_free_ports(
    State(state): State<AppState>,
    Query(params): Query<FreePortsQuery>,
) -> Result<Json<Vec<u16>>, StatusCode> {
    let count = params.count.unwrap_or(1);
    if count == 0 || count > MAX_WINDOW {
        tracing::warn!("Rejecting free-port request for {} ports", count);
        return Err(StatusCode::BAD_REQUEST);
    }
    let (low, high) = range_from_preset(params.range.as_deref());

    let sockets = state.sockets.clone();
    let found =
        tokio::task::spawn_blocking(move || find_free_ports(sockets.as_ref(), count, low, high))
            .await
            .map_err(|e| {
                tracing::error!("Free-port scan task failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

    match found {
        Ok(ports) => Ok(Json(ports)),
        Err(e @ SnapshotError::InsufficientFreePorts { .. }) => {
            tracing::warn!("{}", e);
            Err(StatusCode::CONFLICT)
        }
        Err(e) => {
            tracing::error!("Free-port scan failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn get_annotations(
    State(state): State<AppState>,
) -> Result<Json<AnnotationDocument>, StatusCode> {
    let data = state.store.fetch().await.map_err(store_error)?;
    Ok(Json(data.to_document()))
}

async fn get_table_columns(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<HashMap<String, bool>>, StatusCode> {
    if !TABLE_KINDS.contains(&table.as_str()) {
        return Err(StatusCode::NOT_FOUND);
    }

    let data = state.store.fetch().await.map_err(store_error)?;
    let columns = KNOWN_COLUMNS
        .iter()
        .map(|column| (column.to_string(), data.column_visible(&table, column)))
        .collect();

    Ok(Json(columns))
}

async fn save_service_name(
    State(state): State<AppState>,
    Json(body): Json<SaveServiceName>,
) -> Result<StatusCode, StatusCode> {
    state
        .store
        .set_service_name(body.service_id, body.name)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::OK)
}

async fn save_interface_links(
    State(state): State<AppState>,
    Json(body): Json<SaveInterfaceLinks>,
) -> Result<StatusCode, StatusCode> {
    state
        .store
        .set_interface_links(body.name, body.show_links)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::OK)
}

async fn save_url_path(
    State(state): State<AppState>,
    Json(body): Json<SaveUrlPath>,
) -> Result<StatusCode, StatusCode> {
    state
        .store
        .set_url_path(body.service_id, body.path)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::OK)
}

async fn save_columns(
    State(state): State<AppState>,
    Json(body): Json<SaveColumns>,
) -> Result<StatusCode, StatusCode> {
    state
        .store
        .set_columns(body.column_configs)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::OK)
}

fn annotate_services(entries: Vec<ServiceEntry>, data: &AnnotationData) -> Vec<ServiceView> {
    entries
        .into_iter()
        .map(|entry| {
            let service_id = entry.identity_key();
            let display_name = data.display_name(&service_id, &entry.local_port);
            let url_path = data.url_path(&service_id);
            ServiceView {
                entry,
                service_id,
                display_name,
                url_path,
            }
        })
        .collect()
}

fn store_error(e: StoreError) -> StatusCode {
    tracing::error!("Annotation store request failed: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}
