//! HTTP surface: update ingestion and the read-only query endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::canvas::{format_ms, CanvasVersion};
use crate::hub::Hub;
use crate::update::{UpdateError, UpdateRequest, Updater, Upload};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
    pub hub: Hub,
    pub updater: Updater,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/updateorders", post(update_orders))
        .route("/api/map", get(map))
        .route("/api/stats", get(stats))
        .route("/currentmap", get(current_map))
        .route("/currentorders", get(current_orders))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    current_map: String,
    orders: String,
    order_length: usize,
}

async fn update_orders(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UpdateResponse>, UpdateError> {
    let request = read_update_form(multipart).await?;
    let version = state.updater.submit(request).await?;
    Ok(Json(UpdateResponse {
        current_map: version.image,
        orders: version.orders,
        order_length: version.order_length,
    }))
}

async fn read_update_form(mut multipart: Multipart) -> Result<UpdateRequest, UpdateError> {
    let malformed = |err: axum::extract::multipart::MultipartError| {
        UpdateError::Malformed(err.to_string())
    };
    let mut request = UpdateRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(malformed)?;
                request.image = Some(Upload {
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "password" => request.password = Some(field.text().await.map_err(malformed)?),
            "reason" => request.reason = Some(field.text().await.map_err(malformed)?),
            "uploader" => request.uploader = Some(field.text().await.map_err(malformed)?),
            _ => {}
        }
    }
    Ok(request)
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    file: String,
    orders: String,
    reason: String,
    uploader: Option<String>,
    date: String,
}

impl From<CanvasVersion> for HistoryEntry {
    fn from(version: CanvasVersion) -> Self {
        Self {
            file: version.image,
            orders: version.orders,
            reason: version.reason,
            uploader: version.uploader,
            date: format_ms(version.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MapResponse {
    current_map: String,
    orders: String,
    order_length: usize,
    map_history: Vec<HistoryEntry>,
    date: String,
}

async fn map(State(state): State<Arc<AppState>>) -> Json<MapResponse> {
    let view = state.hub.map_view().await;
    Json(MapResponse {
        current_map: view.current.image,
        orders: view.current.orders,
        order_length: view.current.order_length,
        map_history: view.recent.into_iter().map(HistoryEntry::from).collect(),
        date: format_ms(state.hub.now_ms()),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    active_connection_count: usize,
    raw_connection_count: usize,
    pixels_placed: u64,
    brand_usage: BTreeMap<String, usize>,
    date: String,
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let snapshot = state.hub.stats().await;
    Json(StatsResponse {
        active_connection_count: snapshot.active_labeled_count,
        raw_connection_count: state.hub.session_count().await,
        pixels_placed: state.hub.total_pixels_placed().await,
        brand_usage: snapshot.label_histogram,
        date: format_ms(state.hub.now_ms()),
    })
}

async fn current_map(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::temporary(&format!("/maps/{}", state.hub.current().await.image))
}

async fn current_orders(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::temporary(&format!("/orders/{}", state.hub.current().await.orders))
}
