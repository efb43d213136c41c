use crate::errors::Result;
use crate::metrics::{
    self, CLEARED_ENTRIES_TOTAL, COMMANDS_TOTAL, EVICTED_ENTRIES_TOTAL, MESSAGES_TOTAL,
};
use crate::model::{
    ClearResponse, CommandResponse, DataQuery, DataResponse, DevicesResponse, IngestResponse,
    ServerStatusResponse,
};
use crate::normalize;
use crate::store::{DeviceFilter, SharedStore};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{debug, error, info, Level};

/// Header carrying the sender's device id on POST /api/data
pub const DEVICE_ID_HEADER: &str = "device-id";

/// Largest request body read. Bigger bodies get the error envelope.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const SERVER_NAME: &str = "Open-SmartWatch Communication Server";

#[derive(Debug, Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub default_limit: usize,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(server_status))
        .route("/api/data", get(get_data).post(post_data).delete(clear_data))
        .route("/api/devices", get(get_devices))
        .route("/api/command", post(send_command))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let request_id = req
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http",
                        %request_id,
                        method = %req.method(),
                        uri = %req.uri(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn server_status(State(state): State<AppState>) -> Json<ServerStatusResponse> {
    let store = state.store.read().await;
    Json(ServerStatusResponse {
        message: SERVER_NAME,
        status: "running",
        received_messages: store.len(),
        devices: store.device_ids(),
    })
}

async fn post_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> std::result::Result<Json<IngestResponse>, AppError> {
    let payload = read_json_body(&headers, &body?)?;
    let device_id = headers
        .get(DEVICE_ID_HEADER)
        .and_then(|v| v.to_str().ok());

    let ingested = {
        let mut store = state.store.write().await;
        let ingested = store.ingest(device_id, payload);
        metrics::record_store_size(store.len(), store.device_count());
        ingested
    };

    MESSAGES_TOTAL.inc();
    if ingested.evicted > 0 {
        EVICTED_ENTRIES_TOTAL.inc_by(ingested.evicted as f64);
        debug!("Evicted {} oldest entries", ingested.evicted);
    }

    let entry = ingested.entry;
    info!(device_id = %entry.device_id, timestamp = %entry.timestamp, "Data received");
    debug!(device_id = %entry.device_id, payload = %entry.payload, "Payload");

    Ok(Json(IngestResponse {
        status: "success",
        message: "Data received successfully",
        device_id: entry.device_id,
        timestamp: entry.timestamp,
    }))
}

async fn get_data(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Json<DataResponse> {
    let params = DataQuery::from_pairs(pairs);
    let limit = normalize::limit(params.limit.as_deref(), state.default_limit);
    let filter = normalize::device_filter(&params.device_ids);

    let result = state.store.read().await.query(&filter, limit);

    Json(DataResponse {
        data: result.data,
        total: result.total,
        devices: result.devices,
    })
}

async fn get_devices(State(state): State<AppState>) -> Json<DevicesResponse> {
    let store = state.store.read().await;
    Json(DevicesResponse {
        devices: store.devices().clone(),
        total_devices: store.device_count(),
    })
}

/// Acknowledges a command without delivering it: there is no channel back
/// to the devices, so the request is only logged and echoed.
async fn send_command(
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> std::result::Result<Json<CommandResponse>, AppError> {
    let request = read_json_body(&headers, &body?)?;
    let device_id = request.get("device_id").cloned();
    let command = request.get("command").cloned();

    COMMANDS_TOTAL.inc();
    info!(
        device_id = ?device_id,
        command = ?command,
        "Command acknowledged (not delivered)"
    );
    debug!(params = ?request.get("params"), "Command params");

    Ok(Json(CommandResponse {
        status: "success",
        message: "Command sent successfully",
        command,
        device_id,
    }))
}

async fn clear_data(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Json<ClearResponse> {
    let params = DataQuery::from_pairs(pairs);
    let filter = normalize::device_filter(&params.device_ids);

    let removed = {
        let mut store = state.store.write().await;
        let removed = store.clear(&filter);
        metrics::record_store_size(store.len(), store.device_count());
        removed
    };
    CLEARED_ENTRIES_TOTAL.inc_by(removed as f64);

    match &filter {
        DeviceFilter::All => info!(removed, "Cleared all data"),
        DeviceFilter::Device(device_id) => info!(%device_id, removed, "Cleared device data"),
        DeviceFilter::Nothing => info!(device_ids = ?params.device_ids, "Ambiguous clear ignored"),
    }

    Json(ClearResponse {
        status: "success",
        message: "Data cleared successfully",
    })
}

async fn metrics_handler() -> std::result::Result<String, AppError> {
    Ok(metrics::gather_metrics()?)
}

/// Request body as JSON. Empty bodies and non-JSON content types read as
/// `{}`; a JSON body that does not parse is an error.
fn read_json_body(headers: &HeaderMap, body: &[u8]) -> Result<Value> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.to_ascii_lowercase().contains("json"));

    if !is_json || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    Ok(serde_json::from_slice(body)?)
}

fn error_body(error: &str) -> Json<Value> {
    Json(json!({
        "status": "error",
        "message": "Internal server error",
        "error": error,
    }))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };

    error!("Handler panicked: {}", detail);
    (StatusCode::INTERNAL_SERVER_ERROR, error_body(&detail)).into_response()
}

pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(&self.0.to_string()),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
