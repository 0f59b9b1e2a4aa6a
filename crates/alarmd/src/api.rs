//! HTTP control API.
//!
//! Exposes the alarm policy, the channel configurations and the device bus
//! over the same REST surface the web front-end consumes. No
//! authentication; the API is meant for a trusted home network.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::put;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::alarm::AlarmPolicy;
use crate::alarm::TriggerSource;
use crate::bus::Device;
use crate::bus::DeviceBus;
use crate::bus::DeviceId;
use crate::config::Config;
use crate::config::LogLevel;
use crate::notify::EmailChannel;
use crate::notify::Notifier;
use crate::notify::PushChannel;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<Mutex<AlarmPolicy>>,
    pub push: Arc<PushChannel>,
    pub email: Arc<EmailChannel>,
    pub bus: Arc<dyn DeviceBus>,

    /// Where `PUT /configuration` writes the snapshot
    pub config_path: Arc<PathBuf>,

    /// Startup settings carried into the snapshot unchanged
    pub port: u16,
    pub log_level: LogLevel,
}

#[derive(Serialize, Deserialize)]
struct EnabledBody {
    enabled: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerSourceBody {
    device_id: DeviceId,

    /// ISO-8601 timestamp of the last accepted "on" event, or "N/A"
    last_on: String,
}

impl From<&TriggerSource> for TriggerSourceBody {
    fn from(source: &TriggerSource) -> Self {
        Self {
            device_id: source.device_id,
            last_on: source
                .last_on
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushBody {
    enabled: bool,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushPutBody {
    enabled: Option<bool>,
    api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailBody {
    enabled: bool,
    email_notification_address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailPutBody {
    enabled: Option<bool>,
    email_notification_address: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeyBody {
    api_key: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressBody {
    email_notification_address: String,
}

#[derive(Serialize)]
struct DeviceBody {
    id: DeviceId,
    name: String,
    on: bool,
}

impl From<Device> for DeviceBody {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            name: device.name,
            on: device.on,
        }
    }
}

// Alarm enablement

async fn get_alarm(State(state): State<AppState>) -> Json<EnabledBody> {
    let enabled = state.policy.lock().await.enabled();
    Json(EnabledBody { enabled })
}

async fn put_alarm(State(state): State<AppState>, Json(body): Json<EnabledBody>) -> StatusCode {
    state.policy.lock().await.set_enabled(body.enabled);
    StatusCode::OK
}

// Trigger-source membership

async fn list_trigger_sources(State(state): State<AppState>) -> Json<Vec<TriggerSourceBody>> {
    let policy = state.policy.lock().await;
    Json(policy.trigger_sources().map(TriggerSourceBody::from).collect())
}

async fn get_trigger_source(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<TriggerSourceBody>, StatusCode> {
    let policy = state.policy.lock().await;
    policy
        .trigger_source(DeviceId(id))
        .map(TriggerSourceBody::from)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn add_trigger_source(State(state): State<AppState>, Path(id): Path<u32>) -> StatusCode {
    state.policy.lock().await.add_trigger_source(DeviceId(id));
    StatusCode::OK
}

async fn remove_trigger_source(State(state): State<AppState>, Path(id): Path<u32>) -> StatusCode {
    if state.policy.lock().await.remove_trigger_source(DeviceId(id)) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

// Push channel configuration

async fn get_push(State(state): State<AppState>) -> Json<PushBody> {
    Json(PushBody {
        enabled: state.push.enabled().await,
        api_key: state.push.api_key().await,
    })
}

async fn put_push(State(state): State<AppState>, Json(body): Json<PushPutBody>) -> StatusCode {
    if let Some(enabled) = body.enabled {
        state.push.set_enabled(enabled).await;
    }
    if let Some(api_key) = body.api_key {
        state.push.set_api_key(api_key).await;
    }
    StatusCode::OK
}

async fn get_push_api_key(State(state): State<AppState>) -> Json<ApiKeyBody> {
    Json(ApiKeyBody {
        api_key: state.push.api_key().await,
    })
}

async fn put_push_api_key(
    State(state): State<AppState>,
    Json(body): Json<ApiKeyBody>,
) -> StatusCode {
    state.push.set_api_key(body.api_key).await;
    StatusCode::OK
}

async fn get_push_enabled(State(state): State<AppState>) -> Json<EnabledBody> {
    Json(EnabledBody {
        enabled: state.push.enabled().await,
    })
}

async fn put_push_enabled(
    State(state): State<AppState>,
    Json(body): Json<EnabledBody>,
) -> StatusCode {
    state.push.set_enabled(body.enabled).await;
    StatusCode::OK
}

// Email channel configuration

async fn get_email(State(state): State<AppState>) -> Json<EmailBody> {
    Json(EmailBody {
        enabled: state.email.enabled().await,
        email_notification_address: state.email.email_address().await,
    })
}

async fn put_email(State(state): State<AppState>, Json(body): Json<EmailPutBody>) -> StatusCode {
    if let Some(enabled) = body.enabled {
        state.email.set_enabled(enabled).await;
    }
    if let Some(address) = body.email_notification_address {
        state.email.set_email_address(address).await;
    }
    StatusCode::OK
}

async fn get_email_address(State(state): State<AppState>) -> Json<AddressBody> {
    Json(AddressBody {
        email_notification_address: state.email.email_address().await,
    })
}

async fn put_email_address(
    State(state): State<AppState>,
    Json(body): Json<AddressBody>,
) -> StatusCode {
    state
        .email
        .set_email_address(body.email_notification_address)
        .await;
    StatusCode::OK
}

async fn get_email_enabled(State(state): State<AppState>) -> Json<EnabledBody> {
    Json(EnabledBody {
        enabled: state.email.enabled().await,
    })
}

async fn put_email_enabled(
    State(state): State<AppState>,
    Json(body): Json<EnabledBody>,
) -> StatusCode {
    state.email.set_enabled(body.enabled).await;
    StatusCode::OK
}

// Configuration snapshot

async fn save_configuration(State(state): State<AppState>) -> StatusCode {
    let config = Config {
        port: state.port,
        log_level: state.log_level,
        alarm: state.policy.lock().await.to_config(),
        push: state.push.config().await,
        email: state.email.config().await,
    };

    tracing::info!("saving configuration to {}", state.config_path.display());
    match config.save(state.config_path.as_ref()).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!("could not save configuration: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// Device bus passthrough

async fn list_devices(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeviceBody>>, StatusCode> {
    match state.bus.devices().await {
        Ok(devices) => Ok(Json(devices.into_iter().map(DeviceBody::from).collect())),
        Err(e) => {
            tracing::error!("could not list devices: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<DeviceBody>, StatusCode> {
    match state.bus.device(DeviceId(id)).await {
        Ok(Some(device)) => Ok(Json(device.into())),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("could not query device {id}: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/alarm", get(get_alarm).put(put_alarm))
        .route("/alarm/devices", get(list_trigger_sources))
        .route(
            "/alarm/devices/:id",
            get(get_trigger_source)
                .put(add_trigger_source)
                .delete(remove_trigger_source),
        )
        .route("/alarm/push", get(get_push).put(put_push))
        .route("/alarm/push/apiKey", get(get_push_api_key).put(put_push_api_key))
        .route(
            "/alarm/push/enabled",
            get(get_push_enabled).put(put_push_enabled),
        )
        .route("/alarm/email", get(get_email).put(put_email))
        .route(
            "/alarm/email/address",
            get(get_email_address).put(put_email_address),
        )
        .route(
            "/alarm/email/enabled",
            get(get_email_enabled).put(put_email_enabled),
        )
        .route("/configuration", put(save_configuration))
        .route("/devices", get(list_devices))
        .route("/devices/:id", get(get_device))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to the given address and serves until the shutdown signal fires.
pub async fn serve(
    state: AppState,
    listen: String,
    port: u16,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);

    let addr: SocketAddr = format!("{listen}:{port}").parse()?;
    tracing::info!("starting HTTP API server on {addr}");

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
