/*!
 * HTTP API for the Bluetooth bridge
 * JSON envelopes over plain GET routes
 */

use anyhow::Result;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::bluetooth::{BluetoothManager, Transport};
use crate::refresh::AddressRefresher;
use crate::settings::{SettingsStore, BLUETOOTH_ADDRESS_KEY, CONFIG_COMPONENT};

/// Envelope every route answers with.
#[derive(Debug, Serialize)]
pub struct JsonResponse {
    #[serde(rename = "Output")]
    pub output: Value,
    #[serde(rename = "Status", skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(rename = "OK")]
    pub ok: bool,
}

impl JsonResponse {
    pub fn ok(output: impl Into<Value>) -> Self {
        Self {
            output: output.into(),
            status: None,
            ok: true,
        }
    }

    pub fn fail(output: impl Into<Value>) -> Self {
        Self {
            output: output.into(),
            status: None,
            ok: false,
        }
    }

    fn success<T: Serialize>(output: &T) -> Self {
        Self {
            output: serde_json::to_value(output).unwrap_or(Value::Null),
            status: Some("success"),
            ok: true,
        }
    }

    fn failure(message: &str) -> Self {
        Self {
            output: message.into(),
            status: Some("fail"),
            ok: false,
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub bluetooth: Arc<BluetoothManager>,
    pub refresher: AddressRefresher,
    pub settings: Arc<SettingsStore>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/bluetooth", get(get_device_info))
        .route("/bluetooth/getDeviceInfo", get(get_device_info))
        .route("/bluetooth/getMediaInfo", get(get_media_info))
        .route("/bluetooth/connect", get(connect))
        .route("/bluetooth/disconnect", get(disconnect))
        .route("/bluetooth/prev", get(prev))
        .route("/bluetooth/next", get(next))
        .route("/bluetooth/play", get(play))
        .route("/bluetooth/pause", get(pause))
        .route("/bluetooth/refresh", get(force_refresh))
        .route("/bluetooth/address", get(get_address))
        .route("/bluetooth/address/{address}", post(set_address))
        .route("/settings", get(all_settings))
        .route("/settings/{component}", get(component_settings))
        .route("/settings/{component}/{name}", get(setting_value))
        .route("/settings/{component}/{name}/{value}", post(set_setting_value))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    tracing::info!("HTTP API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn get_device_info(State(state): State<ApiState>) -> Json<JsonResponse> {
    Json(match state.bluetooth.device_info().await {
        Ok(info) => JsonResponse::success(&info),
        Err(_) => JsonResponse::failure("Error getting device info"),
    })
}

async fn get_media_info(State(state): State<ApiState>) -> Json<JsonResponse> {
    Json(match state.bluetooth.media_info().await {
        Ok(info) => JsonResponse::success(&info),
        Err(_) => JsonResponse::failure("Error getting media info"),
    })
}

async fn connect(State(state): State<ApiState>) -> Json<JsonResponse> {
    Json(match state.bluetooth.connect().await {
        Ok(()) => JsonResponse::ok("OK"),
        Err(e) => JsonResponse::fail(e.output()),
    })
}

async fn disconnect(State(state): State<ApiState>) -> Json<JsonResponse> {
    Json(match state.bluetooth.disconnect().await {
        Ok(()) => JsonResponse::ok("OK"),
        Err(e) => JsonResponse::fail(e.output()),
    })
}

fn transport(state: &ApiState, transport: Transport) -> Json<JsonResponse> {
    // Detached; completion is never awaited
    let _ = state.bluetooth.send_transport(transport);
    Json(JsonResponse::ok("OK"))
}

async fn prev(State(state): State<ApiState>) -> Json<JsonResponse> {
    transport(&state, Transport::Previous)
}

async fn next(State(state): State<ApiState>) -> Json<JsonResponse> {
    transport(&state, Transport::Next)
}

async fn play(State(state): State<ApiState>) -> Json<JsonResponse> {
    transport(&state, Transport::Play)
}

async fn pause(State(state): State<ApiState>) -> Json<JsonResponse> {
    transport(&state, Transport::Pause)
}

async fn force_refresh(State(state): State<ApiState>) -> Json<JsonResponse> {
    let _ = state.refresher.force();
    Json(JsonResponse::ok("OK"))
}

async fn get_address(State(state): State<ApiState>) -> Json<JsonResponse> {
    let address = state.bluetooth.bridge().address_store().address().await;
    let bound = !address.is_empty();
    Json(JsonResponse {
        output: address.into(),
        status: None,
        ok: bound,
    })
}

async fn set_address(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Json<JsonResponse> {
    Json(
        match state.bluetooth.bridge().address_store().set_address(&address).await {
            Some(address) => JsonResponse::ok(address),
            None => JsonResponse::fail("Empty address"),
        },
    )
}

async fn all_settings(State(state): State<ApiState>) -> Json<JsonResponse> {
    Json(JsonResponse::success(&state.settings.all().await))
}

async fn component_settings(
    State(state): State<ApiState>,
    Path(component): Path<String>,
) -> Json<JsonResponse> {
    Json(match state.settings.component(&component).await {
        Some(values) => JsonResponse::success(&values),
        None => JsonResponse::failure("Component not found"),
    })
}

async fn setting_value(
    State(state): State<ApiState>,
    Path((component, name)): Path<(String, String)>,
) -> Json<JsonResponse> {
    Json(match state.settings.get(&component, &name).await {
        Some(value) => JsonResponse::success(&value),
        None => JsonResponse::failure("Setting not found"),
    })
}

async fn set_setting_value(
    State(state): State<ApiState>,
    Path((component, name, value)): Path<(String, String, String)>,
) -> Json<JsonResponse> {
    // The device address goes through the store so the live value follows
    if component == CONFIG_COMPONENT && name == BLUETOOTH_ADDRESS_KEY {
        return set_address(State(state), Path(value)).await;
    }

    Json(match state.settings.set(&component, &name, &value).await {
        Ok(()) => JsonResponse::ok(value),
        Err(e) => {
            tracing::error!("Failed to save setting {}.{}: {}", component, name, e);
            JsonResponse::fail(e.to_string())
        }
    })
}
