use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use frame_bus::display::LatestFrameSurface;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::media::{pipe::Relay, types::RelayStatus};

#[derive(Clone)]
pub(crate) struct ApiState {
    pub relay: Arc<Relay>,
    pub surface: Option<Arc<LatestFrameSurface>>,
    pub jpeg_quality: u8,
}

pub(crate) fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/preview.jpg", get(preview))
        .with_state(state)
}

pub(crate) fn start_api_server(
    addr: String,
    state: ApiState,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("failed to bind API server on {}: {}", addr, e);
                return;
            }
        };
        log::info!("API server started on {}", addr);
        if let Err(e) = axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            log::error!("API server error: {}", e);
        }
    })
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("shutting down API server...");
}

async fn index() -> &'static str {
    "zcam relay"
}

async fn status(State(state): State<ApiState>) -> Json<RelayStatus> {
    Json(state.relay.status())
}

async fn preview(State(state): State<ApiState>) -> Response {
    let Some(surface) = state.surface else {
        return (StatusCode::NOT_FOUND, "preview is disabled").into_response();
    };
    let quality = state.jpeg_quality;
    let encoded = tokio::task::spawn_blocking(move || {
        surface
            .jpeg(quality)
            .map(|jpeg| jpeg.ok_or_else(|| surface.placeholder()))
    })
    .await;

    match encoded {
        Ok(Ok(Ok(jpeg))) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        Ok(Ok(Err(placeholder))) => (StatusCode::NOT_FOUND, placeholder).into_response(),
        Ok(Err(e)) => {
            log::warn!("failed to encode preview: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode preview").into_response()
        }
        Err(e) => {
            log::error!("preview task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;
