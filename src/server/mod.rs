#![allow(clippy::result_large_err)] // Server helpers return AppError for consistent diagnostics.

//! HTTP transport: MCP JSON-RPC on `/mcp`, health, and the optional legacy route.

pub mod jsonrpc;

use crate::core::error::AppError;
use crate::core::handler::RequestHandler;
use crate::core::types::ErrorCategory;
use axum::{
    body::{Body, Bytes},
    extract::Extension,
    http::{header, HeaderValue, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use jsonrpc::Dispatch;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::util::MapResponseLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

/// State shared across HTTP requests.
struct BridgeState {
    handler: RequestHandler,
}

/// Start the bridge listener and block until shutdown.
pub async fn serve(handler: RequestHandler) -> Result<(), AppError> {
    serve_internal(handler, None).await
}

/// Start the bridge listener and notify once the bind address is known (test helper).
pub async fn serve_with_ready_notifier(
    handler: RequestHandler,
    ready_notifier: oneshot::Sender<SocketAddr>,
) -> Result<(), AppError> {
    serve_internal(handler, Some(ready_notifier)).await
}

async fn serve_internal(
    handler: RequestHandler,
    ready_notifier: Option<oneshot::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    let bind_addr = handler.config().bind;
    let router = router(handler);

    let listener = TcpListener::bind(bind_addr).await.map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to bind bridge listener {}: {}", bind_addr, err),
        )
        .with_code("BRG-SRV-001")
    })?;
    let local_addr = listener.local_addr().map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to determine bridge listener address: {}", err),
        )
        .with_code("BRG-SRV-002")
    })?;
    if let Some(tx) = ready_notifier {
        let _ = tx.send(local_addr);
    }
    info!("bridge server listening on {}", local_addr);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("bridge server terminated: {}", err),
            )
            .with_code("BRG-SRV-003")
        })?;
    info!("bridge server stopped");
    Ok(())
}

/// Build the router for a handler; body limits come from its config.
pub fn router(handler: RequestHandler) -> Router {
    let max_body_bytes = handler.config().max_body_bytes;
    let legacy_endpoint = handler.config().legacy_endpoint.clone();
    let state = Arc::new(BridgeState { handler });

    let mut router = Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/health", get(handle_health));
    if let Some(path) = legacy_endpoint {
        router = router.route(&path, post(handle_legacy));
    }

    router
        .layer(Extension(state))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(MapResponseLayer::new(|mut response: Response<Body>| {
            if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
                let body = json!({
                    "error": {
                        "code": "BRG-SRV-413",
                        "message": "payload too large"
                    }
                })
                .to_string();
                *response.body_mut() = Body::from(body);
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            response
        }))
}

async fn handle_mcp(
    Extension(state): Extension<Arc<BridgeState>>,
    body: Bytes,
) -> Response<Body> {
    match jsonrpc::dispatch(&state.handler, &body).await {
        Dispatch::Reply(reply) => Json(reply).into_response(),
        Dispatch::Accepted => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_health(Extension(state): Extension<Arc<BridgeState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": state.handler.config().name,
        "version": crate::VERSION,
    }))
}

async fn handle_legacy(
    Extension(state): Extension<Arc<BridgeState>>,
    body: Bytes,
) -> Result<Response<Body>, BridgeRejection> {
    let arguments: Value =
        serde_json::from_slice(&body).map_err(|err| BridgeRejection::InvalidJson(err.to_string()))?;
    let response = state.handler.handle_arguments(&arguments).await;
    Ok(Json(response).into_response())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[derive(Debug, Error)]
enum BridgeRejection {
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),
}

impl BridgeRejection {
    fn status(&self) -> StatusCode {
        match self {
            BridgeRejection::InvalidJson(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            BridgeRejection::InvalidJson(_) => "BRG-SRV-400",
        }
    }
}

impl IntoResponse for BridgeRejection {
    fn into_response(self) -> Response<Body> {
        let mut resp = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string()
            }
        }))
        .into_response();
        *resp.status_mut() = self.status();
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_maps_to_bad_request() {
        let rejection = BridgeRejection::InvalidJson("eof".to_string());
        assert_eq!(rejection.status(), StatusCode::BAD_REQUEST);
        let response = rejection.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
