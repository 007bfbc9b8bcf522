// server.rs - HTTP surface of the runtime.
//
// Two routes:
//   GET  /health   liveness plus the active policy hash and breaker states
//   POST /api/v1   one request envelope in, one response envelope out
//
// `/api/v1` always answers 200 with an envelope, including for bodies that
// are not JSON; the envelope's `status` carries success or failure.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use nx_protocol::{NexxonError, ResponseEnvelope};

use crate::context::RuntimeContext;
use crate::dispatch::dispatch_value;
use crate::error::RuntimeError;

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 1_048_576;

pub fn router(ctx: Arc<RuntimeContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1", post(api))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(ctx)
}

async fn health(State(ctx): State<Arc<RuntimeContext>>) -> Json<Value> {
    let policy = match &ctx.enforcer {
        Some(enforcer) => enforcer.effective_hash(),
        None => "none".to_string(),
    };
    Json(json!({
        "status": "ok",
        "policy": policy,
        "session": ctx.ledger.current_session().ok().map(|s| s.id),
        "providers": ctx.registry.list_providers(),
        "default_provider": ctx.registry.default_name(),
        "breakers": ctx.registry.all_breaker_status(),
    }))
}

async fn api(State(ctx): State<Arc<RuntimeContext>>, body: Bytes) -> Json<ResponseEnvelope> {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let err = NexxonError::invalid_args(format!("request body is not valid JSON: {}", e));
            return Json(ResponseEnvelope::error("unknown", &err));
        }
    };
    Json(dispatch_value(&ctx, value).await)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(ctx: Arc<RuntimeContext>, addr: SocketAddr, shutdown: F) -> Result<(), RuntimeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RuntimeError::Server(format!("failed to bind {}: {}", addr, e)))?;
    serve_on(ctx, listener, shutdown).await
}

/// Serve on an already-bound listener. Tests bind port 0 and read the
/// address back before calling this.
pub async fn serve_on<F>(
    ctx: Arc<RuntimeContext>,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), RuntimeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, policy = %ctx.effective_hash(), "runtime listening");
    }
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RuntimeError::Server(e.to_string()))?;
    tracing::info!("runtime stopped");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
