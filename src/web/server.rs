//! axum server for the signing API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::types::{
    ApiError, ConfirmDeploymentRequest, ConfirmDeploymentResponse, CreateSessionRequest,
    SessionResponse,
};
use crate::error::ServerError;
use crate::session::service::{ObservedConfirmation, SessionService};
use crate::verifier::is_tx_hash;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SessionService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tx", post(create_session))
        .route("/api/tx/{session_id}", get(get_session))
        .route(
            "/api/tx/{session_id}/transaction/{index}",
            post(confirm_deployment),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let deployments = req.deployments.into_iter().map(Into::into).collect();
    let session = state
        .service
        .create_session(&req.chain_ref, deployments, req.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let id = parse_session_id(&session_id)?;
    let session = state.service.get_session(id).await?;
    Ok(Json(session.into()))
}

async fn confirm_deployment(
    State(state): State<AppState>,
    Path((session_id, index)): Path<(String, String)>,
    Json(req): Json<ConfirmDeploymentRequest>,
) -> Result<Json<ConfirmDeploymentResponse>, ApiError> {
    let id = parse_session_id(&session_id)?;
    let index: usize = index
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid deployment index '{index}'")))?;

    // Shape-check the hash before touching any state so a malformed
    // report cannot fail the session.
    if !is_tx_hash(&req.transaction_hash) {
        return Err(ApiError::bad_request(format!(
            "malformed transaction hash '{}'",
            req.transaction_hash
        )));
    }

    let observed = ObservedConfirmation {
        tx_hash: req.transaction_hash.clone(),
        contract_address: req.contract_address.clone(),
    };
    let session = state.service.confirm_deployment(id, index, observed).await?;

    let member = &session.deployments[index];
    Ok(Json(ConfirmDeploymentResponse {
        transaction_hash: req.transaction_hash,
        status: member.status,
        contract_address: member.contract_address.clone(),
        session: session.into(),
    }))
}

/// An unparseable id names no session, so it gets the same answer as an
/// unknown one.
fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(format!("session not found: {raw}")))
}

/// Bind and serve. Returns the bound address (useful with port 0) and a
/// shutdown handle.
pub async fn start_server(
    state: AppState,
    host: &str,
    port: u16,
) -> Result<(SocketAddr, oneshot::Sender<()>), ServerError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::BindFailed {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;
    let bound = listener
        .local_addr()
        .map_err(|e| ServerError::BindFailed {
            addr,
            reason: e.to_string(),
        })?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = build_router(state);

    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    tracing::info!(%bound, "signing API listening");
    Ok((bound, shutdown_tx))
}

/// Periodic expired-session sweep. Runs until the task is aborted.
pub fn spawn_expiry_sweeper(
    service: Arc<SessionService>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        // The first tick fires immediately; skip it so startup stays quiet.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = service.purge_expired().await {
                tracing::warn!(error = %e, "expiry sweep failed");
            }
        }
    })
}
