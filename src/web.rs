//! HTTP transport for the command channel.
//!
//! `POST /v1/{subject}` carries the raw JSON payload of a job and answers with
//! the reply envelope; backup/restore lives under `/v1/srr`.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use serde::Serialize;
use serde_json::json;

use crate::errors::GroupError;
use crate::jobs::{self, Dispatcher};
use crate::settings::Settings;
use crate::srr::{RestoreQuery, SaveQuery, Srr};

pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/v1/srr/save", post(srr_save))
        .route("/v1/srr/restore", post(srr_restore))
        .route("/v1/srr/reset", post(srr_reset))
        .route("/v1/{subject}", post(handle_command))
        .route("/healthz", get(health))
        .with_state(dispatcher)
}

pub async fn serve(settings: &Settings, dispatcher: Dispatcher) -> miette::Result<()> {
    let addr: SocketAddr = settings
        .listen_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    tracing::info!(%addr, "Group API listening");
    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;
    tracing::info!("Group API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}

pub fn status_code(err: &GroupError) -> StatusCode {
    match err {
        GroupError::Validation(_)
        | GroupError::BadRequest(_)
        | GroupError::DuplicateName(_)
        | GroupError::UnsupportedField(_) => StatusCode::BAD_REQUEST,
        GroupError::NotFound(_) => StatusCode::NOT_FOUND,
        GroupError::CyclicReference(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GroupError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string() });
        (status_code(&self), Json(body)).into_response()
    }
}

async fn handle_command(
    State(dispatcher): State<Dispatcher>,
    Path(subject): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let result = dispatcher.dispatch(subject.clone(), body.to_vec()).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(err) => status_code(err),
    };
    (status, Json(jobs::Response::from_result(subject, &result)))
}

/// Run an SRR operation on the blocking pool.
async fn run_srr<T, F>(dispatcher: Dispatcher, op: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&Srr<'_>) -> T + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || op(&Srr::new(dispatcher.context()))).await;
    match joined {
        Ok(out) => Json(out).into_response(),
        Err(err) => GroupError::Io(std::io::Error::other(format!("SRR task aborted: {err}")))
            .into_response(),
    }
}

async fn srr_save(
    State(dispatcher): State<Dispatcher>,
    Json(query): Json<SaveQuery>,
) -> impl IntoResponse {
    run_srr(dispatcher, move |srr| srr.handle_save(&query)).await
}

async fn srr_restore(
    State(dispatcher): State<Dispatcher>,
    Json(query): Json<RestoreQuery>,
) -> impl IntoResponse {
    run_srr(dispatcher, move |srr| srr.handle_restore(&query)).await
}

async fn srr_reset(State(dispatcher): State<Dispatcher>) -> impl IntoResponse {
    run_srr(dispatcher, |srr| srr.handle_reset()).await
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
