use crate::cert_store::RecordSummary;
use crate::configs::ServerConfig;
use crate::download::{download, DownloadKind};
use crate::error::{CaError, ErrorKind};
use crate::import::import_records;
use crate::issuer::{IssueRequest, Issuer};
use crate::profile::Profile;
use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<Issuer>,
    pub recovery_file: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Handler error: a status plus a `{message}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<CaError> for ApiError {
    fn from(err: CaError) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation | ErrorKind::Conflict | ErrorKind::Authorization => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => {
                error!(error = %err, output = err.tool_output().unwrap_or_default(), "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError {
            status,
            body: ErrorResponse {
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    profile: Option<String>,
}

/// Body of `PUT /api/cert/:profile`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutCertBody {
    name: String,
    #[serde(default)]
    pass: Option<String>,
    /// Values of zero or below leave the tool's default validity
    #[serde(default)]
    years: Option<i64>,
    #[serde(default)]
    key_type: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    parent_password: Option<String>,
}

impl From<PutCertBody> for IssueRequest {
    fn from(body: PutCertBody) -> Self {
        IssueRequest {
            name: body.name,
            password: body.pass.map(SecretString::from),
            years: body
                .years
                .filter(|y| *y > 0)
                .map(|y| u32::try_from(y).unwrap_or(u32::MAX)),
            key_type: body.key_type,
            parent_id: body.parent_id,
            parent_password: body.parent_password.map(SecretString::from),
        }
    }
}

#[derive(Serialize)]
struct RecoveryResponse {
    ids: Vec<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/cert", get(list_certs))
        .route("/api/cert/:profile", put(issue_cert))
        .route("/api/cert/:kind/:id", get(download_cert))
        .route("/api/recovery", post(recover))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C, over TLS when the server config names a certificate and key.
pub async fn serve(state: AppState, config: &ServerConfig) -> anyhow::Result<()> {
    let addr = config.listen_addr()?;
    let app = build_router(state);

    let handle = Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.graceful_shutdown(Some(Duration::from_secs(10)));
        }
    });

    match config.tls() {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key)
                .await
                .context(format!(
                    "Failed to load TLS certificate {} and key {}",
                    cert.display(),
                    key.display()
                ))?;
            info!(%addr, "listening with TLS");
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            info!(%addr, "listening");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTP server failed")?;
        }
    }
    Ok(())
}

async fn list_certs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RecordSummary>>, ApiError> {
    let profile = match query.profile.as_deref() {
        None | Some("") => None,
        Some(p) => Some(p.parse::<Profile>()?),
    };
    Ok(Json(state.issuer.store().list(profile)?))
}

async fn issue_cert(
    State(state): State<AppState>,
    Path(profile): Path<String>,
    Json(body): Json<PutCertBody>,
) -> Result<Json<RecordSummary>, ApiError> {
    let profile: Profile = profile.parse()?;
    let id = state.issuer.issue(profile, body.into()).await?;
    Ok(Json(state.issuer.store().get_summary(&id)?))
}

async fn download_cert(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let kind: DownloadKind = kind.parse()?;
    let file = download(state.issuer.store(), &id, kind)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&file.filename),
            ),
        ],
        file.bytes,
    )
        .into_response())
}

/// `attachment` disposition; non-ASCII names use the RFC 5987 `filename*` form.
fn content_disposition(filename: &str) -> String {
    if filename.is_ascii() {
        format!("attachment; filename=\"{}\"", filename.replace(['"', '\\'], ""))
    } else {
        format!("attachment; filename*=UTF-8''{}", urlencoding::encode(filename))
    }
}

async fn recover(State(state): State<AppState>) -> Result<Json<RecoveryResponse>, ApiError> {
    let ids = import_records(&state.issuer, &state.recovery_file).await?;
    Ok(Json(RecoveryResponse { ids }))
}
