//! Axum JSON API: the posting list and resume dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use jobfeed_core::Posting;
use jobfeed_sync::{build_service, maybe_build_scheduler, SyncConfig, SyncService};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod dispatch;

pub use dispatch::{
    DispatchError, HttpMailDispatcher, MailConfig, ResumeAttachment, ResumeDispatcher,
};

pub const CRATE_NAME: &str = "jobfeed-web";

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Read side of the API: whatever currently counts as the posting list.
#[async_trait]
pub trait PostingProvider: Send + Sync {
    async fn postings(&self) -> Vec<Posting>;
}

#[async_trait]
impl PostingProvider for SyncService {
    async fn postings(&self) -> Vec<Posting> {
        SyncService::postings(self).await
    }
}

#[derive(Clone)]
pub struct AppState {
    pub postings: Arc<dyn PostingProvider>,
    /// `None` when no mail provider is configured.
    pub dispatcher: Option<Arc<dyn ResumeDispatcher>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendFailure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    /// Unknown ids and postings without a contact email.
    pub skipped: usize,
    pub failures: Vec<SendFailure>,
}

/// Body of every `/api/send-resume` response.
#[derive(Debug, Serialize)]
struct DispatchResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    summary: Option<DispatchSummary>,
}

impl DispatchResponse {
    fn ok(summary: DispatchSummary) -> Self {
        Self {
            status: "ok",
            message: None,
            summary: Some(summary),
        }
    }

    fn error(message: impl Into<String>, summary: Option<DispatchSummary>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
            summary,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/jobs", get(jobs_handler))
        .route("/api/send-resume", post(send_resume_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env();
    let port: u16 = std::env::var("JOBFEED_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5000);

    let service = Arc::new(build_service(&config).await?);
    if let Err(err) = service.warm_from_store(Utc::now().date_naive()).await {
        warn!(error = %err, "could not warm posting cache");
    }
    let mut scheduler = maybe_build_scheduler(&config, service.clone()).await?;
    if let Some(sched) = &scheduler {
        sched.start().await.context("starting refresh scheduler")?;
    }

    let dispatcher: Option<Arc<dyn ResumeDispatcher>> = match MailConfig::from_env() {
        Some(mail) => Some(Arc::new(HttpMailDispatcher::new(mail)?)),
        None => {
            info!("mail provider not configured; resume dispatch disabled");
            None
        }
    };

    let state = AppState {
        postings: service,
        dispatcher,
    };
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, "serving job feed api");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sched) = scheduler.as_mut() {
        sched.shutdown().await.context("stopping refresh scheduler")?;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
    }
}

async fn jobs_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Posting>> {
    Json(state.postings.postings().await)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(DispatchResponse::error(message, None)),
    )
        .into_response()
}

struct ResumeForm {
    resume: ResumeAttachment,
    job_ids: Vec<String>,
}

/// Accepts either repeated `job_ids` fields, a comma-separated list, or a
/// JSON array of ids.
fn parse_job_ids(value: &str) -> Vec<String> {
    let value = value.trim();
    if value.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(value) {
            return items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|id| !id.is_empty())
                .collect();
        }
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .collect()
}

async fn read_resume_form(mut multipart: Multipart) -> Result<ResumeForm, Response> {
    let bad_request = |err: axum::extract::multipart::MultipartError| {
        error_response(StatusCode::BAD_REQUEST, err.body_text())
    };
    let mut resume = None;
    let mut job_ids = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "resume" => {
                let file_name = field.file_name().unwrap_or("resume").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_request)?;
                resume = Some(ResumeAttachment {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "job_ids" | "job_ids[]" | "jobIds" => {
                let text = field.text().await.map_err(bad_request)?;
                job_ids.extend(parse_job_ids(&text));
            }
            _ => {}
        }
    }

    let Some(resume) = resume else {
        return Err(error_response(StatusCode::BAD_REQUEST, "missing resume file"));
    };
    if job_ids.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "no job ids given"));
    }
    Ok(ResumeForm { resume, job_ids })
}

async fn send_resume_handler(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let Some(dispatcher) = state.dispatcher.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "resume dispatch is not configured",
        );
    };
    let form = match read_resume_form(multipart).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };

    let postings = state.postings.postings().await;
    let by_id = postings
        .iter()
        .map(|p| (p.id.as_str(), p))
        .collect::<HashMap<_, _>>();
    let mut seen = HashSet::new();
    let mut summary = DispatchSummary::default();

    for id in &form.job_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let Some(posting) = by_id.get(id.as_str()).filter(|p| p.has_email()) else {
            summary.skipped += 1;
            continue;
        };
        match dispatcher.send(posting, &form.resume).await {
            Ok(()) => summary.sent += 1,
            Err(err @ DispatchError::Unauthorized { .. }) => {
                warn!(id = %id, error = %err, "mail provider rejected credentials");
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(DispatchResponse::error(err.to_string(), Some(summary))),
                )
                    .into_response();
            }
            Err(err) => {
                warn!(id = %id, error = %err, "resume dispatch failed");
                summary.failed += 1;
                summary.failures.push(SendFailure {
                    id: id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    info!(sent = summary.sent, failed = summary.failed, skipped = summary.skipped, "resume dispatch done");
    (StatusCode::OK, Json(DispatchResponse::ok(summary))).into_response()
}
