// API route handlers for the transcription relay
//
// This module contains the route handlers of the relay. The proxy route
// forwards status checks, uploads and transcription requests to the upstream
// service; `/status` and `/metrics` report on the relay itself.

use crate::client::relay::PROXY_ROUTE;
use crate::client::UpstreamClient;
use crate::config::{RelayConfig, Timeouts};
use crate::error::{ClientError, HandlerError};
use crate::handlers::credentials::UpstreamCredentials;
use crate::handlers::form::extract_upload;
use crate::metrics::Metrics;
use crate::models::{StatusResponse, TranscribeRequest, TranscriptionStarted, UpstreamStatus};
use crate::progress::{job_id_from_path, ProgressEstimator};
use actix_multipart::Multipart;
use actix_web::http::Method;
use actix_web::{get, web, HttpRequest, HttpResponse, ResponseError};
use chrono::Utc;
use futures::StreamExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Largest accepted body of a transcription request
pub const MAX_TRANSCRIBE_BODY: usize = 64 * 1024;

const TRANSCRIPTION_STARTED: &str = "Transcription started";
const TRANSCRIPTION_STARTED_WITH_ERRORS: &str =
    "Transcription may have started with errors, polling for status";

/// Query string of the proxy route
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    /// Upstream subpath, relative to `{endpoint}/api/`
    #[serde(default)]
    pub path: String,
}

/// Metrics label for an upstream subpath
fn route_label(path: &str) -> &'static str {
    let path = path.trim_matches('/');
    if path == "upload" {
        "upload"
    } else if path.starts_with("transcribe/") && path.ends_with("/status") {
        "status"
    } else if path.starts_with("transcribe/") {
        "transcribe"
    } else {
        "other"
    }
}

fn failure_kind(err: &ClientError) -> &'static str {
    match err {
        ClientError::Transport {
            status: Some(_), ..
        } => "http_status",
        ClientError::Transport { message, .. } if message.contains("timed out") => "timeout",
        ClientError::Transport { .. } => "transport",
        _ => "other",
    }
}

fn upstream_client(
    http: &reqwest::Client,
    credentials: UpstreamCredentials,
    config: &RelayConfig,
) -> UpstreamClient {
    UpstreamClient::with_client(http.clone(), credentials.into_inner(), Timeouts::from(config))
}

async fn record_request(
    metrics: &Metrics,
    method: &Method,
    route: &str,
    started: Instant,
    result: &Result<HttpResponse, HandlerError>,
) {
    let status = match result {
        Ok(response) => response.status(),
        Err(e) => e.status_code(),
    };
    metrics
        .record_proxy_request(
            method.as_str(),
            route,
            status.as_u16(),
            started.elapsed().as_secs_f64(),
        )
        .await;
}

/// Handler for proxied GET requests
///
/// Forwards `GET {endpoint}/api/{path}`. Processing jobs without a progress
/// value get an estimated one. Any upstream failure is reported as a pending
/// status so that clients keep polling.
pub async fn proxy_get(
    query: web::Query<ProxyQuery>,
    credentials: UpstreamCredentials,
    config: web::Data<RelayConfig>,
    http: web::Data<reqwest::Client>,
    estimator: web::Data<ProgressEstimator>,
    metrics: web::Data<Metrics>,
) -> HttpResponse {
    let started = Instant::now();
    let path = query.into_inner().path;
    let route = route_label(&path);
    let client = upstream_client(&http, credentials, &config);

    let response = match client.get_json(&path).await {
        Ok(data) if !data.is_null() => {
            let mut data = data;
            if let Some(progress) = estimator.annotate_status(&path, &mut data, Utc::now()) {
                debug!("Estimated progress {}% for {}", progress, path);
                metrics.record_progress_estimate(progress).await;
            }
            metrics.set_tracked_jobs(estimator.tracked_jobs()).await;
            HttpResponse::Ok().json(data)
        }
        Ok(_) => {
            warn!("Empty response from upstream for {}", path);
            metrics.record_upstream_failure(route, "empty_body").await;
            HttpResponse::Ok().json(StatusResponse::pending())
        }
        Err(e) => {
            warn!("Status check for {} failed: {}", path, e);
            metrics.record_upstream_failure(route, failure_kind(&e)).await;
            HttpResponse::Ok().json(StatusResponse::pending())
        }
    };

    metrics
        .record_proxy_request(
            "GET",
            route,
            response.status().as_u16(),
            started.elapsed().as_secs_f64(),
        )
        .await;
    response
}

/// Handler for proxied POST requests
///
/// - `path=upload`: multipart upload, forwarded and answered with upstream's body
/// - `path=transcribe/{file_id}`: starts transcription in the background and
///   answers immediately
pub async fn proxy_post(
    req: HttpRequest,
    query: web::Query<ProxyQuery>,
    payload: web::Payload,
    credentials: UpstreamCredentials,
    config: web::Data<RelayConfig>,
    http: web::Data<reqwest::Client>,
    estimator: web::Data<ProgressEstimator>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, HandlerError> {
    let started = Instant::now();
    let path = query.into_inner().path;
    let route = route_label(&path);
    let client = upstream_client(&http, credentials, &config);

    let result = match route {
        "upload" => {
            let form = Multipart::new(req.headers(), payload);
            upload(form, &client, &config, &metrics).await
        }
        "transcribe" => match job_id_from_path(&path) {
            Some(job_id) => {
                let job_id = job_id.to_string();
                start_transcription(payload, client, job_id, &estimator, &metrics).await
            }
            None => Err(HandlerError::InvalidPath(path.clone())),
        },
        _ => Err(HandlerError::InvalidPath(path.clone())),
    };

    if let Err(e) = &result {
        warn!("POST {} failed: {}", path, e);
    }
    record_request(&metrics, &Method::POST, route, started, &result).await;
    result
}

async fn upload(
    form: Multipart,
    client: &UpstreamClient,
    config: &RelayConfig,
    metrics: &Metrics,
) -> Result<HttpResponse, HandlerError> {
    let file = extract_upload(form, config.max_upload_size)
        .await?
        .ok_or(HandlerError::NoFile)?;
    metrics.record_upload_size(file.data.len()).await;

    match client.upload_json(&file).await {
        Ok(data) => Ok(HttpResponse::Ok().json(data)),
        Err(e) => {
            metrics.record_upstream_failure("upload", failure_kind(&e)).await;
            Err(HandlerError::from(e))
        }
    }
}

async fn start_transcription(
    mut payload: web::Payload,
    client: UpstreamClient,
    job_id: String,
    estimator: &ProgressEstimator,
    metrics: &Metrics,
) -> Result<HttpResponse, HandlerError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| HandlerError::form_error(e.to_string()))?;
        if body.len() + chunk.len() > MAX_TRANSCRIBE_BODY {
            return Err(HandlerError::BodyTooLarge(MAX_TRANSCRIBE_BODY));
        }
        body.extend_from_slice(&chunk);
    }

    let (request, message) = match serde_json::from_slice::<TranscribeRequest>(&body) {
        Ok(request) => (request, TRANSCRIPTION_STARTED),
        Err(e) => {
            warn!(
                "Unreadable transcription request for {}, using automatic language: {}",
                job_id, e
            );
            (TranscribeRequest::default(), TRANSCRIPTION_STARTED_WITH_ERRORS)
        }
    };

    estimator.mark_started(&job_id, Utc::now());
    metrics.set_tracked_jobs(estimator.tracked_jobs()).await;
    info!("Starting transcription for {}", job_id);

    let task_job_id = job_id.clone();
    let task_metrics = metrics.clone();
    actix_web::rt::spawn(async move {
        match client
            .transcribe(&task_job_id, request.language.as_deref())
            .await
        {
            Ok(_) => debug!("Upstream accepted transcription of {}", task_job_id),
            Err(e) => {
                error!("Error starting transcription for {}: {}", task_job_id, e);
                task_metrics
                    .record_upstream_failure("transcribe", failure_kind(&e))
                    .await;
            }
        }
    });

    Ok(HttpResponse::Ok().json(TranscriptionStarted {
        status: UpstreamStatus::Processing,
        message: message.to_string(),
        file_id: job_id,
    }))
}

/// Handler for OPTIONS requests to the proxy route
pub async fn proxy_options() -> HttpResponse {
    let allowed_methods = "OPTIONS, GET, POST";

    HttpResponse::Ok()
        .append_header(("Allow", allowed_methods))
        .append_header(("Access-Control-Allow-Methods", allowed_methods))
        .append_header((
            "Access-Control-Allow-Headers",
            "Content-Type, x-api-endpoint, x-api-key",
        ))
        .append_header(("Access-Control-Max-Age", "86400"))
        .finish()
}

/// Relay status endpoint
///
/// Reports the relay configuration (without secrets) and the number of jobs
/// whose start time is tracked.
#[get("/status")]
pub async fn relay_status(
    config: web::Data<RelayConfig>,
    estimator: web::Data<ProgressEstimator>,
) -> HttpResponse {
    #[derive(Serialize)]
    struct RelayStatusResponse {
        server: ServerConfig,
        upstream: UpstreamConfig,
        progress: ProgressState,
    }

    #[derive(Serialize)]
    struct ServerConfig {
        host: String,
        port: u16,
        worker_number: usize,
        max_upload_size: usize,
        metrics_backend: String,
    }

    #[derive(Serialize)]
    struct UpstreamConfig {
        default_endpoint: Option<String>,
        default_api_key_configured: bool,
        upload_timeout_seconds: u64,
        status_timeout_seconds: u64,
        transcribe_timeout_seconds: u64,
    }

    #[derive(Serialize)]
    struct ProgressState {
        tracked_jobs: usize,
        retention_hours: u64,
        cleanup_interval_hours: u64,
    }

    let response = RelayStatusResponse {
        server: ServerConfig {
            host: config.host.clone(),
            port: config.port,
            worker_number: config.worker_count(),
            max_upload_size: config.max_upload_size,
            metrics_backend: config.metrics_backend.clone(),
        },
        upstream: UpstreamConfig {
            default_endpoint: config.api_endpoint.clone(),
            default_api_key_configured: config.api_key.is_some(),
            upload_timeout_seconds: config.upload_timeout.as_secs(),
            status_timeout_seconds: config.status_timeout.as_secs(),
            transcribe_timeout_seconds: config.transcribe_timeout.as_secs(),
        },
        progress: ProgressState {
            tracked_jobs: estimator.tracked_jobs(),
            retention_hours: config.progress_retention.as_secs() / 3600,
            cleanup_interval_hours: config.progress_cleanup_interval.as_secs() / 3600,
        },
    };

    HttpResponse::Ok().json(response)
}

/// Metrics endpoint handler
#[get("/metrics")]
pub async fn metrics_handler(metrics: web::Data<Metrics>) -> HttpResponse {
    match metrics.export().await {
        Ok(data) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(data),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            HttpResponse::InternalServerError()
                .json(format!("Failed to export metrics: {}", e))
        }
    }
}

/// Register the relay routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(PROXY_ROUTE)
            .route(web::get().to(proxy_get))
            .route(web::post().to(proxy_post))
            .route(web::method(Method::OPTIONS).to(proxy_options)),
    )
    .service(relay_status)
        .service(metrics_handler);
}
