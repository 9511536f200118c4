use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use log::{debug, error, info};
use reqwest::Client;
use serde::Serialize;

use crate::config::Config;
use crate::provider;

pub struct AppState {
    pub config: Config,
    pub client: Client,
}

#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    message: String,
    hostname: String,
    ip: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// Query pairs in request order. Repeated keys are kept so the first one wins
/// instead of failing extraction.
struct UpdateQuery(Vec<(String, String)>);

impl UpdateQuery {
    fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/update", any(update_dns))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(access_log))
        .with_state(Arc::new(state))
}

async fn access_log(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let uri = request.uri();
    let path = match uri.query() {
        Some(q) => format!("{}?{}", uri.path(), q),
        None => uri.path().to_string(),
    };
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or("-").trim().to_string())
        .or_else(|| {
            request
                .headers()
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "-".to_string());

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let length = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    let duration = start.elapsed();

    // method path "user-agent" ip status length duration
    info!(
        target: "access",
        "{} {} \"{}\" {} {} {} {:.3}ms",
        method, path, user_agent, ip, status, length, duration.as_secs_f64() * 1000.0
    );

    response
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

fn bad_request(error: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            success: false,
            error,
        }),
    )
        .into_response()
}

async fn update_dns(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let query = UpdateQuery(pairs);

    let raw_ip = match query.first("ip") {
        Some(ip) if !ip.is_empty() => ip,
        _ => {
            error!("ip query param is missing");
            return bad_request("ip query param is missing".to_string());
        }
    };

    let ip: IpAddr = match raw_ip.parse() {
        Ok(ip) => ip,
        Err(_) => {
            error!("invalid ip address format: {}", raw_ip);
            return bad_request(format!("invalid ip address format: {}", raw_ip));
        }
    };

    let hostname = match query.first("hostname") {
        Some(hostname) if !hostname.is_empty() => hostname,
        _ => {
            error!("hostname query param is missing");
            return bad_request("hostname query param is missing".to_string());
        }
    };

    match provider::cloudflare::update_record(&state.client, &state.config.cloudflare, ip).await {
        Ok(result) => {
            debug!("Cloudflare answered {} for {}", result.status, result.name);
            info!(
                "dns record updated successfully for hostname={}, ip={}",
                hostname, result.content
            );
            (
                StatusCode::OK,
                Json(ApiResponse {
                    success: true,
                    message: format!("Updated record {} to IP {}", result.name, result.content),
                    hostname: hostname.to_string(),
                    ip: result.content,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("error updating dns record: {:#}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    success: false,
                    error: format!("error updating dns record: {:#}", e),
                }),
            )
                .into_response()
        }
    }
}
