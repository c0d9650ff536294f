//! HTTP surface: `POST /render` and `GET /health`.
//!
//! Every render option can be given as a query parameter or a header
//! (a non-empty query value wins): `width`/`x-width`, `height`/`x-height`,
//! `filename`/`x-filename`. Uploads are requested when any of `save`,
//! `persist`, `x-save-to-r2` or `x-persist` is `true`.

use crate::driver::Launcher;
use crate::geometry::parse_dimension;
use crate::ratelimit::{Decision, RateLimiter};
use crate::service::{RenderResponse, RenderService};
use crate::storage::{validate_key, UploadOutcome};
use crate::{Error, RenderRequest, Result, PNG_MIME};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// Header carrying the shared API secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared state behind the router
pub struct AppState<L: Launcher> {
    pub service: RenderService<L>,
    pub api_secret: String,
    pub limiter: RateLimiter,
}

/// Build the application router.
pub fn router<L: Launcher + 'static>(state: Arc<AppState<L>>) -> Router {
    let render = Router::new()
        .route("/render", post(render_handler::<L>))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key::<L>));

    Router::new()
        .merge(render)
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::<L>))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn require_api_key<L: Launcher + 'static>(
    State(state): State<Arc<AppState<L>>>,
    request: Request,
    next: Next,
) -> Response {
    let supplied = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if supplied != Some(state.api_secret.as_str()) {
        warn!("Rejected request with invalid or missing API key");
        return (StatusCode::UNAUTHORIZED, "Access denied: Invalid or missing API key").into_response();
    }
    next.run(request).await
}

async fn rate_limit<L: Launcher + 'static>(
    State(state): State<Arc<AppState<L>>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = client_ip(peer, request.headers());

    let limit = state.limiter.max();
    match state.limiter.check(client) {
        Decision::Allowed { remaining, reset_secs } => {
            let mut response = next.run(request).await;
            set_rate_headers(response.headers_mut(), limit, remaining, reset_secs);
            response
        }
        Decision::Limited { reset_secs } => {
            warn!("Rate limit exceeded for {}", client);
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, please try again later.",
            )
                .into_response();
            set_rate_headers(response.headers_mut(), limit, 0, reset_secs);
            response
        }
    }
}

fn set_rate_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_secs: u64) {
    let pairs = [
        ("ratelimit-limit", limit as u64),
        ("ratelimit-remaining", remaining as u64),
        ("ratelimit-reset", reset_secs),
    ];
    for (name, value) in pairs {
        headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
    }
}

/// Client address for rate limiting. `x-forwarded-for` is only trusted
/// when the peer is a loopback proxy (or unknown).
pub fn client_ip(peer: Option<IpAddr>, headers: &HeaderMap) -> IpAddr {
    let forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok())
    };

    match peer {
        Some(ip) if !ip.is_loopback() => ip,
        Some(ip) => forwarded().unwrap_or(ip),
        None => forwarded().unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
    }
}

async fn render_handler<L: Launcher + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match parse_request(&query, &headers, &body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state.service.render(request).await {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}

fn param<'a>(
    query: &'a HashMap<String, String>,
    headers: &'a HeaderMap,
    query_names: &[&str],
    header_names: &[&str],
) -> Option<&'a str> {
    query_names
        .iter()
        .find_map(|name| query.get(*name).map(String::as_str))
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            header_names
                .iter()
                .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        })
}

fn flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Turn the raw HTTP inputs into a validated [`RenderRequest`].
pub fn parse_request(
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<RenderRequest> {
    let content = std::str::from_utf8(body).map_err(|_| Error::EmptyContent)?;
    if content.trim().is_empty() {
        return Err(Error::EmptyContent);
    }

    let width = parse_dimension("width", param(query, headers, &["width"], &["x-width"]))?;
    let height = parse_dimension("height", param(query, headers, &["height"], &["x-height"]))?;
    let filename = param(query, headers, &["filename"], &["x-filename"])
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string);
    if let Some(name) = &filename {
        validate_key(name)?;
    }
    let persist = ["save", "persist"]
        .iter()
        .any(|name| flag(query.get(*name).map(String::as_str)))
        || ["x-save-to-r2", "x-persist"]
            .iter()
            .any(|name| flag(headers.get(*name).and_then(|v| v.to_str().ok())));

    Ok(RenderRequest {
        content: content.to_string(),
        width,
        height,
        filename,
        persist,
    })
}

#[derive(Serialize)]
struct StoredBody<'a> {
    success: bool,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn stored_response(outcome: &UploadOutcome) -> Response {
    if outcome.success {
        let body = StoredBody {
            success: true,
            message: "Image rendered and uploaded to R2",
            url: outcome.url.as_deref(),
            filename: outcome.key.as_deref(),
            error: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    } else {
        let body = StoredBody {
            success: false,
            message: "Failed to upload image",
            url: None,
            filename: None,
            error: outcome.error.as_deref(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl IntoResponse for RenderResponse {
    fn into_response(self) -> Response {
        match self {
            RenderResponse::Image(image) => {
                ([(header::CONTENT_TYPE, PNG_MIME)], image.bytes).into_response()
            }
            RenderResponse::Stored(outcome) => stored_response(&outcome),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            return (StatusCode::BAD_REQUEST, self.to_string()).into_response();
        }
        error!("Error rendering image: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error: {}", self),
        )
            .into_response()
    }
}
