//! HTTP server implementation
//!
//! hyper http1 with one task per connection. Bodies are read in full before
//! routing; every request gets one access log line.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{AUTHORIZATION, HOST};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::db::DocumentStore;
use crate::odm::{Environment, ModelRegistry};
use crate::routes;
use crate::types::{OlafError, Result};

/// Largest request body accepted, in bytes
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub registry: Arc<ModelRegistry>,
    pub store: Arc<dyn DocumentStore>,
    pub jwt: JwtValidator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        registry: Arc<ModelRegistry>,
        store: Arc<dyn DocumentStore>,
        jwt: JwtValidator,
    ) -> Self {
        Self {
            args,
            registry,
            store,
            jwt,
            started_at: Instant::now(),
        }
    }

    /// Environment acting as `uid`
    pub fn env(&self, uid: bson::oid::ObjectId) -> Environment {
        Environment::new(uid, self.registry.clone(), self.store.clone())
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Olaf listening on {} ({} models, {} store)",
        state.args.listen,
        state.registry.len(),
        state.store.backend()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - relaxed secrets");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Client address: first `X-Forwarded-For` entry, else the peer
fn client_ip(req: &Request<Incoming>, addr: SocketAddr) -> String {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

fn header_string(req: &Request<Incoming>, name: impl hyper::header::AsHeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Read the whole body, refusing oversized ones
async fn read_body(req: Request<Incoming>) -> Result<Bytes> {
    read_limited(req.into_body(), MAX_BODY_SIZE).await
}

/// Buffer at most `limit` bytes of `body`
async fn read_limited<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(OlafError::BadRequest("Request body too large".into()))
        }
        Err(e) => Err(OlafError::BadRequest(format!("Failed to read body: {}", e))),
    }
}

/// Route incoming HTTP requests and write the access log
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let ip = client_ip(&req, addr);
    let host = header_string(&req, HOST).unwrap_or_default();
    let request_id = header_string(&req, "X-Request-ID")
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut response = route(state, method.clone(), &path, req).await;

    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert("X-Request-ID", value);
    }

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        ip = %ip,
        host = %host,
        request_id = %request_id,
        "request"
    );
    Ok(response)
}

async fn route(
    state: Arc<AppState>,
    method: Method,
    path: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state)).await
        }

        (Method::GET, "/status") => routes::status_check(Arc::clone(&state)),

        (Method::OPTIONS, "/token") => routes::cors_preflight(),
        (Method::POST, "/token") | (Method::GET, "/token") => match read_body(req).await {
            Ok(body) => routes::handle_token(state, &body).await,
            Err(e) => routes::error_response(&e),
        },

        (Method::OPTIONS, "/jsonrpc") => routes::cors_preflight(),
        (Method::POST, "/jsonrpc") => {
            let auth = header_string(&req, AUTHORIZATION);
            match read_body(req).await {
                Ok(body) => routes::handle_jsonrpc(state, auth.as_deref(), &body).await,
                Err(e) => routes::error_response(&e),
            }
        }

        (_, "/token") | (_, "/jsonrpc") => {
            routes::message_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }

        _ => routes::not_found_response(path),
    }
}
