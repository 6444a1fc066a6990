//! HTTP API
//!
//! ## Endpoints
//! - `GET /eligible_pieces/sp_local` - pieces the caller itself still holds
//! - `GET /eligible_pieces/anywhere` - pieces obtainable from any source
//! - `GET /pending_proposals` - the caller's proposal pipeline
//! - `GET /health` - liveness and pool state
//!
//! Callers are authenticated upstream; the verified identity arrives in the
//! `X-FIL-SPID` header and the advertised capacity in `X-FIL-SPSIZE`.
//!
//! ## Example Usage
//!
//! ```bash
//! curl -H 'X-FIL-SPID: f01000' -H 'X-FIL-SPSIZE: 68719476736' \
//!      'http://localhost:8080/eligible_pieces/anywhere?limit=10'
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::deal_store::ListingScope;
use crate::error::{EligibilityError, Result};
use crate::response::{self, HandlerResult};
use crate::service::{Caller, EligibilityService, Listing};
use crate::types::ProviderId;

pub const HEADER_SP_ID: &str = "x-fil-spid";
pub const HEADER_SP_SIZE: &str = "x-fil-spsize";

const KNOWN_PATHS: [&str; 4] = [
    "/health",
    "/eligible_pieces/sp_local",
    "/eligible_pieces/anywhere",
    "/pending_proposals",
];

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    let value = headers.get(name).ok_or_else(|| {
        EligibilityError::Auth(format!("missing verified identity header {}", name))
    })?;
    value
        .to_str()
        .map_err(|_| EligibilityError::InvalidInput(format!("header {} is not valid text", name)))
}

/// Verified provider id attached by the authentication layer
pub fn provider_from_headers(headers: &HeaderMap) -> Result<ProviderId> {
    header_str(headers, HEADER_SP_ID)?.parse()
}

/// Verified caller with advertised capacity
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller> {
    let provider = provider_from_headers(headers)?;
    let raw = header_str(headers, HEADER_SP_SIZE)?;
    let capacity = raw.trim().parse::<u64>().map_err(|_| {
        EligibilityError::InvalidInput(format!("advertised size '{}' is not a valid integer", raw))
    })?;
    Ok(Caller { provider, capacity })
}

/// Value of `name` in a query string, if present
pub fn query_param(query: Option<&str>, name: &str) -> Result<Option<String>> {
    let Some(query) = query else {
        return Ok(None);
    };
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
        .map_err(|e| EligibilityError::InvalidInput(format!("malformed query string: {}", e)))?;
    Ok(pairs.into_iter().find(|(k, _)| k == name).map(|(_, v)| v))
}

/// HTTP server state
pub struct HttpServer {
    service: Arc<EligibilityService>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(service: Arc<EligibilityService>, bind_addr: SocketAddr) -> Self {
        Self { service, bind_addr }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    pub async fn handle_request<B>(
        &self,
        req: Request<B>,
    ) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();
        debug!(method = %method, path = %path, "Incoming request");

        let headers = req.headers();
        let query = req.uri().query();

        let result = match (&method, path.as_str()) {
            (&Method::GET, "/health") => Ok(self.handle_health()),
            (&Method::GET, "/eligible_pieces/sp_local") => {
                self.handle_eligible(headers, query, ListingScope::SpLocal).await
            }
            (&Method::GET, "/eligible_pieces/anywhere") => {
                self.handle_eligible(headers, query, ListingScope::Anywhere).await
            }
            (&Method::GET, "/pending_proposals") => self.handle_pending(headers).await,
            (_, path) if KNOWN_PATHS.contains(&path) => Ok(response::method_not_allowed()),
            _ => Ok(response::not_found()),
        };

        Ok(response::from_result(result))
    }

    fn handle_health(&self) -> Response<Full<Bytes>> {
        let stats = self.service.store().stats();
        response::json_response(
            StatusCode::OK,
            &serde_json::json!({
                "status": "ok",
                "connections": stats.connections,
                "idle_connections": stats.idle_connections,
            }),
        )
    }

    /// GET /eligible_pieces/{sp_local,anywhere}
    async fn handle_eligible(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
        scope: ListingScope,
    ) -> HandlerResult {
        let caller = caller_from_headers(headers)?;
        let limit = query_param(query, "limit")?;

        let listing = self
            .service
            .list_eligible(&caller, scope, limit.as_deref(), Utc::now())
            .await?;

        Ok(match listing {
            Listing::Eligible { pieces, info } => {
                response::annotated(StatusCode::OK, &pieces, &info)
            }
            Listing::Ineligible { reason } => response::failure(
                StatusCode::FORBIDDEN,
                &format!(
                    "Storage provider {} is currently ineligible to receive deals from this program:\n{}",
                    caller.provider, reason
                ),
            ),
        })
    }

    /// GET /pending_proposals
    async fn handle_pending(&self, headers: &HeaderMap) -> HandlerResult {
        let provider = provider_from_headers(headers)?;
        let (report, summary) = self.service.pending_proposals(&provider, Utc::now()).await?;
        Ok(response::annotated(StatusCode::OK, &report, &summary))
    }
}
