//! HTTP server implementation

use crate::error::ApiError;
use crate::handlers;
use crate::response::Response;
use crate::router::{RouteMatch, Router};
use crate::state::AppState;
use http::{header, HeaderValue, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Largest request body accepted, in bytes
pub const BODY_LIMIT: usize = 64 * 1024;

/// How long open connections get to finish their in-flight requests on shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Server {
    router: Arc<Router>,
    state: AppState,
}

impl Server {
    pub fn new(router: Router, state: AppState) -> Self {
        Self {
            router: Arc::new(router),
            state,
        }
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// On shutdown the listener is closed and every open connection is told to
    /// close once its in-flight request is answered, so keep-alive clients
    /// cannot submit jobs after this returns. Connections still busy after
    /// [`SHUTDOWN_GRACE`] are left to their tasks.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> std::io::Result<()> {
        info!("Courier listening on http://{}", listener.local_addr()?);
        tokio::pin!(shutdown);
        let graceful = GracefulShutdown::new();

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => break,
            };

            let io = TokioIo::new(stream);
            let router = self.router.clone();
            let state = self.state.clone();

            let service = service_fn(move |req: hyper::Request<Incoming>| {
                let router = router.clone();
                let state = state.clone();
                async move {
                    let response = handle_request(&router, &state, req, remote_addr).await;
                    Ok::<_, Infallible>(response)
                }
            });
            let connection = graceful.watch(http1::Builder::new().serve_connection(io, service));

            tokio::spawn(async move {
                if let Err(err) = connection.await {
                    error!("Connection error: {}", err);
                }
            });
        }

        drop(listener);
        info!("Server stopped accepting connections");

        match tokio::time::timeout(SHUTDOWN_GRACE, graceful.shutdown()).await {
            Ok(()) => info!("All connections closed"),
            Err(_) => warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "Connections still open after shutdown grace period"
            ),
        }
        Ok(())
    }
}

/// Handle a single HTTP request
async fn handle_request(
    router: &Router,
    state: &AppState,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let (parts, body) = req.into_parts();

    let (route, params) = match router.match_route(&path, &method) {
        RouteMatch::Found { route, params } => (route, params),
        RouteMatch::NotFound => {
            let response = ApiError::not_found(format!("No route found for {} {}", method, path))
                .into_response();
            log_request(&method, &path, response.status(), start);
            return response;
        }
        RouteMatch::MethodNotAllowed { allowed } => {
            let allowed: Vec<&str> = allowed.iter().map(|m| m.as_str()).collect();
            let mut response = ApiError::method_not_allowed(format!(
                "Method {} not allowed for {}",
                method, path
            ))
            .into_response();
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                response.headers_mut().insert(header::ALLOW, value);
            }
            log_request(&method, &path, response.status(), start);
            return response;
        }
    };

    let body = match Limited::new(body, BODY_LIMIT).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(remote = %remote_addr, "Rejected request body: {}", err);
            let error = if err.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::payload_too_large(format!("Request body exceeds {} bytes", BODY_LIMIT))
            } else {
                ApiError::bad_request("Failed to read request body")
            };
            let response = error.into_response();
            log_request(&method, &path, response.status(), start);
            return response;
        }
    };

    let response = handlers::dispatch(state, route, &params, &parts.headers, body).await;
    log_request(&method, &path, response.status(), start);
    response
}

/// Log request completion
fn log_request(method: &http::Method, path: &str, status: StatusCode, start: Instant) {
    let elapsed = start.elapsed();

    if status.is_success() {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request completed"
        );
    } else {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request failed"
        );
    }
}
