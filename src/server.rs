//! HTTP front end.
//!
//! Every request goes through a single fallback handler that consults the
//! route table, so routes come from the descriptions rather than from axum's
//! static router. The control client WebSocket is the only fixed route.

use crate::config::ServerConfig;
use crate::error::LoadError;
use crate::loader::load_directory;
use crate::resolver::{ResolvedResponse, ResponseResolver};
use crate::routes::{Lookup, RouteOptions, RouteTable};
use crate::session::InteractiveSession;
use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS,
    ALLOW, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Mock server
///
/// Serves the described endpoints and owns the interactive session.
pub struct MockServer {
    config: ServerConfig,
    routes: RouteTable,
    resolver: ResponseResolver,
    session: Arc<InteractiveSession>,
    /// Total requests processed.
    requests_total: AtomicU64,
    /// Requests answered from a described endpoint.
    requests_matched: AtomicU64,
    /// Requests answered with 404 or 405.
    requests_unmatched: AtomicU64,
}

impl MockServer {
    /// Create a server for an already-built route table.
    pub fn new(config: ServerConfig, routes: RouteTable) -> Self {
        let session = Arc::new(InteractiveSession::new(config.answer_timeout()));
        let resolver = ResponseResolver::new(session.clone(), config.happy_path);

        if !config.happy_path
            && !matches!(routes.lookup(&Method::GET, &config.control_path), Lookup::NotFound)
        {
            warn!(
                control_path = %config.control_path,
                "A described endpoint shares the control client path and will be unreachable"
            );
        }

        info!(
            routes = routes.len(),
            cors = config.cors,
            happy_path = config.happy_path,
            "Mock server initialized"
        );

        Self {
            config,
            routes,
            resolver,
            session,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    /// Load every description in the configured directory and build the server.
    pub async fn load(config: ServerConfig) -> Result<Self, LoadError> {
        let descriptions = load_directory(&config.directory, &config.drafter).await?;
        let routes = RouteTable::build(
            descriptions.iter().map(|d| &d.blueprint),
            RouteOptions {
                cors: config.cors,
                strict_status: config.strict_status,
            },
        )?;
        Ok(Self::new(config, routes))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn session(&self) -> &Arc<InteractiveSession> {
        &self.session
    }

    /// Get total requests processed.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total requests matched.
    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    /// Get total requests unmatched.
    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    /// Build the axum router.
    pub fn router(self: Arc<Self>) -> Router {
        let mut router = Router::new();
        if !self.config.happy_path {
            router = router.route(&self.config.control_path, get(control_client));
        }
        router
            .fallback(dispatch)
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        info!(
            address = %listener.local_addr()?,
            control_path = %self.config.control_path,
            interactive = !self.config.happy_path,
            "Mock server listening"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Answer one request from the route table.
    pub async fn handle(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Response {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let path = uri.path();

        match self.routes.lookup(method, path) {
            Lookup::Found { route, context } => {
                self.requests_matched.fetch_add(1, Ordering::Relaxed);
                debug!(
                    method = %method,
                    path = %path,
                    uri_template = %route.template.as_str(),
                    params = ?context.path_params,
                    "Request matched route"
                );
                let resolved = self
                    .resolver
                    .resolve(&route.responses, method.as_str(), &uri.to_string())
                    .await;
                build_response(resolved)
            }
            Lookup::Preflight => {
                self.requests_matched.fetch_add(1, Ordering::Relaxed);
                build_preflight(headers)
            }
            Lookup::MethodNotAllowed { allowed } => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                warn!(method = %method, path = %path, "Method not described for this path");
                let allow = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut response = json_error(
                    StatusCode::METHOD_NOT_ALLOWED,
                    r#"{"error": "method_not_allowed", "message": "Method not described for this path"}"#,
                );
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    response.headers_mut().insert(ALLOW, value);
                }
                response
            }
            Lookup::NotFound => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                warn!(method = %method, path = %path, "No described endpoint matches");
                json_error(
                    StatusCode::NOT_FOUND,
                    r#"{"error": "not_found", "message": "No described endpoint matches"}"#,
                )
            }
        }
    }
}

async fn dispatch(
    State(server): State<Arc<MockServer>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    server.handle(&method, &uri, &headers).await
}

async fn control_client(
    State(server): State<Arc<MockServer>>,
    ws: WebSocketUpgrade,
) -> Response {
    info!("Control client connecting");
    ws.on_upgrade(move |socket| async move { server.session.serve_client(socket).await })
}

/// Write a resolved variant: CORS origin first, then the declared headers.
fn build_response(resolved: ResolvedResponse) -> Response {
    let mut response = Response::new(Body::from(resolved.body));
    // Statuses are validated when the route table is built.
    *response.status_mut() = StatusCode::from_u16(resolved.status).unwrap_or(StatusCode::OK);

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    for header in &resolved.headers {
        match (
            HeaderName::from_bytes(header.name.as_bytes()),
            HeaderValue::from_str(&header.value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(
                name = %header.name,
                variant = %resolved.variant,
                "Skipping invalid response header"
            ),
        }
    }

    response
}

/// CORS preflight: allow any origin and whatever headers were requested.
fn build_preflight(request_headers: &HeaderMap) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::CREATED;

    let allow_headers = request_headers
        .get(ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""));

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
    response
}

fn json_error(status: StatusCode, body: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
