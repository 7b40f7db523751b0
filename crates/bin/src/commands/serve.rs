//! Serve command - mounts the demo application on an axum server.
//!
//! Every request except `/health` is turned into a [`yusef::Connection`],
//! dispatched on the blocking pool and written back. Redispatched
//! connections are answered from the public directory.

use std::{
    net::SocketAddr,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::signal::unix::{SignalKind, signal};
use tower_cookies::{Cookie, CookieManagerLayer, Cookies};

use yusef::{Connection, Dispatcher, Request, ResponseState, SessionStats, YusefConfig};

use crate::cli::ServeArgs;

/// Shared application state
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    public_dir: Arc<PathBuf>,
}

/// Run the Yusef server
pub async fn run(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args)?;
    let dispatcher = Arc::new(crate::app::build(config)?);
    let sessions = dispatcher.sessions().clone();

    // Periodically drop stale tokens even when no requests arrive
    let sweep_interval = Duration::from_secs(args.sweep_interval.max(1));
    let sweeper = {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                let report = sessions.sweep();
                if !report.is_empty() {
                    tracing::debug!(?report, "background session sweep");
                }
            }
        })
    };

    let app_state = AppState {
        dispatcher: dispatcher.clone(),
        public_dir: Arc::new(args.public_dir.clone()),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(handle_health_endpoint))
        .fallback(handle_request)
        .layer(CookieManagerLayer::new())
        .with_state(app_state);

    // Bind server
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    let service_path = dispatcher.config().service_path.clone();

    println!("Yusef server started");
    println!();
    println!(
        "Application: http://localhost:{}{service_path}",
        local_addr.port()
    );
    println!();
    println!("Available endpoints:");
    println!("  GET  {service_path}              - Notes page");
    println!("  POST {service_path}              - Form actions (add-note, clear-notes)");
    println!("  GET  {service_path}api/info      - Request info as JSON");
    println!("  GET  {service_path}api/sessions  - Session statistics (owner only)");
    println!(
        "  GET  {service_path}static/...    - Files from {}",
        args.public_dir.display()
    );
    println!("  GET  /health         - Health check");
    println!();
    println!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    let stats = sessions.stats();
    sessions.shutdown();
    tracing::info!(
        tokens = stats.tokens,
        sessions = stats.sessions,
        "session store cleared"
    );

    println!("Server shut down");
    Ok(())
}

/// Layer command line flags over the config file.
fn load_config(args: &ServeArgs) -> yusef::Result<YusefConfig> {
    let mut config = match &args.config {
        Some(path) => YusefConfig::from_file(path)?,
        None => YusefConfig::default(),
    };
    if let Some(service_path) = &args.service_path {
        config.service_path = service_path.clone();
    }
    if let Some(app_identity) = &args.app_identity {
        config.app_identity = app_identity.clone();
    }
    if args.no_session_redirect {
        config.redirect_on_new_session = false;
    }
    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!("Failed to set up SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
        _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, initiating graceful shutdown..."),
    }
}

// ============================================================================
// Request Handlers
// ============================================================================

/// Handler for every route but `/health` - runs the dispatcher
async fn handle_request(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    cookies: Cookies,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = build_request(&method, &uri, &headers, &cookies, addr, &body);
    let is_local = addr.ip().is_loopback();

    let dispatcher = state.dispatcher.clone();
    let conn = match tokio::task::spawn_blocking(move || {
        let mut conn = Connection::new(request);
        conn.is_local = is_local;
        conn.is_owner = is_local;
        dispatcher.handle(&mut conn);
        conn
    })
    .await
    {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("Dispatch task failed: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    for (name, value) in conn.response.cookies() {
        let mut cookie = Cookie::new(name.clone(), value.clone());
        cookie.set_http_only(true);
        cookie.set_path("/");
        cookies.add(cookie);
    }

    match conn.response.state() {
        ResponseState::Redispatched(file) => {
            let file = match file {
                Some(file) => Some(file.clone()),
                None => public_file(&state.public_dir, &conn.request.path),
            };
            serve_file(&conn, file).await
        }
        _ => into_http_response(&conn, conn.response.body().to_string().into_bytes()),
    }
}

fn build_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    cookies: &Cookies,
    addr: SocketAddr,
    body: &Bytes,
) -> Request {
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut request = Request::new(method.as_str(), target).with_ip(addr.ip().to_string());

    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            request.add_header(name.as_str(), value);
        }
    }
    for cookie in cookies.list() {
        request.add_cookie(cookie.name(), cookie.value());
    }

    request.set_has_body(*method == Method::POST || !body.is_empty());
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        for (name, value) in url::form_urlencoded::parse(body) {
            request.add_body_item(name, value);
        }
    }
    request
}

/// Copy status, headers and body of a dispatched connection.
fn into_http_response(conn: &Connection, body: Vec<u8>) -> Response {
    let status =
        StatusCode::from_u16(conn.response.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    for (name, value) in conn.response.headers() {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping invalid response header"),
        }
    }
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
    }
    response
}

async fn serve_file(conn: &Connection, file: Option<PathBuf>) -> Response {
    let Some(file) = file else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&file).await {
        Ok(bytes) => {
            let mut response = into_http_response(conn, bytes);
            if conn.response.header("Content-Type").is_none() {
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(content_type_for(&file)),
                );
            }
            response
        }
        Err(e) => {
            tracing::debug!(file = %file.display(), "cannot serve file: {e}");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Map a section sub-path to a file below `root`, refusing to leave it.
fn public_file(root: &Path, path: &str) -> Option<PathBuf> {
    let relative = Path::new(path.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

fn content_type_for(file: &Path) -> &'static str {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Health Handler
// ============================================================================

/// Health check response
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    time: String,
    sessions: SessionStats,
}

/// Handler for GET /health - Health check endpoint
async fn handle_health_endpoint(State(state): State<AppState>) -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "healthy",
        service: state.dispatcher.config().service_name.clone(),
        time: state.dispatcher.sessions().clock().now_rfc3339(),
        sessions: state.dispatcher.sessions().stats(),
    })
}
