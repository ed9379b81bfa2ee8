// eTour / SMOS - Web Server
// JSON API with Axum over the sample systems

use anyhow::{bail, Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use etour_smos::etour::{ImageDescriptor, SearchPreferences, SAMPLE_OPERATOR};
use etour_smos::smos::{sample, Session, SMOS_SERVER};
use etour_smos::{AppConfig, Etour, Event, ServiceError, ServiceResult, Smos};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
struct AppState {
    etour: Arc<Mutex<Etour>>,
    smos: Arc<Mutex<Smos>>,

    /// Administrator session used for the monitoring view
    admin: Session,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct BannerRequest {
    path: String,
    size_bytes: u64,
    width: u32,
    height: u32,
    operator: Option<String>,
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::Duplicate { .. }
        | ServiceError::LimitReached { .. }
        | ServiceError::InvalidState(_) => StatusCode::CONFLICT,
        ServiceError::ConnectionInterrupted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: ServiceResult<T>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(err) => {
            let status = status_for(&err);
            if status.is_server_error() {
                tracing::error!(kind = err.kind(), "request failed: {}", err);
            }
            (status, Json(ApiResponse::<T>::err(err.to_string()))).into_response()
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> ServiceResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ServiceError::Storage("state lock poisoned".to_string()))
}

/// Run a service call on the blocking pool; the link may sleep to simulate latency
async fn call<S, T, F>(system: Arc<Mutex<S>>, operation: F) -> Response
where
    S: Send + 'static,
    T: Serialize + Send + 'static,
    F: FnOnce(&mut S) -> ServiceResult<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let mut guard = lock(&system)?;
        operation(&mut guard)
    })
    .await
    .unwrap_or_else(|err| Err(ServiceError::Storage(format!("request task failed: {}", err))));
    respond(result)
}

const LOGIN_ATTEMPTS: usize = 5;

/// Sign in the monitoring session, retrying only interrupted connections
fn sign_in_admin(smos: &mut Smos) -> Result<Session> {
    for attempt in 1..=LOGIN_ATTEMPTS {
        match smos.login(sample::ADMIN.0, sample::ADMIN.1) {
            Ok(session) => return Ok(session),
            Err(err) if err.is_connection_interrupted() => {
                tracing::warn!(attempt, max = LOGIN_ATTEMPTS, "admin login interrupted, retrying");
            }
            Err(err) => return Err(err).context("Failed to sign in the monitoring session"),
        }
    }

    bail!(
        "Failed to sign in the monitoring session: the {} server was unreachable {} times",
        SMOS_SERVER,
        LOGIN_ATTEMPTS
    )
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/refreshment-points?q= - Search by name or city
async fn search_points(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Response {
    let text = query.q.unwrap_or_default();
    call(state.etour, move |etour| etour.search_refreshment_points(&text)).await
}

/// GET /api/refreshment-points/:id
async fn get_point(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    call(state.etour, move |etour| etour.view_refreshment_point(&id)).await
}

/// GET /api/refreshment-points/:id/banners
async fn get_banners(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    call(state.etour, move |etour| etour.banners_for_point(&id)).await
}

/// POST /api/refreshment-points/:id/banners
async fn post_banner(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<BannerRequest>,
) -> Response {
    let operator = request.operator.unwrap_or_else(|| SAMPLE_OPERATOR.to_string());
    let image = ImageDescriptor::new(&request.path, request.size_bytes, request.width, request.height);
    call(state.etour, move |etour| etour.insert_banner(&operator, &id, image)).await
}

/// DELETE /api/banners/:id
async fn remove_banner(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    call(state.etour, move |etour| etour.delete_banner(SAMPLE_OPERATOR, &id)).await
}

/// GET /api/tourists/:id/preferences
async fn get_preferences(State(state): State<AppState>, Path(tourist): Path<String>) -> Response {
    call(state.etour, move |etour| etour.search_preferences(&tourist)).await
}

/// PUT /api/tourists/:id/preferences
async fn put_preferences(
    State(state): State<AppState>,
    Path(tourist): Path<String>,
    Json(mut prefs): Json<SearchPreferences>,
) -> Response {
    prefs.tourist_id = tourist.clone();
    call(state.etour, move |etour| etour.modify_search_preferences(&tourist, prefs)).await
}

/// GET /api/monitoring - Students over the absence and note thresholds
async fn get_monitoring(State(state): State<AppState>) -> Response {
    let admin = state.admin.clone();
    call(state.smos, move |smos| smos.monitor_students(&admin)).await
}

/// GET /api/audit?limit= - Recent events from both systems, newest first
async fn get_audit(State(state): State<AppState>, Query(query): Query<AuditQuery>) -> Response {
    let mut events = match lock(&state.etour).map(|etour| etour.audit().events()) {
        Ok(events) => events,
        Err(err) => return respond::<Vec<Event>>(Err(err)),
    };
    call(state.smos, move |smos| {
        events.extend(smos.audit().events());
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(query.limit.unwrap_or(50));
        Ok(events)
    })
    .await
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .try_init();

    println!("🌐 eTour / SMOS - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::load(None)?;
    println!("✓ Failure rate: {:.0}%", config.link.failure_rate * 100.0);

    let etour = Etour::with_sample_data(&config)?;
    let mut smos = Smos::with_sample_data(&config)?;

    let admin = sign_in_admin(&mut smos)?;
    println!("✓ Sample data loaded");

    // Create shared state
    let state = AppState {
        etour: Arc::new(Mutex::new(etour)),
        smos: Arc::new(Mutex::new(smos)),
        admin,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/refreshment-points", get(search_points))
        .route("/refreshment-points/:id", get(get_point))
        .route("/refreshment-points/:id/banners", get(get_banners).post(post_banner))
        .route("/banners/:id", delete(remove_banner))
        .route("/tourists/:id/preferences", get(get_preferences).put(put_preferences))
        .route("/monitoring", get(get_monitoring))
        .route("/audit", get(get_audit))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://localhost:{}", port);
    println!("   API: http://localhost:{}/api/refreshment-points", port);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server stopped")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&ServiceError::not_found("Banner", "b1")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&ServiceError::LimitReached { entity: "banners", limit: 5 }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ServiceError::ConnectionInterrupted { server: "ETOUR".to_string() }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&ServiceError::Validation(Vec::new())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_admin_sign_in_gives_up_when_offline() {
        let mut config = AppConfig::reliable();
        config.link.failure_rate = 1.0;
        let mut smos = Smos::with_sample_data(&config).unwrap();

        let err = sign_in_admin(&mut smos).unwrap_err();
        assert!(err.to_string().contains("unreachable 5 times"));
    }

    #[test]
    fn test_admin_sign_in_online() {
        let mut smos = Smos::with_sample_data(&AppConfig::reliable()).unwrap();
        let session = sign_in_admin(&mut smos).unwrap();
        assert_eq!(session.username, sample::ADMIN.0);
    }

    #[tokio::test]
    async fn test_service_calls_run_off_the_async_workers() {
        let mut config = AppConfig::reliable();
        config.link.latency_ms = 20;
        let etour = Arc::new(Mutex::new(Etour::with_sample_data(&config).unwrap()));

        let found = call(etour.clone(), |etour| etour.search_refreshment_points("rome")).await;
        assert_eq!(found.status(), StatusCode::OK);

        let missing = call(etour, |etour| etour.view_refreshment_point("missing")).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_envelope() {
        let body = serde_json::to_value(ApiResponse::<u32>::err("boom".to_string())).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
        assert_eq!(body["error"], "boom");
    }
}
