//! Web server adapter.
//!
//! Axum server rendering askama pages, progressively enhanced with HTMX.
//! Requests carrying `HX-Request` get the page fragment only; everything
//! else gets the fragment wrapped in the site layout.
//!
//! Sessions are held in memory, so a restart signs everyone out.

pub mod auth;
mod error;
mod handlers;
mod notice;
mod templates;

pub use auth::{AuthSession, Backend, Credentials, User};
pub use error::WebError;
pub use notice::{Notice, NoticeKind};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_login::{AuthManagerLayerBuilder, login_required};
use time::Duration;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::Key, cookie::SameSite};
use tracing::{info, warn};

use crate::domain::config_validation::DEFAULT_SESSION_LIFETIME;
use crate::domain::error::SportfundError;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::StorePort;

pub type SharedStore = Arc<dyn StorePort + Send + Sync>;

pub struct AppState {
    pub store: SharedStore,
    pub config: Arc<dyn ConfigPort + Send + Sync>,
}

pub fn build_router(state: AppState) -> Result<Router, SportfundError> {
    let lifetime = state
        .config
        .get_int("auth", "session_lifetime", DEFAULT_SESSION_LIFETIME);
    let secure = state.config.get_bool("auth", "secure_cookies", false);
    let static_dir = state
        .config
        .get_string("web", "static_dir")
        .unwrap_or_else(|| "static".to_string());

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(secure)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(lifetime)))
        .with_signed(session_key(state.config.as_ref())?);

    let backend = Backend::new(Arc::clone(&state.store));
    let auth_layer = AuthManagerLayerBuilder::new(backend, session_layer).build();

    let signed_in = Router::new()
        .route("/dashboard", get(handlers::dashboard))
        .route(
            "/profile",
            get(handlers::profile_form).post(handlers::update_profile),
        )
        .route_layer(login_required!(Backend, login_url = "/auth"));

    let admin = Router::new()
        .route("/admin", get(handlers::admin_overview))
        .route("/admin/challenges", get(handlers::admin_challenges))
        .route(
            "/admin/challenges/{id}/toggle",
            post(handlers::toggle_challenge),
        )
        .route("/admin/enrollments", get(handlers::admin_enrollments))
        .route(
            "/admin/enrollments/{id}/status",
            post(handlers::update_enrollment_status),
        )
        .route("/admin/users", get(handlers::admin_users))
        .route("/admin/users/{id}/admin", post(handlers::toggle_admin))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(login_required!(Backend, login_url = "/auth"));

    Ok(Router::new()
        .route("/", get(handlers::home))
        .route("/about", get(handlers::about))
        .route("/evaluation-process", get(handlers::evaluation_process))
        .route("/challenges", get(handlers::challenges))
        .route("/challenges/enroll", post(handlers::enroll))
        .route("/auth", get(handlers::auth_form))
        .route("/auth/sign-in", post(handlers::sign_in))
        .route("/auth/sign-up", post(handlers::sign_up))
        .route("/auth/sign-out", post(handlers::sign_out))
        .route("/health", get(handlers::health))
        .merge(signed_in)
        .merge(admin)
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(handlers::not_found)
        .layer(auth_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state)))
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), SportfundError> {
    let router = build_router(state)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}

/// Cookie signing key from `[auth] session_secret`, or a fresh random key.
fn session_key(config: &dyn ConfigPort) -> Result<Key, SportfundError> {
    let invalid = |reason: String| SportfundError::ConfigInvalid {
        section: "auth".to_string(),
        key: "session_secret".to_string(),
        reason,
    };
    match config.get_string("auth", "session_secret") {
        Some(secret) => {
            let bytes = hex::decode(secret.trim()).map_err(|e| invalid(e.to_string()))?;
            Key::try_from(bytes.as_slice()).map_err(|e| invalid(e.to_string()))
        }
        None => {
            warn!("no session_secret configured; sessions will not survive a restart");
            Ok(Key::generate())
        }
    }
}

async fn require_admin(auth_session: AuthSession, request: Request, next: Next) -> Response {
    match auth_session.user {
        Some(user) if user.is_admin => next.run(request).await,
        _ => WebError::forbidden("Administrator access required").into_response(),
    }
}

/// Runs a store call on the blocking pool. The store adapters are
/// synchronous and must stay off the async workers.
pub(crate) async fn run_blocking<T, F>(store: &SharedStore, f: F) -> Result<T, SportfundError>
where
    F: FnOnce(&(dyn StorePort + Send + Sync)) -> Result<T, SportfundError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| SportfundError::Database {
            reason: format!("store task failed: {e}"),
        })?
}

fn is_htmx_request(headers: &axum::http::HeaderMap) -> bool {
    headers.get("HX-Request").is_some()
}
