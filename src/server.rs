//!
//! prp HTTP server
//! ---------------
//! Axum-based REST surface over the in-memory repository layer.
//!
//! Responsibilities:
//! - Cookie-carried sessions: login issues a session and sets an HttpOnly
//!   cookie holding the session identifier; every request rebuilds the
//!   caller's authorization context from it.
//! - User CRUD routes guarded by per-operation gates (with self-access).
//! - Status-code mapping from the application error taxonomy; error bodies
//!   are the serialized [`AppError`].
//! - Graceful shutdown on ctrl-c, wired to the session store's eviction
//!   scheduler so the background task stops with the listener.
//!
//! Serialization, cookies and status codes all live here; the stores know
//! nothing about HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info};

use crate::auth::{Context, Gate, Level};
use crate::error::AppError;
use crate::identity::{SessionStore, UserPatch, UserStore};
use crate::uid::{Uid, UidGenerator};

const SESSION_COOKIE: &str = "prp_session";

const DEFAULT_LIST_LIMIT: usize = 100;

// Per-operation permission sets. Self-access is handled by `allows_on` at
// the call sites that target a specific record.
const LIST_USERS: Gate = Gate::new(&[Level::Admin]);
const READ_USER: Gate = Gate::new(&[Level::Admin]);
const CREATE_USER: Gate = Gate::new(&[Level::Unlogged]);
const PATCH_USER: Gate = Gate::new(&[Level::Admin]);
const DELETE_USER: Gate = Gate::new(&[Level::Admin]);

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserStore>,
    pub sessions: Arc<SessionStore>,
    /// Lifetime of newly issued sessions.
    pub session_ttl: Duration,
}

/// Start the prp HTTP server with configuration drawn from the environment:
/// `PRP_HTTP_PORT` (default 4545), `PRP_SESSION_TTL_SECS` (default 3600),
/// `PRP_ADMIN_LOGIN` / `PRP_ADMIN_CREDENTIAL` for the seeded administrator.
pub async fn run() -> anyhow::Result<()> {
    let http_port: u16 = env_or("PRP_HTTP_PORT", 4545)?;
    let ttl_secs: u64 = env_or("PRP_SESSION_TTL_SECS", 3600)?;

    let gen = Arc::new(UidGenerator::new());
    let users = Arc::new(UserStore::new(Arc::clone(&gen)));
    let sessions = Arc::new(SessionStore::new(gen));

    ensure_default_admin(&users)?;

    let state = AppState {
        users,
        sessions: Arc::clone(&sessions),
        session_ttl: Duration::from_secs(ttl_secs),
    };
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{http_port}").parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Listener is down; stop the eviction scheduler too.
    sessions.shutdown();
    info!("Server stopped");
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "prp ok" }))
        .route("/api/v1/users", get(list_users).post(create_user))
        .route(
            "/api/v1/users/{id}",
            get(get_user).patch(patch_user).delete(delete_user),
        )
        .route(
            "/api/v1/sessions",
            post(login).get(get_session).delete(logout),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received");
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("bad value for {key}")),
        Err(_) => Ok(default),
    }
}

/// Seed the administrator account on first boot, so a fresh (memory-only)
/// process is always reachable.
fn ensure_default_admin(users: &UserStore) -> anyhow::Result<()> {
    let login = std::env::var("PRP_ADMIN_LOGIN").unwrap_or_else(|_| "admin".to_string());
    let credential =
        std::env::var("PRP_ADMIN_CREDENTIAL").unwrap_or_else(|_| "change-me-please".to_string());

    if users.get_by_login(&login).is_ok() {
        return Ok(());
    }

    let admin = users
        .create("Administrator", &login, &credential, Level::Admin)
        .map_err(|e| anyhow::anyhow!("seeding default admin: {e}"))?;
    info!(login = %admin.login, uuid = %admin.uuid, "seeded default admin");
    Ok(())
}

// --- request context -------------------------------------------------------

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        let (k, v) = pair.trim().split_once('=')?;
        if k == name {
            return Some(v.to_string());
        }
    }
    None
}

fn session_uid(headers: &HeaderMap) -> Option<Uid> {
    let raw = parse_cookie(headers, SESSION_COOKIE)?;
    Uid::parse(&raw).ok()
}

/// Rebuild the caller's authorization context from the session cookie. Any
/// failure along the way (no cookie, unparsable, expired session, deleted
/// user) degrades to the unlogged context rather than an error.
fn caller_context(state: &AppState, headers: &HeaderMap) -> Context {
    let Some(sid) = session_uid(headers) else {
        return Context::unlogged();
    };
    let Ok(session) = state.sessions.get(sid) else {
        return Context::unlogged();
    };
    match state.users.get(session.user) {
        Ok(user) => Context::logged(user.uuid, user.level),
        Err(_) => Context::unlogged(),
    }
}

fn deny(ctx: &Context) -> AppError {
    if ctx.level() == Level::Unlogged {
        AppError::unauthorized("unauthenticated", "caller is not logged in")
    } else {
        AppError::forbidden("insufficient-level", "caller's permission level does not suffice")
    }
}

fn reply_err(err: AppError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err)).into_response()
}

fn set_session_cookie(sid: Uid) -> Result<HeaderValue, AppError> {
    // The identifier renders to hex and hyphens, so this only fails if the
    // cookie template itself is broken.
    HeaderValue::try_from(format!("{SESSION_COOKIE}={sid}; HttpOnly; SameSite=Strict; Path=/"))
        .map_err(|e| AppError::internal("cookie-encoding", e.to_string()))
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static(
        "prp_session=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Strict; Path=/",
    )
}

// --- user routes -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListParams {
    offset: Option<String>,
    limit: Option<String>,
}

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    let ctx = caller_context(&state, &headers);
    if !LIST_USERS.allows(&ctx) {
        return reply_err(deny(&ctx));
    }

    let parsed = (
        params.offset.as_deref().map_or(Ok(0), str::parse::<usize>),
        params.limit.as_deref().map_or(Ok(DEFAULT_LIST_LIMIT), str::parse::<usize>),
    );
    let (Ok(offset), Ok(limit)) = parsed else {
        return reply_err(AppError::invalid("bad-offset-or-limit", "bad offset or limit params"));
    };

    Json(state.users.list(offset, limit)).into_response()
}

#[derive(Debug, Deserialize)]
struct CreateUserPayload {
    name: String,
    login: String,
    credential: String,
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateUserPayload>,
) -> Response {
    let ctx = caller_context(&state, &headers);
    if !CREATE_USER.allows(&ctx) {
        return reply_err(deny(&ctx));
    }

    // Self-registration always yields a standard user.
    match state
        .users
        .create(&payload.name, &payload.login, &payload.credential, Level::User)
    {
        Ok(entity) => (StatusCode::CREATED, Json(entity)).into_response(),
        Err(e) => reply_err(e),
    }
}

async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let uid = match Uid::parse(&id) {
        Ok(uid) => uid,
        Err(e) => return reply_err(AppError::invalid("bad-uuid", e.to_string())),
    };

    let ctx = caller_context(&state, &headers);
    if !READ_USER.allows_on(&ctx, uid) {
        return reply_err(deny(&ctx));
    }

    match state.users.get(uid) {
        Ok(entity) => Json(entity).into_response(),
        Err(e) => reply_err(e),
    }
}

async fn patch_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<UserPatch>,
) -> Response {
    let uid = match Uid::parse(&id) {
        Ok(uid) => uid,
        Err(e) => return reply_err(AppError::invalid("bad-uuid", e.to_string())),
    };

    let ctx = caller_context(&state, &headers);
    if !PATCH_USER.allows_on(&ctx, uid) {
        return reply_err(deny(&ctx));
    }

    match state.users.patch(uid, patch) {
        Ok(entity) => Json(entity).into_response(),
        Err(e) => reply_err(e),
    }
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let uid = match Uid::parse(&id) {
        Ok(uid) => uid,
        Err(e) => return reply_err(AppError::invalid("bad-uuid", e.to_string())),
    };

    let ctx = caller_context(&state, &headers);
    if !DELETE_USER.allows_on(&ctx, uid) {
        return reply_err(deny(&ctx));
    }

    match state.users.delete(uid) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => reply_err(e),
    }
}

// --- session routes --------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LoginPayload {
    login: String,
    credential: String,
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Response {
    let user = match state.users.verify_credentials(&payload.login, &payload.credential) {
        Ok(user) => user,
        Err(e) => return reply_err(e),
    };

    match state.sessions.create(user.uuid, state.session_ttl) {
        Ok(session) => {
            let cookie = match set_session_cookie(session.uuid) {
                Ok(cookie) => cookie,
                Err(e) => return reply_err(e),
            };
            let mut headers = HeaderMap::new();
            headers.insert(header::SET_COOKIE, cookie);
            (StatusCode::CREATED, headers, Json(session)).into_response()
        }
        Err(e) => {
            error!("session create failed: {e}");
            reply_err(e)
        }
    }
}

async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(sid) = session_uid(&headers) else {
        return reply_err(AppError::unauthorized("unauthenticated", "caller is not logged in"));
    };
    match state.sessions.get(sid) {
        Ok(session) => Json(session).into_response(),
        Err(e) => reply_err(e),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(sid) = session_uid(&headers) {
        state.sessions.delete(sid);
    }
    let mut h = HeaderMap::new();
    h.insert(header::SET_COOKIE, clear_session_cookie());
    (StatusCode::OK, h, Json(serde_json::json!({"status": "ok"}))).into_response()
}
