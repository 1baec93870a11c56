use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use lockbox_core::auth::{MIN_PASSWORD_CHARS, MIN_USERNAME_CHARS};
use lockbox_core::LockBox;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{
    extract_bearer_token, hash_password, verify_password, verify_unknown_user, AuthenticatedUser,
    IssuedToken, JwtIssuer,
};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{LoginRateLimiter, RateLimitMetricsSnapshot};
use crate::store::ServerStore;

const MAX_USERNAME_LEN: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: ServerStore,
    jwt: Arc<JwtIssuer>,
    login_rate_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: ServerStore) -> Self {
        Self {
            jwt: Arc::new(JwtIssuer::new(&config.jwt_secret, config.token_ttl)),
            login_rate_limiter: Arc::new(LoginRateLimiter::from_config(config.as_ref())),
            store,
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/lock_boxes/", get(list_lock_boxes).put(update_lock_box))
        .route("/lock_boxes/create", post(create_lock_box))
        .route("/lock_boxes/create/update", post(upsert_lock_box))
        .route(
            "/lock_boxes/{name}",
            get(get_lock_box).delete(delete_lock_box),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api_routes = Router::new()
        .route("/users/", post(register))
        .route("/auth/login", post(login))
        .merge(protected_routes);

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.login_rate_limiter.metrics_snapshot(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt.verify(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    user_id: String,
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let username = validate_username(&request.username)?;
    if request.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }

    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|error| AppError::internal(format!("Password hashing task failed: {error}")))??;

    let user_id = state.store.create_user(username, &password_hash).await?;
    let user_id = user_id.to_string();
    tracing::info!(
        endpoint = "register",
        user = user_fingerprint(&user_id),
        "Registered user"
    );
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<IssuedToken>, AppError> {
    let username = validate_username(&request.username)?;
    state.login_rate_limiter.check(username).await?;

    let user = state.store.find_user(username).await?;
    let password = request.password;
    let verified = tokio::task::spawn_blocking(move || match user {
        Some(user) => verify_password(&password, &user.password_hash).then_some(user),
        None => {
            verify_unknown_user(&password);
            None
        }
    })
    .await
    .map_err(|error| AppError::internal(format!("Password verification task failed: {error}")))?;
    let user = verified.ok_or_else(|| AppError::unauthorized("invalid username or password"))?;

    let token = state.jwt.issue(&user.id.to_string())?;
    tracing::info!(
        endpoint = "login",
        user = user_fingerprint(&token.user_id),
        expires_at = token.expires_at,
        "Issued access token"
    );
    Ok(Json(token))
}

#[derive(Debug, Serialize)]
struct IdResponse {
    id: i64,
}

async fn create_lock_box(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(record): Json<LockBox>,
) -> Result<(StatusCode, Json<IdResponse>), AppError> {
    let id = state.store.create(&user.user_id, &record).await?;
    tracing::info!(
        endpoint = "lock_boxes_create",
        user = user_fingerprint(&user.user_id),
        id,
        "Created lock box"
    );
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

async fn upsert_lock_box(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(record): Json<LockBox>,
) -> Result<Json<IdResponse>, AppError> {
    let id = state.store.upsert(&user.user_id, &record).await?;
    tracing::debug!(
        endpoint = "lock_boxes_upsert",
        user = user_fingerprint(&user.user_id),
        id,
        "Upserted lock box"
    );
    Ok(Json(IdResponse { id }))
}

async fn get_lock_box(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(name): Path<String>,
) -> Result<Json<LockBox>, AppError> {
    state
        .store
        .get(&user.user_id, &name)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(name))
}

async fn list_lock_boxes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<LockBox>>, AppError> {
    Ok(Json(state.store.list(&user.user_id).await?))
}

async fn update_lock_box(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(record): Json<LockBox>,
) -> Result<StatusCode, AppError> {
    if state.store.update(&user.user_id, &record).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(record.name))
    }
}

async fn delete_lock_box(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.store.delete(&user.user_id, &name).await? {
        tracing::info!(
            endpoint = "lock_boxes_delete",
            user = user_fingerprint(&user.user_id),
            "Deleted lock box"
        );
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(name))
    }
}

fn validate_username(username: &str) -> Result<&str, AppError> {
    let username = username.trim();
    if username.chars().count() < MIN_USERNAME_CHARS {
        return Err(AppError::bad_request(format!(
            "username must be at least {MIN_USERNAME_CHARS} characters"
        )));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::bad_request(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(username)
}

/// Stable hash of a user id so logs never carry the raw identifier.
pub fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}
