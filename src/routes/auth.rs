use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::app::AppState;
use crate::db::users::{fetch_user_by_email, fetch_user_by_id};
use crate::errors::{AppError, AppResult};
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::user::{AuthResponse, LoginRequest, User};
use crate::utils::verify_password;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = fetch_user_by_email(&state.pool, &payload.email)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.config.jwt.encode(db_user.id)?;
    tracing::info!(user_id = %db_user.id, "user logged in");

    Ok(Json(AuthResponse { token, user: db_user.into() }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let db_user = fetch_user_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;
    Ok(Json(db_user.into()))
}
