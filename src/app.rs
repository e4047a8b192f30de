use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{DefaultPolicyEvaluator, PolicyEvaluator};
use crate::config::AppConfig;
use crate::docs;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::routes::{auth, directory, health, permissions, roles, tenants, user_roles};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub event_bus: EventBus,
    pub evaluator: Arc<dyn PolicyEvaluator>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig, event_bus: EventBus) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            event_bus,
            evaluator: Arc::new(DefaultPolicyEvaluator::new()),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth::routes())
        .merge(permissions::routes())
        .merge(tenants::routes())
        .merge(roles::routes())
        .merge(user_roles::routes())
        .merge(directory::routes())
        .merge(docs::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Builds the router and starts the activity-log listener on the same pool.
pub fn create_app_with_config(pool: SqlitePool, config: AppConfig) -> Router {
    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    build_router(AppState::new(pool, config, event_bus))
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let config = AppConfig::from_env()?;
    Ok(create_app_with_config(pool, config))
}
