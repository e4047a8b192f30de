use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::authz::Principal;

pub mod loggable;
pub use loggable::{Loggable, Severity};

pub type EventBus = broadcast::Sender<ActivityEvent>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<ActivityEvent>) {
    broadcast::channel(1024)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    /// `<entity_type>.<action>`, e.g. `custom_role.deleted`.
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Uuid,
    pub subject_id: Uuid,
    pub organization_id: Option<Uuid>,
    /// Set when a SUPER_ADMIN acts on an organization other than its own.
    pub cross_tenant: bool,
    pub severity: Severity,
    pub payload: ActivityPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    #[serde(rename = "new")]
    pub current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
}

pub fn log_activity<T: Loggable>(bus: &EventBus, action: &str, actor: &Principal, entity: &T) {
    log_activity_with_previous(bus, action, actor, entity, None);
}

/// Publishes an activity event. Fire and forget: a missing listener or a
/// serialization failure never fails the request that triggered it.
pub fn log_activity_with_previous<T: Loggable>(
    bus: &EventBus,
    action: &str,
    actor: &Principal,
    entity: &T,
    old_entity: Option<&T>,
) {
    let organization_id = entity.organization_id();
    let cross_tenant = match organization_id {
        Some(org) => actor.organization_id != Some(org),
        None => false,
    };

    if cross_tenant {
        tracing::info!(
            actor_id = %actor.user_id,
            organization_id = ?organization_id,
            event = %format!("{}.{}", T::entity_type(), action),
            "cross-tenant action by super admin"
        );
    }

    let event = ActivityEvent {
        id: Uuid::new_v4(),
        name: format!("{}.{}", T::entity_type(), action),
        occurred_at: Utc::now(),
        actor_id: actor.user_id,
        subject_id: entity.subject_id(),
        organization_id,
        cross_tenant,
        severity: entity.severity_for_action(action),
        payload: ActivityPayload {
            current: serde_json::to_value(entity).unwrap_or_default(),
            old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        },
    };

    let _ = bus.send(event);
}

/// Links an event to its predecessor: `sha256(prev_hash || payload)`.
pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<ActivityEvent>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged, events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if let Err(e) = persist_event(&pool, &event).await {
            tracing::error!(event = %event.name, "failed to save activity log: {}", e);
        }
    }
    tracing::info!("activity listener stopped");
}

async fn persist_event(pool: &SqlitePool, event: &ActivityEvent) -> Result<(), sqlx::Error> {
    let payload = serde_json::to_string(&event.payload).unwrap_or_default();

    let prev_hash: Option<String> = sqlx::query_scalar(
        "SELECT hash FROM activity_log ORDER BY created_at DESC, rowid DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    let hash = chain_hash(prev_hash.as_deref(), &payload);

    sqlx::query(
        r#"
        INSERT INTO activity_log (id, event_name, actor_id, subject_id, organization_id, cross_tenant, severity, occurred_at, payload, prev_hash, hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(&event.name)
    .bind(event.actor_id.to_string())
    .bind(event.subject_id.to_string())
    .bind(event.organization_id.map(|id| id.to_string()))
    .bind(event.cross_tenant)
    .bind(event.severity.as_str())
    .bind(event.occurred_at)
    .bind(&payload)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(pool)
    .await?;

    Ok(())
}
