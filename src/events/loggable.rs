use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for activity logs.
/// Controls retention policies and log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical events: long-term retention, never auto-delete
    Critical,
    /// Important events: medium-term retention (default)
    #[default]
    Important,
    /// Noise events: aggressively trimmed
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Trait for entities that can be logged in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of the event name, e.g. `custom_role` in `custom_role.created`.
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    /// Tenant the entity belongs to.
    fn organization_id(&self) -> Option<Uuid>;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" => Severity::Critical,
            "created" | "updated" => self.severity(),
            _ => Severity::Important,
        }
    }
}
