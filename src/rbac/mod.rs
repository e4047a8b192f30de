//! Permission catalog, effective-permission aggregation and custom-role storage.

pub mod catalog;
pub mod resolver;
pub mod roles;

pub use catalog::{PermissionCatalog, PermissionDef};
pub use resolver::{effective_permissions, EffectiveGrant, RoleGrant};

use std::collections::BTreeSet;
use std::fmt;

/// An atomic `(resource, action)` capability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionKey {
    pub resource: String,
    pub action: String,
}

impl PermissionKey {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<PermissionKey>);

impl PermissionSet {
    pub fn contains(&self, resource: &str, action: &str) -> bool {
        self.0.iter().any(|k| k.resource == resource && k.action == action)
    }

    pub fn contains_key(&self, key: &PermissionKey) -> bool {
        self.0.contains(key)
    }

    pub fn insert(&mut self, key: PermissionKey) -> bool {
        self.0.insert(key)
    }

    pub fn extend(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        PermissionSet(self.0.union(&other.0).cloned().collect())
    }

    pub fn is_superset(&self, other: &PermissionSet) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionKey> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted `resource:action` strings.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl FromIterator<PermissionKey> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = PermissionKey>>(iter: I) -> Self {
        PermissionSet(iter.into_iter().collect())
    }
}

/// Permission keys named by the handlers.
pub mod required {
    use super::PermissionKey;

    pub fn organization_manage() -> PermissionKey { PermissionKey::new("organization", "manage") }
    pub fn roles_view() -> PermissionKey { PermissionKey::new("roles", "view") }
    pub fn roles_create() -> PermissionKey { PermissionKey::new("roles", "create") }
    pub fn roles_edit() -> PermissionKey { PermissionKey::new("roles", "edit") }
    pub fn roles_delete() -> PermissionKey { PermissionKey::new("roles", "delete") }
    pub fn users_view() -> PermissionKey { PermissionKey::new("users", "view") }
    pub fn users_manage_roles() -> PermissionKey { PermissionKey::new("users", "manage_roles") }
    pub fn directory_manage_requests() -> PermissionKey { PermissionKey::new("directory", "manage_requests") }
}
