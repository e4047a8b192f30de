use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::{PermissionKey, PermissionSet};
use crate::models::user::BuiltInRole;

/// One immutable catalog entry. Seeded into the `permissions` table by the
/// `seed_permissions` migration; the two lists must stay identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionDef {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub resource: &'static str,
    pub action: &'static str,
}

impl PermissionDef {
    const fn new(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        category: &'static str,
        resource: &'static str,
        action: &'static str,
    ) -> Self {
        Self { id, name, description, category, resource, action }
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.resource, self.action)
    }
}

const DEFINITIONS: &[PermissionDef] = &[
    PermissionDef::new("perm_user_view", "View Users", "View user profiles and information", "User Management", "users", "view"),
    PermissionDef::new("perm_user_create", "Create Users", "Add new users to the organization", "User Management", "users", "create"),
    PermissionDef::new("perm_user_edit", "Edit Users", "Modify user profiles and settings", "User Management", "users", "edit"),
    PermissionDef::new("perm_user_delete", "Delete Users", "Remove users and their dependent records", "User Management", "users", "delete"),
    PermissionDef::new("perm_user_manage_roles", "Manage User Roles", "Assign and revoke custom roles", "User Management", "users", "manage_roles"),
    PermissionDef::new("perm_document_view", "View Documents", "View community documents", "Document Management", "documents", "view"),
    PermissionDef::new("perm_document_upload", "Upload Documents", "Upload new documents", "Document Management", "documents", "upload"),
    PermissionDef::new("perm_document_edit", "Edit Documents", "Modify document details", "Document Management", "documents", "edit"),
    PermissionDef::new("perm_document_delete", "Delete Documents", "Remove documents", "Document Management", "documents", "delete"),
    PermissionDef::new("perm_document_manage_folders", "Manage Folders", "Create, reorganize and remove document folders", "Document Management", "documents", "manage_folders"),
    PermissionDef::new("perm_directory_view", "View Directory", "View resident directory", "Directory Management", "directory", "view"),
    PermissionDef::new("perm_directory_edit", "Edit Directory", "Modify directory entries", "Directory Management", "directory", "edit"),
    PermissionDef::new("perm_directory_export", "Export Directory", "Export directory data", "Directory Management", "directory", "export"),
    PermissionDef::new("perm_directory_manage_requests", "Manage Update Requests", "Approve or reject directory update requests", "Directory Management", "directory", "manage_requests"),
    PermissionDef::new("perm_payment_view", "View Payments", "View payment records", "Financial Management", "payments", "view"),
    PermissionDef::new("perm_payment_create", "Create Payments", "Record new payments", "Financial Management", "payments", "create"),
    PermissionDef::new("perm_payment_edit", "Edit Payments", "Modify payment records", "Financial Management", "payments", "edit"),
    PermissionDef::new("perm_budget_view", "View Budget", "View budget information", "Financial Management", "budget", "view"),
    PermissionDef::new("perm_budget_edit", "Edit Budget", "Modify budget data", "Financial Management", "budget", "edit"),
    PermissionDef::new("perm_message_send", "Send Messages", "Send messages to residents", "Communication", "messages", "send"),
    PermissionDef::new("perm_message_broadcast", "Broadcast Messages", "Send announcements to everyone", "Communication", "messages", "broadcast"),
    PermissionDef::new("perm_announcement_create", "Create Announcements", "Post announcements", "Communication", "announcements", "create"),
    PermissionDef::new("perm_announcement_edit", "Edit Announcements", "Modify announcements", "Communication", "announcements", "edit"),
    PermissionDef::new("perm_announcement_delete", "Delete Announcements", "Remove announcements", "Communication", "announcements", "delete"),
    PermissionDef::new("perm_settings_view", "View Settings", "View organization settings", "System Administration", "settings", "view"),
    PermissionDef::new("perm_settings_edit", "Edit Settings", "Modify organization settings", "System Administration", "settings", "edit"),
    PermissionDef::new("perm_role_view", "View Roles", "View role definitions", "System Administration", "roles", "view"),
    PermissionDef::new("perm_role_create", "Create Roles", "Create custom roles", "System Administration", "roles", "create"),
    PermissionDef::new("perm_role_edit", "Edit Roles", "Modify custom roles and their permissions", "System Administration", "roles", "edit"),
    PermissionDef::new("perm_role_delete", "Delete Roles", "Remove custom roles", "System Administration", "roles", "delete"),
    PermissionDef::new("perm_org_manage", "Manage Organization", "Manage tenant domains and organization configuration", "System Administration", "organization", "manage"),
    PermissionDef::new("perm_task_view", "View Tasks", "View tasks and assignments", "Tasks & Calendar", "tasks", "view"),
    PermissionDef::new("perm_task_create", "Create Tasks", "Create new tasks", "Tasks & Calendar", "tasks", "create"),
    PermissionDef::new("perm_task_edit", "Edit Tasks", "Modify task details", "Tasks & Calendar", "tasks", "edit"),
    PermissionDef::new("perm_task_delete", "Delete Tasks", "Remove tasks", "Tasks & Calendar", "tasks", "delete"),
    PermissionDef::new("perm_calendar_view", "View Calendar", "View community calendar", "Tasks & Calendar", "calendar", "view"),
    PermissionDef::new("perm_calendar_create", "Create Events", "Create calendar events", "Tasks & Calendar", "calendar", "create"),
    PermissionDef::new("perm_calendar_edit", "Edit Events", "Modify calendar events", "Tasks & Calendar", "calendar", "edit"),
    PermissionDef::new("perm_calendar_delete", "Delete Events", "Remove calendar events", "Tasks & Calendar", "calendar", "delete"),
    PermissionDef::new("perm_committee_view", "View Committees", "View committee information", "Committees", "committees", "view"),
    PermissionDef::new("perm_committee_create", "Create Committees", "Create new committees", "Committees", "committees", "create"),
    PermissionDef::new("perm_committee_edit", "Edit Committees", "Modify committee details", "Committees", "committees", "edit"),
    PermissionDef::new("perm_committee_delete", "Delete Committees", "Remove committees and their memberships", "Committees", "committees", "delete"),
];

const USER_GRANTS: &[(&str, &str)] = &[
    ("directory", "view"),
    ("documents", "view"),
    ("calendar", "view"),
    ("tasks", "view"),
    ("committees", "view"),
    ("messages", "send"),
];

const ADMIN_GRANTS: &[(&str, &str)] = &[
    ("users", "view"),
    ("users", "create"),
    ("users", "edit"),
    ("documents", "upload"),
    ("documents", "edit"),
    ("documents", "delete"),
    ("directory", "edit"),
    ("directory", "export"),
    ("directory", "manage_requests"),
    ("payments", "view"),
    ("payments", "create"),
    ("payments", "edit"),
    ("budget", "view"),
    ("budget", "edit"),
    ("messages", "broadcast"),
    ("announcements", "create"),
    ("announcements", "edit"),
    ("announcements", "delete"),
    ("settings", "view"),
    ("tasks", "create"),
    ("tasks", "edit"),
    ("tasks", "delete"),
    ("calendar", "create"),
    ("calendar", "edit"),
    ("calendar", "delete"),
    ("committees", "create"),
    ("committees", "edit"),
    ("roles", "view"),
];

/// Role management, tenant configuration and deletion-with-dependents. Only
/// reachable through an explicit custom role (or SUPER_ADMIN).
pub const CUSTOM_ROLE_ONLY: &[(&str, &str)] = &[
    ("roles", "create"),
    ("roles", "edit"),
    ("roles", "delete"),
    ("users", "manage_roles"),
    ("organization", "manage"),
    ("settings", "edit"),
    ("users", "delete"),
    ("committees", "delete"),
    ("documents", "manage_folders"),
];

/// Process-wide, read-only permission registry keyed by permission id.
#[derive(Debug)]
pub struct PermissionCatalog {
    by_id: BTreeMap<&'static str, PermissionDef>,
    universe: PermissionSet,
    user: PermissionSet,
    admin: PermissionSet,
}

static CATALOG: OnceLock<PermissionCatalog> = OnceLock::new();

impl PermissionCatalog {
    pub fn global() -> &'static PermissionCatalog {
        CATALOG.get_or_init(Self::build)
    }

    fn build() -> Self {
        let by_id = DEFINITIONS.iter().map(|def| (def.id, *def)).collect();
        let universe = DEFINITIONS.iter().map(PermissionDef::key).collect();
        let user: PermissionSet = USER_GRANTS
            .iter()
            .map(|(resource, action)| PermissionKey::new(*resource, *action))
            .collect();
        let admin_only: PermissionSet = ADMIN_GRANTS
            .iter()
            .map(|(resource, action)| PermissionKey::new(*resource, *action))
            .collect();
        let admin = user.union(&admin_only);

        Self { by_id, universe, user, admin }
    }

    pub fn get(&self, id: &str) -> Option<&PermissionDef> {
        self.by_id.get(id)
    }

    pub fn find(&self, resource: &str, action: &str) -> Option<&PermissionDef> {
        self.by_id
            .values()
            .find(|def| def.resource == resource && def.action == action)
    }

    pub fn all(&self) -> impl Iterator<Item = &PermissionDef> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Every permission known to the platform.
    pub fn universe(&self) -> &PermissionSet {
        &self.universe
    }

    /// Fixed grant of a built-in role. SUPER_ADMIN maps to the universe.
    pub fn built_in(&self, role: BuiltInRole) -> &PermissionSet {
        match role {
            BuiltInRole::SuperAdmin => &self.universe,
            BuiltInRole::Admin => &self.admin,
            BuiltInRole::User => &self.user,
        }
    }

    /// Catalog entries grouped by category, categories and entries sorted by id.
    pub fn by_category(&self) -> BTreeMap<&'static str, Vec<&PermissionDef>> {
        let mut grouped: BTreeMap<&'static str, Vec<&PermissionDef>> = BTreeMap::new();
        for def in self.by_id.values() {
            grouped.entry(def.category).or_default().push(def);
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_and_keys_are_unique() {
        let catalog = PermissionCatalog::global();
        assert_eq!(catalog.len(), DEFINITIONS.len());
        let keys: HashSet<_> = DEFINITIONS.iter().map(PermissionDef::key).collect();
        assert_eq!(keys.len(), DEFINITIONS.len());
    }

    #[test]
    fn built_in_grants_exist_in_catalog() {
        let catalog = PermissionCatalog::global();
        for (resource, action) in USER_GRANTS.iter().chain(ADMIN_GRANTS).chain(CUSTOM_ROLE_ONLY) {
            assert!(catalog.find(resource, action).is_some(), "{resource}:{action} missing");
        }
    }

    #[test]
    fn built_in_roles_never_hold_custom_role_only_actions() {
        let catalog = PermissionCatalog::global();
        for role in [BuiltInRole::User, BuiltInRole::Admin] {
            for (resource, action) in CUSTOM_ROLE_ONLY {
                assert!(
                    !catalog.built_in(role).contains(resource, action),
                    "{role} must not hold {resource}:{action}"
                );
            }
        }
    }

    #[test]
    fn admin_extends_user_and_super_admin_is_universe() {
        let catalog = PermissionCatalog::global();
        let user = catalog.built_in(BuiltInRole::User);
        let admin = catalog.built_in(BuiltInRole::Admin);
        assert!(user.iter().all(|key| admin.contains_key(key)));
        assert!(admin.contains("directory", "manage_requests"));
        assert!(!user.contains("directory", "manage_requests"));
        assert_eq!(catalog.built_in(BuiltInRole::SuperAdmin), catalog.universe());
    }

    #[test]
    fn categories_cover_every_entry() {
        let catalog = PermissionCatalog::global();
        let grouped = catalog.by_category();
        assert_eq!(grouped.values().map(Vec::len).sum::<usize>(), catalog.len());
        assert!(grouped.contains_key("Financial Management"));
    }

    #[test]
    fn migration_seed_matches_catalog() {
        let seed = include_str!("../../migrations/20250301000200_seed_permissions.sql");
        for def in PermissionCatalog::global().all() {
            let row = format!("('{}', ", def.id);
            assert!(seed.contains(&row), "{} missing from seed migration", def.id);
            assert!(seed.contains(&format!("'{}', '{}')", def.resource, def.action)));
        }
        assert_eq!(seed.matches("('perm_").count(), DEFINITIONS.len());
    }
}
