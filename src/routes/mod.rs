pub mod auth;
pub mod directory;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod tenants;
pub mod user_roles;
