pub mod directory;
pub mod organization;
pub mod rbac;
pub mod user;

use serde::{Deserialize, Deserializer};

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in partial-update payloads.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
