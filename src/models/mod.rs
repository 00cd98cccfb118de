//! Domain model module declarations.

use serde::{Deserialize, Deserializer};

pub mod conversation;
pub mod task;

/// Deserialize a nullable field so that an explicit `null` becomes
/// `Some(None)` while an absent field (via `#[serde(default)]`) stays `None`.
pub(crate) fn double_option<'de, T, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
