//! API request and response models for dishwasher endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::dishwashers::Dishwasher;

/// Fields a client may send when creating or updating a dishwasher.
///
/// Bodies are decoded leniently: unknown fields, `code` and `id` are dropped,
/// blank or non-string `name`/`status` are ignored, and an unusable
/// `last_updated` counts as `0`. This type only documents the accepted shape.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct DishwasherFields {
    /// Free-text label
    #[serde(default)]
    pub name: Option<String>,
    /// Usually `"clean"` or `"dirty"`; defaults to `"dirty"` on create
    #[serde(default)]
    pub status: Option<String>,
    /// Client logical clock in unix seconds. An update only applies if this
    /// is strictly greater than the stored value.
    #[serde(default)]
    pub last_updated: Option<i64>,
}

/// A dishwasher as returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DishwasherResponse {
    pub id: i64,
    pub name: Option<String>,
    pub status: String,
    /// Public short code, used as the key in every URL
    pub code: String,
    /// Logical clock of the last applied write (unix seconds)
    pub last_updated: i64,
}

impl From<Dishwasher> for DishwasherResponse {
    fn from(db: Dishwasher) -> Self {
        Self {
            id: db.id,
            name: db.name,
            status: db.status,
            // Rows only leave the creation transaction with a code
            code: db.code.unwrap_or_default(),
            last_updated: db.last_updated,
        }
    }
}
