//! Database models for dishwashers.

use serde::{Deserialize, Serialize};

/// Database representation of a dishwasher
///
/// `code` is only `None` inside the creation transaction, between the initial
/// insert and the write of the minted code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dishwasher {
    pub id: i64,
    pub name: Option<String>,
    pub status: String,
    pub code: Option<String>,
    pub last_updated: i64,
}

/// Request to insert a new dishwasher (defaults already applied)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishwasherCreateDBRequest {
    pub name: Option<String>,
    pub status: String,
    pub last_updated: i64,
}

/// Request to update an existing dishwasher
///
/// `None` fields are left untouched. `last_updated` is the claimed logical
/// clock and is written whenever the update is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishwasherUpdateDBRequest {
    pub name: Option<String>,
    pub status: Option<String>,
    pub last_updated: i64,
}

/// Response from database after creating, updating or deleting a dishwasher
pub type DishwasherDBResponse = Dishwasher;
