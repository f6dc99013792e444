//! Dishwasher field rules: what a client may set, and when a write wins.
//!
//! Clients send loosely-typed JSON objects. Everything in here turns those
//! objects into typed requests for the repository in
//! [`crate::db::handlers::Dishwashers`]:
//!
//! - `code` and `id` are server-owned and always dropped.
//! - `name` and `status` are only kept when they are non-blank strings.
//! - `last_updated` is a client-supplied logical clock. Absent or invalid
//!   values read as `0` (see [`parse_timestamp`]).
//!
//! Updates follow last-writer-wins on that logical clock: an update is applied
//! only if its claimed timestamp is strictly greater than the stored one. The
//! server never clamps the claimed value, so a client with a clock far in the
//! future can lock a record against further updates.

use crate::db::models::dishwashers::{DishwasherCreateDBRequest, DishwasherUpdateDBRequest};
use crate::errors::{Error, Result};
use serde_json::{Map, Value};

/// Status given to dishwashers created without one
pub const DEFAULT_STATUS: &str = "dirty";

/// Fields of an update request that survived sanitizing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateFields {
    pub name: Option<String>,
    pub status: Option<String>,
}

impl UpdateFields {
    /// Attach the claimed logical clock, producing the repository request.
    pub fn into_db_request(self, claimed_timestamp: i64) -> DishwasherUpdateDBRequest {
        DishwasherUpdateDBRequest {
            name: self.name,
            status: self.status,
            last_updated: claimed_timestamp,
        }
    }
}

/// Current wall-clock time in unix seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Parse a client-supplied `last_updated` value.
///
/// Absent or invalid ⇒ `0`. Integers are taken as-is, floats are truncated,
/// strings are read up to the first non-digit (`"42abc"` is `42`). Negative
/// results collapse to `0`.
pub fn parse_timestamp(value: Option<&Value>) -> i64 {
    let parsed = match value {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i
            } else if n.as_u64().is_some() {
                i64::MAX
            } else {
                // `as` saturates on overflow
                n.as_f64().map(|f| f.trunc() as i64).unwrap_or(0)
            }
        }
        Some(Value::String(s)) => leading_integer(s),
        _ => 0,
    };
    parsed.max(0)
}

fn leading_integer(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.chars().next() {
        Some('-') => (true, &s[1..]),
        Some('+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for d in digits.chars().map_while(|c| c.to_digit(10)) {
        value = value.saturating_mul(10).saturating_add(i64::from(d));
    }

    if negative { -value } else { value }
}

fn non_blank_string(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// Filter an update body down to the fields a client may change.
///
/// Returns the surviving fields and the claimed timestamp. Never fails:
/// anything unusable is dropped.
pub fn sanitize_update_fields(mut raw: Map<String, Value>) -> (UpdateFields, i64) {
    raw.remove("code");
    raw.remove("id");

    let claimed = parse_timestamp(raw.get("last_updated"));
    let fields = UpdateFields {
        name: non_blank_string(raw.remove("name")),
        status: non_blank_string(raw.remove("status")),
    };

    (fields, claimed)
}

/// Filter a create body, applying the creation defaults.
///
/// `status` falls back to [`DEFAULT_STATUS`] and `last_updated` to `now` when
/// the client did not send a usable value.
pub fn sanitize_create_fields(raw: Map<String, Value>, now: i64) -> DishwasherCreateDBRequest {
    let (fields, claimed) = sanitize_update_fields(raw);

    DishwasherCreateDBRequest {
        name: fields.name,
        status: fields.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        last_updated: if claimed > 0 { claimed } else { now },
    }
}

/// Last-writer-wins: a write is accepted only if its clock is strictly newer.
pub fn accepts_update(claimed: i64, stored: i64) -> bool {
    claimed > stored
}

/// Decode a request body as a JSON object.
///
/// An empty body reads as `{}`. Anything that is not a JSON object is a
/// [`Error::BadRequest`] carrying the parser's message.
pub fn parse_body(body: &[u8]) -> Result<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::BadRequest {
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(Error::BadRequest { message: e.to_string() }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
