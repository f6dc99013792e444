//! HTTP handlers for dishwasher endpoints.
//!
//! Request bodies are taken as raw bytes and decoded with
//! [`parse_body`](crate::dishwashers::parse_body) so that every malformed body
//! is answered with a `400` carrying a JSON string, whatever content type the
//! client sent.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use bytes::Bytes;
use tracing::{info, instrument};

use crate::{
    AppState,
    api::models::dishwashers::{DishwasherFields, DishwasherResponse},
    db::handlers::{Dishwashers, UpdateOutcome},
    dishwashers::{now, parse_body, sanitize_create_fields, sanitize_update_fields},
    errors::{Error, Result},
};

/// Get a dishwasher by its code.
#[utoipa::path(
    get,
    path = "/dishwashers/{code}",
    tag = "dishwashers",
    summary = "Get dishwasher",
    params(
        ("code" = String, Path, description = "Public dishwasher code"),
    ),
    responses(
        (status = 200, description = "Dishwasher", body = DishwasherResponse),
        (status = 404, description = "No dishwasher has this code", body = String),
        (status = 500, description = "Internal server error", body = String),
    ),
)]
#[instrument(skip_all, fields(code = %code), err)]
pub async fn get_dishwasher(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<DishwasherResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Dishwashers::new(&mut conn);

    match repo.get_by_code(&code).await? {
        Some(dishwasher) => Ok(Json(dishwasher.into())),
        None => Err(Error::not_found(code)),
    }
}

/// Create a dishwasher and mint its public code.
#[utoipa::path(
    post,
    path = "/dishwashers",
    tag = "dishwashers",
    summary = "Create dishwasher",
    description = "Creates a dishwasher. `status` defaults to `dirty` and `last_updated` to the current time. \
                   Any `code` or `id` in the body is ignored; the code is minted by the server.",
    request_body(content = DishwasherFields, description = "Initial fields, all optional", content_type = "application/json"),
    responses(
        (status = 201, description = "Dishwasher created", body = DishwasherResponse),
        (status = 400, description = "Malformed body or duplicate code", body = String),
        (status = 502, description = "The code minting service failed", body = String),
        (status = 500, description = "Internal server error", body = String),
    ),
)]
#[instrument(skip_all, err)]
pub async fn create_dishwasher(State(state): State<AppState>, body: Bytes) -> Result<(StatusCode, Json<DishwasherResponse>)> {
    let request = sanitize_create_fields(parse_body(&body)?, now());

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Dishwashers::new(&mut tx);

    // Dropping the transaction on error discards the code-less row
    let dishwasher = repo.create(&request, state.minter.as_ref(), &state.config.public_url).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(id = dishwasher.id, code = ?dishwasher.code, "Created dishwasher");
    Ok((StatusCode::CREATED, Json(dishwasher.into())))
}

/// Update a dishwasher, last writer (by logical clock) wins.
#[utoipa::path(
    post,
    path = "/dishwashers/update/{code}",
    tag = "dishwashers",
    summary = "Update dishwasher",
    description = "Applies `name` and `status` only if `last_updated` is strictly greater than the stored value. \
                   Otherwise the change is discarded and the stored dishwasher is returned unchanged.",
    params(
        ("code" = String, Path, description = "Public dishwasher code"),
    ),
    request_body(content = DishwasherFields, description = "Fields to change and the claimed clock", content_type = "application/json"),
    responses(
        (status = 200, description = "Dishwasher after the update (unchanged if the write was stale)", body = DishwasherResponse),
        (status = 400, description = "Malformed body", body = String),
        (status = 404, description = "No dishwasher has this code", body = String),
        (status = 500, description = "Internal server error", body = String),
    ),
)]
#[instrument(skip_all, fields(code = %code), err)]
pub async fn update_dishwasher(State(state): State<AppState>, Path(code): Path<String>, body: Bytes) -> Result<Json<DishwasherResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Dishwashers::new(&mut tx);

    // An unknown code is a 404 even when the body is malformed
    let current = repo.lock_by_code(&code).await?;
    let (fields, claimed) = sanitize_update_fields(parse_body(&body)?);
    let request = fields.into_db_request(claimed);

    let outcome = repo.apply_update(current, &request).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    if let UpdateOutcome::Stale(current) = &outcome {
        info!(claimed, stored = current.last_updated, "Discarded stale update");
    }

    Ok(Json(outcome.into_inner().into()))
}

/// Delete a dishwasher.
#[utoipa::path(
    delete,
    path = "/dishwashers/{code}",
    tag = "dishwashers",
    summary = "Delete dishwasher",
    params(
        ("code" = String, Path, description = "Public dishwasher code"),
    ),
    responses(
        (status = 200, description = "The deleted dishwasher's final state", body = DishwasherResponse),
        (status = 404, description = "No dishwasher has this code", body = String),
        (status = 500, description = "Internal server error", body = String),
    ),
)]
#[instrument(skip_all, fields(code = %code), err)]
pub async fn delete_dishwasher(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<DishwasherResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Dishwashers::new(&mut conn);

    let deleted = repo.delete(&code).await?;
    info!(id = deleted.id, "Deleted dishwasher");

    Ok(Json(deleted.into()))
}

/// Delete a dishwasher, for clients that cannot send `DELETE`.
#[utoipa::path(
    post,
    path = "/dishwashers/delete/{code}",
    tag = "dishwashers",
    summary = "Delete dishwasher (POST)",
    params(
        ("code" = String, Path, description = "Public dishwasher code"),
    ),
    responses(
        (status = 200, description = "The deleted dishwasher's final state", body = DishwasherResponse),
        (status = 404, description = "No dishwasher has this code", body = String),
        (status = 500, description = "Internal server error", body = String),
    ),
)]
pub async fn delete_dishwasher_via_post(state: State<AppState>, code: Path<String>) -> Result<Json<DishwasherResponse>> {
    delete_dishwasher(state, code).await
}
