//! Database repository for dishwashers.

use crate::{
    db::{
        errors::{DbError, Result},
        models::dishwashers::{Dishwasher, DishwasherCreateDBRequest, DishwasherDBResponse, DishwasherUpdateDBRequest},
    },
    dishwashers::accepts_update,
    errors::Error,
    minter::{CodeMinter, resource_url},
};
use sqlx::PgConnection;
use tracing::{debug, instrument, warn};
use url::Url;

/// How many codes [`Dishwashers::create`] asks for before giving up on a
/// collision with an existing code.
const MINT_ATTEMPTS: u32 = 3;

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The claimed clock was newer; the returned row carries the new values
    Applied(DishwasherDBResponse),
    /// The claimed clock was not newer; the stored row is returned unchanged
    Stale(DishwasherDBResponse),
}

impl UpdateOutcome {
    pub fn into_inner(self) -> DishwasherDBResponse {
        match self {
            UpdateOutcome::Applied(d) | UpdateOutcome::Stale(d) => d,
        }
    }
}

pub struct Dishwashers<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Dishwashers<'c> {
    /// Create a new Dishwashers repository instance
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a row without a code. Only meaningful inside a transaction that
    /// goes on to call [`Self::assign_code`].
    #[instrument(skip(self, request), fields(status = %request.status), err)]
    pub async fn insert(&mut self, request: &DishwasherCreateDBRequest) -> Result<DishwasherDBResponse> {
        let dishwasher = sqlx::query_as::<_, Dishwasher>(
            r#"
            INSERT INTO dishwashers (name, status, last_updated)
            VALUES ($1, $2, $3)
            RETURNING id, name, status, code, last_updated
            "#,
        )
        .bind(&request.name)
        .bind(&request.status)
        .bind(request.last_updated)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(dishwasher)
    }

    /// Write the minted code onto a row that does not have one yet.
    ///
    /// Codes are written exactly once: a row that already has a code is
    /// reported as not found.
    #[instrument(skip(self), err)]
    pub async fn assign_code(&mut self, id: i64, code: &str) -> Result<DishwasherDBResponse> {
        let dishwasher = sqlx::query_as::<_, Dishwasher>(
            r#"
            UPDATE dishwashers
            SET code = $2
            WHERE id = $1 AND code IS NULL
            RETURNING id, name, status, code, last_updated
            "#,
        )
        .bind(id)
        .bind(code)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(dishwasher)
    }

    /// Create a dishwasher and give it a public code.
    ///
    /// Inserts the row to obtain its id, asks `minter` for a code for the
    /// row's canonical URL, then stores that code. A code that is already in
    /// use is minted again, up to [`MINT_ATTEMPTS`] codes in total. Run this
    /// on a transaction:
    /// if minting fails the caller drops the transaction and no code-less row
    /// is left behind.
    #[instrument(skip_all, fields(minter = minter.name()), err)]
    pub async fn create(
        &mut self,
        request: &DishwasherCreateDBRequest,
        minter: &dyn CodeMinter,
        public_url: &Url,
    ) -> crate::errors::Result<DishwasherDBResponse> {
        let row = self.insert(request).await?;

        let url = resource_url(public_url, row.id).map_err(|e| Error::Internal {
            operation: format!("build resource URL for dishwasher {}: {e}", row.id),
        })?;

        let mut attempt = 1;
        let code = loop {
            let code = minter.mint(&url).await.map_err(|source| Error::ExternalService {
                service: minter.name().to_string(),
                source,
            })?;
            // The last attempt goes through to the unique constraint
            if attempt >= MINT_ATTEMPTS || self.get_by_code(&code).await?.is_none() {
                break code;
            }
            warn!(id = row.id, %code, attempt, "Minted code is already in use, minting again");
            attempt += 1;
        };
        debug!(id = row.id, %code, "minted dishwasher code");

        Ok(self.assign_code(row.id, &code).await?)
    }

    /// Get a dishwasher by its public code
    #[instrument(skip(self), err)]
    pub async fn get_by_code(&mut self, code: &str) -> Result<Option<DishwasherDBResponse>> {
        let dishwasher = sqlx::query_as::<_, Dishwasher>(
            r#"
            SELECT id, name, status, code, last_updated
            FROM dishwashers
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(dishwasher)
    }

    /// Fetch a dishwasher by code and lock its row until the surrounding
    /// transaction ends.
    #[instrument(skip(self), err)]
    pub async fn lock_by_code(&mut self, code: &str) -> Result<DishwasherDBResponse> {
        let dishwasher = sqlx::query_as::<_, Dishwasher>(
            r#"
            SELECT id, name, status, code, last_updated
            FROM dishwashers
            WHERE code = $1
            FOR UPDATE
            "#,
        )
        .bind(code)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(dishwasher)
    }

    /// Write `request` onto a row obtained from [`Self::lock_by_code`] if its
    /// claimed clock is newer than the stored one.
    #[instrument(skip(self, current, request), fields(id = current.id, claimed = request.last_updated), err)]
    pub async fn apply_update(
        &mut self,
        current: DishwasherDBResponse,
        request: &DishwasherUpdateDBRequest,
    ) -> Result<UpdateOutcome> {
        if !accepts_update(request.last_updated, current.last_updated) {
            debug!(
                stored = current.last_updated,
                "discarding update with a clock that is not newer than the stored one"
            );
            return Ok(UpdateOutcome::Stale(current));
        }

        let updated = sqlx::query_as::<_, Dishwasher>(
            r#"
            UPDATE dishwashers
            SET name = COALESCE($2, name),
                status = COALESCE($3, status),
                last_updated = $4
            WHERE id = $1
            RETURNING id, name, status, code, last_updated
            "#,
        )
        .bind(current.id)
        .bind(&request.name)
        .bind(&request.status)
        .bind(request.last_updated)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(UpdateOutcome::Applied(updated))
    }

    /// Apply an update if its claimed clock is newer than the stored one.
    ///
    /// The row is locked with `FOR UPDATE` before the comparison, so run this
    /// on a transaction to keep concurrent updates from both passing the check
    /// against the same stale read.
    pub async fn update(&mut self, code: &str, request: &DishwasherUpdateDBRequest) -> Result<UpdateOutcome> {
        let current = self.lock_by_code(code).await?;
        self.apply_update(current, request).await
    }

    /// Delete a dishwasher, returning its final snapshot
    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, code: &str) -> Result<DishwasherDBResponse> {
        let dishwasher = sqlx::query_as::<_, Dishwasher>(
            r#"
            DELETE FROM dishwashers
            WHERE code = $1
            RETURNING id, name, status, code, last_updated
            "#,
        )
        .bind(code)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(dishwasher)
    }

    /// Remove rows that never received a code. They cannot be reached through
    /// the HTTP surface.
    #[instrument(skip(self), err)]
    pub async fn purge_uncoded(&mut self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dishwashers WHERE code IS NULL")
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
