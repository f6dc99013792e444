//! Database layer.
//!
//! - [`models`]: row shapes and repository request structs
//! - [`handlers`]: repositories that run queries over a borrowed connection
//! - [`errors`]: [`errors::DbError`] and the mapping from `sqlx::Error`
//!
//! Repositories borrow a `&mut PgConnection`, so a caller decides whether a
//! sequence of calls runs inside one transaction:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut repo = Dishwashers::new(&mut tx);
//! let dishwasher = repo.get_by_code("ab12xy").await?;
//! tx.commit().await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
