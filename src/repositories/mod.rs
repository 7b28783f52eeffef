//! Repository layer over the SeaORM entities.
//!
//! Every write is a single-row insert/upsert/update scoped by project id,
//! so the orchestration core needs no cross-project locking. Synced issue
//! rows are written by the page-fetch activity inside its own transaction.

pub mod project;
pub mod sync_job;
pub mod sync_log;
pub mod sync_state;

use sea_orm::{DbErr, RuntimeErr};

/// Whether the error is a unique-constraint violation, across the backends
/// we run against (Postgres in production, sqlite in tests).
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match err {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .map(|code| code.as_ref() == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_ref()))
        .unwrap_or(false)
}
