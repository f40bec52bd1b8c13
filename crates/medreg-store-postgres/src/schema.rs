//! Schema bootstrap for the registry tables.
//!
//! The schema is fixed (three tables and their indexes), so startup runs a
//! short list of idempotent DDL statements instead of a migration tool.

use sqlx_core::query::query;
use sqlx_postgres::PgPool;
use tracing::{debug, instrument};

use crate::error::{PostgresError, Result};

/// Idempotent DDL, executed in order on startup.
///
/// The username constraint is named explicitly so conflict mapping can key
/// on it.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS hospitals (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        sequence INTEGER NOT NULL DEFAULT 0,
        address TEXT,
        phone TEXT,
        contact_name TEXT,
        contact_phone TEXT,
        latitude TEXT,
        longitude TEXT,
        picture TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS wards (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        sequence INTEGER NOT NULL DEFAULT 0,
        kind TEXT NOT NULL DEFAULT 'STANDARD',
        hospital_id TEXT NOT NULL REFERENCES hospitals(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        role TEXT NOT NULL DEFAULT 'USER',
        display_name TEXT,
        picture TEXT,
        note TEXT,
        created_by TEXT,
        ward_id TEXT NOT NULL REFERENCES wards(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT users_username_key UNIQUE (username)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_hospitals_sequence ON hospitals(sequence)",
    "CREATE INDEX IF NOT EXISTS idx_wards_hospital_id ON wards(hospital_id)",
    "CREATE INDEX IF NOT EXISTS idx_wards_sequence ON wards(sequence)",
    "CREATE INDEX IF NOT EXISTS idx_users_ward_id ON users(ward_id)",
];

/// Creates the registry tables and indexes if they do not exist yet.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        query(statement)
            .execute(pool)
            .await
            .map_err(|e| PostgresError::schema(e.to_string()))?;
    }
    debug!("Registry schema ensured");
    Ok(())
}
