//! Embedded schema migrations.
//!
//! Users, tokens and permissions live in `greenlight_core/migrations/`; the
//! server applies any pending ones at startup.

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};

/// Migrations compiled into the binary, in version order.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply every pending migration.
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
