use sqlx::migrate::{MigrateError, Migrator};
use tracing::info;

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaReadiness {
    AlreadyProvisioned,
    Provisioned,
}

/// Whether the installation table exists; used by operator readiness checks.
pub async fn install_store_provisioned(pool: &DbPool) -> Result<bool, sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'slack_installation'",
    )
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Startup path for the install store: probe the installation table and
/// provision the schema only when the probe fails.
pub async fn ensure_ready(pool: &DbPool) -> Result<SchemaReadiness, MigrateError> {
    let probe =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM slack_installation").fetch_one(pool).await;

    match probe {
        Ok(_) => Ok(SchemaReadiness::AlreadyProvisioned),
        Err(error) => {
            info!(
                event_name = "system.db.schema_probe_failed",
                error = %error,
                "install store probe failed; provisioning schema"
            );
            run_pending(pool).await?;
            Ok(SchemaReadiness::Provisioned)
        }
    }
}
