use anyhow::Result;
use std::path::Path;

use crate::db;

/// Create the directory catalog schema. Idempotent; existing rows are kept.
pub async fn run_migrations(path: &Path) -> Result<()> {
    let pool = db::connect(path).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            group_name TEXT NOT NULL,
            device_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            PRIMARY KEY (group_name, device_id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_devices_device_id ON devices(device_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
