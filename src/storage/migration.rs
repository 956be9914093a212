//! Schema bootstrap. Plain `CREATE TABLE IF NOT EXISTS` rather than
//! `sea-orm-migration`'s versioned migrator: there is exactly one schema
//! version and no upgrade path to track yet.

use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};

use crate::utils::error::Result;

pub async fn run(db: &DatabaseConnection) -> Result<()> {
    let backend = db.get_database_backend();
    db.execute(Statement::from_string(
        backend,
        "CREATE TABLE IF NOT EXISTS kv_store (
            namespace TEXT NOT NULL,
            key TEXT NOT NULL,
            value_json TEXT NOT NULL,
            PRIMARY KEY (namespace, key)
        )"
        .to_string(),
    ))
    .await?;

    db.execute(Statement::from_string(
        backend,
        "CREATE TABLE IF NOT EXISTS relay_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp BIGINT NOT NULL,
            channel_id BIGINT NOT NULL,
            record_json TEXT NOT NULL
        )"
        .to_string(),
    ))
    .await?;

    Ok(())
}
