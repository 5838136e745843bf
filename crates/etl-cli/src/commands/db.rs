//! `etl-cli db` — control-plane database lifecycle.

use anyhow::Result;
use sqlx::PgPool;

pub async fn migrate(pool: &PgPool) -> Result<()> {
    etl_db::migrate(pool).await?;
    println!("migrations_applied=true");
    Ok(())
}

pub async fn status(pool: &PgPool) -> Result<()> {
    let s = etl_db::status(pool).await?;
    println!("db_ok={} has_loaders_table={}", s.ok, s.has_loaders_table);
    Ok(())
}
