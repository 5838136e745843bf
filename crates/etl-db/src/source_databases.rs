use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceDatabaseRow {
    pub id: Uuid,
    pub db_code: String,
    pub db_type: String,
    pub host: String,
    pub port: i32,
    pub database_name: String,
    pub username: String,
    pub password_encrypted: Option<String>,
    pub max_pool_size: i32,
    pub min_idle: i32,
    pub idle_timeout_seconds: i32,
    pub connect_timeout_seconds: i32,
}

pub async fn list_source_databases(pool: &PgPool) -> Result<Vec<SourceDatabaseRow>> {
    sqlx::query_as::<_, SourceDatabaseRow>(
        r#"
        SELECT id, db_code, db_type, host, port, database_name, username,
               password_encrypted, max_pool_size, min_idle, idle_timeout_seconds,
               connect_timeout_seconds
        FROM source_databases
        ORDER BY db_code
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list_source_databases failed")
}

pub async fn get_source_database_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<SourceDatabaseRow>> {
    sqlx::query_as::<_, SourceDatabaseRow>(
        r#"
        SELECT id, db_code, db_type, host, port, database_name, username,
               password_encrypted, max_pool_size, min_idle, idle_timeout_seconds,
               connect_timeout_seconds
        FROM source_databases
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("get_source_database_by_id failed")
}

pub async fn get_source_database_by_code(
    pool: &PgPool,
    db_code: &str,
) -> Result<Option<SourceDatabaseRow>> {
    sqlx::query_as::<_, SourceDatabaseRow>(
        r#"
        SELECT id, db_code, db_type, host, port, database_name, username,
               password_encrypted, max_pool_size, min_idle, idle_timeout_seconds,
               connect_timeout_seconds
        FROM source_databases
        WHERE db_code = $1
        "#,
    )
    .bind(db_code)
    .fetch_optional(pool)
    .await
    .context("get_source_database_by_code failed")
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_source_database(
    pool: &PgPool,
    id: Uuid,
    db_code: &str,
    db_type: &str,
    host: &str,
    port: i32,
    database_name: &str,
    username: &str,
    password_encrypted: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO source_databases (id, db_code, db_type, host, port, database_name, username, password_encrypted)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(db_code)
    .bind(db_type)
    .bind(host)
    .bind(port)
    .bind(database_name)
    .bind(username)
    .bind(password_encrypted)
    .execute(pool)
    .await
    .context("insert_source_database failed")?;
    Ok(())
}
