use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

/// Registry of discovered HTTP endpoints — metadata only, not on the
/// critical path (§3).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiEndpointRow {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub description: Option<String>,
}

pub async fn register_api_endpoint(
    pool: &PgPool,
    id: Uuid,
    method: &str,
    path: &str,
    description: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO api_endpoints (id, method, path, description)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (method, path) DO UPDATE SET description = EXCLUDED.description
        "#,
    )
    .bind(id)
    .bind(method)
    .bind(path)
    .bind(description)
    .execute(pool)
    .await
    .context("register_api_endpoint failed")?;
    Ok(())
}

pub async fn list_api_endpoints(pool: &PgPool) -> Result<Vec<ApiEndpointRow>> {
    sqlx::query_as::<_, ApiEndpointRow>(
        "SELECT id, method, path, description FROM api_endpoints ORDER BY path, method",
    )
    .fetch_all(pool)
    .await
    .context("list_api_endpoints failed")
}
