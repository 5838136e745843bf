//! C1 SourceRegistry: one pooled connection per `dbCode`, built from the
//! `source_databases` table the same way `mqk-db::connect_from_env` builds
//! the control-plane pool, generalized to many pools of two possible wire
//! protocols instead of one.

mod rowmap;

pub use rowmap::RowMap;

use etl_crypto::EncryptedFieldCodec;
use etl_db::SourceDatabaseRow;
use etl_types::EtlError;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::{MySqlPool, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

enum SourcePool {
    Postgres(PgPool),
    MySql(MySqlPool),
}

/// Loads every `SourceDatabase` row at process start (and on `reload`),
/// decrypts passwords with C2, and materializes one pool per `dbCode`.
/// `runQuery` never mutates the source — read-only enforcement is the
/// pipeline's job at C4, not the registry's.
pub struct SourceRegistry {
    control_db: PgPool,
    codec: Arc<EncryptedFieldCodec>,
    pools: RwLock<HashMap<String, SourcePool>>,
}

impl SourceRegistry {
    pub async fn load(control_db: PgPool, codec: Arc<EncryptedFieldCodec>) -> Result<Self, EtlError> {
        let registry = Self {
            control_db,
            codec,
            pools: RwLock::new(HashMap::new()),
        };
        registry.reload().await?;
        Ok(registry)
    }

    /// Rebuilds every pool from the current `source_databases` rows. Pools
    /// not present in the new set are closed after the swap so in-flight
    /// queries on them can drain.
    pub async fn reload(&self) -> Result<(), EtlError> {
        let rows = etl_db::list_source_databases(&self.control_db).await?;

        let mut built = HashMap::with_capacity(rows.len());
        for row in &rows {
            built.insert(row.db_code.clone(), build_pool(row, &self.codec).await?);
        }

        let old = {
            let mut guard = self.pools.write().await;
            std::mem::replace(&mut *guard, built)
        };
        for (db_code, pool) in old {
            tracing::info!(db_code, "closing superseded source pool");
            close_pool(pool).await;
        }
        Ok(())
    }

    pub async fn run_query(&self, db_code: &str, sql: &str) -> Result<Vec<RowMap>, EtlError> {
        let guard = self.pools.read().await;
        let pool = guard
            .get(db_code)
            .ok_or_else(|| EtlError::SourceUnknown(db_code.to_string()))?;
        match pool {
            SourcePool::Postgres(p) => rowmap::run_pg_query(p, sql).await,
            SourcePool::MySql(p) => rowmap::run_mysql_query(p, sql).await,
        }
    }

    pub async fn registered_codes(&self) -> Vec<String> {
        self.pools.read().await.keys().cloned().collect()
    }

    pub async fn shutdown(&self) {
        let pools = {
            let mut guard = self.pools.write().await;
            std::mem::take(&mut *guard)
        };
        for (db_code, pool) in pools {
            tracing::info!(db_code, "closing source pool on shutdown");
            close_pool(pool).await;
        }
    }
}

async fn close_pool(pool: SourcePool) {
    match pool {
        SourcePool::Postgres(p) => p.close().await,
        SourcePool::MySql(p) => p.close().await,
    }
}

async fn build_pool(row: &SourceDatabaseRow, codec: &EncryptedFieldCodec) -> Result<SourcePool, EtlError> {
    let password = codec
        .decrypt_opt(row.password_encrypted.as_deref())
        .map_err(EtlError::from)?
        .unwrap_or_default();

    let idle_timeout = Duration::from_secs(row.idle_timeout_seconds.max(0) as u64);
    let acquire_timeout = Duration::from_secs(row.connect_timeout_seconds.max(0) as u64);
    let max_connections = row.max_pool_size.max(1) as u32;
    let min_connections = row.min_idle.max(0) as u32;

    match row.db_type.as_str() {
        "POSTGRESQL" => {
            let url = format!(
                "postgres://{}:{}@{}:{}/{}",
                row.username, password, row.host, row.port, row.database_name
            );
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .min_connections(min_connections)
                .idle_timeout(idle_timeout)
                .acquire_timeout(acquire_timeout)
                .connect(&url)
                .await
                .map_err(|e| EtlError::SourceUnavailable(format!("{}: {e}", row.db_code)))?;
            Ok(SourcePool::Postgres(pool))
        }
        "MYSQL" => {
            let url = format!(
                "mysql://{}:{}@{}:{}/{}",
                row.username, password, row.host, row.port, row.database_name
            );
            let pool = MySqlPoolOptions::new()
                .max_connections(max_connections)
                .min_connections(min_connections)
                .idle_timeout(idle_timeout)
                .acquire_timeout(acquire_timeout)
                .connect(&url)
                .await
                .map_err(|e| EtlError::SourceUnavailable(format!("{}: {e}", row.db_code)))?;
            Ok(SourcePool::MySql(pool))
        }
        other => Err(EtlError::Validation(format!(
            "unsupported dbType {other:?} for source database {}",
            row.db_code
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> Arc<EncryptedFieldCodec> {
        Arc::new(EncryptedFieldCodec::new(&[3u8; 32]).unwrap())
    }

    fn row(db_type: &str) -> SourceDatabaseRow {
        SourceDatabaseRow {
            id: uuid::Uuid::new_v4(),
            db_code: "SRC_A".to_string(),
            db_type: db_type.to_string(),
            host: "localhost".to_string(),
            port: 5432,
            database_name: "srcdb".to_string(),
            username: "user".to_string(),
            password_encrypted: None,
            max_pool_size: 5,
            min_idle: 1,
            idle_timeout_seconds: 300,
            connect_timeout_seconds: 30,
        }
    }

    #[tokio::test]
    async fn unsupported_db_type_fails_fast_at_pool_build() {
        let err = build_pool(&row("ORACLE"), &codec()).await.unwrap_err();
        match err {
            EtlError::Validation(msg) => assert!(msg.contains("ORACLE")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_query_against_an_unregistered_db_code_is_source_unknown() {
        let pool = PgPool::connect_lazy("postgres://localhost/does-not-matter").unwrap();
        let registry = SourceRegistry {
            control_db: pool,
            codec: codec(),
            pools: RwLock::new(HashMap::new()),
        };
        let err = registry.run_query("NOT_REGISTERED", "select 1").await.unwrap_err();
        assert_eq!(err, EtlError::SourceUnknown("NOT_REGISTERED".to_string()));
    }
}
