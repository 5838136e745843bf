//! Dynamic row-to-JSON mapping. `runQuery` has no compile-time schema to
//! decode against — each source database can return arbitrary columns — so
//! rows are introspected by column type name and converted into a generic
//! map the way a JDBC `ResultSetMetaData` walk would.

use etl_types::EtlError;
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::{Column, MySqlPool, PgPool, Row, TypeInfo};
use std::collections::BTreeMap;

pub type RowMap = BTreeMap<String, Value>;

pub(crate) async fn run_pg_query(pool: &PgPool, sql: &str) -> Result<Vec<RowMap>, EtlError> {
    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| EtlError::SourceUnavailable(e.to_string()))?;
    Ok(rows.iter().map(pg_row_to_map).collect())
}

pub(crate) async fn run_mysql_query(pool: &MySqlPool, sql: &str) -> Result<Vec<RowMap>, EtlError> {
    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| EtlError::SourceUnavailable(e.to_string()))?;
    Ok(rows.iter().map(mysql_row_to_map).collect())
}

fn pg_row_to_map(row: &PgRow) -> RowMap {
    let mut map = RowMap::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), pg_value_at(row, i, col.type_info().name()));
    }
    map
}

fn pg_value_at(row: &PgRow, i: usize, type_name: &str) -> Value {
    let value: Option<Value> = match type_name {
        "INT2" => row.try_get::<Option<i16>, _>(i).ok().flatten().map(|v| Value::from(v as i64)),
        "INT4" => row.try_get::<Option<i32>, _>(i).ok().flatten().map(|v| Value::from(v as i64)),
        "INT8" => row.try_get::<Option<i64>, _>(i).ok().flatten().map(Value::from),
        "FLOAT4" => row.try_get::<Option<f32>, _>(i).ok().flatten().map(|v| Value::from(v as f64)),
        "FLOAT8" | "NUMERIC" => row.try_get::<Option<f64>, _>(i).ok().flatten().map(Value::from),
        "BOOL" => row.try_get::<Option<bool>, _>(i).ok().flatten().map(Value::from),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i).ok().flatten(),
        "TIMESTAMPTZ" | "TIMESTAMP" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
            .ok()
            .flatten()
            .map(|dt| Value::from(dt.to_rfc3339())),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(i)
            .ok()
            .flatten()
            .map(|u| Value::from(u.to_string())),
        _ => row.try_get::<Option<String>, _>(i).ok().flatten().map(Value::from),
    };
    value.unwrap_or(Value::Null)
}

fn mysql_row_to_map(row: &MySqlRow) -> RowMap {
    let mut map = RowMap::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), mysql_value_at(row, i, col.type_info().name()));
    }
    map
}

fn mysql_value_at(row: &MySqlRow, i: usize, type_name: &str) -> Value {
    let value: Option<Value> = match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INT UNSIGNED" => {
            row.try_get::<Option<i64>, _>(i).ok().flatten().map(Value::from)
        }
        "BIGINT" | "BIGINT UNSIGNED" => row.try_get::<Option<i64>, _>(i).ok().flatten().map(Value::from),
        "FLOAT" => row.try_get::<Option<f32>, _>(i).ok().flatten().map(|v| Value::from(v as f64)),
        "DOUBLE" | "DECIMAL" => row.try_get::<Option<f64>, _>(i).ok().flatten().map(Value::from),
        "BOOLEAN" | "TINYINT(1)" => row.try_get::<Option<bool>, _>(i).ok().flatten().map(Value::from),
        "JSON" => row.try_get::<Option<Value>, _>(i).ok().flatten(),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
            .ok()
            .flatten()
            .map(|dt| Value::from(dt.to_rfc3339())),
        _ => row.try_get::<Option<String>, _>(i).ok().flatten().map(Value::from),
    };
    value.unwrap_or(Value::Null)
}
