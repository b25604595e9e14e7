//! PostgreSQL 적재기.
//!
//! 수집 결과(JSON 배열 텍스트)를 스키마 아래 테이블에 행 단위로 적재합니다.
//! 테이블 구조는 `(partition_key text, data jsonb, loaded_at timestamptz)`이며
//! 처음 적재할 때 만들어집니다.

use sdc_core::DatabaseSettings;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{DataError, Result};

/// 스키마 하나에 묶인 연결 풀.
#[derive(Clone)]
pub struct PgLoader {
    pool: PgPool,
    schema: String,
}

impl PgLoader {
    /// 연결 풀을 생성합니다.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let schema = quote_ident(&settings.schema)?;
        info!(schema = %settings.schema, "Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&settings.url)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        info!("Database connection established");
        Ok(Self { pool, schema })
    }

    /// 연결 풀을 닫습니다.
    pub async fn disconnect(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }

    pub async fn create_schema(&self) -> Result<()> {
        self.exec(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema))
            .await
            .map(|_| ())
    }

    pub async fn drop_schema(&self) -> Result<()> {
        info!(schema = %self.schema, "Dropping schema");
        self.exec(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema))
            .await
            .map(|_| ())
    }

    /// 결과 행이 없는 SQL을 실행하고 영향받은 행 수를 반환합니다.
    pub async fn exec(&self, sql: &str) -> Result<u64> {
        debug!(sql, "Executing");
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// 조회 결과를 행마다 JSON 객체로 반환합니다.
    pub async fn run_query(&self, sql: &str) -> Result<Vec<Value>> {
        let wrapped = format!("SELECT row_to_json(q) FROM ({}) q", sql);
        let rows: Vec<Value> = sqlx::query_scalar(&wrapped).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// 적재된 테이블의 심볼(`partition_key`)을 읽습니다. NULL과 빈 값은 제외합니다.
    pub async fn select_symbols(&self, table: &str) -> Result<Vec<String>> {
        let sql = select_symbols_sql(&self.schema, table)?;
        let rows: Vec<Option<String>> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .flatten()
            .filter(|symbol| !symbol.trim().is_empty())
            .collect())
    }

    /// JSON 배열 텍스트를 테이블에 적재하고 적재한 행 수를 반환합니다.
    ///
    /// 최상위가 배열이 아닌 JSON은 거부합니다.
    #[instrument(skip(self, json_text), fields(schema = %self.schema))]
    pub async fn load_by_json_text(
        &self,
        json_text: &str,
        table: &str,
        partition: &str,
    ) -> Result<u64> {
        validate_json_array(json_text)?;
        let table = format!("{}.{}", self.schema, quote_ident(table)?);

        self.create_schema().await?;
        self.exec(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                partition_key TEXT NOT NULL,
                data JSONB NOT NULL,
                loaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            table
        ))
        .await?;

        let result = sqlx::query(&format!(
            "INSERT INTO {} (partition_key, data)
             SELECT $1, value FROM jsonb_array_elements($2::jsonb)",
            table
        ))
        .bind(partition)
        .bind(json_text)
        .execute(&self.pool)
        .await?;

        let rows = result.rows_affected();
        debug!(table = %table, partition, rows, "Loaded JSON rows");
        Ok(rows)
    }
}

fn select_symbols_sql(schema: &str, table: &str) -> Result<String> {
    Ok(format!(
        "SELECT DISTINCT partition_key FROM {}.{}",
        schema,
        quote_ident(table)?
    ))
}

/// 식별자를 검증하고 큰따옴표로 감쌉니다.
///
/// 영문자, 숫자, 밑줄만 허용하며 숫자로 시작할 수 없습니다.
fn quote_ident(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(DataError::InvalidData(format!("invalid identifier: {:?}", name)));
    }
    Ok(format!("\"{}\"", name))
}

fn validate_json_array(json_text: &str) -> Result<()> {
    match serde_json::from_str::<Value>(json_text)? {
        Value::Array(_) => Ok(()),
        other => Err(DataError::InvalidData(format!(
            "expected JSON array, got {}",
            match other {
                Value::Object(_) => "object",
                Value::String(_) => "string",
                Value::Number(_) => "number",
                Value::Bool(_) => "bool",
                _ => "null",
            }
        ))),
    }
}
