//! 데이터 모듈 오류 타입.

use sdc_core::CollectError;
use thiserror::Error;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 공유 큐(캐시) 오류
    #[error("Cache error: {0}")]
    CacheError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 성공이 아닌 HTTP 응답
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// HTTP 요청 자체의 실패 (연결, 타임아웃 등)
    #[error("Request error: {0}")]
    RequestError(String),

    /// 파일 입출력 오류
    #[error("IO error: {0}")]
    Io(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 잘못된 데이터 형식
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<redis::RedisError> for DataError {
    fn from(err: redis::RedisError) -> Self {
        DataError::CacheError(err.to_string())
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DataError::ConnectionError(err.to_string())
            }
            sqlx::Error::Database(db_err) => DataError::QueryError(db_err.message().to_string()),
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        match (err.status(), err.url()) {
            (Some(status), Some(url)) => DataError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            },
            _ => DataError::RequestError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DataError {
    fn from(err: std::io::Error) -> Self {
        DataError::Io(err.to_string())
    }
}

impl From<DataError> for CollectError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Http { status, url } => {
                CollectError::server(status, format!("HTTP {} from {}", status, url))
            }
            DataError::CacheError(msg)
            | DataError::ConnectionError(msg)
            | DataError::RequestError(msg) => CollectError::Transport(msg),
            DataError::SerializationError(msg) | DataError::InvalidData(msg) => {
                CollectError::Validation(msg)
            }
            other => CollectError::Item(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
