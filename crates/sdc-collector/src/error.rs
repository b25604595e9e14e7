//! 에러 타입 정의.

use sdc_core::CollectError;
use sdc_data::DataError;
use thiserror::Error;

/// 실행 단위 에러
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 준비 단계 실패 (워커 시작 전 중단)
    #[error("Prepare failed: {0}")]
    Prepare(#[source] CollectError),

    /// 공유 큐 에러
    #[error("Queue error: {0}")]
    Queue(#[source] CollectError),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 실행이 끝났지만 처리되지 않은 항목이 남았거나 워커가 실패함
    #[error(
        "Run incomplete: remaining={remaining}, errored={errored}, invalid={invalid}, worker_failures={worker_failures}{detail}"
    )]
    Incomplete {
        remaining: u64,
        errored: u64,
        invalid: u64,
        worker_failures: usize,
        detail: String,
    },

    /// 데이터 계층 에러
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
