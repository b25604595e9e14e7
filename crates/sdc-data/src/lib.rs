//! 수집 파이프라인의 데이터 계층.
//!
//! 이 crate는 다음을 제공합니다:
//! - 공유 큐 (Redis 집합 기반, 인메모리 구현 포함)
//! - 프록시 검증 및 워커별 프록시 배분
//! - HTTP 리더 (서버 에러 상태 코드 보존)
//! - PostgreSQL 적재기
//! - 수집 결과 내보내기 (파일, DB, 큐, 조합)

pub mod error;
pub mod export;
pub mod provider;
pub mod queue;
pub mod storage;

pub use error::{DataError, Result};

pub use queue::memory::MemoryQueue;
pub use queue::redis::{RedisConfig, RedisQueue};
pub use queue::{SharedQueue, SharedQueueRef};

pub use export::{DbExporter, Exporter, Exporters, FileExporter, QueueExporter};
pub use provider::http::HttpReader;
pub use provider::proxy::{
    load_proxies, parse_proxy_lines, validate_proxies, HttpProxyProbe, ProxyEndpoint, ProxyPool, ProxyProbe,
    DEFAULT_PROBERS,
};
pub use provider::tickers::{load_tickers_file, parse_tickers_json};
pub use storage::postgres::PgLoader;
