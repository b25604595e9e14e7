//! 공유 큐 기반 병렬 주식 데이터 수집기.
//!
//! 이 crate는 다음을 제공합니다:
//! - 병렬 수집 엔진 (디스패처, 워커, 결과 수집)
//! - 공유 큐 기반 작업 항목 매니저 (대기/에러/무효 파티션)
//! - 재무제표 페이지 다운로드, 가격 이력, 티커 목록, HTML 표 파싱 수집 모듈

pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod modules;
pub mod stats;

pub use config::{CollectorConfig, RunOptions, SymbolSource};
pub use engine::{EngineState, ParallelEngine, WorkItemManager, Worker, WorkerContext, WorkerFactory};
pub use error::{CollectorError, Result};
pub use manager::{ItemSeeder, PrepareStep, QueueWorkItemManager, TokenSeeder};
pub use stats::{QueueReport, RunSummary};
