//! # SDC Core
//!
//! 데이터 수집 파이프라인의 핵심 타입을 제공합니다.
//!
//! 이 크레이트는 수집기 전반에서 사용되는 기본 타입을 제공합니다:
//! - 작업 항목(WorkItem) 및 큐 파티션 이름
//! - 처리 실패 분류용 에러 타입
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;
