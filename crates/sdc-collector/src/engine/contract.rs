//! 엔진과 수집기 사이의 계약.
//!
//! 매니저와 워커 팩토리는 같은 `Item` 타입을 공유해야 엔진을 만들 수 있습니다.

use async_trait::async_trait;
use sdc_core::{CollectError, WorkItem};
use sdc_data::ProxyEndpoint;
use tracing::Span;

use crate::stats::{QueueReport, RunSummary};

/// 작업 항목의 원천과 결과 기록을 담당합니다.
#[async_trait]
pub trait WorkItemManager: Send + Sync + 'static {
    type Item: WorkItem;

    /// 대기 큐를 채웁니다. 실패하면 워커를 시작하지 않고 실행을 중단합니다.
    ///
    /// 원천이 비어 있는 것은 에러가 아닙니다.
    async fn prepare(&self) -> Result<(), CollectError>;

    /// 다음 항목을 꺼냅니다. `Ok(None)`이 유일한 정상 종료 신호입니다.
    async fn next(&self) -> Result<Option<Self::Item>, CollectError>;

    /// 현재 대기 항목 수 (참고용)
    async fn size(&self) -> Result<u64, CollectError>;

    /// 실패 항목을 무효 또는 에러 큐 중 하나로 보냅니다.
    async fn on_process_error(&self, item: &Self::Item, err: &CollectError)
        -> Result<(), CollectError>;

    async fn on_process_success(&self, item: &Self::Item) -> Result<(), CollectError>;

    async fn summary(&self) -> Result<RunSummary, CollectError>;

    /// 대기/에러/무효 파티션의 실제 토큰 목록
    async fn report(&self) -> Result<QueueReport, CollectError>;
}

/// 항목을 하나씩 처리하는 워커.
///
/// `Created → init → process* → done` 순서로 사용됩니다.
#[async_trait]
pub trait Worker: Send + 'static {
    type Item: WorkItem;

    /// 외부 연결을 준비합니다.
    async fn init(&mut self) -> Result<(), CollectError>;

    /// 항목 하나를 처리합니다. 성공한 경우에만 결과를 남겨야 합니다.
    async fn process(&mut self, item: &Self::Item) -> Result<(), CollectError>;

    /// `true`면 엔진이 이 워커를 버리고 새로 만들어 계속합니다.
    fn retry(&self, err: &CollectError) -> bool;

    /// 연결을 해제합니다.
    async fn done(&mut self) -> Result<(), CollectError>;
}

/// 워커 생성에 필요한 정보
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub worker_id: usize,
    /// 이 워커의 로그 span
    pub span: Span,
    /// 워커 수명 동안 고정된 프록시 (없으면 직접 연결)
    pub proxy: Option<ProxyEndpoint>,
}

pub trait WorkerFactory: Send + Sync + 'static {
    type Item: WorkItem;
    type Worker: Worker<Item = Self::Item>;

    fn make_worker(&self, ctx: &WorkerContext) -> Result<Self::Worker, CollectError>;
}
