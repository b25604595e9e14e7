//! 공유 큐 기반 작업 항목 매니저.
//!
//! 대기/에러/무효 세 파티션을 사용합니다. 성공한 항목은 어느 파티션에도
//! 남지 않으며, 실패한 항목은 404이면 무효, 그 외에는 에러 파티션으로 갑니다.

use async_trait::async_trait;
use sdc_core::{CollectError, FailureKind, QueueName, QueueSet, WorkItem};
use sdc_data::{SharedQueue, SharedQueueRef};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::WorkItemManager;
use crate::stats::{QueueReport, RunSummary};

/// 콜드 스타트 시 대기 파티션을 채웁니다.
#[async_trait]
pub trait ItemSeeder: Send + Sync {
    /// 채운 항목 수를 반환합니다. 원천이 비어 있으면 0입니다.
    async fn seed(&self, queue: &dyn SharedQueue, pending: &QueueName) -> Result<u64, CollectError>;
}

/// 고정된 토큰 목록으로 채웁니다.
#[derive(Debug, Clone, Default)]
pub struct TokenSeeder {
    tokens: Vec<String>,
}

impl TokenSeeder {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ItemSeeder for TokenSeeder {
    async fn seed(&self, queue: &dyn SharedQueue, pending: &QueueName) -> Result<u64, CollectError> {
        for token in &self.tokens {
            queue.add(pending, token).await?;
        }
        Ok(self.tokens.len() as u64)
    }
}

/// 대기 파티션을 준비한 뒤 실행할 추가 준비 작업 (예: 프록시 적재).
#[async_trait]
pub trait PrepareStep: Send + Sync {
    async fn run(&self, queue: &dyn SharedQueue) -> Result<(), CollectError>;
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    errored: AtomicU64,
    invalid: AtomicU64,
}

/// 파티션 묶음 하나를 관리하는 매니저.
pub struct QueueWorkItemManager<I> {
    queue: SharedQueueRef,
    queues: QueueSet,
    continue_run: bool,
    seeder: Arc<dyn ItemSeeder>,
    steps: Vec<Arc<dyn PrepareStep>>,
    counters: Counters,
    _item: PhantomData<fn() -> I>,
}

impl<I: WorkItem> QueueWorkItemManager<I> {
    pub fn new(queue: SharedQueueRef, queues: QueueSet, seeder: Arc<dyn ItemSeeder>) -> Self {
        Self {
            queue,
            queues,
            continue_run: false,
            seeder,
            steps: Vec::new(),
            counters: Counters::default(),
            _item: PhantomData,
        }
    }

    /// 준비 단계에서 원천 대신 이전 실행의 에러 파티션을 다시 처리합니다.
    pub fn continue_run(mut self, enabled: bool) -> Self {
        self.continue_run = enabled;
        self
    }

    pub fn with_prepare_step(mut self, step: Arc<dyn PrepareStep>) -> Self {
        self.steps.push(step);
        self
    }
}

#[async_trait]
impl<I: WorkItem> WorkItemManager for QueueWorkItemManager<I> {
    type Item = I;

    async fn prepare(&self) -> Result<(), CollectError> {
        if self.continue_run {
            let moved = self
                .queue
                .move_all(&self.queues.error, &self.queues.pending)
                .await?;
            info!(moved, from = %self.queues.error, to = %self.queues.pending, "Requeued previous errors");
        } else {
            let seeded = self
                .seeder
                .seed(self.queue.as_ref(), &self.queues.pending)
                .await?;
            info!(seeded, to = %self.queues.pending, "Seeded pending queue");
        }
        for step in &self.steps {
            step.run(self.queue.as_ref()).await?;
        }
        Ok(())
    }

    async fn next(&self) -> Result<Option<I>, CollectError> {
        Ok(self
            .queue
            .pop(&self.queues.pending)
            .await?
            .map(I::from_token))
    }

    async fn size(&self) -> Result<u64, CollectError> {
        Ok(self.queue.length(&self.queues.pending).await?)
    }

    async fn on_process_error(&self, item: &I, err: &CollectError) -> Result<(), CollectError> {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        let (target, counter) = match err.failure_kind() {
            FailureKind::Invalid => (&self.queues.invalid, &self.counters.invalid),
            FailureKind::Error => (&self.queues.error, &self.counters.errored),
        };
        counter.fetch_add(1, Ordering::Relaxed);
        debug!(item = %item, to = %target, error = %err, "Routing failed item");

        self.queue.add(target, &item.token()).await?;
        Ok(())
    }

    async fn on_process_success(&self, item: &I) -> Result<(), CollectError> {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
        debug!(item = %item, "Item processed");
        Ok(())
    }

    async fn summary(&self) -> Result<RunSummary, CollectError> {
        Ok(RunSummary {
            processed: self.counters.processed.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            errored: self.counters.errored.load(Ordering::Relaxed),
            invalid: self.counters.invalid.load(Ordering::Relaxed),
            remaining: self.queue.length(&self.queues.pending).await?,
            error_queue: self.queue.length(&self.queues.error).await?,
            invalid_queue: self.queue.length(&self.queues.invalid).await?,
        })
    }

    async fn report(&self) -> Result<QueueReport, CollectError> {
        Ok(QueueReport::new(
            self.queue.all(&self.queues.pending).await?,
            self.queue.all(&self.queues.error).await?,
            self.queue.all(&self.queues.invalid).await?,
        ))
    }
}
