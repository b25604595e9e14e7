//! 병렬 수집 엔진.
//!
//! 디스패처 하나가 매니저에서 항목을 꺼내 요청 채널로 보내고, N개의 워커가
//! 요청을 처리해 응답 채널로 결과를 돌려줍니다. 호출한 태스크는 응답을 받아
//! 매니저에 기록합니다. 워커가 모두 끝나면 감독 태스크가 응답 채널을 닫습니다.
//!
//! ```text
//! Idle → Preparing → Running → Draining → Done
//! ```
//!
//! 항목 사이의 완료 순서는 보장하지 않지만, 꺼낸 항목마다 정확히 하나의 결과가
//! 기록됩니다.

pub mod contract;

pub use contract::{WorkItemManager, Worker, WorkerContext, WorkerFactory};

use sdc_core::{engine_span, worker_span, CollectError, QueueName, WorkItem};
use sdc_data::{ProxyPool, SharedQueueRef};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::error::CollectorError;
use crate::stats::RunSummary;

/// 채널 용량 = 병렬 수 × 이 값
pub const DEFAULT_CHANNEL_FACTOR: usize = 4;

const NO_WORKER_LEFT: &str = "no worker left to process item";

/// 엔진 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Preparing,
    Running,
    Draining,
    Done,
}

/// 워커가 실패한 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStage {
    Create,
    Init,
    Done,
    Aborted,
}

/// 워커 수명 주기 실패
#[derive(Debug)]
pub struct WorkerFailure {
    pub worker_id: usize,
    pub stage: WorkerStage,
    pub error: CollectError,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker {} failed at {:?}: {}",
            self.worker_id, self.stage, self.error
        )
    }
}

struct Outcome<I> {
    item: I,
    result: Result<(), CollectError>,
}

type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// 매니저와 워커 팩토리를 묶어 병렬로 실행합니다.
pub struct ParallelEngine<M, F> {
    name: String,
    manager: Arc<M>,
    factory: Arc<F>,
    proxy_source: Option<(SharedQueueRef, QueueName)>,
    channel_factor: usize,
    span: Span,
    state: std::sync::Mutex<EngineState>,
}

impl<M, F> ParallelEngine<M, F>
where
    M: WorkItemManager,
    F: WorkerFactory<Item = M::Item>,
{
    pub fn new(name: impl Into<String>, manager: Arc<M>, factory: Arc<F>) -> Self {
        let name = name.into();
        let span = engine_span(&name);
        Self {
            name,
            manager,
            factory,
            proxy_source: None,
            channel_factor: DEFAULT_CHANNEL_FACTOR,
            span,
            state: std::sync::Mutex::new(EngineState::Idle),
        }
    }

    /// 준비 후 이 파티션에서 워커 수만큼 프록시를 꺼내 배분합니다.
    pub fn with_proxies(mut self, queue: SharedQueueRef, key: QueueName) -> Self {
        self.proxy_source = Some((queue, key));
        self
    }

    pub fn with_channel_factor(mut self, factor: usize) -> Self {
        self.channel_factor = factor.max(1);
        self
    }

    pub fn manager(&self) -> &Arc<M> {
        &self.manager
    }

    pub fn state(&self) -> EngineState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(EngineState::Done)
    }

    fn transition(&self, next: EngineState) {
        if let Ok(mut state) = self.state.lock() {
            debug!(from = ?*state, to = ?next, "Engine state");
            *state = next;
        }
    }

    /// `parallelism`개의 워커로 대기 큐가 빌 때까지 처리합니다.
    ///
    /// 대기 큐에 항목이 남았거나 워커 생성/초기화/종료가 실패하면
    /// [`CollectorError::Incomplete`]를 반환합니다.
    pub async fn execute(&self, parallelism: usize) -> Result<RunSummary, CollectorError> {
        let result = self
            .run(parallelism.max(1))
            .instrument(self.span.clone())
            .await;
        self.transition(EngineState::Done);
        result
    }

    async fn run(&self, parallelism: usize) -> Result<RunSummary, CollectorError> {
        self.transition(EngineState::Preparing);
        info!(parallelism, "Preparing work items");
        self.manager.prepare().await.map_err(|e| {
            error!(error = %e, "Prepare failed");
            CollectorError::Prepare(e)
        })?;
        match self.manager.size().await {
            Ok(pending) => info!(pending, "Work items ready"),
            Err(e) => warn!(error = %e, "Could not read pending size"),
        }

        let proxies = match &self.proxy_source {
            Some((queue, key)) => ProxyPool::drain_from(queue.as_ref(), key, parallelism)
                .await
                .map_err(|e| CollectorError::Queue(e.into()))?,
            None => ProxyPool::empty(),
        };

        let capacity = parallelism * self.channel_factor;
        let (request_tx, request_rx) = mpsc::channel::<M::Item>(capacity);
        let request_rx: SharedReceiver<M::Item> = Arc::new(Mutex::new(request_rx));
        let (response_tx, mut response_rx) = mpsc::channel::<Outcome<M::Item>>(capacity);

        self.transition(EngineState::Running);

        let dispatcher = tokio::spawn(
            dispatch(Arc::clone(&self.manager), request_tx, response_tx.clone())
                .instrument(self.span.clone()),
        );

        let mut workers = JoinSet::new();
        let mut worker_ids = HashMap::new();
        for worker_id in 0..parallelism {
            let ctx = WorkerContext {
                worker_id,
                span: worker_span(&self.span, worker_id),
                proxy: proxies.try_take(),
            };
            let span = ctx.span.clone();
            let handle = workers.spawn(
                run_worker(
                    Arc::clone(&self.factory),
                    ctx,
                    Arc::clone(&request_rx),
                    response_tx.clone(),
                )
                .instrument(span),
            );
            worker_ids.insert(handle.id(), worker_id);
        }

        let supervisor = tokio::spawn(
            supervise(workers, worker_ids, request_rx, response_tx).instrument(self.span.clone()),
        );

        let mut record_failures = Vec::new();
        while let Some(Outcome { item, result }) = response_rx.recv().await {
            let recorded = match &result {
                Ok(()) => self.manager.on_process_success(&item).await,
                Err(err) => {
                    debug!(item = %item, error = %err, "Item failed");
                    self.manager.on_process_error(&item, err).await
                }
            };
            if let Err(e) = recorded {
                error!(item = %item, error = %e, "Failed to record outcome");
                record_failures.push(format!("{}: {}", item, e));
            }
        }

        self.transition(EngineState::Draining);

        let mut problems = Vec::new();
        match dispatcher.await {
            Ok(Ok(dispatched)) => debug!(dispatched, "Dispatcher finished"),
            Ok(Err(e)) => problems.push(format!("dispatcher stopped: {}", e)),
            Err(e) => problems.push(format!("dispatcher aborted: {}", e)),
        }
        let worker_failures = match supervisor.await {
            Ok(failures) => failures,
            Err(e) => {
                problems.push(format!("supervisor aborted: {}", e));
                Vec::new()
            }
        };
        problems.extend(worker_failures.iter().map(ToString::to_string));
        problems.extend(record_failures);

        let summary = self.manager.summary().await.map_err(CollectorError::Queue)?;
        info!("{}", summary);
        summary.log_summary(&self.name);

        if summary.remaining > 0 || !problems.is_empty() {
            let detail = if problems.is_empty() {
                String::new()
            } else {
                format!("; {}", problems.join("; "))
            };
            return Err(CollectorError::Incomplete {
                remaining: summary.remaining,
                errored: summary.errored,
                invalid: summary.invalid,
                worker_failures: worker_failures.len(),
                detail,
            });
        }

        Ok(summary)
    }
}

/// 매니저에서 항목을 꺼내 요청 채널로 보냅니다.
///
/// 큐 에러를 만나면 새 항목 공급만 멈추고, 이미 보낸 항목은 워커가 계속 처리합니다.
async fn dispatch<M: WorkItemManager>(
    manager: Arc<M>,
    requests: mpsc::Sender<M::Item>,
    responses: mpsc::Sender<Outcome<M::Item>>,
) -> Result<u64, CollectError> {
    let mut dispatched = 0;
    loop {
        let item = match manager.next().await {
            Ok(Some(item)) => item,
            Ok(None) => {
                info!(dispatched, "All work items dispatched");
                return Ok(dispatched);
            }
            Err(e) => {
                error!(error = %e, dispatched, "Dispatcher stopped on queue error");
                return Err(e);
            }
        };

        if let Err(mpsc::error::SendError(item)) = requests.send(item).await {
            warn!(item = %item, "No worker left to accept items");
            let outcome = Outcome {
                item,
                result: Err(CollectError::Item(NO_WORKER_LEFT.to_string())),
            };
            let _ = responses.send(outcome).await;
            return Ok(dispatched);
        }
        dispatched += 1;
    }
}

/// 워커가 모두 끝날 때까지 기다린 뒤 남은 요청을 실패로 돌려주고 응답 채널을 닫습니다.
async fn supervise<I: WorkItem>(
    mut workers: JoinSet<Result<(), WorkerFailure>>,
    worker_ids: HashMap<Id, usize>,
    requests: SharedReceiver<I>,
    responses: mpsc::Sender<Outcome<I>>,
) -> Vec<WorkerFailure> {
    let mut failures = Vec::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => {
                error!(%failure, "Worker failed");
                failures.push(failure);
            }
            Err(e) => {
                let worker_id = worker_ids.get(&e.id()).copied().unwrap_or_default();
                error!(worker_id, error = %e, "Worker task aborted");
                failures.push(WorkerFailure {
                    worker_id,
                    stage: WorkerStage::Aborted,
                    error: CollectError::Item(e.to_string()),
                });
            }
        }
    }

    let mut leftovers = 0;
    let mut rx = requests.lock().await;
    rx.close();
    while let Some(item) = rx.recv().await {
        leftovers += 1;
        let outcome = Outcome {
            item,
            result: Err(CollectError::Item(NO_WORKER_LEFT.to_string())),
        };
        if responses.send(outcome).await.is_err() {
            break;
        }
    }
    if leftovers > 0 {
        warn!(leftovers, "Requests left after all workers exited");
    }

    failures
}

async fn start_worker<F: WorkerFactory>(
    factory: &F,
    ctx: &WorkerContext,
) -> Result<F::Worker, WorkerFailure> {
    let failure = |stage, error| WorkerFailure {
        worker_id: ctx.worker_id,
        stage,
        error,
    };

    let mut worker = factory
        .make_worker(ctx)
        .map_err(|e| failure(WorkerStage::Create, e))?;
    worker
        .init()
        .await
        .map_err(|e| failure(WorkerStage::Init, e))?;
    Ok(worker)
}

async fn run_worker<F: WorkerFactory>(
    factory: Arc<F>,
    ctx: WorkerContext,
    requests: SharedReceiver<F::Item>,
    responses: mpsc::Sender<Outcome<F::Item>>,
) -> Result<(), WorkerFailure> {
    let mut worker = start_worker(factory.as_ref(), &ctx).await?;
    match &ctx.proxy {
        Some(proxy) => info!(proxy = %proxy, "Worker started"),
        None => info!("Worker started without proxy"),
    }

    let mut processed = 0u64;
    loop {
        let next = requests.lock().await.recv().await;
        let Some(item) = next else { break };

        let result = worker.process(&item).await;
        processed += 1;
        let recreate = matches!(&result, Err(err) if worker.retry(err));

        if responses.send(Outcome { item, result }).await.is_err() {
            warn!("Response channel closed");
            break;
        }

        if recreate {
            warn!("Recreating worker after retryable failure");
            if let Err(e) = worker.done().await {
                warn!(error = %e, "Worker cleanup failed before recreation");
            }
            worker = start_worker(factory.as_ref(), &ctx).await?;
        }
    }

    worker.done().await.map_err(|error| WorkerFailure {
        worker_id: ctx.worker_id,
        stage: WorkerStage::Done,
        error,
    })?;
    info!(processed, "Worker finished");
    Ok(())
}
