//! 병렬 엔진 통합 테스트
//!
//! 메모리 큐와 가짜 워커로 엔진의 결과 기록, 재개, 워커 재생성을 검증합니다.

use async_trait::async_trait;
use sdc_collector::{
    CollectorError, EngineState, ItemSeeder, ParallelEngine, QueueReport, QueueWorkItemManager,
    RunSummary, TokenSeeder, WorkItemManager, Worker, WorkerContext, WorkerFactory,
};
use sdc_core::{CollectError, QueueName, QueueSet, Symbol};
use sdc_data::{MemoryQueue, SharedQueue};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PREFIX: &str = "TEST";

/// 토큰별 실패를 지정할 수 있는 가짜 워커 팩토리
#[derive(Default)]
struct FakeFactory {
    not_found: HashSet<String>,
    throttled: HashSet<String>,
    broken: HashSet<String>,
    fail_init: bool,
    fail_reinit: bool,
    fail_done: bool,
    inits: AtomicUsize,
    made: AtomicUsize,
    processed: Mutex<Vec<String>>,
    proxies: Mutex<Vec<Option<String>>>,
}

impl FakeFactory {
    fn not_found(mut self, token: &str) -> Self {
        self.not_found.insert(token.to_string());
        self
    }

    fn throttled(mut self, token: &str) -> Self {
        self.throttled.insert(token.to_string());
        self
    }

    fn broken(mut self, token: &str) -> Self {
        self.broken.insert(token.to_string());
        self
    }

    fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// 첫 초기화만 성공하고 재생성 후 초기화는 실패
    fn failing_reinit(mut self) -> Self {
        self.fail_reinit = true;
        self
    }

    fn failing_done(mut self) -> Self {
        self.fail_done = true;
        self
    }

    fn made(&self) -> usize {
        self.made.load(Ordering::SeqCst)
    }

    fn processed(&self) -> Vec<String> {
        let mut processed = self.processed.lock().unwrap().clone();
        processed.sort();
        processed
    }
}

struct FakeWorker {
    factory: Arc<FakeFactory>,
}

#[async_trait]
impl Worker for FakeWorker {
    type Item = Symbol;

    async fn init(&mut self) -> Result<(), CollectError> {
        let earlier = self.factory.inits.fetch_add(1, Ordering::SeqCst);
        if self.factory.fail_init || (self.factory.fail_reinit && earlier > 0) {
            return Err(CollectError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    async fn process(&mut self, item: &Symbol) -> Result<(), CollectError> {
        let token = item.as_str();
        self.factory.processed.lock().unwrap().push(token.to_string());
        tokio::task::yield_now().await;

        if self.factory.not_found.contains(token) {
            return Err(CollectError::server(404, "not found"));
        }
        if self.factory.throttled.contains(token) {
            return Err(CollectError::server(429, "too many requests"));
        }
        if self.factory.broken.contains(token) {
            return Err(CollectError::Transport("connection reset".to_string()));
        }
        Ok(())
    }

    fn retry(&self, err: &CollectError) -> bool {
        err.is_retryable()
    }

    async fn done(&mut self) -> Result<(), CollectError> {
        if self.factory.fail_done {
            return Err(CollectError::Transport("session close failed".to_string()));
        }
        Ok(())
    }
}

/// 엔진은 `Arc<F>`를 받으므로 테스트가 같은 팩토리를 관찰할 수 있도록 감쌉니다.
struct SharedFactory(Arc<FakeFactory>);

impl WorkerFactory for SharedFactory {
    type Item = Symbol;
    type Worker = FakeWorker;

    fn make_worker(&self, ctx: &WorkerContext) -> Result<FakeWorker, CollectError> {
        self.0.made.fetch_add(1, Ordering::SeqCst);
        self.0
            .proxies
            .lock()
            .unwrap()
            .push(ctx.proxy.as_ref().map(|p| p.address()));
        Ok(FakeWorker {
            factory: Arc::clone(&self.0),
        })
    }
}

fn manager(queue: Arc<MemoryQueue>, tokens: &[&str]) -> QueueWorkItemManager<Symbol> {
    QueueWorkItemManager::new(
        queue,
        QueueSet::for_prefix(PREFIX),
        Arc::new(TokenSeeder::new(tokens.iter().copied())),
    )
}

fn engine(
    manager: QueueWorkItemManager<Symbol>,
    factory: &Arc<FakeFactory>,
) -> ParallelEngine<QueueWorkItemManager<Symbol>, SharedFactory> {
    ParallelEngine::new(
        "test",
        Arc::new(manager),
        Arc::new(SharedFactory(Arc::clone(factory))),
    )
}

async fn members(queue: &MemoryQueue, name: &QueueName) -> Vec<String> {
    let mut members = queue.all(name).await.unwrap();
    members.sort();
    members
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_not_found_item_lands_in_invalid_queue() {
    let queue = Arc::new(MemoryQueue::new());
    let factory = Arc::new(FakeFactory::default().not_found("B"));
    let engine = engine(manager(queue.clone(), &["A", "B", "C"]), &factory);

    let summary = engine.execute(2).await.unwrap();

    assert!(summary
        .to_string()
        .starts_with("Processed: 3, Left: 0, Error: 0"));
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.succeeded, 2);

    let set = QueueSet::for_prefix(PREFIX);
    assert_eq!(members(&queue, &set.invalid).await, vec!["B"]);
    assert!(members(&queue, &set.error).await.is_empty());
    assert!(members(&queue, &set.pending).await.is_empty());
    assert_eq!(factory.processed(), vec!["A", "B", "C"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_item_processed_once_for_any_parallelism() {
    let tokens: Vec<String> = (0..25).map(|i| format!("SYM{:02}", i)).collect();
    let token_refs: Vec<&str> = tokens.iter().map(String::as_str).collect();

    for parallelism in [1, 2, 4, 8, 32] {
        let queue = Arc::new(MemoryQueue::new());
        let factory = Arc::new(FakeFactory::default());
        let engine = engine(manager(queue.clone(), &token_refs), &factory);

        let summary = engine.execute(parallelism).await.unwrap();

        assert_eq!(summary.processed, 25, "parallelism {}", parallelism);
        assert_eq!(summary.remaining, 0);
        assert_eq!(factory.processed().len(), 25);
        assert_eq!(factory.made(), parallelism);
    }
}

#[tokio::test]
async fn test_continue_run_requeues_errors_only() {
    let queue = Arc::new(MemoryQueue::new());
    let set = QueueSet::for_prefix(PREFIX);

    let failing = Arc::new(FakeFactory::default().broken("A").broken("B").not_found("Z"));
    let first = engine(manager(queue.clone(), &["A", "B", "C", "Z"]), &failing);
    let summary = first.execute(2).await.unwrap();
    assert_eq!(summary.errored, 2);
    assert_eq!(members(&queue, &set.error).await, vec!["A", "B"]);
    assert_eq!(members(&queue, &set.invalid).await, vec!["Z"]);

    let healthy = Arc::new(FakeFactory::default());
    let second = engine(
        manager(queue.clone(), &["SHOULD", "NOT", "SEED"]).continue_run(true),
        &healthy,
    );
    let summary = second.execute(2).await.unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(healthy.processed(), vec!["A", "B"]);
    assert!(members(&queue, &set.error).await.is_empty());
    assert_eq!(members(&queue, &set.invalid).await, vec!["Z"]);
}

#[tokio::test]
async fn test_retryable_failure_recreates_worker_and_is_recorded() {
    let queue = Arc::new(MemoryQueue::new());
    let factory = Arc::new(FakeFactory::default().throttled("T"));
    let engine = engine(manager(queue.clone(), &["T"]), &factory);

    let summary = engine.execute(1).await.unwrap();

    assert_eq!(factory.made(), 2);
    assert_eq!(summary.errored, 1);
    let set = QueueSet::for_prefix(PREFIX);
    assert_eq!(members(&queue, &set.error).await, vec!["T"]);
}

#[tokio::test]
async fn test_recreated_worker_keeps_processing() {
    let queue = Arc::new(MemoryQueue::new());
    let factory = Arc::new(FakeFactory::default().throttled("T"));
    let engine = engine(manager(queue.clone(), &["A", "B", "T", "C", "D"]), &factory);

    let summary = engine.execute(1).await.unwrap();

    assert_eq!(summary.processed, 5);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(factory.made(), 2);
}

struct FailingSeeder;

#[async_trait]
impl ItemSeeder for FailingSeeder {
    async fn seed(&self, _queue: &dyn SharedQueue, _pending: &QueueName) -> Result<u64, CollectError> {
        Err(CollectError::Transport("symbol source unreachable".to_string()))
    }
}

#[tokio::test]
async fn test_prepare_failure_starts_no_worker() {
    let queue = Arc::new(MemoryQueue::new());
    let factory = Arc::new(FakeFactory::default());
    let manager = QueueWorkItemManager::new(
        queue.clone(),
        QueueSet::for_prefix(PREFIX),
        Arc::new(FailingSeeder),
    );
    let engine = engine(manager, &factory);

    let err = engine.execute(4).await.unwrap_err();

    assert!(matches!(err, CollectorError::Prepare(_)));
    assert_eq!(factory.made(), 0);
    assert_eq!(engine.state(), EngineState::Done);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_init_failure_reports_every_dispatched_item() {
    let queue = Arc::new(MemoryQueue::new());
    let factory = Arc::new(FakeFactory::default().failing_init());
    let engine = engine(manager(queue.clone(), &["A", "B", "C"]), &factory);

    let err = engine.execute(2).await.unwrap_err();

    match err {
        CollectorError::Incomplete {
            remaining,
            errored,
            worker_failures,
            ..
        } => {
            assert_eq!(worker_failures, 2);
            assert_eq!(remaining + errored, 3);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(factory.processed().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_done_failure_makes_run_incomplete() {
    let queue = Arc::new(MemoryQueue::new());
    let factory = Arc::new(FakeFactory::default().failing_done());
    let engine = engine(manager(queue.clone(), &["A", "B", "C"]), &factory);

    let err = engine.execute(2).await.unwrap_err();

    match err {
        CollectorError::Incomplete {
            remaining,
            errored,
            worker_failures,
            detail,
            ..
        } => {
            assert_eq!(worker_failures, 2);
            assert_eq!(remaining, 0);
            assert_eq!(errored, 0);
            assert!(detail.contains("failed at Done"), "detail: {}", detail);
        }
        other => panic!("unexpected error: {}", other),
    }

    let set = QueueSet::for_prefix(PREFIX);
    let pending = members(&queue, &set.pending).await.len();
    assert_eq!(pending + factory.processed().len(), 3);
    assert_eq!(engine.state(), EngineState::Done);
}

#[tokio::test]
async fn test_recreated_worker_init_failure_makes_run_incomplete() {
    let queue = Arc::new(MemoryQueue::new());
    let factory = Arc::new(
        FakeFactory::default()
            .throttled("T1")
            .throttled("T2")
            .throttled("T3")
            .throttled("T4")
            .failing_reinit(),
    );
    let engine = engine(manager(queue.clone(), &["T1", "T2", "T3", "T4"]), &factory);

    let err = engine.execute(1).await.unwrap_err();

    match err {
        CollectorError::Incomplete {
            remaining,
            errored,
            worker_failures,
            detail,
            ..
        } => {
            assert_eq!(worker_failures, 1);
            assert!(errored >= 1);
            assert_eq!(remaining + errored, 4);
            assert!(detail.contains("failed at Init"), "detail: {}", detail);
        }
        other => panic!("unexpected error: {}", other),
    }

    assert_eq!(factory.made(), 2);
    assert_eq!(factory.processed().len(), 1);
    let set = QueueSet::for_prefix(PREFIX);
    let pending = members(&queue, &set.pending).await.len();
    let errors = members(&queue, &set.error).await.len();
    assert_eq!(pending + errors, 4);
}

#[tokio::test]
async fn test_engine_state_transitions() {
    let queue = Arc::new(MemoryQueue::new());
    let factory = Arc::new(FakeFactory::default());
    let engine = engine(manager(queue, &["A"]), &factory);

    assert_eq!(engine.state(), EngineState::Idle);
    engine.execute(1).await.unwrap();
    assert_eq!(engine.state(), EngineState::Done);
}

#[tokio::test]
async fn test_empty_source_is_not_an_error() {
    let queue = Arc::new(MemoryQueue::new());
    let factory = Arc::new(FakeFactory::default());
    let engine = engine(manager(queue, &[]), &factory);

    let summary = engine.execute(3).await.unwrap();

    assert_eq!(summary, RunSummary::default());
    assert_eq!(factory.made(), 3);
}

#[tokio::test]
async fn test_proxies_assigned_one_per_worker() {
    let queue = Arc::new(MemoryQueue::with_members(
        &QueueName::PROXIES,
        ["10.0.0.1:8080", "10.0.0.2:8080", "10.0.0.3:8080"],
    ));
    let factory = Arc::new(FakeFactory::default());
    let engine = engine(manager(queue.clone(), &["A", "B"]), &factory)
        .with_proxies(queue.clone(), QueueName::PROXIES);

    engine.execute(2).await.unwrap();

    let proxies = factory.proxies.lock().unwrap().clone();
    assert_eq!(proxies.len(), 2);
    assert!(proxies.iter().all(Option::is_some));
    assert_ne!(proxies[0], proxies[1]);
    assert_eq!(queue.length(&QueueName::PROXIES).await.unwrap(), 1);
}

#[tokio::test]
async fn test_workers_connect_directly_without_proxies() {
    let queue = Arc::new(MemoryQueue::new());
    let factory = Arc::new(FakeFactory::default());
    let engine = engine(manager(queue.clone(), &["A"]), &factory)
        .with_proxies(queue.clone(), QueueName::PROXIES);

    engine.execute(2).await.unwrap();

    let proxies = factory.proxies.lock().unwrap().clone();
    assert_eq!(proxies, vec![None, None]);
}

/// 일정 수의 항목을 준 뒤 큐 에러를 내는 매니저
struct FlakyManager {
    items: Mutex<VecDeque<Symbol>>,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl FlakyManager {
    fn new(tokens: &[&str]) -> Self {
        Self {
            items: Mutex::new(tokens.iter().map(|t| Symbol::new(*t)).collect()),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl WorkItemManager for FlakyManager {
    type Item = Symbol;

    async fn prepare(&self) -> Result<(), CollectError> {
        Ok(())
    }

    async fn next(&self) -> Result<Option<Symbol>, CollectError> {
        let next = self.items.lock().unwrap().pop_front();
        next.map(Some)
            .ok_or_else(|| CollectError::Transport("queue connection lost".to_string()))
    }

    async fn size(&self) -> Result<u64, CollectError> {
        Ok(self.items.lock().unwrap().len() as u64)
    }

    async fn on_process_error(&self, _item: &Symbol, _err: &CollectError) -> Result<(), CollectError> {
        self.failed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_process_success(&self, _item: &Symbol) -> Result<(), CollectError> {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn summary(&self) -> Result<RunSummary, CollectError> {
        let succeeded = self.succeeded.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        Ok(RunSummary {
            processed: succeeded + failed,
            succeeded,
            errored: failed,
            ..Default::default()
        })
    }

    async fn report(&self) -> Result<QueueReport, CollectError> {
        Ok(QueueReport::default())
    }
}

#[tokio::test]
async fn test_dispatcher_queue_error_still_drains_dispatched_items() {
    let manager = Arc::new(FlakyManager::new(&["A", "B"]));
    let factory = Arc::new(FakeFactory::default());
    let engine = ParallelEngine::new(
        "flaky",
        Arc::clone(&manager),
        Arc::new(SharedFactory(Arc::clone(&factory))),
    );

    let err = engine.execute(2).await.unwrap_err();

    match err {
        CollectorError::Incomplete { detail, .. } => {
            assert!(detail.contains("dispatcher stopped"), "detail: {}", detail)
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(manager.succeeded.load(Ordering::SeqCst), 2);
    assert_eq!(factory.processed(), vec!["A", "B"]);
}
