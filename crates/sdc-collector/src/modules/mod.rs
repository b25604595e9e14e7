//! 수집 모듈.
//!
//! 각 수집기를 엔진에 연결해 한 번 실행하는 진입점을 제공합니다.
//! 페이지 다운로드, 가격 이력, 티커 목록, HTML 표 파싱 수집기가 있습니다.

pub mod history_prices;
pub mod html_pages;
pub mod nd_tickers;
pub mod sa_pages;
pub mod symbols;

use sdc_core::{CollectError, QueueName, QueueSet, Symbol};
use sdc_data::{
    DbExporter, Exporters, FileExporter, PgLoader, QueueExporter, SharedQueue, SharedQueueRef,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{CollectorConfig, RunOptions};
use crate::engine::{ParallelEngine, WorkItemManager, WorkerFactory};
use crate::error::{CollectorError, Result};
use crate::manager::{QueueWorkItemManager, TokenSeeder};
use crate::stats::{QueueReport, RunSummary};

pub use history_prices::{HistoryPriceWorkerFactory, OPENBB_PREFIX};
pub use html_pages::{
    html_queue_set, HtmlPageSeeder, HtmlPageWorkerFactory, HttpPageParser, PagePath, PageParser,
};
pub use nd_tickers::{NdTickerWorkerFactory, ScreenerFile, TickerRow, ND_PREFIX};
pub use sa_pages::{ProxyLoader, SaPageWorkerFactory, SA_PREFIX};
pub use symbols::SymbolSeeder;

/// 실행 결과와 (요청 시) 실행 후 큐 내용
#[derive(Debug)]
pub struct RunOutcome {
    pub result: Result<RunSummary>,
    pub report: Option<QueueReport>,
}

/// 재무제표 페이지 다운로드 실행
pub async fn collect_sa_pages(
    config: &CollectorConfig,
    options: &RunOptions,
    queue: SharedQueueRef,
    loader: Option<Arc<PgLoader>>,
) -> RunOutcome {
    let mut manager = symbol_manager(config, options, queue.clone(), SA_PREFIX, loader);
    if let Some(path) = &options.proxy_file {
        manager = manager.with_prepare_step(Arc::new(ProxyLoader::new(path, config.proxy.clone())));
    }

    let factory = SaPageWorkerFactory::new(&config.data_dir);
    let engine = ParallelEngine::new("sa_pages", Arc::new(manager), Arc::new(factory))
        .with_channel_factor(config.channel_factor)
        .with_proxies(queue, QueueName::PROXIES);

    run_engine(engine, options).await
}

/// 가격 이력 수집 실행
///
/// 결과는 파일로 저장하고, DB 연결이 있으면 DB에도 적재합니다.
pub async fn collect_history_prices(
    config: &CollectorConfig,
    options: &RunOptions,
    queue: SharedQueueRef,
    loader: Option<Arc<PgLoader>>,
) -> RunOutcome {
    let mut exporters = Exporters::new().with(FileExporter::new(&config.data_dir));
    if let Some(loader) = &loader {
        exporters = exporters.with(DbExporter::new(Arc::clone(loader)));
    }

    let manager = symbol_manager(config, options, queue, OPENBB_PREFIX, loader);
    let factory = HistoryPriceWorkerFactory::new(&config.openbb_url, Arc::new(exporters));
    let engine = ParallelEngine::new("history_prices", Arc::new(manager), Arc::new(factory))
        .with_channel_factor(config.channel_factor);

    run_engine(engine, options).await
}

/// NASDAQ 스크리너 CSV에서 티커 목록 수집
///
/// 행마다 `<data_dir>/<YYYYMMDD>/tickers/<SYMBOL>/nd_tickers.json`으로 저장하고,
/// DB 연결이 있으면 DB에도 적재하며, 심볼을 기준 집합(`SYMBOLS`)에 추가합니다.
pub async fn collect_nd_tickers(
    config: &CollectorConfig,
    options: &RunOptions,
    queue: SharedQueueRef,
    loader: Option<Arc<PgLoader>>,
    screener: &Path,
) -> RunOutcome {
    let file = match ScreenerFile::read(screener).await {
        Ok(file) => file,
        Err(e) => return prepare_failed(e),
    };

    let date = chrono::Local::now().format("%Y%m%d").to_string();
    let mut exporters =
        Exporters::new().with(FileExporter::new(config.data_dir.join(date).join("tickers")));
    if let Some(loader) = &loader {
        exporters = exporters.with(DbExporter::new(Arc::clone(loader)));
    }
    exporters = exporters.with(QueueExporter::new(queue.clone(), QueueName::SYMBOLS));

    let manager = QueueWorkItemManager::<TickerRow>::new(
        queue,
        QueueSet::for_prefix(ND_PREFIX),
        Arc::new(TokenSeeder::new(file.rows)),
    )
    .continue_run(options.continue_run);
    let factory = NdTickerWorkerFactory::new(file.keys, Arc::new(exporters));
    let engine = ParallelEngine::new("nd_tickers", Arc::new(manager), Arc::new(factory))
        .with_channel_factor(config.channel_factor);

    run_engine(engine, options).await
}

/// 다운로드한 HTML 페이지의 표 파싱
///
/// `pages_dir` 아래 `<SYMBOL>/<page>.html` 파일을 파싱 서비스로 보내고 결과를
/// `<data_dir>/<YYYYMMDD>/tables`와 (연결이 있으면) DB에 저장합니다.
pub async fn collect_html_pages(
    config: &CollectorConfig,
    options: &RunOptions,
    queue: SharedQueueRef,
    loader: Option<Arc<PgLoader>>,
    pages_dir: &Path,
) -> RunOutcome {
    let parser = match HttpPageParser::new(&config.scraper_url) {
        Ok(parser) => parser,
        Err(e) => return prepare_failed(e),
    };

    let date = chrono::Local::now().format("%Y%m%d").to_string();
    let mut exporters =
        Exporters::new().with(FileExporter::new(config.data_dir.join(date).join("tables")));
    if let Some(loader) = &loader {
        exporters = exporters.with(DbExporter::new(Arc::clone(loader)));
    }

    let manager = QueueWorkItemManager::<PagePath>::new(
        queue,
        html_queue_set(),
        Arc::new(HtmlPageSeeder::new(pages_dir)),
    )
    .continue_run(options.continue_run);
    let factory = HtmlPageWorkerFactory::new(Arc::new(parser), Arc::new(exporters));
    let engine = ParallelEngine::new("html_pages", Arc::new(manager), Arc::new(factory))
        .with_channel_factor(config.channel_factor);

    run_engine(engine, options).await
}

fn prepare_failed(err: CollectError) -> RunOutcome {
    RunOutcome {
        result: Err(CollectorError::Prepare(err)),
        report: None,
    }
}

fn symbol_manager(
    config: &CollectorConfig,
    options: &RunOptions,
    queue: SharedQueueRef,
    prefix: &str,
    loader: Option<Arc<PgLoader>>,
) -> QueueWorkItemManager<Symbol> {
    let mut seeder = SymbolSeeder::new(options.seed_order(&config.tickers_table));
    if let Some(loader) = loader {
        seeder = seeder.with_loader(loader);
    }
    QueueWorkItemManager::new(queue, QueueSet::for_prefix(prefix), Arc::new(seeder))
        .continue_run(options.continue_run)
}

async fn run_engine<M, F>(engine: ParallelEngine<M, F>, options: &RunOptions) -> RunOutcome
where
    M: WorkItemManager,
    F: WorkerFactory<Item = M::Item>,
{
    let result = engine.execute(options.parallelism).await;

    let report = if options.report {
        match engine.manager().report().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Failed to read queue report");
                None
            }
        }
    } else {
        None
    };

    RunOutcome { result, report }
}

/// 수집기 파티션의 현재 내용
pub async fn queue_report(queue: SharedQueueRef, set: QueueSet) -> Result<QueueReport> {
    let manager =
        QueueWorkItemManager::<Symbol>::new(queue, set, Arc::new(TokenSeeder::default()));
    manager.report().await.map_err(CollectorError::Queue)
}

/// 모든 수집기 파티션과 기준/프록시 파티션을 삭제합니다.
///
/// 삭제한 파티션 수를 반환합니다.
pub async fn reset_cache(queue: &dyn SharedQueue) -> Result<usize> {
    let mut names = vec![QueueName::SYMBOLS, QueueName::PROXIES];
    let sets = [SA_PREFIX, OPENBB_PREFIX, ND_PREFIX]
        .map(QueueSet::for_prefix)
        .into_iter()
        .chain([html_queue_set()]);
    for set in sets {
        names.extend(set.all().into_iter().cloned());
    }

    for name in &names {
        queue.delete_queue(name).await?;
    }
    info!(partitions = names.len(), "Cache reset");
    Ok(names.len())
}
