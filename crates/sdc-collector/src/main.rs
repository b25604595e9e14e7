//! 병렬 주식 데이터 수집 CLI.

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sdc_collector::modules::{self, RunOutcome, ND_PREFIX, OPENBB_PREFIX, SA_PREFIX};
use sdc_collector::{CollectorConfig, RunOptions};
use sdc_core::{init_logging, LogConfig, LogFormat, QueueSet};
use sdc_data::{PgLoader, RedisConfig, RedisQueue, SharedQueueRef};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sdc-collector")]
#[command(about = "Parallel Stock Data Collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 로그 형식 (pretty, json, compact)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// 설정 파일 경로 (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// 재무제표 페이지 다운로드 (프록시 사용)
    Pages(RunArgs),

    /// 가격 이력 수집 (파일 + DB 적재)
    Prices(RunArgs),

    /// NASDAQ 스크리너 CSV에서 티커 목록 수집
    Tickers {
        /// 스크리너 CSV 파일
        #[arg(long)]
        file: PathBuf,

        #[command(flatten)]
        run: EngineArgs,
    },

    /// 다운로드한 HTML 페이지의 재무표 파싱
    Scrape {
        /// `<SYMBOL>/<page>.html` 파일이 있는 디렉토리
        #[arg(long)]
        dir: PathBuf,

        #[command(flatten)]
        run: EngineArgs,
    },

    /// 수집 스키마에 SQL 조회 실행 (행마다 JSON 한 줄)
    Query {
        #[arg(long)]
        sql: String,
    },

    /// 모든 수집기 큐 파티션 삭제
    ResetCache,

    /// 수집 스키마 삭제
    ResetDb,

    /// 수집기 큐 내용 출력
    Report {
        #[arg(value_enum)]
        collector: CollectorKind,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// 병렬 워커 수 (기본값: 설정 파일)
    #[arg(long)]
    parallel: Option<usize>,

    /// 이전 실행의 에러 큐만 다시 처리
    #[arg(long = "continue")]
    continue_run: bool,

    /// 티커 목록 JSON 파일
    #[arg(long)]
    tickers_json: Option<PathBuf>,

    /// 특정 심볼만 처리 (예: "AAPL")
    #[arg(long)]
    symbol: Option<String>,

    /// 프록시 후보 파일 (host:port[:user:pass])
    #[arg(long)]
    proxy: Option<PathBuf>,

    /// 실행 후 큐 내용 출력
    #[arg(long)]
    report: bool,
}

/// 심볼 원천이 따로 있는 수집기의 공통 인자
#[derive(Args, Debug)]
struct EngineArgs {
    /// 병렬 워커 수 (기본값: 설정 파일)
    #[arg(long)]
    parallel: Option<usize>,

    /// 이전 실행의 에러 큐만 다시 처리
    #[arg(long = "continue")]
    continue_run: bool,

    /// 실행 후 큐 내용 출력
    #[arg(long)]
    report: bool,
}

impl EngineArgs {
    fn into_options(self, default_parallelism: usize) -> RunOptions {
        let mut options = RunOptions::new(self.parallel.unwrap_or(default_parallelism));
        options.continue_run = self.continue_run;
        options.report = self.report;
        options
    }
}

impl RunArgs {
    fn into_options(self, default_parallelism: usize) -> RunOptions {
        let mut options = RunOptions::new(self.parallel.unwrap_or(default_parallelism));
        options.continue_run = self.continue_run;
        options.single_symbol = self.symbol;
        options.tickers_json = self.tickers_json;
        options.proxy_file = self.proxy;
        options.report = self.report;
        options
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CollectorKind {
    Pages,
    Prices,
    Tickers,
    Scrape,
}

impl CollectorKind {
    fn queue_set(self) -> QueueSet {
        match self {
            Self::Pages => QueueSet::for_prefix(SA_PREFIX),
            Self::Prices => QueueSet::for_prefix(OPENBB_PREFIX),
            Self::Tickers => QueueSet::for_prefix(ND_PREFIX),
            Self::Scrape => modules::html_queue_set(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CollectorConfig::load(cli.config.as_deref())?;

    // 로깅 초기화 (CLI 인자가 설정 파일보다 우선)
    let mut log_config = LogConfig::from_settings(&config.logging);
    if let Some(level) = &cli.log_level {
        log_config.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        log_config = log_config.with_format(format.parse::<LogFormat>().map_err(|e| anyhow!(e))?);
    }
    init_logging(log_config).map_err(|e| anyhow!("로깅 초기화 실패: {}", e))?;

    tracing::info!("SDC Collector 시작");
    tracing::debug!(redis_url = %config.redis_url, data_dir = %config.data_dir.display(), "설정 로드 완료");

    match cli.command {
        Commands::Pages(args) => {
            let options = args.into_options(config.default_parallelism);
            let queue = connect_queue(&config).await?;
            let loader = if options.may_read_database() {
                connect_database_optional(&config).await
            } else {
                None
            };

            let outcome = modules::collect_sa_pages(&config, &options, queue, loader.clone()).await;
            close(loader).await;
            finish("페이지 다운로드", outcome)?;
        }
        Commands::Prices(args) => {
            let options = args.into_options(config.default_parallelism);
            let queue = connect_queue(&config).await?;
            let loader = Arc::new(
                PgLoader::connect(&config.database)
                    .await
                    .context("데이터베이스 연결 실패")?,
            );
            loader.create_schema().await?;

            let outcome =
                modules::collect_history_prices(&config, &options, queue, Some(loader.clone()))
                    .await;
            close(Some(loader)).await;
            finish("가격 이력 수집", outcome)?;
        }
        Commands::Tickers { file, run } => {
            let options = run.into_options(config.default_parallelism);
            let queue = connect_queue(&config).await?;
            let loader = connect_database_optional(&config).await;

            let outcome =
                modules::collect_nd_tickers(&config, &options, queue, loader.clone(), &file).await;
            close(loader).await;
            finish("티커 목록 수집", outcome)?;
        }
        Commands::Scrape { dir, run } => {
            let options = run.into_options(config.default_parallelism);
            let queue = connect_queue(&config).await?;
            let loader = connect_database_optional(&config).await;

            let outcome =
                modules::collect_html_pages(&config, &options, queue, loader.clone(), &dir).await;
            close(loader).await;
            finish("HTML 표 파싱", outcome)?;
        }
        Commands::Query { sql } => {
            let loader = PgLoader::connect(&config.database)
                .await
                .context("데이터베이스 연결 실패")?;
            let rows = loader.run_query(&sql).await;
            loader.disconnect().await;
            for row in rows? {
                println!("{}", row);
            }
        }
        Commands::ResetCache => {
            let queue = connect_queue(&config).await?;
            let cleared = modules::reset_cache(queue.as_ref()).await?;
            tracing::info!(cleared, "캐시 초기화 완료");
        }
        Commands::ResetDb => {
            let loader = PgLoader::connect(&config.database)
                .await
                .context("데이터베이스 연결 실패")?;
            loader.drop_schema().await?;
            loader.disconnect().await;
            tracing::info!(schema = %config.database.schema, "스키마 삭제 완료");
        }
        Commands::Report { collector } => {
            let queue = connect_queue(&config).await?;
            let report = modules::queue_report(queue, collector.queue_set()).await?;
            println!("{}", report);
        }
    }

    tracing::info!("SDC Collector 종료");
    Ok(())
}

async fn connect_queue(config: &CollectorConfig) -> anyhow::Result<SharedQueueRef> {
    let queue = RedisQueue::connect(&RedisConfig {
        url: config.redis_url.clone(),
    })
    .await
    .context("Redis 연결 실패")?;
    tracing::info!("Redis 연결 성공");
    Ok(Arc::new(queue))
}

/// 심볼 테이블이 필요할 수도 있는 실행에서만 사용합니다. 실패해도 계속 진행합니다.
async fn connect_database_optional(config: &CollectorConfig) -> Option<Arc<PgLoader>> {
    match PgLoader::connect(&config.database).await {
        Ok(loader) => {
            tracing::info!("데이터베이스 연결 성공");
            Some(Arc::new(loader))
        }
        Err(e) => {
            tracing::warn!(error = %e, "데이터베이스 연결 실패, 다른 심볼 원천만 사용합니다");
            None
        }
    }
}

async fn close(loader: Option<Arc<PgLoader>>) {
    if let Some(loader) = loader {
        loader.disconnect().await;
    }
}

fn finish(job: &str, outcome: RunOutcome) -> anyhow::Result<()> {
    if let Some(report) = &outcome.report {
        println!("{}", report);
    }
    match outcome.result {
        Ok(summary) => {
            println!("{}", summary);
            tracing::info!("{} 완료", job);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "{} 미완료", job);
            Err(e.into())
        }
    }
}
