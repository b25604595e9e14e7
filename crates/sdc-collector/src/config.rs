//! 설정 모듈.
//!
//! `AppConfig`(기본값 → 설정 파일 → `SDC__*` 환경변수)를 읽은 뒤
//! `.env`와 일반 환경변수(`REDIS_URL`, `DATABASE_URL` 등)로 덮어씁니다.

use sdc_core::{AppConfig, DatabaseSettings, LoggingSettings, QueueName};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CollectorError, Result};

/// 심볼 목록을 읽어 올 기본 테이블
pub const DEFAULT_TICKERS_TABLE: &str = "nd_tickers";

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 공유 큐 Redis URL
    pub redis_url: String,
    /// 관계형 저장소 설정
    pub database: DatabaseSettings,
    /// 다운로드/내보내기 디렉토리
    pub data_dir: PathBuf,
    /// 가격 이력 REST API 주소
    pub openbb_url: String,
    /// HTML 재무표 파싱 서비스 주소
    pub scraper_url: String,
    /// 심볼 테이블 (DB 원천)
    pub tickers_table: String,
    /// 기본 병렬 워커 수
    pub default_parallelism: usize,
    /// 채널 용량 = 병렬 수 × 이 값
    pub channel_factor: usize,
    /// 프록시 검증 설정
    pub proxy: ProxyProbeConfig,
    /// 로깅 설정 (CLI 인자로 덮어쓸 수 있음)
    pub logging: LoggingSettings,
}

/// 프록시 검증 설정
#[derive(Debug, Clone)]
pub struct ProxyProbeConfig {
    pub canary_url: String,
    pub timeout_secs: u64,
    pub probers: usize,
}

impl ProxyProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CollectorConfig {
    /// 설정 파일(선택)과 환경변수에서 설정 로드
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let app = AppConfig::load(path).map_err(|e| CollectorError::Config(e.to_string()))?;
        let mut config = Self::from_app(&app);

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        config.database.schema = env_var_parse("SDC_SCHEMA", config.database.schema);
        config.data_dir = env_var_parse("SDC_DATA_DIR", config.data_dir);
        config.openbb_url = env_var_parse("OPENBB_URL", config.openbb_url);
        config.scraper_url = env_var_parse("SCRAPER_URL", config.scraper_url);
        config.tickers_table = env_var_parse("SDC_TICKERS_TABLE", config.tickers_table);

        if config.channel_factor == 0 {
            return Err(CollectorError::Config(
                "channel_factor는 1 이상이어야 합니다".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn from_app(app: &AppConfig) -> Self {
        let collector = &app.collector;
        Self {
            redis_url: app.redis.url.clone(),
            database: app.database.clone(),
            data_dir: PathBuf::from(&collector.data_dir),
            openbb_url: collector.openbb_url.clone(),
            scraper_url: collector.scraper_url.clone(),
            tickers_table: DEFAULT_TICKERS_TABLE.to_string(),
            default_parallelism: collector.parallelism.max(1),
            channel_factor: collector.channel_factor,
            proxy: ProxyProbeConfig {
                canary_url: collector.proxy_canary_url.clone(),
                timeout_secs: collector.proxy_probe_timeout_secs,
                probers: collector.proxy_probers.max(1),
            },
            logging: app.logging.clone(),
        }
    }
}

/// 콜드 스타트 시 대기 큐를 채울 원천
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolSource {
    /// 심볼 하나만 처리
    Single(String),
    /// 티커 목록 JSON 파일
    File(PathBuf),
    /// 기준 파티션 복사 (비어 있으면 건너뜀)
    Queue(QueueName),
    /// `SELECT DISTINCT partition_key FROM <schema>.<table>`
    Database { table: String },
}

/// 한 번의 실행 옵션 (CLI 인자에서 생성)
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// 워커 수
    pub parallelism: usize,
    /// 이전 실행의 에러 큐만 다시 처리
    pub continue_run: bool,
    /// 특정 심볼만 처리
    pub single_symbol: Option<String>,
    /// 티커 목록 JSON 파일
    pub tickers_json: Option<PathBuf>,
    /// 프록시 후보 파일
    pub proxy_file: Option<PathBuf>,
    /// 실행 후 큐 내용 출력
    pub report: bool,
}

impl RunOptions {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            continue_run: false,
            single_symbol: None,
            tickers_json: None,
            proxy_file: None,
            report: false,
        }
    }

    /// 콜드 스타트가 DB 테이블까지 내려갈 수 있는지 여부
    pub fn may_read_database(&self) -> bool {
        !self.continue_run && self.single_symbol.is_none() && self.tickers_json.is_none()
    }

    /// 콜드 스타트 원천을 시도 순서대로 반환합니다.
    ///
    /// 심볼 지정 → 티커 파일 → 기준 파티션(비어 있지 않을 때) → DB 테이블
    pub fn seed_order(&self, tickers_table: &str) -> Vec<SymbolSource> {
        if let Some(symbol) = &self.single_symbol {
            return vec![SymbolSource::Single(symbol.clone())];
        }
        if let Some(path) = &self.tickers_json {
            return vec![SymbolSource::File(path.clone())];
        }
        vec![
            SymbolSource::Queue(QueueName::SYMBOLS),
            SymbolSource::Database {
                table: tickers_table.to_string(),
            },
        ]
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
