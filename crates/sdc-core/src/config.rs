//! 설정 관리.
//!
//! 기본값 → TOML 파일(선택) → `SDC__` 접두사 환경 변수 순으로 덮어씁니다.
//! 예: `SDC__COLLECTOR__PARALLELISM=8`

use serde::{Deserialize, Serialize};
use std::path::Path;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 공유 큐(Redis) 설정
    #[serde(default)]
    pub redis: RedisSettings,
    /// 관계형 저장소 설정
    #[serde(default)]
    pub database: DatabaseSettings,
    /// 수집기 설정
    #[serde(default)]
    pub collector: CollectorSettings,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Redis 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisSettings {
    /// Redis URL (redis://host:port/db)
    pub url: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
        }
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    /// PostgreSQL URL
    pub url: String,
    /// 수집 결과를 적재할 스키마
    pub schema: String,
    /// 최대 연결 수
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/sdc".to_string(),
            schema: "sdc".to_string(),
            max_connections: 5,
        }
    }
}

/// 수집기 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorSettings {
    /// 기본 병렬 워커 수
    pub parallelism: usize,
    /// 다운로드/내보내기 결과 디렉토리
    pub data_dir: String,
    /// 프록시 검증용 canary URL
    pub proxy_canary_url: String,
    /// 프록시 검증 타임아웃 (초)
    pub proxy_probe_timeout_secs: u64,
    /// 동시 프록시 검사 수
    pub proxy_probers: usize,
    /// 채널 용량 = 병렬 수 × 이 값
    pub channel_factor: usize,
    /// 가격 이력 REST API 주소
    pub openbb_url: String,
    /// HTML 재무표 파싱 서비스 주소
    pub scraper_url: String,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            parallelism: 1,
            data_dir: "data".to_string(),
            proxy_canary_url: "http://example.com".to_string(),
            proxy_probe_timeout_secs: 5,
            proxy_probers: 20,
            channel_factor: 4,
            openbb_url: "http://openbb:6900".to_string(),
            scraper_url: "http://scraper:8000".to_string(),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일(선택)과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&AppConfig::default())?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SDC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
