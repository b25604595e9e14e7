//! 일봉 가격 이력 수집.
//!
//! REST API에서 심볼별 가격 이력을 받아 `results` 배열만 꺼낸 뒤
//! 내보내기 대상(파일, DB)에 기록합니다. 실패한 항목은 재시도하지 않습니다.

use async_trait::async_trait;
use sdc_core::{CollectError, Symbol};
use sdc_data::{Exporter, HttpReader};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::{Worker, WorkerContext, WorkerFactory};

/// 이 수집기의 파티션 접두사
pub const OPENBB_PREFIX: &str = "OPENBB";

pub const HISTORY_PRICE_PATH: &str = "/api/v1/equity/price/historical";
pub const HISTORY_PRICE_TABLE: &str = "history_price";
const HISTORY_PRICE_ENTITY: &str = "HistoryPrice";

const START_DATE: &str = "2010-01-01";

/// 가격 이력 다운로드 워커
pub struct HistoryPriceWorker {
    endpoint: String,
    exporter: Arc<dyn Exporter>,
    reader: Option<HttpReader>,
}

impl HistoryPriceWorker {
    fn params<'a>(symbol: &'a str) -> [(&'static str, &'a str); 13] {
        [
            ("chart", "false"),
            ("provider", "yfinance"),
            ("symbol", symbol),
            ("start_date", START_DATE),
            ("interval", "1d"),
            ("adjustment", "splits_only"),
            ("extended_hours", "false"),
            ("use_cache", "true"),
            ("timezone", "America/New_York"),
            ("source", "realtime"),
            ("sort", "asc"),
            ("limit", "49999"),
            ("include_actions", "true"),
        ]
    }
}

/// 응답 본문에서 `results` 배열을 꺼내 들여쓰기된 JSON으로 만듭니다.
pub fn extract_results(body: &str) -> Result<String, CollectError> {
    let mut response: Value = serde_json::from_str(body)?;
    let results = response
        .get_mut("results")
        .map(Value::take)
        .ok_or_else(|| CollectError::Validation("response has no results".to_string()))?;
    if !results.is_array() {
        return Err(CollectError::Validation(
            "results is not an array".to_string(),
        ));
    }
    Ok(serde_json::to_string_pretty(&results)?)
}

#[async_trait]
impl Worker for HistoryPriceWorker {
    type Item = Symbol;

    async fn init(&mut self) -> Result<(), CollectError> {
        self.reader = Some(HttpReader::direct()?);
        Ok(())
    }

    async fn process(&mut self, symbol: &Symbol) -> Result<(), CollectError> {
        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| CollectError::Item("worker not initialised".to_string()))?;

        let body = reader
            .read(&self.endpoint, &Self::params(symbol.as_str()))
            .await?;
        let normalised = extract_results(&body)?;
        debug!(symbol = %symbol, bytes = normalised.len(), "Price history received");

        self.exporter
            .export(
                HISTORY_PRICE_ENTITY,
                HISTORY_PRICE_TABLE,
                &normalised,
                symbol.as_str(),
            )
            .await?;

        info!(symbol = %symbol, "Price history exported");
        Ok(())
    }

    fn retry(&self, _err: &CollectError) -> bool {
        false
    }

    async fn done(&mut self) -> Result<(), CollectError> {
        self.reader = None;
        Ok(())
    }
}

/// 가격 이력 워커 팩토리
#[derive(Clone)]
pub struct HistoryPriceWorkerFactory {
    endpoint: String,
    exporter: Arc<dyn Exporter>,
}

impl HistoryPriceWorkerFactory {
    /// `base_url`은 API 서버 주소 (예: `http://openbb:6900`)
    pub fn new(base_url: &str, exporter: Arc<dyn Exporter>) -> Self {
        Self {
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), HISTORY_PRICE_PATH),
            exporter,
        }
    }
}

impl WorkerFactory for HistoryPriceWorkerFactory {
    type Item = Symbol;
    type Worker = HistoryPriceWorker;

    fn make_worker(&self, _ctx: &WorkerContext) -> Result<HistoryPriceWorker, CollectError> {
        Ok(HistoryPriceWorker {
            endpoint: self.endpoint.clone(),
            exporter: Arc::clone(&self.exporter),
            reader: None,
        })
    }
}
