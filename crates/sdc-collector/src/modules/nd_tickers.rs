//! NASDAQ 스크리너 CSV에서 티커 목록 수집.
//!
//! 헤더 행에서 키를 만들고(공백 제거, 예: `IPO Year` → `IPOYear`), 같은 회사의
//! 중복 행을 걸러낸 뒤 행 하나를 작업 항목 하나로 분배합니다. 워커는 행을 필요한
//! 필드만 담은 JSON 객체로 바꿔 `nd_tickers`로 내보내고 심볼을 기준 집합에 추가합니다.

use async_trait::async_trait;
use csv::ReaderBuilder;
use sdc_core::{CollectError, WorkItem};
use sdc_data::Exporter;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::{Worker, WorkerContext, WorkerFactory};

/// 이 수집기의 파티션 접두사
pub const ND_PREFIX: &str = "ND";

pub const ND_TICKERS_TABLE: &str = "nd_tickers";
const ND_TICKER_ENTITY: &str = "NDTicker";

/// 내보내는 필드 (헤더 키 기준)
const TICKER_FIELDS: [&str; 6] = ["Symbol", "Name", "Country", "IPOYear", "Sector", "Industry"];

/// CSV 한 줄을 필드로 나눕니다. 따옴표 안의 쉼표는 구분자가 아닙니다.
fn split_row(line: &str) -> Result<Vec<String>, CollectError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    match reader.records().next() {
        Some(record) => {
            let record = record.map_err(|e| CollectError::Validation(e.to_string()))?;
            Ok(record.iter().map(str::to_string).collect())
        }
        None => Ok(Vec::new()),
    }
}

/// 스크리너 CSV 한 행
///
/// 토큰은 원본 행 전체이고, 로그와 진행 표시는 심볼로 합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerRow {
    row: String,
    symbol: String,
}

impl TickerRow {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn fields(&self) -> Result<Vec<String>, CollectError> {
        split_row(&self.row)
    }
}

impl fmt::Display for TickerRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

impl WorkItem for TickerRow {
    fn from_token(token: String) -> Self {
        let row = token.trim_end_matches('\r').to_string();
        let symbol = split_row(&row)
            .ok()
            .and_then(|fields| fields.into_iter().next())
            .map(|symbol| symbol.trim().to_string())
            .unwrap_or_default();
        Self { row, symbol }
    }

    fn token(&self) -> String {
        self.row.clone()
    }
}

/// 헤더 키와 중복 제거된 데이터 행
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenerFile {
    pub keys: Vec<String>,
    pub rows: Vec<String>,
}

impl ScreenerFile {
    pub async fn read(path: &Path) -> Result<Self, CollectError> {
        let text = tokio::fs::read_to_string(path).await?;
        let file = Self::parse(&text)?;
        info!(
            path = %path.display(),
            keys = file.keys.len(),
            rows = file.rows.len(),
            "Screener file loaded"
        );
        Ok(file)
    }

    /// 첫 번째 비어 있지 않은 줄이 헤더입니다.
    pub fn parse(text: &str) -> Result<Self, CollectError> {
        let mut lines = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty());

        let Some(header) = lines.next() else {
            return Ok(Self::default());
        };
        let keys = split_row(header)?
            .iter()
            .map(|key| key.chars().filter(|c| !c.is_whitespace()).collect())
            .collect();

        Ok(Self {
            keys,
            rows: remove_duplicate_rows(lines)?,
        })
    }
}

/// 회사명 첫 단어가 같은 행은 한 번만 남깁니다.
///
/// 먼저 나온 행의 심볼이 새 심볼을 포함하면(예: `GOOGL`과 `GOOG`) 더 짧은 새 행으로
/// 바꾸고, 아니면 먼저 나온 행을 유지합니다. 열이 2개 미만인 행은 에러입니다.
fn remove_duplicate_rows<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Vec<String>, CollectError> {
    let mut rows: Vec<(String, String)> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for line in lines {
        let fields = split_row(line)?;
        if fields.len() < 2 {
            return Err(CollectError::Validation(format!(
                "expected at least 2 columns, got {}: {}",
                fields.len(),
                line
            )));
        }
        let symbol = fields[0].trim().to_string();
        let short_name = fields[1].split_whitespace().next().unwrap_or_default().to_string();

        match by_name.get(&short_name).copied() {
            Some(index) => {
                let (existing, _) = &rows[index];
                if existing.contains(symbol.as_str()) {
                    debug!(kept = %symbol, dropped = %existing, "Duplicate ticker replaced");
                    rows[index] = (symbol, line.to_string());
                } else {
                    debug!(kept = %existing, dropped = %symbol, "Duplicate ticker skipped");
                }
            }
            None => {
                by_name.insert(short_name, rows.len());
                rows.push((symbol, line.to_string()));
            }
        }
    }

    Ok(rows.into_iter().map(|(_, row)| row).collect())
}

/// 행을 `[{"Symbol": .., "Name": .., ..}]` JSON으로 바꿉니다.
pub fn ticker_json(keys: &[String], row: &TickerRow) -> Result<String, CollectError> {
    let values = row.fields()?;
    if values.len() != keys.len() {
        return Err(CollectError::Validation(format!(
            "inconsistent keys and values: {} keys, {} values",
            keys.len(),
            values.len()
        )));
    }

    let object: Map<String, Value> = keys
        .iter()
        .zip(values)
        .filter(|(key, _)| TICKER_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), Value::String(value.trim().to_string())))
        .collect();
    Ok(serde_json::to_string_pretty(&Value::Array(vec![Value::Object(object)]))?)
}

/// 티커 행 변환 워커
pub struct NdTickerWorker {
    keys: Arc<Vec<String>>,
    exporter: Arc<dyn Exporter>,
}

#[async_trait]
impl Worker for NdTickerWorker {
    type Item = TickerRow;

    async fn init(&mut self) -> Result<(), CollectError> {
        Ok(())
    }

    async fn process(&mut self, row: &TickerRow) -> Result<(), CollectError> {
        if row.symbol().is_empty() {
            return Err(CollectError::Validation("row without symbol".to_string()));
        }
        let data = ticker_json(&self.keys, row)?;
        self.exporter
            .export(ND_TICKER_ENTITY, ND_TICKERS_TABLE, &data, row.symbol())
            .await?;

        debug!(symbol = %row, "Ticker exported");
        Ok(())
    }

    fn retry(&self, _err: &CollectError) -> bool {
        false
    }

    async fn done(&mut self) -> Result<(), CollectError> {
        Ok(())
    }
}

/// 티커 워커 팩토리
#[derive(Clone)]
pub struct NdTickerWorkerFactory {
    keys: Arc<Vec<String>>,
    exporter: Arc<dyn Exporter>,
}

impl NdTickerWorkerFactory {
    pub fn new(keys: Vec<String>, exporter: Arc<dyn Exporter>) -> Self {
        Self {
            keys: Arc::new(keys),
            exporter,
        }
    }
}

impl WorkerFactory for NdTickerWorkerFactory {
    type Item = TickerRow;
    type Worker = NdTickerWorker;

    fn make_worker(&self, _ctx: &WorkerContext) -> Result<NdTickerWorker, CollectError> {
        Ok(NdTickerWorker {
            keys: Arc::clone(&self.keys),
            exporter: Arc::clone(&self.exporter),
        })
    }
}
