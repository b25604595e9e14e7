//! 티커 목록 JSON 파일.

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::error::Result;

/// 티커 목록 레코드. 알 수 없는 필드는 무시합니다.
#[derive(Debug, Deserialize)]
struct TickerRecord {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
}

impl TickerRecord {
    /// 우선주/클래스 표기(`.`, `$`)와 워런트, 빈 심볼은 수집 대상이 아닙니다.
    fn is_collectable(&self) -> bool {
        let symbol = self.symbol.trim();
        !symbol.is_empty()
            && !symbol.contains(['.', '$'])
            && !self.name.contains("- Warrants")
    }
}

/// 티커 목록 JSON 배열에서 수집 대상 심볼을 추출합니다.
pub fn parse_tickers_json(text: &str) -> Result<Vec<String>> {
    let records: Vec<TickerRecord> = serde_json::from_str(text)?;
    Ok(records
        .into_iter()
        .filter(TickerRecord::is_collectable)
        .map(|record| record.symbol.trim().to_string())
        .collect())
}

/// 티커 목록 파일을 읽습니다.
pub async fn load_tickers_file(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path).await?;
    let symbols = parse_tickers_json(&text)?;
    info!(path = %path.display(), symbols = symbols.len(), "Loaded tickers file");
    Ok(symbols)
}
