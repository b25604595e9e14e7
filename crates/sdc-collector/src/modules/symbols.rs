//! 심볼 원천에서 대기 파티션 채우기.

use async_trait::async_trait;
use sdc_core::{CollectError, QueueName};
use sdc_data::{load_tickers_file, PgLoader, SharedQueue};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SymbolSource;
use crate::manager::ItemSeeder;

/// 원천을 순서대로 시도해 첫 번째로 사용 가능한 것으로 채웁니다.
///
/// 기준 파티션은 비어 있으면 건너뜁니다. DB 원천은 읽은 심볼을 기준
/// 파티션에도 기록해 다음 수집기가 재사용할 수 있게 합니다.
pub struct SymbolSeeder {
    sources: Vec<SymbolSource>,
    loader: Option<Arc<PgLoader>>,
}

impl SymbolSeeder {
    pub fn new(sources: Vec<SymbolSource>) -> Self {
        Self {
            sources,
            loader: None,
        }
    }

    pub fn with_loader(mut self, loader: Arc<PgLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    async fn add_all(
        queue: &dyn SharedQueue,
        targets: &[&QueueName],
        symbols: &[String],
    ) -> Result<u64, CollectError> {
        for symbol in symbols {
            for target in targets {
                queue.add(target, symbol).await?;
            }
        }
        Ok(symbols.len() as u64)
    }
}

#[async_trait]
impl ItemSeeder for SymbolSeeder {
    async fn seed(&self, queue: &dyn SharedQueue, pending: &QueueName) -> Result<u64, CollectError> {
        for source in &self.sources {
            match source {
                SymbolSource::Single(symbol) => {
                    info!(symbol = %symbol, "Processing single symbol");
                    queue.add(pending, symbol).await?;
                    return Ok(1);
                }
                SymbolSource::File(path) => {
                    let symbols = load_tickers_file(path).await?;
                    info!(path = %path.display(), symbols = symbols.len(), "Symbols loaded from file");
                    return Self::add_all(queue, &[pending], &symbols).await;
                }
                SymbolSource::Queue(reference) => {
                    if queue.length(reference).await? == 0 {
                        info!(key = %reference, "Reference queue empty, trying next source");
                        continue;
                    }
                    let copied = queue.copy_all(reference, pending).await?;
                    info!(key = %reference, copied, "Symbols copied from reference queue");
                    return Ok(copied);
                }
                SymbolSource::Database { table } => {
                    let Some(loader) = &self.loader else {
                        return Err(CollectError::Item(format!(
                            "database connection required to read table {}",
                            table
                        )));
                    };
                    let symbols = loader.select_symbols(table).await?;
                    info!(table = %table, symbols = symbols.len(), "Symbols retrieved from database");
                    return Self::add_all(queue, &[&QueueName::SYMBOLS, pending], &symbols).await;
                }
            }
        }

        warn!("No symbol source available");
        Ok(0)
    }
}
