//! 수집 결과 내보내기.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use sdc_core::QueueName;
use tracing::{debug, info};

use crate::error::Result;
use crate::queue::SharedQueueRef;
use crate::storage::postgres::PgLoader;

/// 수집 결과(JSON 텍스트)를 저장하는 대상.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// `entity`는 데이터 종류 표시, `partition`은 보통 심볼입니다.
    async fn export(&self, entity: &str, table: &str, data: &str, partition: &str) -> Result<()>;
}

/// `dir/partition/table.json` 파일로 저장합니다.
#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, table: &str, partition: &str) -> PathBuf {
        self.dir.join(partition).join(format!("{}.json", table))
    }
}

#[async_trait]
impl Exporter for FileExporter {
    async fn export(&self, entity: &str, table: &str, data: &str, partition: &str) -> Result<()> {
        let path = self.path_for(table, partition);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        debug!(entity, path = %path.display(), "Exported to file");
        Ok(())
    }
}

/// 관계형 저장소에 적재합니다.
#[derive(Clone)]
pub struct DbExporter {
    loader: Arc<PgLoader>,
}

impl DbExporter {
    pub fn new(loader: Arc<PgLoader>) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl Exporter for DbExporter {
    async fn export(&self, entity: &str, table: &str, data: &str, partition: &str) -> Result<()> {
        let rows = self.loader.load_by_json_text(data, table, partition).await?;
        info!(entity, table, partition, rows, "Exported to database");
        Ok(())
    }
}

/// 내보낸 파티션 이름(심볼)을 공유 큐 파티션에 추가합니다.
///
/// 데이터 본문은 쓰지 않습니다. 다른 수집기가 기준 심볼 집합을 복사해 쓸 수 있게 합니다.
#[derive(Clone)]
pub struct QueueExporter {
    queue: SharedQueueRef,
    name: QueueName,
}

impl QueueExporter {
    pub fn new(queue: SharedQueueRef, name: QueueName) -> Self {
        Self { queue, name }
    }
}

#[async_trait]
impl Exporter for QueueExporter {
    async fn export(&self, entity: &str, _table: &str, _data: &str, partition: &str) -> Result<()> {
        self.queue.add(&self.name, partition).await?;
        debug!(entity, queue = %self.name, partition, "Exported to queue");
        Ok(())
    }
}

/// 여러 대상에 순서대로 내보냅니다. 첫 실패에서 멈춥니다.
#[derive(Default)]
pub struct Exporters {
    exporters: Vec<Box<dyn Exporter>>,
}

impl Exporters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, exporter: impl Exporter + 'static) -> Self {
        self.exporters.push(Box::new(exporter));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.exporters.is_empty()
    }
}

#[async_trait]
impl Exporter for Exporters {
    async fn export(&self, entity: &str, table: &str, data: &str, partition: &str) -> Result<()> {
        for exporter in &self.exporters {
            exporter.export(entity, table, data, partition).await?;
        }
        Ok(())
    }
}
