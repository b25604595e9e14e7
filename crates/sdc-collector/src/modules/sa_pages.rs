//! 재무제표 페이지 다운로드.
//!
//! 심볼마다 분기 손익계산서, 재무상태표, 현금흐름표, 재무비율 페이지를 받아
//! `<data_dir>/<YYYYMMDD>/<SYMBOL>/<name>.html`로 저장합니다.
//! 워커는 생성 시 받은 프록시를 수명 동안 사용합니다.

use async_trait::async_trait;
use sdc_core::{CollectError, QueueName, Symbol};
use sdc_data::{load_proxies, HttpProxyProbe, HttpReader, ProxyEndpoint, SharedQueue};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ProxyProbeConfig;
use crate::engine::{Worker, WorkerContext, WorkerFactory};
use crate::manager::PrepareStep;

/// 이 수집기의 파티션 접두사
pub const SA_PREFIX: &str = "SA";

pub const SA_BASE_URL: &str = "https://stockanalysis.com/stocks";

const PAGES: [(&str, &str); 4] = [
    ("income", "/financials/?p=quarterly"),
    ("balance_sheet", "/financials/balance-sheet/?p=quarterly"),
    ("cash_flow_statement", "/financials/cash-flow-statement/?p=quarterly"),
    ("ratios", "/financials/ratios/?p=quarterly"),
];

/// 페이지 다운로드 워커
pub struct SaPageWorker {
    base_url: String,
    data_dir: PathBuf,
    proxy: Option<ProxyEndpoint>,
    reader: Option<HttpReader>,
    download_dir: PathBuf,
}

impl SaPageWorker {
    fn reader(&self) -> Result<&HttpReader, CollectError> {
        self.reader
            .as_ref()
            .ok_or_else(|| CollectError::Item("worker not initialised".to_string()))
    }
}

#[async_trait]
impl Worker for SaPageWorker {
    type Item = Symbol;

    async fn init(&mut self) -> Result<(), CollectError> {
        let date = chrono::Local::now().format("%Y%m%d").to_string();
        self.download_dir = self.data_dir.join(date);
        tokio::fs::create_dir_all(&self.download_dir).await?;

        self.reader = Some(HttpReader::new(self.proxy.as_ref())?);
        debug!(dir = %self.download_dir.display(), "Page worker initialised");
        Ok(())
    }

    async fn process(&mut self, symbol: &Symbol) -> Result<(), CollectError> {
        let reader = self.reader()?;
        let base = format!("{}/{}", self.base_url, symbol.as_str().to_lowercase());

        // 네 페이지를 모두 받은 뒤에만 기록
        let mut pages = Vec::with_capacity(PAGES.len());
        for (name, path) in PAGES {
            let url = format!("{}{}", base, path);
            let html = reader.read(&url, &[]).await?;
            pages.push((name, html));
        }

        let dir = self.download_dir.join(symbol.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        for (name, html) in pages {
            let path = dir.join(format!("{}.html", name));
            tokio::fs::write(&path, html).await?;
            debug!(path = %path.display(), "Page written");
        }

        info!(symbol = %symbol, "Pages downloaded");
        Ok(())
    }

    fn retry(&self, err: &CollectError) -> bool {
        if err.is_not_found() {
            debug!("Symbol not valid, no retry");
            return false;
        }
        if err.is_retryable() {
            warn!(error = %err, "Server throttling, recreating worker");
            return true;
        }
        false
    }

    async fn done(&mut self) -> Result<(), CollectError> {
        self.reader = None;
        Ok(())
    }
}

/// 페이지 다운로드 워커 팩토리
#[derive(Debug, Clone)]
pub struct SaPageWorkerFactory {
    base_url: String,
    data_dir: PathBuf,
}

impl SaPageWorkerFactory {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: SA_BASE_URL.to_string(),
            data_dir: data_dir.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl WorkerFactory for SaPageWorkerFactory {
    type Item = Symbol;
    type Worker = SaPageWorker;

    fn make_worker(&self, ctx: &WorkerContext) -> Result<SaPageWorker, CollectError> {
        Ok(SaPageWorker {
            base_url: self.base_url.clone(),
            data_dir: self.data_dir.clone(),
            proxy: ctx.proxy.clone(),
            reader: None,
            download_dir: self.data_dir.clone(),
        })
    }
}

/// 준비 단계에서 프록시 후보를 검증해 프록시 파티션에 적재합니다.
pub struct ProxyLoader {
    path: PathBuf,
    probe: ProxyProbeConfig,
}

impl ProxyLoader {
    pub fn new(path: impl Into<PathBuf>, probe: ProxyProbeConfig) -> Self {
        Self {
            path: path.into(),
            probe,
        }
    }
}

#[async_trait]
impl PrepareStep for ProxyLoader {
    async fn run(&self, queue: &dyn SharedQueue) -> Result<(), CollectError> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(CollectError::Item(format!(
                "no proxy file found at {}",
                self.path.display()
            )));
        }

        let probe = Arc::new(HttpProxyProbe::new(
            self.probe.canary_url.clone(),
            self.probe.timeout(),
        ));
        let added = load_proxies(
            queue,
            &QueueName::PROXIES,
            &self.path,
            probe,
            self.probe.probers,
        )
        .await?;

        if added == 0 {
            warn!(path = %self.path.display(), "No usable proxy, workers will connect directly");
        }
        Ok(())
    }
}
