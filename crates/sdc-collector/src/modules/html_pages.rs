//! 다운로드한 재무제표 HTML 페이지 파싱.
//!
//! `<dir>/<SYMBOL>/<page>.html` 파일 경로를 `HTML_FILES` 파티션에 채우고, 워커는 각
//! 페이지를 표 파싱 서비스에 넘겨 받은 JSON 배열을 `sa_<page>` 테이블로 내보냅니다.
//! 실패한 페이지는 재시도하지 않습니다.

use async_trait::async_trait;
use sdc_core::{CollectError, QueueName, QueueSet, WorkItem};
use sdc_data::{Exporter, HttpReader, SharedQueue};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::{Worker, WorkerContext, WorkerFactory};
use crate::manager::ItemSeeder;

/// 이 수집기의 대기 파티션
pub const HTML_FILES: &str = "HTML_FILES";

pub const PARSE_PATH: &str = "/parse";
const PAGE_TYPE: &str = "financial_table";

pub fn html_queue_set() -> QueueSet {
    QueueSet::for_base(HTML_FILES)
}

/// HTML 파일 경로
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePath(PathBuf);

impl PagePath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// 상위 디렉토리 이름(심볼)과 확장자를 뗀 파일 이름
    pub fn symbol_and_page(&self) -> Result<(&str, &str), CollectError> {
        let invalid = || CollectError::Validation(format!("unexpected page path: {}", self));
        let page = self.0.file_stem().and_then(|s| s.to_str()).ok_or_else(invalid)?;
        let symbol = self
            .0
            .parent()
            .and_then(Path::file_name)
            .and_then(|s| s.to_str())
            .ok_or_else(invalid)?;
        Ok((symbol, page))
    }
}

impl fmt::Display for PagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl WorkItem for PagePath {
    fn from_token(token: String) -> Self {
        Self(PathBuf::from(token))
    }
}

/// `balance_sheet` → `SABalanceSheet`
fn page_entity(page: &str) -> String {
    let pascal: String = page
        .split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    format!("SA{}", pascal)
}

/// `<dir>/*/*.html` 경로로 대기 파티션을 채웁니다.
#[derive(Debug, Clone)]
pub struct HtmlPageSeeder {
    dir: PathBuf,
}

impl HtmlPageSeeder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn find_pages(dir: &Path) -> Result<Vec<PathBuf>, CollectError> {
        let pattern = format!("{}/*/*.html", glob::Pattern::escape(&dir.to_string_lossy()));
        let mut pages: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| CollectError::Validation(format!("invalid page pattern {}: {}", pattern, e)))?
            .filter_map(|path| path.ok())
            .collect();
        pages.sort();
        Ok(pages)
    }
}

#[async_trait]
impl ItemSeeder for HtmlPageSeeder {
    async fn seed(&self, queue: &dyn SharedQueue, pending: &QueueName) -> Result<u64, CollectError> {
        let dir = self.dir.clone();
        let pages = tokio::task::spawn_blocking(move || Self::find_pages(&dir))
            .await
            .map_err(|e| CollectError::Item(e.to_string()))??;

        for page in &pages {
            queue.add(pending, &PagePath::new(page).token()).await?;
        }
        info!(dir = %self.dir.display(), pages = pages.len(), "HTML pages queued");
        Ok(pages.len() as u64)
    }
}

/// HTML 페이지에서 표를 꺼내는 서비스
#[async_trait]
pub trait PageParser: Send + Sync {
    /// 표 행의 JSON 배열을 반환합니다.
    async fn parse(&self, html: &str, page_type: &str) -> Result<Value, CollectError>;
}

#[derive(Serialize)]
struct ParseRequest<'a> {
    html_text: &'a str,
    page_type: &'a str,
}

/// HTTP JSON API로 파싱 서비스를 호출합니다.
pub struct HttpPageParser {
    endpoint: String,
    reader: HttpReader,
}

impl HttpPageParser {
    /// `base_url`은 서비스 주소 (예: `http://scraper:8000`)
    pub fn new(base_url: &str) -> Result<Self, CollectError> {
        Ok(Self {
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), PARSE_PATH),
            reader: HttpReader::direct()?,
        })
    }
}

#[async_trait]
impl PageParser for HttpPageParser {
    async fn parse(&self, html: &str, page_type: &str) -> Result<Value, CollectError> {
        let body = self
            .reader
            .post_json(&self.endpoint, &ParseRequest { html_text: html, page_type })
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// 페이지 파싱 워커
pub struct HtmlPageWorker {
    parser: Arc<dyn PageParser>,
    exporter: Arc<dyn Exporter>,
}

#[async_trait]
impl Worker for HtmlPageWorker {
    type Item = PagePath;

    async fn init(&mut self) -> Result<(), CollectError> {
        Ok(())
    }

    async fn process(&mut self, page: &PagePath) -> Result<(), CollectError> {
        let (symbol, name) = page.symbol_and_page()?;
        let html = tokio::fs::read_to_string(page.path()).await?;

        let rows = self.parser.parse(&html, PAGE_TYPE).await?;
        if !rows.is_array() {
            return Err(CollectError::Validation(format!(
                "parser returned non-array for {}",
                page
            )));
        }
        let data = serde_json::to_string_pretty(&rows)?;

        let table = format!("sa_{}", name);
        self.exporter
            .export(&page_entity(name), &table, &data, symbol)
            .await?;
        debug!(page = %page, table = %table, "Page exported");
        Ok(())
    }

    fn retry(&self, _err: &CollectError) -> bool {
        false
    }

    async fn done(&mut self) -> Result<(), CollectError> {
        Ok(())
    }
}

/// 페이지 파싱 워커 팩토리
#[derive(Clone)]
pub struct HtmlPageWorkerFactory {
    parser: Arc<dyn PageParser>,
    exporter: Arc<dyn Exporter>,
}

impl HtmlPageWorkerFactory {
    pub fn new(parser: Arc<dyn PageParser>, exporter: Arc<dyn Exporter>) -> Self {
        Self { parser, exporter }
    }
}

impl WorkerFactory for HtmlPageWorkerFactory {
    type Item = PagePath;
    type Worker = HtmlPageWorker;

    fn make_worker(&self, _ctx: &WorkerContext) -> Result<HtmlPageWorker, CollectError> {
        Ok(HtmlPageWorker {
            parser: Arc::clone(&self.parser),
            exporter: Arc::clone(&self.exporter),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdc_data::{FileExporter, MemoryQueue};
    use std::sync::Mutex;
    use tracing::Span;

    /// 받은 페이지 종류를 기록하고 고정 응답을 돌려주는 파서
    struct FixedParser {
        response: Value,
        seen: Mutex<Vec<String>>,
    }

    impl FixedParser {
        fn new(response: Value) -> Self {
            Self {
                response,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageParser for FixedParser {
        async fn parse(&self, html: &str, page_type: &str) -> Result<Value, CollectError> {
            self.seen.lock().unwrap().push(format!("{}:{}", page_type, html));
            Ok(self.response.clone())
        }
    }

    fn ctx() -> WorkerContext {
        WorkerContext {
            worker_id: 0,
            span: Span::none(),
            proxy: None,
        }
    }

    fn write_page(root: &Path, symbol: &str, name: &str, html: &str) -> PathBuf {
        let dir = root.join(symbol);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, html).unwrap();
        path
    }

    #[test]
    fn test_page_entity_is_pascal_case() {
        assert_eq!(page_entity("balance_sheet"), "SABalanceSheet");
        assert_eq!(page_entity("cash_flow_statement"), "SACashFlowStatement");
        assert_eq!(page_entity("ratios"), "SARatios");
    }

    #[test]
    fn test_symbol_and_page_from_path() {
        let page = PagePath::from_token("/data/20240102/AAPL/income.html".to_string());
        assert_eq!(page.symbol_and_page().unwrap(), ("AAPL", "income"));
        assert_eq!(page.token(), "/data/20240102/AAPL/income.html");
    }

    #[tokio::test]
    async fn test_seeder_queues_only_nested_html_files() {
        let root = tempfile::tempdir().unwrap();
        write_page(root.path(), "AAPL", "income.html", "<table/>");
        write_page(root.path(), "MSFT", "ratios.html", "<table/>");
        write_page(root.path(), "MSFT", "notes.txt", "skip");
        std::fs::write(root.path().join("top.html"), "skip").unwrap();

        let queue = MemoryQueue::new();
        let set = html_queue_set();
        let seeded = HtmlPageSeeder::new(root.path())
            .seed(&queue, &set.pending)
            .await
            .unwrap();

        assert_eq!(seeded, 2);
        let mut queued = queue.all(&set.pending).await.unwrap();
        queued.sort();
        assert!(queued[0].ends_with("AAPL/income.html"));
        assert!(queued[1].ends_with("MSFT/ratios.html"));
    }

    #[tokio::test]
    async fn test_seeder_missing_directory_seeds_nothing() {
        let root = tempfile::tempdir().unwrap();
        let queue = MemoryQueue::new();
        let seeded = HtmlPageSeeder::new(root.path().join("absent"))
            .seed(&queue, &html_queue_set().pending)
            .await
            .unwrap();
        assert_eq!(seeded, 0);
    }

    #[tokio::test]
    async fn test_worker_exports_parsed_table() {
        let pages = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let path = write_page(pages.path(), "AAPL", "balance_sheet.html", "<table>1</table>");
        let parser = Arc::new(FixedParser::new(serde_json::json!([{"Cash": "1,000"}])));

        let factory = HtmlPageWorkerFactory::new(parser.clone(), Arc::new(FileExporter::new(out.path())));
        let mut worker = factory.make_worker(&ctx()).unwrap();
        worker.init().await.unwrap();
        worker.process(&PagePath::new(&path)).await.unwrap();

        assert_eq!(
            parser.seen.lock().unwrap().clone(),
            vec!["financial_table:<table>1</table>"]
        );
        let written =
            std::fs::read_to_string(out.path().join("AAPL").join("sa_balance_sheet.json")).unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed[0]["Cash"], "1,000");
    }

    #[tokio::test]
    async fn test_non_array_response_is_rejected() {
        let pages = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let path = write_page(pages.path(), "AAPL", "income.html", "<p/>");
        let parser = Arc::new(FixedParser::new(serde_json::json!({"error": "no table"})));

        let factory = HtmlPageWorkerFactory::new(parser, Arc::new(FileExporter::new(out.path())));
        let mut worker = factory.make_worker(&ctx()).unwrap();
        let err = worker.process(&PagePath::new(&path)).await.unwrap_err();

        assert!(matches!(err, CollectError::Validation(_)));
        assert!(!worker.retry(&err));
        assert!(!out.path().join("AAPL").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_item_error() {
        let out = tempfile::tempdir().unwrap();
        let parser = Arc::new(FixedParser::new(serde_json::json!([])));
        let factory = HtmlPageWorkerFactory::new(parser, Arc::new(FileExporter::new(out.path())));
        let mut worker = factory.make_worker(&ctx()).unwrap();

        let err = worker
            .process(&PagePath::new(out.path().join("AAPL").join("gone.html")))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Item(_)));
    }

    #[tokio::test]
    async fn test_http_parser_posts_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PARSE_PATH)
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"html_text": "<table/>", "page_type": "financial_table"}),
            ))
            .with_status(200)
            .with_body(r#"[{"Revenue": "10"}]"#)
            .create_async()
            .await;

        let parser = HttpPageParser::new(&server.url()).unwrap();
        let rows = parser.parse("<table/>", PAGE_TYPE).await.unwrap();

        mock.assert_async().await;
        assert_eq!(rows[0]["Revenue"], "10");
    }
}
