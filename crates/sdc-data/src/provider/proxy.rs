//! 프록시 목록 검증과 워커별 배분.
//!
//! 후보 파일 형식은 한 줄에 하나씩 `host:port` 또는 `host:port:user:pass`이며,
//! 빈 줄과 `#`으로 시작하는 줄은 무시합니다. IPv6 호스트는 `[::1]:8080`처럼
//! 대괄호로 감쌉니다. 사용자 이름과 비밀번호에는 `:`를 쓸 수 없습니다.

use async_trait::async_trait;
use sdc_core::QueueName;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{DataError, Result};
use crate::queue::SharedQueue;

/// 동시에 검사하는 프록시 수 기본값.
pub const DEFAULT_PROBERS: usize = 20;

// =============================================================================
// 프록시 주소
// =============================================================================

/// 프록시 서버 주소와 선택적 인증 정보.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    credentials: Option<(String, SecretString)>,
}

impl ProxyEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), SecretString::from(password.into())));
        self
    }

    /// `host:port` (IPv6 호스트는 `[host]:port`)
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.credentials.as_ref().map(|(user, _)| user.as_str())
    }

    /// 공유 큐 저장 형식. 인증 정보가 있으면 함께 기록합니다.
    pub fn token(&self) -> String {
        match &self.credentials {
            Some((user, password)) => format!(
                "{}:{}:{}",
                self.address(),
                user,
                password.expose_secret()
            ),
            None => self.address(),
        }
    }

    /// reqwest 프록시 설정으로 변환합니다.
    pub fn to_reqwest(&self) -> Result<reqwest::Proxy> {
        let proxy = reqwest::Proxy::all(format!("http://{}", self.address()))
            .map_err(|e| DataError::ConfigError(format!("invalid proxy {}: {}", self, e)))?;
        Ok(match &self.credentials {
            Some((user, password)) => proxy.basic_auth(user, password.expose_secret()),
            None => proxy,
        })
    }
}

impl fmt::Display for ProxyEndpoint {
    // 비밀번호는 출력하지 않음
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.user() {
            Some(user) => write!(f, "{}@{}", user, self.address()),
            None => f.write_str(&self.address()),
        }
    }
}

impl FromStr for ProxyEndpoint {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        let line = s.trim();
        let invalid = || DataError::InvalidData(format!("invalid proxy line: {}", line));

        // 대괄호 호스트는 내부의 `:`를 구분자로 보지 않음
        let (host, rest) = match line.strip_prefix('[') {
            Some(bracketed) => {
                let (host, rest) = bracketed.split_once(']').ok_or_else(invalid)?;
                (host, rest.strip_prefix(':').ok_or_else(invalid)?)
            }
            None => line.split_once(':').ok_or_else(invalid)?,
        };
        if host.is_empty() {
            return Err(invalid());
        }

        let parts: Vec<&str> = rest.split(':').collect();
        let port = parts[0].parse::<u16>().map_err(|_| invalid())?;
        let endpoint = ProxyEndpoint::new(host, port);
        match parts.as_slice() {
            [_] => Ok(endpoint),
            [_, user, password] => Ok(endpoint.with_credentials(*user, *password)),
            _ => Err(invalid()),
        }
    }
}

/// 후보 파일 내용을 파싱합니다. 형식이 잘못된 줄은 경고 후 건너뜁니다.
pub fn parse_proxy_lines(text: &str) -> Vec<ProxyEndpoint> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match line.parse::<ProxyEndpoint>() {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                warn!(error = %e, "Skipping proxy line");
                None
            }
        })
        .collect()
}

// =============================================================================
// 검증
// =============================================================================

/// 프록시 하나가 사용 가능한지 검사합니다.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    async fn probe(&self, proxy: &ProxyEndpoint) -> bool;
}

/// TCP 도달 가능성 확인 후 canary URL을 프록시 경유로 받아 봅니다.
#[derive(Debug, Clone)]
pub struct HttpProxyProbe {
    canary_url: String,
    timeout: Duration,
}

impl HttpProxyProbe {
    pub fn new(canary_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            canary_url: canary_url.into(),
            timeout,
        }
    }

    async fn reachable(&self, proxy: &ProxyEndpoint) -> bool {
        let connect = TcpStream::connect((proxy.host.as_str(), proxy.port));
        matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)))
    }

    async fn fetch_canary(&self, proxy: &ProxyEndpoint) -> Result<()> {
        let client = reqwest::Client::builder()
            .proxy(proxy.to_reqwest()?)
            .timeout(self.timeout)
            .build()?;
        let response = client.get(&self.canary_url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DataError::Http {
                status: status.as_u16(),
                url: self.canary_url.clone(),
            })
        }
    }
}

#[async_trait]
impl ProxyProbe for HttpProxyProbe {
    async fn probe(&self, proxy: &ProxyEndpoint) -> bool {
        if !self.reachable(proxy).await {
            debug!(proxy = %proxy, "Proxy unreachable");
            return false;
        }
        match self.fetch_canary(proxy).await {
            Ok(()) => true,
            Err(e) => {
                debug!(proxy = %proxy, error = %e, "Proxy canary failed");
                false
            }
        }
    }
}

/// 후보 프록시들을 최대 `probers`개씩 동시에 검사하고 통과한 것만 반환합니다.
///
/// 후보 수와 무관하게 후보마다 정확히 하나의 결과를 수거한 뒤 반환합니다.
/// 반환 순서는 보장하지 않습니다.
pub async fn validate_proxies(
    candidates: Vec<ProxyEndpoint>,
    probe: Arc<dyn ProxyProbe>,
    probers: usize,
) -> Vec<ProxyEndpoint> {
    let total = candidates.len();
    if total == 0 {
        return Vec::new();
    }

    let (candidate_tx, candidate_rx) = mpsc::channel::<ProxyEndpoint>(total);
    let candidate_rx = Arc::new(tokio::sync::Mutex::new(candidate_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<(ProxyEndpoint, bool)>(total);

    let mut tasks = JoinSet::new();
    for _ in 0..probers.clamp(1, total) {
        let candidate_rx = Arc::clone(&candidate_rx);
        let result_tx = result_tx.clone();
        let probe = Arc::clone(&probe);
        tasks.spawn(async move {
            loop {
                let next = candidate_rx.lock().await.recv().await;
                let Some(candidate) = next else { break };
                let ok = probe.probe(&candidate).await;
                if result_tx.send((candidate, ok)).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(result_tx);

    for candidate in candidates {
        // 용량이 후보 수와 같으므로 블록되지 않음
        if candidate_tx.send(candidate).await.is_err() {
            break;
        }
    }
    drop(candidate_tx);

    let mut valid = Vec::new();
    for _ in 0..total {
        match result_rx.recv().await {
            Some((candidate, true)) => valid.push(candidate),
            Some((candidate, false)) => debug!(proxy = %candidate, "Proxy rejected"),
            None => break,
        }
    }
    while tasks.join_next().await.is_some() {}

    info!(candidates = total, valid = valid.len(), "Proxy validation completed");
    valid
}

/// 후보 파일을 읽어 검증을 통과한 프록시를 공유 큐에 추가합니다.
///
/// 추가한 프록시 수를 반환합니다.
pub async fn load_proxies(
    queue: &dyn SharedQueue,
    key: &QueueName,
    path: &Path,
    probe: Arc<dyn ProxyProbe>,
    probers: usize,
) -> Result<usize> {
    let text = tokio::fs::read_to_string(path).await?;
    let candidates = parse_proxy_lines(&text);
    info!(path = %path.display(), candidates = candidates.len(), "Loading proxies");

    let valid = validate_proxies(candidates, probe, probers).await;
    for proxy in &valid {
        queue.add(key, &proxy.token()).await?;
    }

    info!(key = %key, added = valid.len(), "Proxies loaded");
    Ok(valid.len())
}

// =============================================================================
// 워커별 배분
// =============================================================================

/// 워커들이 하나씩 가져가는 프록시 풀.
///
/// 비어 있으면 [`ProxyPool::try_take`]가 즉시 `None`을 반환하고 워커는 직접 연결합니다.
#[derive(Debug)]
pub struct ProxyPool {
    rx: Mutex<mpsc::Receiver<ProxyEndpoint>>,
}

impl ProxyPool {
    /// 프록시가 없는 풀.
    pub fn empty() -> Self {
        Self::from_endpoints(Vec::new())
    }

    pub fn from_endpoints(endpoints: Vec<ProxyEndpoint>) -> Self {
        let (tx, rx) = mpsc::channel(endpoints.len().max(1));
        for endpoint in endpoints {
            // 용량이 충분하므로 실패하지 않음
            let _ = tx.try_send(endpoint);
        }
        Self { rx: Mutex::new(rx) }
    }

    /// 공유 큐에서 최대 `limit`개의 프록시를 꺼내 풀을 만듭니다.
    pub async fn drain_from(queue: &dyn SharedQueue, key: &QueueName, limit: usize) -> Result<Self> {
        let mut endpoints = Vec::with_capacity(limit);
        while endpoints.len() < limit {
            let Some(token) = queue.pop(key).await? else {
                break;
            };
            match token.parse::<ProxyEndpoint>() {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) => warn!(error = %e, "Discarding malformed proxy from queue"),
            }
        }
        info!(key = %key, proxies = endpoints.len(), "Proxy pool prepared");
        Ok(Self::from_endpoints(endpoints))
    }

    /// 대기 없이 프록시 하나를 가져옵니다.
    pub fn try_take(&self) -> Option<ProxyEndpoint> {
        self.rx.lock().ok()?.try_recv().ok()
    }
}
