//! HTTP 리더.
//!
//! 성공이 아닌 응답은 상태 코드를 그대로 담은 [`DataError::Http`]로 돌려주므로
//! 호출자가 404(영구 실패)와 429/5xx(재시도)를 구분할 수 있습니다.

use reqwest::{redirect::Policy, Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;

use super::proxy::ProxyEndpoint;
use crate::error::{DataError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 직접 연결 또는 프록시 경유 HTTP 클라이언트.
#[derive(Debug, Clone)]
pub struct HttpReader {
    client: Client,
    /// 리다이렉트를 따라가지 않는 클라이언트 (Location 조회용)
    no_redirect: Client,
}

impl HttpReader {
    /// 프록시 없이 직접 연결하는 리더를 생성합니다.
    pub fn direct() -> Result<Self> {
        Self::build(None)
    }

    /// 프록시가 있으면 경유하고 없으면 직접 연결합니다.
    pub fn new(proxy: Option<&ProxyEndpoint>) -> Result<Self> {
        Self::build(proxy)
    }

    fn build(proxy: Option<&ProxyEndpoint>) -> Result<Self> {
        let configure = |builder: ClientBuilder| -> Result<ClientBuilder> {
            let builder = builder.timeout(REQUEST_TIMEOUT).user_agent(USER_AGENT);
            match proxy {
                Some(proxy) => Ok(builder.proxy(proxy.to_reqwest()?)),
                None => Ok(builder),
            }
        };

        let client = configure(Client::builder())?
            .build()
            .map_err(|e| DataError::ConfigError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;
        let no_redirect = configure(Client::builder().redirect(Policy::none()))?
            .build()
            .map_err(|e| DataError::ConfigError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            no_redirect,
        })
    }

    /// GET 요청으로 본문을 읽습니다.
    pub async fn read(&self, url: &str, params: &[(&str, &str)]) -> Result<String> {
        debug!(url, "GET");
        let mut request = self.client.get(url);
        if !params.is_empty() {
            request = request.query(params);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// JSON 본문을 POST하고 응답 본문을 읽습니다.
    pub async fn post_json<T: serde::Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<String> {
        debug!(url, "POST");
        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// 리다이렉트 응답의 `Location` 헤더를 반환합니다.
    ///
    /// 리다이렉트가 아니면 요청한 URL을 그대로 반환합니다.
    pub async fn redirected_url(&self, url: &str) -> Result<String> {
        let response = self.no_redirect.get(url).send().await?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    DataError::InvalidData(format!("redirect without Location from {}", url))
                })?;
            return Ok(location.to_string());
        }
        if !status.is_success() {
            return Err(DataError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdc_core::CollectError;

    #[tokio::test]
    async fn test_read_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/quote")
            .match_query(mockito::Matcher::UrlEncoded("symbol".into(), "AAPL".into()))
            .with_status(200)
            .with_body("<html>AAPL</html>")
            .create_async()
            .await;

        let reader = HttpReader::direct().unwrap();
        let body = reader
            .read(&format!("{}/quote", server.url()), &[("symbol", "AAPL")])
            .await
            .unwrap();

        assert_eq!(body, "<html>AAPL</html>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_is_permanent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/stocks/zzzz")
            .with_status(404)
            .create_async()
            .await;

        let reader = HttpReader::direct().unwrap();
        let err = reader
            .read(&format!("{}/stocks/zzzz", server.url()), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, DataError::Http { status: 404, .. }));
        assert!(CollectError::from(err).is_permanent());
    }

    #[tokio::test]
    async fn test_rate_limited_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/busy")
            .with_status(429)
            .create_async()
            .await;

        let reader = HttpReader::direct().unwrap();
        let err = reader
            .read(&format!("{}/busy", server.url()), &[])
            .await
            .unwrap_err();

        assert!(CollectError::from(err).is_retryable());
    }

    #[tokio::test]
    async fn test_post_json_sends_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/parse")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"html_text": "<table/>", "page_type": "financial_table"}),
            ))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let reader = HttpReader::direct().unwrap();
        let body = reader
            .post_json(
                &format!("{}/parse", server.url()),
                &serde_json::json!({"html_text": "<table/>", "page_type": "financial_table"}),
            )
            .await
            .unwrap();

        assert_eq!(body, "[]");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_json_keeps_server_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/parse")
            .with_status(503)
            .create_async()
            .await;

        let reader = HttpReader::direct().unwrap();
        let err = reader
            .post_json(&format!("{}/parse", server.url()), &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, DataError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_redirected_url_returns_location() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/old")
            .with_status(301)
            .with_header("location", "https://example.com/new")
            .create_async()
            .await;

        let reader = HttpReader::direct().unwrap();
        let location = reader
            .redirected_url(&format!("{}/old", server.url()))
            .await
            .unwrap();

        assert_eq!(location, "https://example.com/new");
    }

    #[tokio::test]
    async fn test_redirected_url_without_redirect() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/same")
            .with_status(200)
            .create_async()
            .await;

        let reader = HttpReader::direct().unwrap();
        let url = format!("{}/same", server.url());
        assert_eq!(reader.redirected_url(&url).await.unwrap(), url);
    }
}
