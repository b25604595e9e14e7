//! 외부 데이터 접근 (HTTP, 프록시, 티커 목록).

pub mod http;
pub mod proxy;
pub mod tickers;
