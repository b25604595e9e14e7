//! 작업 항목 타입.

use std::fmt;

/// 분배 가능한 작업 단위.
///
/// 작업 항목은 공유 큐에 문자열 토큰으로 저장되며, 토큰에서 다시 복원할 수
/// 있어야 합니다. 두 항목은 렌더링(토큰)이 같으면 같은 항목입니다.
pub trait WorkItem: Clone + Send + Sync + fmt::Debug + fmt::Display + 'static {
    /// 공유 큐 토큰에서 항목을 복원합니다.
    fn from_token(token: String) -> Self;

    /// 공유 큐에 저장할 토큰.
    fn token(&self) -> String {
        self.to_string()
    }
}

/// 티커 심볼 (예: AAPL, MSFT).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl WorkItem for Symbol {
    fn from_token(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
