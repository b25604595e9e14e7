//! 공유 큐 파티션 이름.

use std::borrow::Cow;
use std::fmt;

/// 공유 큐의 논리 파티션 키.
///
/// 여러 파티션이 같은 저장소에 공존하며, 항목의 상태는 어느 파티션에
/// 속해 있는지로만 표현됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueName(Cow<'static, str>);

impl QueueName {
    /// 모든 수집기가 공유하는 기준 심볼 집합
    pub const SYMBOLS: QueueName = QueueName::from_static("SYMBOLS");
    /// 검증된 프록시 집합
    pub const PROXIES: QueueName = QueueName::from_static("PROXIES");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for QueueName {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

/// 수집기 하나가 사용하는 파티션 묶음.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSet {
    /// 처리 대기 항목
    pub pending: QueueName,
    /// 재시도 대상 실패 항목
    pub error: QueueName,
    /// 영구 실패 항목
    pub invalid: QueueName,
}

impl QueueSet {
    /// 접두사로 파티션 이름을 만듭니다.
    ///
    /// `QueueSet::for_prefix("SA")` → `SA_SYMBOLS`, `SA_SYMBOLS_ERROR`, `SA_SYMBOLS_INVALID`
    pub fn for_prefix(prefix: &str) -> Self {
        Self::for_base(&format!("{}_SYMBOLS", prefix))
    }

    /// 대기 파티션 이름을 그대로 쓰고 `_ERROR`, `_INVALID`를 붙입니다.
    ///
    /// `QueueSet::for_base("HTML_FILES")` → `HTML_FILES`, `HTML_FILES_ERROR`, `HTML_FILES_INVALID`
    pub fn for_base(base: &str) -> Self {
        Self {
            pending: QueueName::new(base),
            error: QueueName::new(format!("{}_ERROR", base)),
            invalid: QueueName::new(format!("{}_INVALID", base)),
        }
    }

    /// 세 파티션을 모두 반환합니다.
    pub fn all(&self) -> [&QueueName; 3] {
        [&self.pending, &self.error, &self.invalid]
    }
}
