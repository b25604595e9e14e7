//! 수집 작업의 에러 타입.
//!
//! 작업 항목 처리 중 발생한 실패를 분류합니다. 분류 결과는
//! 실패한 항목이 어느 큐(invalid / error)로 갈지, 그리고 워커를
//! 다시 만들어 계속할지를 결정합니다.

use thiserror::Error;

/// HTTP 404 (존재하지 않는 심볼 등)
pub const STATUS_NOT_FOUND: u16 = 404;

/// HTTP 429 (요청 한도 초과)
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// 작업 항목 처리 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectError {
    /// 큐 또는 네트워크에 연결할 수 없음
    #[error("전송 에러: {0}")]
    Transport(String),

    /// 원격 서버가 에러 상태 코드를 반환함
    #[error("서버 에러 {status}: {message}")]
    Server { status: u16, message: String },

    /// 잘못된 입력 (예: 컬럼 수 불일치)
    #[error("검증 에러: {0}")]
    Validation(String),

    /// 상태 코드가 없는 일반 처리 실패
    #[error("처리 에러: {0}")]
    Item(String),
}

/// 실패한 항목이 라우팅될 큐 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 영구적으로 잘못된 항목. 자동으로 재시도하지 않습니다.
    Invalid,
    /// 재시도 대상 항목. `continue` 실행에서 다시 처리됩니다.
    Error,
}

impl CollectError {
    /// 서버 에러를 생성합니다.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// 서버 에러의 상태 코드.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 404 응답인지 확인합니다.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(STATUS_NOT_FOUND)
    }

    /// 429 응답인지 확인합니다.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(STATUS_TOO_MANY_REQUESTS)
    }

    /// 5xx 응답인지 확인합니다.
    pub fn is_server_side(&self) -> bool {
        matches!(self.status(), Some(s) if (500..600).contains(&s))
    }

    /// 다시 시도해도 결과가 바뀌지 않는 에러인지 확인합니다.
    pub fn is_permanent(&self) -> bool {
        self.is_not_found() || matches!(self, Self::Validation(_))
    }

    /// 워커를 다시 만들어 계속할 만한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        self.is_rate_limited() || self.is_server_side()
    }

    /// 실패 항목이 들어갈 큐 종류.
    ///
    /// 404만 invalid로 분류합니다. 나머지는 모두 error 큐로 갑니다.
    pub fn failure_kind(&self) -> FailureKind {
        if self.is_not_found() {
            FailureKind::Invalid
        } else {
            FailureKind::Error
        }
    }
}

impl From<serde_json::Error> for CollectError {
    fn from(err: serde_json::Error) -> Self {
        CollectError::Validation(err.to_string())
    }
}

impl From<std::io::Error> for CollectError {
    fn from(err: std::io::Error) -> Self {
        CollectError::Item(err.to_string())
    }
}
