//! 실행 통계와 큐 보고서.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 한 번의 실행 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// 결과가 기록된 항목 수 (성공 + 실패)
    pub processed: u64,
    /// 성공 수
    pub succeeded: u64,
    /// 이번 실행에서 에러 큐로 보낸 수
    pub errored: u64,
    /// 이번 실행에서 무효 큐로 보낸 수
    pub invalid: u64,
    /// 대기 큐에 남은 항목 수
    pub remaining: u64,
    /// 에러 큐 크기 (이전 실행분 포함)
    pub error_queue: u64,
    /// 무효 큐 크기 (이전 실행분 포함)
    pub invalid_queue: u64,
}

impl RunSummary {
    /// 통계 요약 로그 출력
    pub fn log_summary(&self, collector: &str) {
        tracing::info!(
            collector = collector,
            processed = self.processed,
            succeeded = self.succeeded,
            errored = self.errored,
            invalid = self.invalid,
            remaining = self.remaining,
            error_queue = self.error_queue,
            invalid_queue = self.invalid_queue,
            "수집 완료"
        );
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed: {}, Left: {}, Error: {}, Invalid: {}",
            self.processed, self.remaining, self.error_queue, self.invalid_queue
        )
    }
}

/// 파티션별 토큰 목록 (정렬됨)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueReport {
    pub remaining: Vec<String>,
    pub error: Vec<String>,
    pub invalid: Vec<String>,
}

impl QueueReport {
    pub fn new(mut remaining: Vec<String>, mut error: Vec<String>, mut invalid: Vec<String>) -> Self {
        remaining.sort();
        error.sort();
        invalid.sort();
        Self {
            remaining,
            error,
            invalid,
        }
    }
}

impl fmt::Display for QueueReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, tokens) in [
            ("Remaining", &self.remaining),
            ("Error", &self.error),
            ("Invalid", &self.invalid),
        ] {
            writeln!(f, "{} ({}): {}", label, tokens.len(), tokens.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            processed: 3,
            succeeded: 2,
            invalid: 1,
            invalid_queue: 1,
            ..Default::default()
        };
        assert_eq!(
            summary.to_string(),
            "Processed: 3, Left: 0, Error: 0, Invalid: 1"
        );
    }

    #[test]
    fn test_report_is_sorted() {
        let report = QueueReport::new(
            vec!["MSFT".into(), "AAPL".into()],
            vec![],
            vec!["ZZZZ".into()],
        );
        assert_eq!(report.remaining, vec!["AAPL", "MSFT"]);
        assert_eq!(
            report.to_string(),
            "Remaining (2): AAPL MSFT\nError (0): \nInvalid (1): ZZZZ\n"
        );
    }
}
