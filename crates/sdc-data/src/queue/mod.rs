//! 공유 큐 (이름 붙은 문자열 집합).
//!
//! 모든 파티션은 중복 없는 집합이며 순서를 보장하지 않습니다.
//! 여러 프로세스가 같은 저장소를 공유할 수 있으므로 개별 연산은
//! 저장소 단위로 원자적이어야 합니다.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use sdc_core::QueueName;
use std::sync::Arc;

use crate::error::Result;

/// 이름 붙은 집합들에 대한 공유 큐 연산.
#[async_trait]
pub trait SharedQueue: Send + Sync {
    /// 멤버를 추가합니다. 이미 있으면 아무 일도 하지 않습니다.
    async fn add(&self, queue: &QueueName, member: &str) -> Result<()>;

    /// 임의의 멤버 하나를 꺼냅니다. 비어 있으면 `None`.
    async fn pop(&self, queue: &QueueName) -> Result<Option<String>>;

    /// 임의의 멤버 하나를 제거하지 않고 조회합니다.
    async fn peek(&self, queue: &QueueName) -> Result<Option<String>>;

    /// 모든 멤버를 반환합니다.
    async fn all(&self, queue: &QueueName) -> Result<Vec<String>>;

    /// 멤버 하나를 제거합니다. 없으면 아무 일도 하지 않습니다.
    async fn delete(&self, queue: &QueueName, member: &str) -> Result<()>;

    /// 멤버 수.
    async fn length(&self, queue: &QueueName) -> Result<u64>;

    /// 파티션 전체를 삭제합니다.
    async fn delete_queue(&self, queue: &QueueName) -> Result<()>;

    /// 저장소 연결 상태를 확인합니다.
    async fn ping(&self) -> Result<()>;

    /// `src`의 모든 멤버를 `dst`로 옮기고 옮긴 수를 반환합니다.
    ///
    /// 완료 후 `src`는 비어 있고 `dst`는 두 집합의 합집합입니다.
    /// `src`와 `dst`가 같으면 아무것도 바꾸지 않고 멤버 수를 반환합니다.
    async fn move_all(&self, src: &QueueName, dst: &QueueName) -> Result<u64> {
        if src == dst {
            return self.length(src).await;
        }
        let mut moved = 0;
        while let Some(member) = self.pop(src).await? {
            self.add(dst, &member).await?;
            moved += 1;
        }
        Ok(moved)
    }

    /// `src`의 모든 멤버를 `dst`에 복사하고 복사한 수를 반환합니다. `src`는 변하지 않습니다.
    async fn copy_all(&self, src: &QueueName, dst: &QueueName) -> Result<u64> {
        let members = self.all(src).await?;
        for member in &members {
            self.add(dst, member).await?;
        }
        Ok(members.len() as u64)
    }
}

/// 워커와 매니저가 함께 쓰는 공유 큐 핸들.
pub type SharedQueueRef = Arc<dyn SharedQueue>;
