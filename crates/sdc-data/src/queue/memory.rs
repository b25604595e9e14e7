//! 프로세스 내 공유 큐.
//!
//! 단일 프로세스 실행과 테스트에서 Redis 대신 사용합니다.

use async_trait::async_trait;
use sdc_core::QueueName;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::SharedQueue;
use crate::error::{DataError, Result};

type Sets = HashMap<QueueName, HashSet<String>>;

/// `HashMap<파티션, HashSet<멤버>>` 기반 공유 큐.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    sets: Mutex<Sets>,
    disconnected: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 멤버로 파티션을 채운 큐를 만듭니다.
    pub fn with_members<I, S>(queue: &QueueName, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let this = Self::new();
        if let Ok(mut sets) = this.sets.lock() {
            sets.entry(queue.clone())
                .or_default()
                .extend(members.into_iter().map(Into::into));
        }
        this
    }

    /// 저장소 연결 끊김을 흉내 냅니다. 이후 모든 연산이 실패합니다.
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// 끊긴 연결을 복구합니다.
    pub fn reconnect(&self) {
        self.disconnected.store(false, Ordering::SeqCst);
    }

    fn sets(&self) -> Result<MutexGuard<'_, Sets>> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(DataError::CacheError(
                "memory queue disconnected".to_string(),
            ));
        }
        self.sets
            .lock()
            .map_err(|e| DataError::CacheError(e.to_string()))
    }
}

#[async_trait]
impl SharedQueue for MemoryQueue {
    async fn add(&self, queue: &QueueName, member: &str) -> Result<()> {
        self.sets()?
            .entry(queue.clone())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn pop(&self, queue: &QueueName) -> Result<Option<String>> {
        let mut sets = self.sets()?;
        let Some(set) = sets.get_mut(queue) else {
            return Ok(None);
        };
        let member = set.iter().next().cloned();
        if let Some(member) = &member {
            set.remove(member);
        }
        Ok(member)
    }

    async fn peek(&self, queue: &QueueName) -> Result<Option<String>> {
        Ok(self
            .sets()?
            .get(queue)
            .and_then(|set| set.iter().next().cloned()))
    }

    async fn all(&self, queue: &QueueName) -> Result<Vec<String>> {
        Ok(self
            .sets()?
            .get(queue)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, queue: &QueueName, member: &str) -> Result<()> {
        if let Some(set) = self.sets()?.get_mut(queue) {
            set.remove(member);
        }
        Ok(())
    }

    async fn length(&self, queue: &QueueName) -> Result<u64> {
        Ok(self.sets()?.get(queue).map_or(0, |set| set.len() as u64))
    }

    async fn delete_queue(&self, queue: &QueueName) -> Result<()> {
        self.sets()?.remove(queue);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.sets().map(|_| ())
    }

    async fn move_all(&self, src: &QueueName, dst: &QueueName) -> Result<u64> {
        let mut sets = self.sets()?;
        let moved = sets.remove(src).unwrap_or_default();
        let count = moved.len() as u64;
        sets.entry(dst.clone()).or_default().extend(moved);
        Ok(count)
    }
}
