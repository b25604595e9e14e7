//! 수집 파이프라인 공통 타입.

pub mod queue;
pub mod work_item;

pub use queue::{QueueName, QueueSet};
pub use work_item::{Symbol, WorkItem};
