//! 영구 저장소.

pub mod postgres;
