//! 同步协议模块
//!
//! 职责：
//! - 传输模型与存储模型互转（布尔标记 ↔ 0/1 整数）
//! - 超长字段的溢出路由
//! - 拉取（checkpoint 增量查询 + 回填）与推送（LWW 比对落库 + 水位线推进）

pub mod convert;
pub mod docs;
pub mod engine;
pub mod overflow;

pub use docs::{
    CardDoc, CardTypeDoc, Checkpoint, PullBulk, PushRow, SpaceDoc, TagDoc, UpdateInfo, ViewDoc,
    ViewEdgeDoc, ViewNodeDoc,
};
pub use engine::SyncEngine;
