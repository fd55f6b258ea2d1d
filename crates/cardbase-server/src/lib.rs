//! Cardbase Server - 多租户笔记同步后端核心
//!
//! 本库实现卡片笔记应用的服务端同步核心，包括：
//! - 🔄 基于 checkpoint 的拉取/推送复制协议（最新时间戳胜出）
//! - 📦 超长字段溢出存储（propext 宽列侧表）
//! - ⏱️ 每用户单调水位线缓存（compare-and-swap 推进）
//! - 📡 跨设备推送扇出（发起会话除外的广播）
//! - 🌱 新账号种子数据初始化
//!
//! HTTP 路由、鉴权、请求校验等外层由上层服务负责；本库只消费
//! 已认证的 `RequestContext`，产出落库行、缓存更新与推送通知。
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use cardbase_server::{
//!     RequestContext, SessionFanout, StorageManager, SyncEngine, UpdateTimeCache,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 初始化存储与各组件
//!     let storage = Arc::new(StorageManager::new(Path::new("/var/lib/cardbase")).await?);
//!     let fanout = Arc::new(SessionFanout::new());
//!     let updates = Arc::new(UpdateTimeCache::new(storage.kv(), fanout.clone()));
//!     let engine = SyncEngine::new(storage, updates);
//!
//!     // 设备连接后注册推送通道
//!     let mut notifications = fanout.register(1, "device-a").unwrap();
//!
//!     // 拉取增量数据
//!     let ctx = RequestContext::new(1, "device-a");
//!     let bulk = engine.pull_cards(ctx.uid, None, 100).await?;
//!     println!("拉取到 {} 篇文档", bulk.documents.len());
//!
//!     // 其他设备推送后，本设备会收到新水位线
//!     if let Some(watermark) = notifications.recv().await {
//!         println!("收到更新通知: {}", watermark);
//!     }
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod bootstrap;
pub mod cache;
pub mod context;
pub mod error;
pub mod fanout;
pub mod storage;
pub mod sync;
pub mod utils;

// 重新导出核心类型，方便使用
pub use bootstrap::seed_account;
pub use cache::UpdateTimeCache;
pub use context::RequestContext;
pub use error::{CardbaseError, Result};
pub use fanout::SessionFanout;
pub use storage::entities::{
    is_doc_view, CardRow, CardTypeRow, RowMeta, SpaceRow, SyncRecord, TagRow, ViewEdgeRow,
    ViewNodeRow, ViewRow,
};
pub use storage::propext::{FieldKind, PropextRow, USER_CONFIG_ID};
pub use storage::StorageManager;
pub use sync::{
    CardDoc, CardTypeDoc, Checkpoint, PullBulk, PushRow, SpaceDoc, SyncEngine, TagDoc, UpdateInfo,
    ViewDoc, ViewEdgeDoc, ViewNodeDoc,
};
pub use utils::{now_millis, unid, unid_now};
