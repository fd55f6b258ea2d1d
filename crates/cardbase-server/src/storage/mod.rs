//! 存储管理模块 - SQLite 主存储 + sled KV 缓存
//!
//! 服务端单库多租户：所有用户的数据落在同一个 SQLite 数据库，
//! 行级以 uid 分区；sled 作为水位线等热数据的快速键值缓存。

pub mod dao;
pub mod entities;
pub mod kv;
pub mod migrate;
pub mod propext;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::{CardbaseError, Result};
use kv::KvStore;

/// 存储管理器：持有数据库连接与 KV 实例，供引擎与缓存层共享
#[derive(Debug)]
pub struct StorageManager {
    #[allow(dead_code)]
    base_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
    kv: Arc<KvStore>,
}

impl StorageManager {
    /// 初始化存储：建目录 → 开库 → pragmas + migrations → 开 KV
    pub async fn new(base_path: &Path) -> Result<Self> {
        let base_path = base_path.to_path_buf();
        tokio::fs::create_dir_all(&base_path)
            .await
            .map_err(|e| CardbaseError::IO(format!("创建存储目录失败: {}", e)))?;

        let db_path = base_path.join("cardbase.db");
        let mut conn = Connection::open(&db_path)
            .map_err(|e| CardbaseError::Database(format!("打开数据库失败: {}", e)))?;
        migrate::init_db(&mut conn)?;

        let kv = KvStore::open(&base_path.join("kv"))?;

        tracing::info!("存储初始化完成: {}", base_path.display());

        Ok(Self {
            base_path,
            conn: Arc::new(Mutex::new(conn)),
            kv: Arc::new(kv),
        })
    }

    /// 获取数据库连接（调用方持锁期间执行同步的 rusqlite 操作）
    pub fn conn(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// 获取 KV 实例
    pub fn kv(&self) -> Arc<KvStore> {
        self.kv.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_storage_manager_init() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageManager::new(temp_dir.path()).await.unwrap();

        // 表已建好
        let conn_m = storage.conn();
        let conn = conn_m.lock().await;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='card')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(exists);
        drop(conn);

        // KV 可用
        storage.kv().set("probe", &1i64).unwrap();
        assert_eq!(storage.kv().get::<i64>("probe").unwrap(), Some(1));
    }
}
