//! KV 存储模块 - 基于 sled 的高性能键值缓存
//!
//! 本模块提供：
//! - 服务端共享的键值存储（多租户按 key 前缀区分，不按用户分树）
//! - JSON 序列化的类型化读写
//! - 原子 compare-and-swap（水位线推进依赖它避免并发丢更新）

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};

use crate::error::{CardbaseError, Result};

/// KV 存储组件
#[derive(Debug)]
pub struct KvStore {
    #[allow(dead_code)]
    db: Db,
    tree: Tree,
}

impl KvStore {
    /// 打开 KV 存储（目录不存在时自动创建）
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| CardbaseError::KvStore(format!("打开 sled 数据库失败: {}", e)))?;
        let tree = db
            .open_tree("cardbase")
            .map_err(|e| CardbaseError::KvStore(format!("打开 Tree 失败: {}", e)))?;
        Ok(Self { db, tree })
    }

    /// 设置键值对
    pub fn set<V>(&self, key: &str, value: &V) -> Result<()>
    where
        V: Serialize,
    {
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| CardbaseError::Serialization(format!("序列化值失败: {}", e)))?;
        self.tree
            .insert(key, value_bytes)
            .map_err(|e| CardbaseError::KvStore(format!("设置键值对失败: {}", e)))?;
        Ok(())
    }

    /// 获取键值对
    pub fn get<V>(&self, key: &str) -> Result<Option<V>>
    where
        V: DeserializeOwned,
    {
        let result = self
            .tree
            .get(key)
            .map_err(|e| CardbaseError::KvStore(format!("获取键值对失败: {}", e)))?;
        match result {
            Some(value_bytes) => {
                let value = serde_json::from_slice(&value_bytes)
                    .map_err(|e| CardbaseError::Serialization(format!("反序列化值失败: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 删除键值对
    pub fn delete(&self, key: &str) -> Result<()> {
        self.tree
            .remove(key)
            .map_err(|e| CardbaseError::KvStore(format!("删除键值对失败: {}", e)))?;
        Ok(())
    }

    /// 检查键是否存在
    pub fn exists(&self, key: &str) -> Result<bool> {
        self.tree
            .contains_key(key)
            .map_err(|e| CardbaseError::KvStore(format!("检查键存在失败: {}", e)))
    }

    /// 原子 compare-and-swap：当前值等于 `old` 时写入 `new`，返回是否成功
    ///
    /// 值按 JSON 编码比较，i64 的 JSON 编码是规范化的十进制串，可安全用于 CAS。
    pub fn compare_and_swap_i64(&self, key: &str, old: Option<i64>, new: i64) -> Result<bool> {
        let old_bytes = match old {
            Some(v) => Some(
                serde_json::to_vec(&v)
                    .map_err(|e| CardbaseError::Serialization(format!("序列化旧值失败: {}", e)))?,
            ),
            None => None,
        };
        let new_bytes = serde_json::to_vec(&new)
            .map_err(|e| CardbaseError::Serialization(format!("序列化新值失败: {}", e)))?;
        let result = self
            .tree
            .compare_and_swap(key, old_bytes, Some(new_bytes))
            .map_err(|e| CardbaseError::KvStore(format!("原子替换失败: {}", e)))?;
        Ok(result.is_ok())
    }
}
