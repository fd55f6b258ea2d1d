//! 用户更新时间缓存 - 每用户一条单调不减的水位线
//!
//! 水位线 = 该用户所有已同步实体的最大 update_time，客户端据此判断
//! 是否需要拉取。首次读取时以当前墙钟时间懒初始化（而不是 0），
//! 避免新用户触发全量历史拉取。推进必须走 compare-and-swap，
//! 同一用户多设备并发推送时不丢更新。

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::fanout::SessionFanout;
use crate::storage::kv::KvStore;
use crate::sync::docs::UpdateInfo;
use crate::utils::now_millis;

const USER_UPDATE_KEY: &str = "user_update:";

/// 水位线缓存：KV 存储 + 推进成功后的扇出通知
pub struct UpdateTimeCache {
    kv: Arc<KvStore>,
    fanout: Arc<SessionFanout>,
}

impl UpdateTimeCache {
    pub fn new(kv: Arc<KvStore>, fanout: Arc<SessionFanout>) -> Self {
        Self { kv, fanout }
    }

    fn key(uid: i64) -> String {
        format!("{}{}", USER_UPDATE_KEY, uid)
    }

    /// 读取当前水位线；不存在时以当前时间懒初始化
    ///
    /// 初始化走 CAS，多个并发首读收敛到同一个种子值。
    pub fn get(&self, uid: i64) -> Result<i64> {
        let key = Self::key(uid);
        loop {
            if let Some(value) = self.kv.get::<i64>(&key)? {
                return Ok(value);
            }
            let now = now_millis();
            if self.kv.compare_and_swap_i64(&key, None, now)? {
                debug!("水位线初始化: uid={} value={}", uid, now);
                return Ok(now);
            }
            // CAS 失败说明并发初始化已完成，重读即可
        }
    }

    /// 推进水位线：candidate 大于当前值时写入并通知其他会话，返回是否推进
    pub fn advance(&self, uid: i64, rid: &str, candidate: i64) -> Result<bool> {
        let key = Self::key(uid);
        loop {
            let current = self.get(uid)?;
            if current >= candidate {
                return Ok(false);
            }
            if self.kv.compare_and_swap_i64(&key, Some(current), candidate)? {
                // 推送更新消息给同一用户的其他客户端
                self.fanout.notify(uid, rid, candidate);
                return Ok(true);
            }
            // 并发推进导致 CAS 失败，重读后再判
        }
    }

    /// 更新信息探针：水位线 + 服务端当前时间（客户端据此估算时钟偏移）
    pub fn update_info(&self, uid: i64) -> Result<UpdateInfo> {
        Ok(UpdateInfo {
            last_update_time: self.get(uid)?,
            current_time: now_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, UpdateTimeCache, Arc<SessionFanout>) {
        let temp_dir = TempDir::new().unwrap();
        let kv = Arc::new(KvStore::open(&temp_dir.path().join("kv")).unwrap());
        let fanout = Arc::new(SessionFanout::new());
        (temp_dir, UpdateTimeCache::new(kv, fanout.clone()), fanout)
    }

    #[test]
    fn test_get_seeds_with_wall_clock() {
        let (_temp_dir, cache, _fanout) = setup();
        let before = now_millis();
        let seeded = cache.get(1).unwrap();
        assert!(seeded >= before);
        // 再次读取返回同一个种子，不重复初始化
        assert_eq!(cache.get(1).unwrap(), seeded);
    }

    #[test]
    fn test_advance_is_monotonic() {
        let (_temp_dir, cache, _fanout) = setup();
        let base = now_millis() + 60_000;

        assert!(cache.advance(1, "r1", base).unwrap());
        // 不大于当前值的候选一律拒绝
        assert!(!cache.advance(1, "r1", base).unwrap());
        assert!(!cache.advance(1, "r1", base - 1).unwrap());
        assert!(cache.advance(1, "r2", base + 5).unwrap());
        assert_eq!(cache.get(1).unwrap(), base + 5);

        // 用户之间互不影响
        let other = cache.get(2).unwrap();
        assert_ne!(other, base + 5);
    }

    #[test]
    fn test_advance_notifies_other_sessions_only() {
        let (_temp_dir, cache, fanout) = setup();
        let mut rx_origin = fanout.register(1, "s1").unwrap();
        let mut rx_other = fanout.register(1, "s2").unwrap();
        let base = now_millis() + 60_000;

        assert!(cache.advance(1, "s1", base).unwrap());
        assert_eq!(rx_other.try_recv().unwrap(), base);
        assert!(rx_origin.try_recv().is_err());

        // 推进失败不产生通知
        assert!(!cache.advance(1, "s1", base - 1).unwrap());
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn test_update_info() {
        let (_temp_dir, cache, _fanout) = setup();
        let base = now_millis() + 60_000;
        cache.advance(1, "r", base).unwrap();

        let info = cache.update_info(1).unwrap();
        assert_eq!(info.last_update_time, base);
        assert!(info.current_time >= now_millis() - 1_000);
    }
}
