//! 推送扇出 - 按 (用户, 会话) 维护的在线连接表
//!
//! 水位线推进后，把新值广播给同一用户的**其他**会话（发起写入的设备
//! 不需要回拉自己的改动）。投递是尽力而为：通知只是降低拉取延迟的
//! 优化，丢失或乱序时客户端靠重新拉取收敛，单个接收方的故障不会
//! 影响其他会话，更不会影响写入方。
//!
//! 连接状态机：registered → (streaming) → unregistered，注销即终态；
//! 客户端重连时换新会话 ID 重新注册。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// 每个会话通道的缓冲容量；慢客户端塞满缓冲后的通知直接丢弃
const CHANNEL_CAPACITY: usize = 16;

/// 客户端连接表：uid → rid → 发送端
#[derive(Debug, Default)]
pub struct SessionFanout {
    clients: RwLock<HashMap<i64, HashMap<String, mpsc::Sender<i64>>>>,
}

impl SessionFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册会话连接，返回接收端；uid/rid 非法时拒绝（返回 None）
    ///
    /// 同一 rid 重复注册时替换旧通道（旧接收端随 sender 丢弃而关闭）。
    pub fn register(&self, uid: i64, rid: &str) -> Option<mpsc::Receiver<i64>> {
        if uid <= 0 || rid.is_empty() {
            return None;
        }
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut clients = self.clients.write();
        clients.entry(uid).or_default().insert(rid.to_string(), tx);
        debug!("会话注册: uid={} rid={}", uid, rid);
        Some(rx)
    }

    /// 注销会话连接；可重复调用（幂等）
    pub fn unregister(&self, uid: i64, rid: &str) {
        if uid <= 0 || rid.is_empty() {
            return;
        }
        let mut clients = self.clients.write();
        if let Some(sessions) = clients.get_mut(&uid) {
            sessions.remove(rid);
            if sessions.is_empty() {
                clients.remove(&uid);
            }
        }
        debug!("会话注销: uid={} rid={}", uid, rid);
    }

    /// 把 value 投递给 uid 的所有会话，发起方 origin_rid 除外
    ///
    /// 通道已满/已关闭只记日志，不向写入方传播。
    pub fn notify(&self, uid: i64, origin_rid: &str, value: i64) {
        if uid <= 0 || origin_rid.is_empty() {
            return;
        }
        let targets: Vec<(String, mpsc::Sender<i64>)> = {
            let clients = self.clients.read();
            match clients.get(&uid) {
                Some(sessions) => sessions
                    .iter()
                    .filter(|(rid, _)| rid.as_str() != origin_rid)
                    .map(|(rid, tx)| (rid.clone(), tx.clone()))
                    .collect(),
                None => return,
            }
        };
        for (rid, tx) in targets {
            if let Err(e) = tx.try_send(value) {
                warn!("通知投递失败: uid={} rid={} value={} err={}", uid, rid, value, e);
            }
        }
    }

    /// 连接建立约 1 秒后下发一个空值 0，让客户端据此校准重试间隔
    pub fn send_retry_hint(&self, uid: i64, rid: &str) {
        let tx = {
            let clients = self.clients.read();
            clients
                .get(&uid)
                .and_then(|sessions| sessions.get(rid))
                .cloned()
        };
        let Some(tx) = tx else { return };
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.try_send(0);
        });
    }

    /// 清理已关闭的通道，返回清理数量
    ///
    /// 客户端异常消失不会调用 unregister，定期清扫避免连接表无限增长。
    pub fn evict_closed(&self) -> usize {
        let mut removed = 0;
        let mut clients = self.clients.write();
        clients.retain(|_, sessions| {
            sessions.retain(|_, tx| {
                if tx.is_closed() {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
            !sessions.is_empty()
        });
        removed
    }

    /// 启动定期清扫任务
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let removed = self.evict_closed();
                if removed > 0 {
                    debug!("清理失效会话通道: {}", removed);
                }
            }
        })
    }

    /// 某用户当前注册的会话数
    pub fn session_count(&self, uid: i64) -> usize {
        self.clients
            .read()
            .get(&uid)
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_rejects_invalid() {
        let fanout = SessionFanout::new();
        assert!(fanout.register(0, "rid").is_none());
        assert!(fanout.register(-1, "rid").is_none());
        assert!(fanout.register(1, "").is_none());
        assert!(fanout.register(1, "rid").is_some());
        assert_eq!(fanout.session_count(1), 1);
    }

    #[test]
    fn test_notify_excludes_origin_session() {
        let fanout = SessionFanout::new();
        let mut rx1 = fanout.register(1, "s1").unwrap();
        let mut rx2 = fanout.register(1, "s2").unwrap();

        fanout.notify(1, "s1", 42);

        // 发起方 s1 收不到本次通知，s2 收到新水位值
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), 42);

        // 其他用户不受影响
        let mut rx3 = fanout.register(2, "s1").unwrap();
        fanout.notify(1, "s2", 43);
        assert!(rx3.try_recv().is_err());
        assert_eq!(rx1.try_recv().unwrap(), 43);
    }

    #[test]
    fn test_unregister_idempotent_and_isolated() {
        let fanout = SessionFanout::new();
        let _rx1 = fanout.register(1, "s1").unwrap();
        let mut rx2 = fanout.register(1, "s2").unwrap();

        fanout.unregister(1, "s1");
        fanout.unregister(1, "s1"); // 重复注销安全
        fanout.unregister(1, "");   // 非法参数忽略
        assert_eq!(fanout.session_count(1), 1);

        // 注销后的通道不再投递，其余会话正常
        fanout.notify(1, "other", 7);
        assert_eq!(rx2.try_recv().unwrap(), 7);
    }

    #[test]
    fn test_notify_survives_dropped_receiver() {
        let fanout = SessionFanout::new();
        let rx1 = fanout.register(1, "s1").unwrap();
        let mut rx2 = fanout.register(1, "s2").unwrap();
        drop(rx1);

        // 接收端已销毁也不恐慌，正常会话照常投递
        fanout.notify(1, "origin", 99);
        assert_eq!(rx2.try_recv().unwrap(), 99);
    }

    #[test]
    fn test_evict_closed_channels() {
        let fanout = SessionFanout::new();
        let rx1 = fanout.register(1, "s1").unwrap();
        let _rx2 = fanout.register(1, "s2").unwrap();
        let rx3 = fanout.register(2, "s3").unwrap();
        drop(rx1);
        drop(rx3);

        assert_eq!(fanout.evict_closed(), 2);
        assert_eq!(fanout.session_count(1), 1);
        assert_eq!(fanout.session_count(2), 0);
        // 再次清扫无事可做
        assert_eq!(fanout.evict_closed(), 0);
    }

    #[tokio::test]
    async fn test_send_retry_hint_after_delay() {
        let fanout = SessionFanout::new();
        let mut rx = fanout.register(1, "s1").unwrap();

        fanout.send_retry_hint(1, "s1");
        // 约 1 秒后收到空值 0
        assert_eq!(rx.recv().await.unwrap(), 0);
    }

    #[test]
    fn test_send_retry_hint_unknown_session_is_noop() {
        let fanout = SessionFanout::new();
        // 未注册的会话直接忽略
        tokio_test::block_on(async {
            fanout.send_retry_hint(1, "ghost");
        });
        assert_eq!(fanout.session_count(1), 0);
    }
}
