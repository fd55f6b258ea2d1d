//! 请求上下文 - 认证层注入的用户/会话标识
//!
//! 中间件完成鉴权后构造，并作为参数显式传入所有写路径操作。
//! 不使用任何全局可变状态，保证并发请求安全。

/// 已认证的请求上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// 用户 ID（租户分区键）
    pub uid: i64,
    /// 会话 ID（同一用户的每个设备连接各持有一个，推送时排除本会话）
    pub rid: String,
}

impl RequestContext {
    pub fn new(uid: i64, rid: impl Into<String>) -> Self {
        Self {
            uid,
            rid: rid.into(),
        }
    }
}
