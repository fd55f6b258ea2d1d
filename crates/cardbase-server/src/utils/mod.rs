//! 工具模块 - 时间与实体 ID 生成
//!
//! 约定：
//! - 存储层所有时间字段使用 UTC 毫秒时间戳（INTEGER）
//! - 实体 ID 为「毫秒时间戳 base62 前缀 + 随机后缀」，大致按创建时间可排序

use chrono::Utc;
use rand::Rng;

/// base62 字母表（数字 < 大写 < 小写，保证字典序与数值序一致）
const BASE: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// 时间前缀长度：62^7 可表示到公元 4000 年以后的毫秒时间戳
const TIME_LEN: usize = 7;
/// 随机后缀长度
const RAND_LEN: usize = 5;

/// 当前 UTC 毫秒时间戳
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 生成 n 位随机 base62 字符串
pub fn rand_str(n: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut b = Vec::with_capacity(n);
    for _ in 0..n {
        b.push(BASE[rng.gen_range(0..BASE.len())]);
    }
    // 只包含 ASCII 字符
    String::from_utf8(b).unwrap_or_default()
}

/// 根据给定毫秒时间戳生成实体 ID：7 位 base62 时间前缀 + 5 位随机后缀
///
/// 前缀按大端序填充，同一毫秒内生成的 ID 前缀相同，靠随机后缀避免碰撞。
pub fn unid(t: i64) -> String {
    let mut t = t;
    let mut arr = [b'0'; TIME_LEN];
    let mut i = TIME_LEN;
    while t > 0 && i > 0 {
        i -= 1;
        arr[i] = BASE[(t % 62) as usize];
        t /= 62;
    }
    let mut id = String::with_capacity(TIME_LEN + RAND_LEN);
    id.push_str(std::str::from_utf8(&arr).unwrap_or("0000000"));
    id.push_str(&rand_str(RAND_LEN));
    id
}

/// 以当前时间生成实体 ID
pub fn unid_now() -> String {
    unid(now_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unid_shape() {
        let id = unid(1_700_000_000_000);
        assert_eq!(id.len(), TIME_LEN + RAND_LEN);
        assert!(id.bytes().all(|b| BASE.contains(&b)));
    }

    #[test]
    fn test_unid_time_ordering() {
        // 不同毫秒生成的 ID，时间前缀保持数值序
        let a = unid(1_700_000_000_000);
        let b = unid(1_700_000_000_999);
        assert!(a[..TIME_LEN] < b[..TIME_LEN]);
    }

    #[test]
    fn test_unid_uniqueness() {
        // 同一毫秒下随机后缀避免碰撞
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            assert!(seen.insert(unid(1_700_000_000_000)));
        }
    }

    #[test]
    fn test_rand_str_len() {
        assert_eq!(rand_str(12).len(), 12);
        assert_eq!(rand_str(0).len(), 0);
    }
}
