//! 同步实体仓储 - 七种实体共用的泛型数据访问层
//!
//! 按 `SyncRecord` 描述的表结构生成 SQL，提供同步协议需要的四个操作：
//! checkpoint 查询、增量列表（含分页平局补查）、批量插入、条件批量更新。

use std::collections::HashMap;
use std::marker::PhantomData;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::error::{CardbaseError, Result};
use crate::storage::entities::SyncRecord;
use crate::storage::propext::{in_params, placeholders};

/// 泛型实体仓储
pub struct EntityDao<'a, R> {
    conn: &'a Connection,
    _marker: PhantomData<R>,
}

impl<'a, R: SyncRecord> EntityDao<'a, R> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            _marker: PhantomData,
        }
    }

    /// 查询候选 id 集合中已存在记录的 update_time（缺席表示尚未创建）
    pub fn checkpoint_map(&self, uid: i64, ids: &[String]) -> Result<HashMap<String, i64>> {
        let mut map = HashMap::new();
        if ids.is_empty() {
            return Ok(map);
        }
        let sql = format!(
            "SELECT id, update_time FROM \"{}\" WHERE uid = ?1 AND id IN ({})",
            R::TABLE,
            placeholders(ids.len(), 2)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| CardbaseError::Database(format!("准备 checkpoint 查询失败: {}", e)))?;
        let mut rows = stmt
            .query(params_from_iter(in_params(uid, ids)))
            .map_err(|e| CardbaseError::Database(format!("查询 checkpoint 失败: {}", e)))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| CardbaseError::Database(format!("读取 checkpoint 失败: {}", e)))?
        {
            map.insert(row.get::<_, String>(0)?, row.get::<_, i64>(1)?);
        }
        Ok(map)
    }

    /// 增量列表：update_time 升序，最多 limit 条
    ///
    /// 恰好取满 limit 条时，尾部 update_time 可能还有未返回的同刻记录；
    /// 补查「同一 update_time 且 seq 更大」的剩余行并全部追加（不设上限），
    /// 保证分页边界上的时间戳平局不会悄悄丢行。
    pub fn list_since(&self, uid: i64, since: i64, limit: usize) -> Result<Vec<R>> {
        let sql = format!(
            "SELECT * FROM \"{}\" WHERE uid = ?1 AND update_time > ?2 \
             ORDER BY update_time, seq LIMIT ?3",
            R::TABLE
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| CardbaseError::Database(format!("准备增量查询失败: {}", e)))?;
        let mut list = Vec::new();
        let mut rows = stmt
            .query(params_from_iter([
                Value::from(uid),
                Value::from(since),
                Value::from(limit as i64),
            ]))
            .map_err(|e| CardbaseError::Database(format!("查询增量列表失败: {}", e)))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| CardbaseError::Database(format!("读取增量列表失败: {}", e)))?
        {
            list.push(R::from_row(row)?);
        }
        drop(rows);

        if list.len() == limit && limit > 0 {
            let last = list
                .last()
                .map(|r| (r.meta().update_time, r.meta().seq))
                .unwrap_or((0, 0));
            let sql = format!(
                "SELECT * FROM \"{}\" WHERE uid = ?1 AND update_time = ?2 AND seq > ?3 \
                 ORDER BY seq",
                R::TABLE
            );
            let mut stmt = self
                .conn
                .prepare(&sql)
                .map_err(|e| CardbaseError::Database(format!("准备平局补查失败: {}", e)))?;
            let mut rows = stmt
                .query(params_from_iter([
                    Value::from(uid),
                    Value::from(last.0),
                    Value::from(last.1),
                ]))
                .map_err(|e| CardbaseError::Database(format!("平局补查失败: {}", e)))?;
            while let Some(row) = rows
                .next()
                .map_err(|e| CardbaseError::Database(format!("读取平局补查结果失败: {}", e)))?
            {
                list.push(R::from_row(row)?);
            }
        }
        Ok(list)
    }

    /// 批量插入（seq 由数据库分配）
    pub fn insert_many(&self, rows: &[R]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let columns: Vec<String> = ["uid", "id", "update_time", "is_deleted", "deleted"]
            .iter()
            .map(|c| c.to_string())
            .chain(R::CLIENT_COLUMNS.iter().map(|c| c.to_string()))
            .collect();
        let quoted: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            R::TABLE,
            quoted.join(", "),
            placeholders(columns.len(), 1)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| CardbaseError::Database(format!("准备批量插入失败: {}", e)))?;
        for row in rows {
            let meta = row.meta();
            let mut values = vec![
                Value::from(meta.uid),
                Value::from(meta.id.clone()),
                Value::from(meta.update_time),
                Value::from(meta.is_deleted),
                Value::from(meta.deleted),
            ];
            values.extend(row.client_values());
            stmt.execute(params_from_iter(values))
                .map_err(|e| CardbaseError::Database(format!("批量插入失败: {}", e)))?;
        }
        Ok(())
    }

    /// 批量更新：逐条按 (uid, id) 定位，只写客户端可写列
    ///
    /// 条件 `update_time < 新值` 使同一行的并发写在数据库层面按时间戳裁决，
    /// 过期写落到 0 行，不报错。返回实际生效的行数。
    pub fn update_many(&self, rows: &[R]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut assigns: Vec<String> = vec![
            "update_time = ?1".to_string(),
            "is_deleted = ?2".to_string(),
            "deleted = ?3".to_string(),
        ];
        for (i, col) in R::CLIENT_COLUMNS.iter().enumerate() {
            assigns.push(format!("\"{}\" = ?{}", col, i + 4));
        }
        let base = R::CLIENT_COLUMNS.len() + 4;
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE uid = ?{} AND id = ?{} AND update_time < ?{}",
            R::TABLE,
            assigns.join(", "),
            base,
            base + 1,
            base + 2
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| CardbaseError::Database(format!("准备批量更新失败: {}", e)))?;
        let mut applied = 0usize;
        for row in rows {
            let meta = row.meta();
            let mut values = vec![
                Value::from(meta.update_time),
                Value::from(meta.is_deleted),
                Value::from(meta.deleted),
            ];
            values.extend(row.client_values());
            values.push(Value::from(meta.uid));
            values.push(Value::from(meta.id.clone()));
            values.push(Value::from(meta.update_time));
            applied += stmt
                .execute(params_from_iter(values))
                .map_err(|e| CardbaseError::Database(format!("批量更新失败: {}", e)))?;
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entities::{RowMeta, SpaceRow};
    use crate::storage::migrate;
    use tempfile::TempDir;

    fn create_test_db() -> (TempDir, Connection) {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        migrate::init_db(&mut conn).unwrap();
        (temp_dir, conn)
    }

    fn space(uid: i64, id: &str, update_time: i64, name: &str) -> SpaceRow {
        SpaceRow {
            meta: RowMeta::new(uid, id, update_time),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_checkpoint_map() {
        let (_temp_dir, conn) = create_test_db();
        let dao = EntityDao::<SpaceRow>::new(&conn);

        dao.insert_many(&[space(1, "A", 100, "a"), space(1, "B", 200, "b")])
            .unwrap();

        let map = dao
            .checkpoint_map(1, &["A".to_string(), "B".to_string(), "C".to_string()])
            .unwrap();
        assert_eq!(map.get("A"), Some(&100));
        assert_eq!(map.get("B"), Some(&200));
        assert!(!map.contains_key("C"));

        // 其他租户不可见
        let other = dao.checkpoint_map(2, &["A".to_string()]).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn test_list_since_ordered_and_capped() {
        let (_temp_dir, conn) = create_test_db();
        let dao = EntityDao::<SpaceRow>::new(&conn);

        dao.insert_many(&[
            space(1, "A", 300, "a"),
            space(1, "B", 100, "b"),
            space(1, "C", 200, "c"),
        ])
        .unwrap();

        let list = dao.list_since(1, 0, 10).unwrap();
        let ids: Vec<&str> = list.iter().map(|r| r.meta.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C", "A"]);

        // checkpoint 之后的才返回
        let list = dao.list_since(1, 100, 10).unwrap();
        let ids: Vec<&str> = list.iter().map(|r| r.meta.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A"]);
    }

    #[test]
    fn test_list_since_page_boundary_tie_safety() {
        let (_temp_dir, conn) = create_test_db();
        let dao = EntityDao::<SpaceRow>::new(&conn);

        // 5 条记录共享同一 update_time，limit=2 跨过分页边界
        dao.insert_many(&[
            space(1, "A", 100, "a"),
            space(1, "B", 100, "b"),
            space(1, "C", 100, "c"),
            space(1, "D", 100, "d"),
            space(1, "E", 100, "e"),
        ])
        .unwrap();

        let list = dao.list_since(1, 0, 2).unwrap();
        // 平局补查把剩余同刻记录全部带回，一条不丢
        assert_eq!(list.len(), 5);
        let mut ids: Vec<&str> = list.iter().map(|r| r.meta.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_update_many_conditional() {
        let (_temp_dir, conn) = create_test_db();
        let dao = EntityDao::<SpaceRow>::new(&conn);

        dao.insert_many(&[space(1, "A", 200, "old")]).unwrap();

        // 时间戳更大，生效
        let applied = dao.update_many(&[space(1, "A", 300, "new")]).unwrap();
        assert_eq!(applied, 1);
        // 时间戳更小，数据库层面丢弃
        let applied = dao.update_many(&[space(1, "A", 250, "stale")]).unwrap();
        assert_eq!(applied, 0);
        // 时间戳相等也丢弃
        let applied = dao.update_many(&[space(1, "A", 300, "equal")]).unwrap();
        assert_eq!(applied, 0);

        let list = dao.list_since(1, 0, 10).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "new");
        assert_eq!(list[0].meta.update_time, 300);
    }

    #[test]
    fn test_update_does_not_touch_seq() {
        let (_temp_dir, conn) = create_test_db();
        let dao = EntityDao::<SpaceRow>::new(&conn);

        dao.insert_many(&[space(1, "A", 100, "a")]).unwrap();
        let before = dao.list_since(1, 0, 10).unwrap()[0].meta.seq;
        dao.update_many(&[space(1, "A", 200, "a2")]).unwrap();
        let after = dao.list_since(1, 0, 10).unwrap()[0].meta.seq;
        assert_eq!(before, after);
    }
}
