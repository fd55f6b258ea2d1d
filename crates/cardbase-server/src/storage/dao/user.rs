//! 用户数据访问层 - 核心只关心 config 列
//!
//! 账号体系（注册、登录、令牌）由外部系统负责，这里只维护
//! 同步核心需要的最小用户面：建号占位与用户配置读写。

use rusqlite::{params, Connection};

use crate::error::{CardbaseError, Result};

pub struct UserDao<'a> {
    conn: &'a Connection,
}

impl<'a> UserDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 建号占位（已存在则忽略）
    pub fn ensure(&self, uid: i64, create_time: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO \"user\" (id, config, create_time) VALUES (?1, '', ?2)",
                params![uid, create_time],
            )
            .map_err(|e| CardbaseError::Database(format!("创建用户记录失败: {}", e)))?;
        Ok(())
    }

    /// 读取用户配置（主表列；溢出场景由上层回退到 propext）
    pub fn get_config(&self, uid: i64) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT config FROM \"user\" WHERE id = ?1")
            .map_err(|e| CardbaseError::Database(format!("准备配置查询失败: {}", e)))?;
        let mut rows = stmt
            .query(params![uid])
            .map_err(|e| CardbaseError::Database(format!("查询用户配置失败: {}", e)))?;
        match rows
            .next()
            .map_err(|e| CardbaseError::Database(format!("读取用户配置失败: {}", e)))?
        {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// 写入用户配置主表列
    pub fn update_config(&self, uid: i64, config: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE \"user\" SET config = ?1 WHERE id = ?2",
                params![config, uid],
            )
            .map_err(|e| CardbaseError::Database(format!("更新用户配置失败: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrate;
    use tempfile::TempDir;

    #[test]
    fn test_user_config_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        migrate::init_db(&mut conn).unwrap();
        let dao = UserDao::new(&conn);

        assert!(dao.get_config(7).unwrap().is_none());
        dao.ensure(7, 1000).unwrap();
        dao.ensure(7, 2000).unwrap(); // 幂等
        assert_eq!(dao.get_config(7).unwrap().unwrap(), "");

        dao.update_config(7, "{\"theme\":\"dark\"}").unwrap();
        assert_eq!(dao.get_config(7).unwrap().unwrap(), "{\"theme\":\"dark\"}");
    }
}
