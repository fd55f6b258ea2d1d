//! 扩展字段溢出表 - 主表超长字段的侧存储
//!
//! 主表字段超过阈值（或文档视图正文）时，把值落到 propext 表并把主表字段置空。
//! 不变量：主表可溢出字段为空 ⇔ 存在对应 (uid, id, type_id) 的溢出记录，
//! 两者不会同时有值，也不会在逻辑值非空时同时为空。

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::error::{CardbaseError, Result};

/// 用户配置在溢出表中的固定实体 ID
pub const USER_CONFIG_ID: &str = "user_configs";

/// 溢出字段类别（存储值 1-9 为既有数据的互操作契约，不可改动）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum FieldKind {
    /// 1 - 卡片属性
    CardProps = 1,
    /// 2 - 卡片内容
    CardContent = 2,
    /// 3 - 类型字段配置
    TypeConfig = 3,
    /// 4 - 类型样式配置
    TypeStyle = 4,
    /// 5 - 视图配置
    ViewConfig = 5,
    /// 6 - 画布边内容
    ViewEdgeContent = 6,
    /// 7 - 画布节点内容
    ViewNodeContent = 7,
    /// 8 - 用户配置
    UserConfig = 8,
    /// 9 - 文档正文
    DocContent = 9,
}

impl FieldKind {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            1 => Some(Self::CardProps),
            2 => Some(Self::CardContent),
            3 => Some(Self::TypeConfig),
            4 => Some(Self::TypeStyle),
            5 => Some(Self::ViewConfig),
            6 => Some(Self::ViewEdgeContent),
            7 => Some(Self::ViewNodeContent),
            8 => Some(Self::UserConfig),
            9 => Some(Self::DocContent),
            _ => None,
        }
    }

    /// 内存中的存在位掩码：每个类别占独立一位
    pub const fn mask(self) -> u16 {
        1 << ((self as i64) - 1)
    }
}

/// 一条溢出记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropextRow {
    pub uid: i64,
    pub id: String,
    pub kind: FieldKind,
    pub props: String,
}

impl PropextRow {
    pub fn new(uid: i64, id: impl Into<String>, kind: FieldKind, props: impl Into<String>) -> Self {
        Self {
            uid,
            id: id.into(),
            kind,
            props: props.into(),
        }
    }
}

/// 溢出表数据访问对象
pub struct PropextDao<'a> {
    conn: &'a Connection,
}

impl<'a> PropextDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 批量创建
    pub fn insert_many(&self, rows: &[PropextRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut stmt = self
            .conn
            .prepare("INSERT INTO \"propext\" (uid, id, type_id, props) VALUES (?1, ?2, ?3, ?4)")
            .map_err(|e| CardbaseError::Database(format!("准备溢出插入失败: {}", e)))?;
        for row in rows {
            stmt.execute(params![row.uid, row.id, row.kind as i64, row.props])
                .map_err(|e| CardbaseError::Database(format!("写入溢出记录失败: {}", e)))?;
        }
        Ok(())
    }

    /// 批量更新：逐条按 (uid, id, type_id) 定位
    pub fn update_many(&self, rows: &[PropextRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut stmt = self
            .conn
            .prepare("UPDATE \"propext\" SET props = ?1 WHERE uid = ?2 AND id = ?3 AND type_id = ?4")
            .map_err(|e| CardbaseError::Database(format!("准备溢出更新失败: {}", e)))?;
        for row in rows {
            stmt.execute(params![row.props, row.uid, row.id, row.kind as i64])
                .map_err(|e| CardbaseError::Database(format!("更新溢出记录失败: {}", e)))?;
        }
        Ok(())
    }

    /// 批量读取：返回 (id, kind) → props，用于拉取时回填主表空字段
    pub fn get_many(
        &self,
        uid: i64,
        ids: &[String],
    ) -> Result<HashMap<(String, FieldKind), String>> {
        let mut map = HashMap::new();
        if ids.is_empty() {
            return Ok(map);
        }
        let sql = format!(
            "SELECT id, type_id, props FROM \"propext\" WHERE uid = ?1 AND id IN ({})",
            placeholders(ids.len(), 2)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| CardbaseError::Database(format!("准备溢出查询失败: {}", e)))?;
        let mut rows = stmt
            .query(params_from_iter(in_params(uid, ids)))
            .map_err(|e| CardbaseError::Database(format!("查询溢出记录失败: {}", e)))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| CardbaseError::Database(format!("读取溢出记录失败: {}", e)))?
        {
            let id: String = row.get(0)?;
            let type_id: i64 = row.get(1)?;
            let props: String = row.get(2)?;
            if let Some(kind) = FieldKind::from_i64(type_id) {
                map.insert((id, kind), props);
            }
        }
        Ok(map)
    }

    /// 批量探测：返回 id → 已存在溢出记录的类别位掩码，用于推送时决定插入还是更新
    pub fn exists_kinds(&self, uid: i64, ids: &[String]) -> Result<HashMap<String, u16>> {
        let mut map: HashMap<String, u16> = HashMap::new();
        if ids.is_empty() {
            return Ok(map);
        }
        let sql = format!(
            "SELECT id, type_id FROM \"propext\" WHERE uid = ?1 AND id IN ({})",
            placeholders(ids.len(), 2)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| CardbaseError::Database(format!("准备溢出探测失败: {}", e)))?;
        let mut rows = stmt
            .query(params_from_iter(in_params(uid, ids)))
            .map_err(|e| CardbaseError::Database(format!("探测溢出记录失败: {}", e)))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| CardbaseError::Database(format!("读取溢出探测结果失败: {}", e)))?
        {
            let id: String = row.get(0)?;
            let type_id: i64 = row.get(1)?;
            if let Some(kind) = FieldKind::from_i64(type_id) {
                *map.entry(id).or_insert(0) |= kind.mask();
            }
        }
        Ok(map)
    }

    /// 读取单条溢出记录
    pub fn get_one(&self, uid: i64, id: &str, kind: FieldKind) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT props FROM \"propext\" WHERE uid = ?1 AND id = ?2 AND type_id = ?3")
            .map_err(|e| CardbaseError::Database(format!("准备溢出单查失败: {}", e)))?;
        let mut rows = stmt
            .query(params![uid, id, kind as i64])
            .map_err(|e| CardbaseError::Database(format!("查询溢出记录失败: {}", e)))?;
        match rows
            .next()
            .map_err(|e| CardbaseError::Database(format!("读取溢出记录失败: {}", e)))?
        {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

/// 生成 IN 子句占位符：?start, ?start+1, ...
pub(crate) fn placeholders(count: usize, start: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", start + i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// uid + id 列表的绑定参数
pub(crate) fn in_params(uid: i64, ids: &[String]) -> Vec<Value> {
    let mut values = Vec::with_capacity(ids.len() + 1);
    values.push(Value::from(uid));
    for id in ids {
        values.push(Value::from(id.clone()));
    }
    values
}
