//! 数据实体定义 - 对应数据库表结构
//!
//! 每张同步表共享一组公共元数据列（RowMeta），加各自的业务列。
//! `SyncRecord` 把「表名 + 客户端可写列 + 行映射」抽象出来，
//! 使仓储层对七种实体只需一份泛型实现。

use rusqlite::types::Value;
use rusqlite::Row;

/// 视图类型：0-列表, 1-白板, 2-看板, 3-甘特, 4-文档, 5-大纲
pub const VIEW_TYPE_LIST: i64 = 0;
pub const VIEW_TYPE_BOARD: i64 = 1;
pub const VIEW_TYPE_KANBAN: i64 = 2;
pub const VIEW_TYPE_GANTT: i64 = 3;
pub const VIEW_TYPE_DOC: i64 = 4;
pub const VIEW_TYPE_OUTLINE: i64 = 5;

/// 文档/大纲视图的正文无条件外置到溢出表
pub fn is_doc_view(view_type: i64) -> bool {
    view_type == VIEW_TYPE_DOC || view_type == VIEW_TYPE_OUTLINE
}

/// 同步表公共元数据列
///
/// - `seq`：行插入序（SQLite 自增主键），仅作分页平局裁决，永不下发给客户端写
/// - `is_deleted`：用户墓碑标记，仍参与同步使各端收敛
/// - `deleted`：可硬清理标记，与 `is_deleted` 相互独立
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMeta {
    pub seq: i64,
    pub uid: i64,
    pub id: String,
    pub update_time: i64,
    pub is_deleted: i64,
    pub deleted: i64,
}

impl RowMeta {
    pub fn new(uid: i64, id: impl Into<String>, update_time: i64) -> Self {
        Self {
            seq: 0,
            uid,
            id: id.into(),
            update_time,
            is_deleted: 0,
            deleted: 0,
        }
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get("seq")?,
            uid: row.get("uid")?,
            id: row.get("id")?,
            update_time: row.get("update_time")?,
            is_deleted: row.get("is_deleted")?,
            deleted: row.get("deleted")?,
        })
    }
}

/// 同步实体的表结构描述，仓储层据此生成 SQL
///
/// `CLIENT_COLUMNS` 只包含业务列；元数据列由仓储层统一处理，
/// 其中 `seq` 永不写入，`update_time`/`is_deleted`/`deleted` 随每次写入更新。
pub trait SyncRecord: Sized {
    const TABLE: &'static str;
    const CLIENT_COLUMNS: &'static [&'static str];

    fn meta(&self) -> &RowMeta;
    fn meta_mut(&mut self) -> &mut RowMeta;
    /// 业务列取值，顺序与 `CLIENT_COLUMNS` 一致
    fn client_values(&self) -> Vec<Value>;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// 空间 - 对应 space 表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceRow {
    pub meta: RowMeta,
    pub name: String,
    pub icon: String,
    pub desc: String,
    pub snum: i64,
}

impl SyncRecord for SpaceRow {
    const TABLE: &'static str = "space";
    const CLIENT_COLUMNS: &'static [&'static str] = &["name", "icon", "desc", "snum"];

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }

    fn client_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.name.clone()),
            Value::from(self.icon.clone()),
            Value::from(self.desc.clone()),
            Value::from(self.snum),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta: RowMeta::from_row(row)?,
            name: row.get("name")?,
            icon: row.get("icon")?,
            desc: row.get("desc")?,
            snum: row.get("snum")?,
        })
    }
}

/// 卡片类型 - 对应 card_type 表
///
/// props（字段配置）与 styles（样式配置）超过 4000 字符时外置（kind 3 / kind 4）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardTypeRow {
    pub meta: RowMeta,
    pub name: String,
    pub icon: String,
    pub snum: i64,
    pub props: String,
    pub styles: String,
    pub desc: String,
}

impl SyncRecord for CardTypeRow {
    const TABLE: &'static str = "card_type";
    const CLIENT_COLUMNS: &'static [&'static str] =
        &["name", "icon", "snum", "props", "styles", "desc"];

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }

    fn client_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.name.clone()),
            Value::from(self.icon.clone()),
            Value::from(self.snum),
            Value::from(self.props.clone()),
            Value::from(self.styles.clone()),
            Value::from(self.desc.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta: RowMeta::from_row(row)?,
            name: row.get("name")?,
            icon: row.get("icon")?,
            snum: row.get("snum")?,
            props: row.get("props")?,
            styles: row.get("styles")?,
            desc: row.get("desc")?,
        })
    }
}

/// 卡片 - 对应 card 表
///
/// props 超过 1000 字符、content 超过 2000 字符时外置（kind 1 / kind 2）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardRow {
    pub meta: RowMeta,
    pub name: String,
    pub space_id: String,
    pub type_id: String,
    pub tags: String,
    pub props: String,
    pub content: String,
    pub create_time: i64,
}

impl SyncRecord for CardRow {
    const TABLE: &'static str = "card";
    const CLIENT_COLUMNS: &'static [&'static str] = &[
        "name",
        "space_id",
        "type_id",
        "tags",
        "props",
        "content",
        "create_time",
    ];

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }

    fn client_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.name.clone()),
            Value::from(self.space_id.clone()),
            Value::from(self.type_id.clone()),
            Value::from(self.tags.clone()),
            Value::from(self.props.clone()),
            Value::from(self.content.clone()),
            Value::from(self.create_time),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta: RowMeta::from_row(row)?,
            name: row.get("name")?,
            space_id: row.get("space_id")?,
            type_id: row.get("type_id")?,
            tags: row.get("tags")?,
            props: row.get("props")?,
            content: row.get("content")?,
            create_time: row.get("create_time")?,
        })
    }
}

/// 标签 - 对应 tag 表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRow {
    pub meta: RowMeta,
    pub name: String,
    pub space_id: String,
    pub pid: String,
    pub color: String,
    pub snum: i64,
}

impl SyncRecord for TagRow {
    const TABLE: &'static str = "tag";
    const CLIENT_COLUMNS: &'static [&'static str] = &["name", "space_id", "pid", "color", "snum"];

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }

    fn client_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.name.clone()),
            Value::from(self.space_id.clone()),
            Value::from(self.pid.clone()),
            Value::from(self.color.clone()),
            Value::from(self.snum),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta: RowMeta::from_row(row)?,
            name: row.get("name")?,
            space_id: row.get("space_id")?,
            pid: row.get("pid")?,
            color: row.get("color")?,
            snum: row.get("snum")?,
        })
    }
}

/// 视图 - 对应 view 表
///
/// config 超过 2000 字符时外置（kind 5）；文档/大纲视图的正文不在本表，
/// 无条件存溢出表（kind 9）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewRow {
    pub meta: RowMeta,
    pub name: String,
    pub space_id: String,
    pub pid: String,
    pub snum: i64,
    pub view_type: i64,
    pub inline_type: i64,
    pub is_favor: i64,
    pub icon: String,
    pub desc: String,
    pub config: String,
}

impl SyncRecord for ViewRow {
    const TABLE: &'static str = "view";
    const CLIENT_COLUMNS: &'static [&'static str] = &[
        "name",
        "space_id",
        "pid",
        "snum",
        "view_type",
        "inline_type",
        "is_favor",
        "icon",
        "desc",
        "config",
    ];

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }

    fn client_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.name.clone()),
            Value::from(self.space_id.clone()),
            Value::from(self.pid.clone()),
            Value::from(self.snum),
            Value::from(self.view_type),
            Value::from(self.inline_type),
            Value::from(self.is_favor),
            Value::from(self.icon.clone()),
            Value::from(self.desc.clone()),
            Value::from(self.config.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta: RowMeta::from_row(row)?,
            name: row.get("name")?,
            space_id: row.get("space_id")?,
            pid: row.get("pid")?,
            snum: row.get("snum")?,
            view_type: row.get("view_type")?,
            inline_type: row.get("inline_type")?,
            is_favor: row.get("is_favor")?,
            icon: row.get("icon")?,
            desc: row.get("desc")?,
            config: row.get("config")?,
        })
    }
}

/// 画布节点 - 对应 view_node 表
///
/// content 超过 1000 字符时外置（kind 7）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewNodeRow {
    pub meta: RowMeta,
    pub view_id: String,
    pub group_id: String,
    pub pid: String,
    pub node_type: i64,
    pub node_id: String,
    pub vn_type_id: String,
    pub name: String,
    pub content: String,
}

impl SyncRecord for ViewNodeRow {
    const TABLE: &'static str = "view_node";
    const CLIENT_COLUMNS: &'static [&'static str] = &[
        "view_id",
        "group_id",
        "pid",
        "node_type",
        "node_id",
        "vn_type_id",
        "name",
        "content",
    ];

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }

    fn client_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.view_id.clone()),
            Value::from(self.group_id.clone()),
            Value::from(self.pid.clone()),
            Value::from(self.node_type),
            Value::from(self.node_id.clone()),
            Value::from(self.vn_type_id.clone()),
            Value::from(self.name.clone()),
            Value::from(self.content.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta: RowMeta::from_row(row)?,
            view_id: row.get("view_id")?,
            group_id: row.get("group_id")?,
            pid: row.get("pid")?,
            node_type: row.get("node_type")?,
            node_id: row.get("node_id")?,
            vn_type_id: row.get("vn_type_id")?,
            name: row.get("name")?,
            content: row.get("content")?,
        })
    }
}

/// 画布边 - 对应 view_edge 表
///
/// content 超过 500 字符时外置（kind 6）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewEdgeRow {
    pub meta: RowMeta,
    pub view_id: String,
    pub source: String,
    pub target: String,
    pub source_handle: String,
    pub target_handle: String,
    pub ve_type_id: String,
    pub name: String,
    pub content: String,
}

impl SyncRecord for ViewEdgeRow {
    const TABLE: &'static str = "view_edge";
    const CLIENT_COLUMNS: &'static [&'static str] = &[
        "view_id",
        "source",
        "target",
        "source_handle",
        "target_handle",
        "ve_type_id",
        "name",
        "content",
    ];

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }

    fn client_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.view_id.clone()),
            Value::from(self.source.clone()),
            Value::from(self.target.clone()),
            Value::from(self.source_handle.clone()),
            Value::from(self.target_handle.clone()),
            Value::from(self.ve_type_id.clone()),
            Value::from(self.name.clone()),
            Value::from(self.content.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta: RowMeta::from_row(row)?,
            view_id: row.get("view_id")?,
            source: row.get("source")?,
            target: row.get("target")?,
            source_handle: row.get("source_handle")?,
            target_handle: row.get("target_handle")?,
            ve_type_id: row.get("ve_type_id")?,
            name: row.get("name")?,
            content: row.get("content")?,
        })
    }
}
