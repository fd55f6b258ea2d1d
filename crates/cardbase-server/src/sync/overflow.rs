//! 溢出路由 - 超长字段从主表移入溢出表的策略
//!
//! 阈值按 Unicode 标量数计（非字节数）；恰好等于阈值保留在主表，
//! 超过阈值移入溢出表并把主表字段置空。
//! 推送更新时，已有溢出记录的字段不论长短都继续走溢出表
//! （主表字段保持为空，维持「为空 ⇔ 有溢出记录」不变量）。
//! 文档/大纲视图的正文不设阈值，无条件外置。

use crate::storage::entities::{
    is_doc_view, CardRow, CardTypeRow, ViewEdgeRow, ViewNodeRow, ViewRow,
};
use crate::storage::propext::{FieldKind, PropextRow};

/// 各 (实体, 字段) 的字符数阈值
pub const LIMIT_CARD_PROPS: usize = 1000;
pub const LIMIT_CARD_CONTENT: usize = 2000;
pub const LIMIT_TYPE_CONFIG: usize = 4000;
pub const LIMIT_TYPE_STYLE: usize = 4000;
pub const LIMIT_VIEW_CONFIG: usize = 2000;
pub const LIMIT_VIEW_EDGE_CONTENT: usize = 500;
pub const LIMIT_VIEW_NODE_CONTENT: usize = 1000;
pub const LIMIT_USER_CONFIG: usize = 2000;

/// 字段是否超过阈值（按 Unicode 标量数）
pub fn over_limit(s: &str, limit: usize) -> bool {
    s.chars().count() > limit
}

/// 单字段路由：已有溢出记录 ⇒ 更新溢出并清空主表字段；
/// 否则超长 ⇒ 新建溢出并清空主表字段；否则留在主表。
/// 插入路径传 ext_mask = 0 即可。
fn route_field(
    uid: i64,
    id: &str,
    kind: FieldKind,
    limit: usize,
    field: &mut String,
    ext_mask: u16,
    inserts: &mut Vec<PropextRow>,
    updates: &mut Vec<PropextRow>,
) {
    if ext_mask & kind.mask() > 0 {
        updates.push(PropextRow::new(uid, id, kind, std::mem::take(field)));
    } else if over_limit(field, limit) {
        inserts.push(PropextRow::new(uid, id, kind, std::mem::take(field)));
    }
}

pub(crate) fn spill_card(
    row: &mut CardRow,
    ext_mask: u16,
    inserts: &mut Vec<PropextRow>,
    updates: &mut Vec<PropextRow>,
) {
    let uid = row.meta.uid;
    let id = row.meta.id.clone();
    route_field(
        uid,
        &id,
        FieldKind::CardProps,
        LIMIT_CARD_PROPS,
        &mut row.props,
        ext_mask,
        inserts,
        updates,
    );
    route_field(
        uid,
        &id,
        FieldKind::CardContent,
        LIMIT_CARD_CONTENT,
        &mut row.content,
        ext_mask,
        inserts,
        updates,
    );
}

pub(crate) fn spill_card_type(
    row: &mut CardTypeRow,
    ext_mask: u16,
    inserts: &mut Vec<PropextRow>,
    updates: &mut Vec<PropextRow>,
) {
    let uid = row.meta.uid;
    let id = row.meta.id.clone();
    route_field(
        uid,
        &id,
        FieldKind::TypeConfig,
        LIMIT_TYPE_CONFIG,
        &mut row.props,
        ext_mask,
        inserts,
        updates,
    );
    route_field(
        uid,
        &id,
        FieldKind::TypeStyle,
        LIMIT_TYPE_STYLE,
        &mut row.styles,
        ext_mask,
        inserts,
        updates,
    );
}

/// 视图：config 走阈值路由；文档/大纲视图的正文无条件外置，
/// 插入还是更新由溢出记录是否已存在决定。
pub(crate) fn spill_view(
    row: &mut ViewRow,
    content: &str,
    ext_mask: u16,
    inserts: &mut Vec<PropextRow>,
    updates: &mut Vec<PropextRow>,
) {
    let uid = row.meta.uid;
    let id = row.meta.id.clone();
    route_field(
        uid,
        &id,
        FieldKind::ViewConfig,
        LIMIT_VIEW_CONFIG,
        &mut row.config,
        ext_mask,
        inserts,
        updates,
    );
    if is_doc_view(row.view_type) {
        let prop = PropextRow::new(uid, &id, FieldKind::DocContent, content);
        if ext_mask & FieldKind::DocContent.mask() > 0 {
            updates.push(prop);
        } else {
            inserts.push(prop);
        }
    }
}

pub(crate) fn spill_view_node(
    row: &mut ViewNodeRow,
    ext_mask: u16,
    inserts: &mut Vec<PropextRow>,
    updates: &mut Vec<PropextRow>,
) {
    let uid = row.meta.uid;
    let id = row.meta.id.clone();
    route_field(
        uid,
        &id,
        FieldKind::ViewNodeContent,
        LIMIT_VIEW_NODE_CONTENT,
        &mut row.content,
        ext_mask,
        inserts,
        updates,
    );
}

pub(crate) fn spill_view_edge(
    row: &mut ViewEdgeRow,
    ext_mask: u16,
    inserts: &mut Vec<PropextRow>,
    updates: &mut Vec<PropextRow>,
) {
    let uid = row.meta.uid;
    let id = row.meta.id.clone();
    route_field(
        uid,
        &id,
        FieldKind::ViewEdgeContent,
        LIMIT_VIEW_EDGE_CONTENT,
        &mut row.content,
        ext_mask,
        inserts,
        updates,
    );
}
