//! 传输模型与存储模型互转
//!
//! 布尔标记编码：传输层 bool ↔ 存储层 0/1 整数。
//! doc → row 用于推送落库（忽略 seq，由数据库分配）；
//! row → doc 用于拉取回包（溢出字段已由引擎回填）。

use crate::storage::entities::{
    CardRow, CardTypeRow, RowMeta, SpaceRow, TagRow, ViewEdgeRow, ViewNodeRow, ViewRow,
};
use crate::sync::docs::{
    CardDoc, CardTypeDoc, SpaceDoc, TagDoc, ViewDoc, ViewEdgeDoc, ViewNodeDoc,
};

/// 传输层 bool → 存储层 0/1
fn flag(b: bool) -> i64 {
    if b {
        1
    } else {
        0
    }
}

/// 存储层整数 → 传输层 bool（非零即真）
fn is_set(v: i64) -> bool {
    v != 0
}

fn meta_of(uid: i64, id: &str, update_time: i64, is_deleted: bool, deleted: bool) -> RowMeta {
    RowMeta {
        seq: 0,
        uid,
        id: id.to_string(),
        update_time,
        is_deleted: flag(is_deleted),
        deleted: flag(deleted),
    }
}

pub fn space_doc_to_row(uid: i64, doc: &SpaceDoc) -> SpaceRow {
    SpaceRow {
        meta: meta_of(uid, &doc.id, doc.update_time, doc.is_deleted, doc.deleted),
        name: doc.name.clone(),
        icon: doc.icon.clone(),
        desc: doc.desc.clone(),
        snum: doc.snum,
    }
}

pub fn space_row_to_doc(row: &SpaceRow) -> SpaceDoc {
    SpaceDoc {
        id: row.meta.id.clone(),
        name: row.name.clone(),
        icon: row.icon.clone(),
        desc: row.desc.clone(),
        snum: row.snum,
        update_time: row.meta.update_time,
        is_deleted: is_set(row.meta.is_deleted),
        deleted: is_set(row.meta.deleted),
    }
}

pub fn card_type_doc_to_row(uid: i64, doc: &CardTypeDoc) -> CardTypeRow {
    CardTypeRow {
        meta: meta_of(uid, &doc.id, doc.update_time, doc.is_deleted, doc.deleted),
        name: doc.name.clone(),
        icon: doc.icon.clone(),
        snum: doc.snum,
        props: doc.props.clone(),
        styles: doc.styles.clone(),
        desc: doc.desc.clone(),
    }
}

pub fn card_type_row_to_doc(row: &CardTypeRow) -> CardTypeDoc {
    CardTypeDoc {
        id: row.meta.id.clone(),
        name: row.name.clone(),
        icon: row.icon.clone(),
        snum: row.snum,
        props: row.props.clone(),
        styles: row.styles.clone(),
        desc: row.desc.clone(),
        update_time: row.meta.update_time,
        is_deleted: is_set(row.meta.is_deleted),
        deleted: is_set(row.meta.deleted),
    }
}

pub fn card_doc_to_row(uid: i64, doc: &CardDoc) -> CardRow {
    CardRow {
        meta: meta_of(uid, &doc.id, doc.update_time, doc.is_deleted, doc.deleted),
        name: doc.name.clone(),
        space_id: doc.space_id.clone(),
        type_id: doc.type_id.clone(),
        tags: doc.tags.clone(),
        props: doc.props.clone(),
        content: doc.content.clone(),
        create_time: doc.create_time,
    }
}

pub fn card_row_to_doc(row: &CardRow) -> CardDoc {
    CardDoc {
        id: row.meta.id.clone(),
        name: row.name.clone(),
        space_id: row.space_id.clone(),
        type_id: row.type_id.clone(),
        tags: row.tags.clone(),
        props: row.props.clone(),
        content: row.content.clone(),
        create_time: row.create_time,
        update_time: row.meta.update_time,
        is_deleted: is_set(row.meta.is_deleted),
        deleted: is_set(row.meta.deleted),
    }
}

pub fn tag_doc_to_row(uid: i64, doc: &TagDoc) -> TagRow {
    TagRow {
        meta: meta_of(uid, &doc.id, doc.update_time, doc.is_deleted, doc.deleted),
        name: doc.name.clone(),
        space_id: doc.space_id.clone(),
        pid: doc.pid.clone(),
        color: doc.color.clone(),
        snum: doc.snum,
    }
}

pub fn tag_row_to_doc(row: &TagRow) -> TagDoc {
    TagDoc {
        id: row.meta.id.clone(),
        name: row.name.clone(),
        space_id: row.space_id.clone(),
        pid: row.pid.clone(),
        color: row.color.clone(),
        snum: row.snum,
        update_time: row.meta.update_time,
        is_deleted: is_set(row.meta.is_deleted),
        deleted: is_set(row.meta.deleted),
    }
}

/// 视图 doc → row：content 不进主表，由引擎单独路由到溢出表
pub fn view_doc_to_row(uid: i64, doc: &ViewDoc) -> ViewRow {
    ViewRow {
        meta: meta_of(uid, &doc.id, doc.update_time, doc.is_deleted, doc.deleted),
        name: doc.name.clone(),
        space_id: doc.space_id.clone(),
        pid: doc.pid.clone(),
        snum: doc.snum,
        view_type: doc.view_type,
        inline_type: doc.inline_type,
        is_favor: flag(doc.is_favor),
        icon: doc.icon.clone(),
        desc: doc.desc.clone(),
        config: doc.config.clone(),
    }
}

/// 视图 row → doc：content 由调用方从溢出表取出后传入
pub fn view_row_to_doc(row: &ViewRow, content: &str) -> ViewDoc {
    ViewDoc {
        id: row.meta.id.clone(),
        name: row.name.clone(),
        space_id: row.space_id.clone(),
        pid: row.pid.clone(),
        snum: row.snum,
        view_type: row.view_type,
        inline_type: row.inline_type,
        is_favor: is_set(row.is_favor),
        icon: row.icon.clone(),
        desc: row.desc.clone(),
        config: row.config.clone(),
        content: content.to_string(),
        update_time: row.meta.update_time,
        is_deleted: is_set(row.meta.is_deleted),
        deleted: is_set(row.meta.deleted),
    }
}

pub fn view_node_doc_to_row(uid: i64, doc: &ViewNodeDoc) -> ViewNodeRow {
    ViewNodeRow {
        meta: meta_of(uid, &doc.id, doc.update_time, doc.is_deleted, doc.deleted),
        view_id: doc.view_id.clone(),
        group_id: doc.group_id.clone(),
        pid: doc.pid.clone(),
        node_type: doc.node_type,
        node_id: doc.node_id.clone(),
        vn_type_id: doc.vn_type_id.clone(),
        name: doc.name.clone(),
        content: doc.content.clone(),
    }
}

pub fn view_node_row_to_doc(row: &ViewNodeRow) -> ViewNodeDoc {
    ViewNodeDoc {
        id: row.meta.id.clone(),
        view_id: row.view_id.clone(),
        group_id: row.group_id.clone(),
        pid: row.pid.clone(),
        node_type: row.node_type,
        node_id: row.node_id.clone(),
        vn_type_id: row.vn_type_id.clone(),
        name: row.name.clone(),
        content: row.content.clone(),
        update_time: row.meta.update_time,
        is_deleted: is_set(row.meta.is_deleted),
        deleted: is_set(row.meta.deleted),
    }
}

pub fn view_edge_doc_to_row(uid: i64, doc: &ViewEdgeDoc) -> ViewEdgeRow {
    ViewEdgeRow {
        meta: meta_of(uid, &doc.id, doc.update_time, doc.is_deleted, doc.deleted),
        view_id: doc.view_id.clone(),
        source: doc.source.clone(),
        target: doc.target.clone(),
        source_handle: doc.source_handle.clone(),
        target_handle: doc.target_handle.clone(),
        ve_type_id: doc.ve_type_id.clone(),
        name: doc.name.clone(),
        content: doc.content.clone(),
    }
}

pub fn view_edge_row_to_doc(row: &ViewEdgeRow) -> ViewEdgeDoc {
    ViewEdgeDoc {
        id: row.meta.id.clone(),
        view_id: row.view_id.clone(),
        source: row.source.clone(),
        target: row.target.clone(),
        source_handle: row.source_handle.clone(),
        target_handle: row.target_handle.clone(),
        ve_type_id: row.ve_type_id.clone(),
        name: row.name.clone(),
        content: row.content.clone(),
        update_time: row.meta.update_time,
        is_deleted: is_set(row.meta.is_deleted),
        deleted: is_set(row.meta.deleted),
    }
}
