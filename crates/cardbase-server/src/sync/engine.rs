//! 同步引擎 - 拉取/推送协议核心
//!
//! 每种实体两个操作：
//! - **pull**：按 checkpoint 增量查询，回填溢出字段，返回文档与新 checkpoint；
//! - **push**：批量 checkpoint 比对后按「最新时间戳胜出」分流
//!   插入 / 更新 / 丢弃，超长字段路由到溢出表，主表与溢出表的写入在
//!   同一事务内提交，最后以幸存行的最大 update_time 推进用户水位线。
//!
//! 过期写静默丢弃，不计入返回值——返回的冲突列表恒为空，客户端靠
//! 重新拉取发现自己的写入被覆盖。推送是幂等的：同一批数据重复提交，
//! 第二次会因「存储时间戳 ≥ 提交时间戳」而整体落空。
//!
//! ## NOTE: Engine 不做重试
//!
//! 拉取/推送失败以整体失败上报，由客户端按 checkpoint 幂等重试；
//! 引擎内部不含任何 retry / backoff 策略。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cache::UpdateTimeCache;
use crate::context::RequestContext;
use crate::error::{CardbaseError, Result};
use crate::storage::dao::{EntityDao, UserDao};
use crate::storage::entities::{
    is_doc_view, CardRow, CardTypeRow, SpaceRow, SyncRecord, TagRow, ViewEdgeRow, ViewNodeRow,
    ViewRow,
};
use crate::storage::propext::{FieldKind, PropextDao, PropextRow, USER_CONFIG_ID};
use crate::storage::StorageManager;
use crate::sync::convert;
use crate::sync::docs::{
    CardDoc, CardTypeDoc, Checkpoint, PullBulk, PushRow, SpaceDoc, TagDoc, UpdateInfo, ViewDoc,
    ViewEdgeDoc, ViewNodeDoc,
};
use crate::sync::overflow;

/// 拉取条数上限的兜底值
fn clamp_limit(limit: i64) -> usize {
    if limit <= 0 || limit > 200 {
        100
    } else {
        limit as usize
    }
}

/// checkpoint 输入归一化：缺省或非正值视为「从头拉取」
fn since_of(checkpoint: Option<Checkpoint>) -> i64 {
    checkpoint
        .map(|c| c.update_time)
        .filter(|&t| t > 0)
        .unwrap_or(0)
}

/// LWW 分流结果
struct Partition<R> {
    inserts: Vec<R>,
    updates: Vec<R>,
    update_ids: Vec<String>,
    max_time: i64,
}

/// 按 checkpoint 比对分流：库中缺席 ⇒ 插入；库中时间戳更小 ⇒ 更新；
/// 否则为过期写，静默丢弃。max_time 只统计幸存行。
fn partition<R: SyncRecord>(check: &HashMap<String, i64>, recs: Vec<R>) -> Partition<R> {
    let mut part = Partition {
        inserts: Vec::new(),
        updates: Vec::new(),
        update_ids: Vec::new(),
        max_time: 0,
    };
    for rec in recs {
        let id = rec.meta().id.clone();
        let proposed = rec.meta().update_time;
        match check.get(&id) {
            Some(&stored) => {
                if stored < proposed {
                    part.max_time = part.max_time.max(proposed);
                    part.update_ids.push(id);
                    part.updates.push(rec);
                }
            }
            None => {
                part.max_time = part.max_time.max(proposed);
                part.inserts.push(rec);
            }
        }
    }
    part
}

/// 同步引擎
pub struct SyncEngine {
    storage: Arc<StorageManager>,
    updates: Arc<UpdateTimeCache>,
}

impl SyncEngine {
    pub fn new(storage: Arc<StorageManager>, updates: Arc<UpdateTimeCache>) -> Self {
        Self { storage, updates }
    }

    /// 水位线缓存（供外层查询 update_info 等）
    pub fn updates(&self) -> &Arc<UpdateTimeCache> {
        &self.updates
    }

    /// 更新信息探针
    pub fn update_info(&self, uid: i64) -> Result<UpdateInfo> {
        self.updates.update_info(uid)
    }

    // ---------- space ----------

    pub async fn pull_spaces(
        &self,
        uid: i64,
        checkpoint: Option<Checkpoint>,
        limit: i64,
    ) -> Result<PullBulk<SpaceDoc>> {
        let since = since_of(checkpoint);
        let conn_m = self.storage.conn();
        let docs: Vec<SpaceDoc> = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<SpaceRow>::new(&conn);
            let list = dao.list_since(uid, since, clamp_limit(limit))?;
            list.iter().map(convert::space_row_to_doc).collect()
        };
        Ok(PullBulk::from_documents(docs, since, |d| d.update_time))
    }

    pub async fn push_spaces(
        &self,
        ctx: &RequestContext,
        rows: Vec<PushRow<SpaceDoc>>,
    ) -> Result<Vec<SpaceDoc>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let conn_m = self.storage.conn();
        let max_time = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<SpaceRow>::new(&conn);
            let ids: Vec<String> = rows
                .iter()
                .map(|r| r.new_document_state.id.clone())
                .collect();
            let check = dao.checkpoint_map(ctx.uid, &ids)?;
            let recs: Vec<SpaceRow> = rows
                .iter()
                .map(|r| convert::space_doc_to_row(ctx.uid, &r.new_document_state))
                .collect();
            let part = partition(&check, recs);

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| CardbaseError::Database(format!("开始事务失败: {}", e)))?;
            dao.insert_many(&part.inserts)?;
            dao.update_many(&part.updates)?;
            tx.commit()
                .map_err(|e| CardbaseError::Database(format!("提交事务失败: {}", e)))?;
            debug!(
                "push space: uid={} insert={} update={}",
                ctx.uid,
                part.inserts.len(),
                part.updates.len()
            );
            part.max_time
        };
        if max_time > 0 {
            self.updates.advance(ctx.uid, &ctx.rid, max_time)?;
        }
        // 冲突列表恒为空：过期写已静默丢弃
        Ok(Vec::new())
    }

    // ---------- card_type ----------

    pub async fn pull_card_types(
        &self,
        uid: i64,
        checkpoint: Option<Checkpoint>,
        limit: i64,
    ) -> Result<PullBulk<CardTypeDoc>> {
        let since = since_of(checkpoint);
        let conn_m = self.storage.conn();
        let docs: Vec<CardTypeDoc> = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<CardTypeRow>::new(&conn);
            let mut list = dao.list_since(uid, since, clamp_limit(limit))?;
            let need: Vec<String> = list
                .iter()
                .filter(|r| r.props.is_empty() || r.styles.is_empty())
                .map(|r| r.meta.id.clone())
                .collect();
            if !need.is_empty() {
                let pdao = PropextDao::new(&conn);
                let props = pdao.get_many(uid, &need)?;
                for row in list.iter_mut() {
                    if let Some(v) = props.get(&(row.meta.id.clone(), FieldKind::TypeConfig)) {
                        row.props = v.clone();
                    }
                    if let Some(v) = props.get(&(row.meta.id.clone(), FieldKind::TypeStyle)) {
                        row.styles = v.clone();
                    }
                }
            }
            list.iter().map(convert::card_type_row_to_doc).collect()
        };
        Ok(PullBulk::from_documents(docs, since, |d| d.update_time))
    }

    pub async fn push_card_types(
        &self,
        ctx: &RequestContext,
        rows: Vec<PushRow<CardTypeDoc>>,
    ) -> Result<Vec<CardTypeDoc>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let conn_m = self.storage.conn();
        let max_time = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<CardTypeRow>::new(&conn);
            let pdao = PropextDao::new(&conn);
            let ids: Vec<String> = rows
                .iter()
                .map(|r| r.new_document_state.id.clone())
                .collect();
            let check = dao.checkpoint_map(ctx.uid, &ids)?;
            let recs: Vec<CardTypeRow> = rows
                .iter()
                .map(|r| convert::card_type_doc_to_row(ctx.uid, &r.new_document_state))
                .collect();
            let mut part = partition(&check, recs);

            let ext_map = pdao.exists_kinds(ctx.uid, &part.update_ids)?;
            let mut ext_inserts = Vec::new();
            let mut ext_updates = Vec::new();
            for rec in part.updates.iter_mut() {
                let mask = ext_map.get(&rec.meta.id).copied().unwrap_or(0);
                overflow::spill_card_type(rec, mask, &mut ext_inserts, &mut ext_updates);
            }
            for rec in part.inserts.iter_mut() {
                overflow::spill_card_type(rec, 0, &mut ext_inserts, &mut ext_updates);
            }

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| CardbaseError::Database(format!("开始事务失败: {}", e)))?;
            dao.insert_many(&part.inserts)?;
            dao.update_many(&part.updates)?;
            pdao.insert_many(&ext_inserts)?;
            pdao.update_many(&ext_updates)?;
            tx.commit()
                .map_err(|e| CardbaseError::Database(format!("提交事务失败: {}", e)))?;
            debug!(
                "push card_type: uid={} insert={} update={} ext={}",
                ctx.uid,
                part.inserts.len(),
                part.updates.len(),
                ext_inserts.len() + ext_updates.len()
            );
            part.max_time
        };
        if max_time > 0 {
            self.updates.advance(ctx.uid, &ctx.rid, max_time)?;
        }
        Ok(Vec::new())
    }

    // ---------- card ----------

    pub async fn pull_cards(
        &self,
        uid: i64,
        checkpoint: Option<Checkpoint>,
        limit: i64,
    ) -> Result<PullBulk<CardDoc>> {
        let since = since_of(checkpoint);
        let conn_m = self.storage.conn();
        let docs: Vec<CardDoc> = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<CardRow>::new(&conn);
            let mut list = dao.list_since(uid, since, clamp_limit(limit))?;
            let need: Vec<String> = list
                .iter()
                .filter(|r| r.props.is_empty() || r.content.is_empty())
                .map(|r| r.meta.id.clone())
                .collect();
            if !need.is_empty() {
                let pdao = PropextDao::new(&conn);
                let props = pdao.get_many(uid, &need)?;
                for row in list.iter_mut() {
                    if let Some(v) = props.get(&(row.meta.id.clone(), FieldKind::CardProps)) {
                        row.props = v.clone();
                    }
                    if let Some(v) = props.get(&(row.meta.id.clone(), FieldKind::CardContent)) {
                        row.content = v.clone();
                    }
                }
            }
            list.iter().map(convert::card_row_to_doc).collect()
        };
        Ok(PullBulk::from_documents(docs, since, |d| d.update_time))
    }

    pub async fn push_cards(
        &self,
        ctx: &RequestContext,
        rows: Vec<PushRow<CardDoc>>,
    ) -> Result<Vec<CardDoc>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let conn_m = self.storage.conn();
        let max_time = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<CardRow>::new(&conn);
            let pdao = PropextDao::new(&conn);
            let ids: Vec<String> = rows
                .iter()
                .map(|r| r.new_document_state.id.clone())
                .collect();
            let check = dao.checkpoint_map(ctx.uid, &ids)?;
            let recs: Vec<CardRow> = rows
                .iter()
                .map(|r| convert::card_doc_to_row(ctx.uid, &r.new_document_state))
                .collect();
            let mut part = partition(&check, recs);

            let ext_map = pdao.exists_kinds(ctx.uid, &part.update_ids)?;
            let mut ext_inserts = Vec::new();
            let mut ext_updates = Vec::new();
            for rec in part.updates.iter_mut() {
                let mask = ext_map.get(&rec.meta.id).copied().unwrap_or(0);
                overflow::spill_card(rec, mask, &mut ext_inserts, &mut ext_updates);
            }
            for rec in part.inserts.iter_mut() {
                overflow::spill_card(rec, 0, &mut ext_inserts, &mut ext_updates);
            }

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| CardbaseError::Database(format!("开始事务失败: {}", e)))?;
            dao.insert_many(&part.inserts)?;
            dao.update_many(&part.updates)?;
            pdao.insert_many(&ext_inserts)?;
            pdao.update_many(&ext_updates)?;
            tx.commit()
                .map_err(|e| CardbaseError::Database(format!("提交事务失败: {}", e)))?;
            debug!(
                "push card: uid={} insert={} update={} ext={}",
                ctx.uid,
                part.inserts.len(),
                part.updates.len(),
                ext_inserts.len() + ext_updates.len()
            );
            part.max_time
        };
        if max_time > 0 {
            self.updates.advance(ctx.uid, &ctx.rid, max_time)?;
        }
        Ok(Vec::new())
    }

    // ---------- tag ----------

    pub async fn pull_tags(
        &self,
        uid: i64,
        checkpoint: Option<Checkpoint>,
        limit: i64,
    ) -> Result<PullBulk<TagDoc>> {
        let since = since_of(checkpoint);
        let conn_m = self.storage.conn();
        let docs: Vec<TagDoc> = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<TagRow>::new(&conn);
            let list = dao.list_since(uid, since, clamp_limit(limit))?;
            list.iter().map(convert::tag_row_to_doc).collect()
        };
        Ok(PullBulk::from_documents(docs, since, |d| d.update_time))
    }

    pub async fn push_tags(
        &self,
        ctx: &RequestContext,
        rows: Vec<PushRow<TagDoc>>,
    ) -> Result<Vec<TagDoc>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let conn_m = self.storage.conn();
        let max_time = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<TagRow>::new(&conn);
            let ids: Vec<String> = rows
                .iter()
                .map(|r| r.new_document_state.id.clone())
                .collect();
            let check = dao.checkpoint_map(ctx.uid, &ids)?;
            let recs: Vec<TagRow> = rows
                .iter()
                .map(|r| convert::tag_doc_to_row(ctx.uid, &r.new_document_state))
                .collect();
            let part = partition(&check, recs);

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| CardbaseError::Database(format!("开始事务失败: {}", e)))?;
            dao.insert_many(&part.inserts)?;
            dao.update_many(&part.updates)?;
            tx.commit()
                .map_err(|e| CardbaseError::Database(format!("提交事务失败: {}", e)))?;
            debug!(
                "push tag: uid={} insert={} update={}",
                ctx.uid,
                part.inserts.len(),
                part.updates.len()
            );
            part.max_time
        };
        if max_time > 0 {
            self.updates.advance(ctx.uid, &ctx.rid, max_time)?;
        }
        Ok(Vec::new())
    }

    // ---------- view ----------

    pub async fn pull_views(
        &self,
        uid: i64,
        checkpoint: Option<Checkpoint>,
        limit: i64,
    ) -> Result<PullBulk<ViewDoc>> {
        let since = since_of(checkpoint);
        let conn_m = self.storage.conn();
        let docs: Vec<ViewDoc> = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<ViewRow>::new(&conn);
            let mut list = dao.list_since(uid, since, clamp_limit(limit))?;
            // 配置为空（已溢出）或文档视图（正文在溢出表）才需要回查
            let need: Vec<String> = list
                .iter()
                .filter(|r| r.config.is_empty() || is_doc_view(r.view_type))
                .map(|r| r.meta.id.clone())
                .collect();
            let mut contents: HashMap<String, String> = HashMap::new();
            if !need.is_empty() {
                let pdao = PropextDao::new(&conn);
                let props = pdao.get_many(uid, &need)?;
                for row in list.iter_mut() {
                    if let Some(v) = props.get(&(row.meta.id.clone(), FieldKind::ViewConfig)) {
                        row.config = v.clone();
                    }
                    if let Some(v) = props.get(&(row.meta.id.clone(), FieldKind::DocContent)) {
                        contents.insert(row.meta.id.clone(), v.clone());
                    }
                }
            }
            list.iter()
                .map(|r| {
                    let content = contents.get(&r.meta.id).map(String::as_str).unwrap_or("");
                    convert::view_row_to_doc(r, content)
                })
                .collect()
        };
        Ok(PullBulk::from_documents(docs, since, |d| d.update_time))
    }

    pub async fn push_views(
        &self,
        ctx: &RequestContext,
        rows: Vec<PushRow<ViewDoc>>,
    ) -> Result<Vec<ViewDoc>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let conn_m = self.storage.conn();
        let max_time = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<ViewRow>::new(&conn);
            let pdao = PropextDao::new(&conn);
            let ids: Vec<String> = rows
                .iter()
                .map(|r| r.new_document_state.id.clone())
                .collect();
            // 正文不进主表，按 id 暂存，溢出路由时取用
            let contents: HashMap<String, String> = rows
                .iter()
                .map(|r| {
                    (
                        r.new_document_state.id.clone(),
                        r.new_document_state.content.clone(),
                    )
                })
                .collect();
            let check = dao.checkpoint_map(ctx.uid, &ids)?;
            let recs: Vec<ViewRow> = rows
                .iter()
                .map(|r| convert::view_doc_to_row(ctx.uid, &r.new_document_state))
                .collect();
            let mut part = partition(&check, recs);

            let ext_map = pdao.exists_kinds(ctx.uid, &part.update_ids)?;
            let mut ext_inserts = Vec::new();
            let mut ext_updates = Vec::new();
            for rec in part.updates.iter_mut() {
                let mask = ext_map.get(&rec.meta.id).copied().unwrap_or(0);
                let content = contents.get(&rec.meta.id).map(String::as_str).unwrap_or("");
                overflow::spill_view(rec, content, mask, &mut ext_inserts, &mut ext_updates);
            }
            for rec in part.inserts.iter_mut() {
                let content = contents.get(&rec.meta.id).map(String::as_str).unwrap_or("");
                overflow::spill_view(rec, content, 0, &mut ext_inserts, &mut ext_updates);
            }

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| CardbaseError::Database(format!("开始事务失败: {}", e)))?;
            dao.insert_many(&part.inserts)?;
            dao.update_many(&part.updates)?;
            pdao.insert_many(&ext_inserts)?;
            pdao.update_many(&ext_updates)?;
            tx.commit()
                .map_err(|e| CardbaseError::Database(format!("提交事务失败: {}", e)))?;
            debug!(
                "push view: uid={} insert={} update={} ext={}",
                ctx.uid,
                part.inserts.len(),
                part.updates.len(),
                ext_inserts.len() + ext_updates.len()
            );
            part.max_time
        };
        if max_time > 0 {
            self.updates.advance(ctx.uid, &ctx.rid, max_time)?;
        }
        Ok(Vec::new())
    }

    // ---------- view_node ----------

    pub async fn pull_view_nodes(
        &self,
        uid: i64,
        checkpoint: Option<Checkpoint>,
        limit: i64,
    ) -> Result<PullBulk<ViewNodeDoc>> {
        let since = since_of(checkpoint);
        let conn_m = self.storage.conn();
        let docs: Vec<ViewNodeDoc> = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<ViewNodeRow>::new(&conn);
            let mut list = dao.list_since(uid, since, clamp_limit(limit))?;
            let need: Vec<String> = list
                .iter()
                .filter(|r| r.content.is_empty())
                .map(|r| r.meta.id.clone())
                .collect();
            if !need.is_empty() {
                let pdao = PropextDao::new(&conn);
                let props = pdao.get_many(uid, &need)?;
                for row in list.iter_mut() {
                    if let Some(v) = props.get(&(row.meta.id.clone(), FieldKind::ViewNodeContent)) {
                        row.content = v.clone();
                    }
                }
            }
            list.iter().map(convert::view_node_row_to_doc).collect()
        };
        Ok(PullBulk::from_documents(docs, since, |d| d.update_time))
    }

    pub async fn push_view_nodes(
        &self,
        ctx: &RequestContext,
        rows: Vec<PushRow<ViewNodeDoc>>,
    ) -> Result<Vec<ViewNodeDoc>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let conn_m = self.storage.conn();
        let max_time = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<ViewNodeRow>::new(&conn);
            let pdao = PropextDao::new(&conn);
            let ids: Vec<String> = rows
                .iter()
                .map(|r| r.new_document_state.id.clone())
                .collect();
            let check = dao.checkpoint_map(ctx.uid, &ids)?;
            let recs: Vec<ViewNodeRow> = rows
                .iter()
                .map(|r| convert::view_node_doc_to_row(ctx.uid, &r.new_document_state))
                .collect();
            let mut part = partition(&check, recs);

            let ext_map = pdao.exists_kinds(ctx.uid, &part.update_ids)?;
            let mut ext_inserts = Vec::new();
            let mut ext_updates = Vec::new();
            for rec in part.updates.iter_mut() {
                let mask = ext_map.get(&rec.meta.id).copied().unwrap_or(0);
                overflow::spill_view_node(rec, mask, &mut ext_inserts, &mut ext_updates);
            }
            for rec in part.inserts.iter_mut() {
                overflow::spill_view_node(rec, 0, &mut ext_inserts, &mut ext_updates);
            }

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| CardbaseError::Database(format!("开始事务失败: {}", e)))?;
            dao.insert_many(&part.inserts)?;
            dao.update_many(&part.updates)?;
            pdao.insert_many(&ext_inserts)?;
            pdao.update_many(&ext_updates)?;
            tx.commit()
                .map_err(|e| CardbaseError::Database(format!("提交事务失败: {}", e)))?;
            part.max_time
        };
        if max_time > 0 {
            self.updates.advance(ctx.uid, &ctx.rid, max_time)?;
        }
        Ok(Vec::new())
    }

    // ---------- view_edge ----------

    pub async fn pull_view_edges(
        &self,
        uid: i64,
        checkpoint: Option<Checkpoint>,
        limit: i64,
    ) -> Result<PullBulk<ViewEdgeDoc>> {
        let since = since_of(checkpoint);
        let conn_m = self.storage.conn();
        let docs: Vec<ViewEdgeDoc> = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<ViewEdgeRow>::new(&conn);
            let mut list = dao.list_since(uid, since, clamp_limit(limit))?;
            let need: Vec<String> = list
                .iter()
                .filter(|r| r.content.is_empty())
                .map(|r| r.meta.id.clone())
                .collect();
            if !need.is_empty() {
                let pdao = PropextDao::new(&conn);
                let props = pdao.get_many(uid, &need)?;
                for row in list.iter_mut() {
                    if let Some(v) = props.get(&(row.meta.id.clone(), FieldKind::ViewEdgeContent)) {
                        row.content = v.clone();
                    }
                }
            }
            list.iter().map(convert::view_edge_row_to_doc).collect()
        };
        Ok(PullBulk::from_documents(docs, since, |d| d.update_time))
    }

    pub async fn push_view_edges(
        &self,
        ctx: &RequestContext,
        rows: Vec<PushRow<ViewEdgeDoc>>,
    ) -> Result<Vec<ViewEdgeDoc>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let conn_m = self.storage.conn();
        let max_time = {
            let conn = conn_m.lock().await;
            let dao = EntityDao::<ViewEdgeRow>::new(&conn);
            let pdao = PropextDao::new(&conn);
            let ids: Vec<String> = rows
                .iter()
                .map(|r| r.new_document_state.id.clone())
                .collect();
            let check = dao.checkpoint_map(ctx.uid, &ids)?;
            let recs: Vec<ViewEdgeRow> = rows
                .iter()
                .map(|r| convert::view_edge_doc_to_row(ctx.uid, &r.new_document_state))
                .collect();
            let mut part = partition(&check, recs);

            let ext_map = pdao.exists_kinds(ctx.uid, &part.update_ids)?;
            let mut ext_inserts = Vec::new();
            let mut ext_updates = Vec::new();
            for rec in part.updates.iter_mut() {
                let mask = ext_map.get(&rec.meta.id).copied().unwrap_or(0);
                overflow::spill_view_edge(rec, mask, &mut ext_inserts, &mut ext_updates);
            }
            for rec in part.inserts.iter_mut() {
                overflow::spill_view_edge(rec, 0, &mut ext_inserts, &mut ext_updates);
            }

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| CardbaseError::Database(format!("开始事务失败: {}", e)))?;
            dao.insert_many(&part.inserts)?;
            dao.update_many(&part.updates)?;
            pdao.insert_many(&ext_inserts)?;
            pdao.update_many(&ext_updates)?;
            tx.commit()
                .map_err(|e| CardbaseError::Database(format!("提交事务失败: {}", e)))?;
            part.max_time
        };
        if max_time > 0 {
            self.updates.advance(ctx.uid, &ctx.rid, max_time)?;
        }
        Ok(Vec::new())
    }

    // ---------- 用户配置 ----------

    /// 读取用户配置：主表列为空时回退到溢出表（kind 8）
    pub async fn get_user_config(&self, uid: i64) -> Result<String> {
        let conn_m = self.storage.conn();
        let conn = conn_m.lock().await;
        let udao = UserDao::new(&conn);
        let mut config = udao.get_config(uid)?.unwrap_or_default();
        if config.is_empty() {
            let pdao = PropextDao::new(&conn);
            if let Some(ext) = pdao.get_one(uid, USER_CONFIG_ID, FieldKind::UserConfig)? {
                config = ext;
            }
        }
        Ok(config)
    }

    /// 写入用户配置：已有溢出记录 ⇒ 更新溢出；超长 ⇒ 新建溢出；否则写主表列
    pub async fn update_user_config(&self, ctx: &RequestContext, config: &str) -> Result<()> {
        let conn_m = self.storage.conn();
        let conn = conn_m.lock().await;
        let pdao = PropextDao::new(&conn);
        let exists = pdao
            .get_one(ctx.uid, USER_CONFIG_ID, FieldKind::UserConfig)?
            .is_some();
        if exists {
            pdao.update_many(&[PropextRow::new(
                ctx.uid,
                USER_CONFIG_ID,
                FieldKind::UserConfig,
                config,
            )])?;
        } else if overflow::over_limit(config, overflow::LIMIT_USER_CONFIG) {
            pdao.insert_many(&[PropextRow::new(
                ctx.uid,
                USER_CONFIG_ID,
                FieldKind::UserConfig,
                config,
            )])?;
            // 维持「主表列为空 ⇔ 有溢出记录」不变量
            UserDao::new(&conn).update_config(ctx.uid, "")?;
        } else {
            UserDao::new(&conn).update_config(ctx.uid, config)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::SessionFanout;
    use crate::storage::entities::VIEW_TYPE_DOC;
    use crate::utils::now_millis;
    use rusqlite::params;
    use tempfile::TempDir;

    async fn setup() -> (
        TempDir,
        SyncEngine,
        Arc<StorageManager>,
        Arc<SessionFanout>,
        Arc<UpdateTimeCache>,
    ) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageManager::new(temp_dir.path()).await.unwrap());
        let fanout = Arc::new(SessionFanout::new());
        let updates = Arc::new(UpdateTimeCache::new(storage.kv(), fanout.clone()));
        let engine = SyncEngine::new(storage.clone(), updates.clone());
        (temp_dir, engine, storage, fanout, updates)
    }

    fn ctx(uid: i64, rid: &str) -> RequestContext {
        RequestContext::new(uid, rid)
    }

    fn card(id: &str, update_time: i64, name: &str) -> PushRow<CardDoc> {
        PushRow::new(CardDoc {
            id: id.to_string(),
            name: name.to_string(),
            update_time,
            ..Default::default()
        })
    }

    async fn stored_card_field(storage: &StorageManager, uid: i64, id: &str, col: &str) -> String {
        let conn_m = storage.conn();
        let conn = conn_m.lock().await;
        conn.query_row(
            &format!("SELECT \"{}\" FROM \"card\" WHERE uid = ?1 AND id = ?2", col),
            params![uid, id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 100);
        assert_eq!(clamp_limit(-5), 100);
        assert_eq!(clamp_limit(201), 100);
        assert_eq!(clamp_limit(200), 200);
        assert_eq!(clamp_limit(5), 5);
    }

    #[tokio::test]
    async fn test_push_insert_update_stale_scenario() {
        let (_t, engine, _storage, _fanout, _updates) = setup().await;
        let c = ctx(1, "s1");

        // 插入
        let conflicts = engine.push_cards(&c, vec![card("A", 100, "x")]).await.unwrap();
        assert!(conflicts.is_empty());
        // 更高时间戳，更新生效
        engine.push_cards(&c, vec![card("A", 200, "y")]).await.unwrap();
        // 过期写，静默丢弃
        engine.push_cards(&c, vec![card("A", 150, "z")]).await.unwrap();

        let bulk = engine.pull_cards(1, None, 100).await.unwrap();
        assert_eq!(bulk.documents.len(), 1);
        assert_eq!(bulk.documents[0].name, "y");
        assert_eq!(bulk.documents[0].update_time, 200);
        assert_eq!(bulk.checkpoint.update_time, 200);
    }

    #[tokio::test]
    async fn test_push_idempotent() {
        let (_t, engine, _storage, _fanout, _updates) = setup().await;
        let c = ctx(1, "s1");

        let row = card("A", 100, "x");
        engine.push_cards(&c, vec![row.clone()]).await.unwrap();
        // 重复提交同一批数据，第二次整体落空
        engine.push_cards(&c, vec![row]).await.unwrap();

        let bulk = engine.pull_cards(1, None, 100).await.unwrap();
        assert_eq!(bulk.documents.len(), 1);
        assert_eq!(bulk.documents[0].name, "x");
    }

    #[tokio::test]
    async fn test_overflow_round_trip_and_threshold() {
        let (_t, engine, storage, _fanout, _updates) = setup().await;
        let c = ctx(1, "s1");

        // 恰好等于阈值：留在主表
        let inline = "a".repeat(overflow::LIMIT_CARD_PROPS);
        let mut doc = CardDoc {
            id: "IN".to_string(),
            props: inline.clone(),
            update_time: 100,
            ..Default::default()
        };
        engine
            .push_cards(&c, vec![PushRow::new(doc.clone())])
            .await
            .unwrap();
        assert_eq!(stored_card_field(&storage, 1, "IN", "props").await, inline);

        // 超过阈值：主表置空，值进溢出表，拉取时原样回来
        let long = "b".repeat(overflow::LIMIT_CARD_PROPS + 1);
        doc.id = "OV".to_string();
        doc.props = long.clone();
        engine.push_cards(&c, vec![PushRow::new(doc)]).await.unwrap();
        assert_eq!(stored_card_field(&storage, 1, "OV", "props").await, "");

        let bulk = engine.pull_cards(1, None, 100).await.unwrap();
        let ov = bulk.documents.iter().find(|d| d.id == "OV").unwrap();
        assert_eq!(ov.props, long);
        let inl = bulk.documents.iter().find(|d| d.id == "IN").unwrap();
        assert_eq!(inl.props, inline);
    }

    #[tokio::test]
    async fn test_overflowed_field_stays_external_after_short_update() {
        let (_t, engine, storage, _fanout, _updates) = setup().await;
        let c = ctx(1, "s1");

        let long = "x".repeat(overflow::LIMIT_CARD_PROPS + 10);
        engine
            .push_cards(
                &c,
                vec![PushRow::new(CardDoc {
                    id: "A".to_string(),
                    props: long,
                    update_time: 100,
                    ..Default::default()
                })],
            )
            .await
            .unwrap();

        // 更新为短值：仍走溢出表，主表保持为空
        engine
            .push_cards(
                &c,
                vec![PushRow::new(CardDoc {
                    id: "A".to_string(),
                    props: "short".to_string(),
                    update_time: 200,
                    ..Default::default()
                })],
            )
            .await
            .unwrap();

        assert_eq!(stored_card_field(&storage, 1, "A", "props").await, "");
        let bulk = engine.pull_cards(1, None, 100).await.unwrap();
        assert_eq!(bulk.documents[0].props, "short");
        assert_eq!(bulk.documents[0].update_time, 200);
    }

    #[tokio::test]
    async fn test_doc_view_content_always_externalized() {
        let (_t, engine, storage, _fanout, _updates) = setup().await;
        let c = ctx(1, "s1");

        engine
            .push_views(
                &c,
                vec![PushRow::new(ViewDoc {
                    id: "V".to_string(),
                    name: "draft".to_string(),
                    view_type: VIEW_TYPE_DOC,
                    config: "{}".to_string(),
                    content: "short".to_string(),
                    update_time: 100,
                    ..Default::default()
                })],
            )
            .await
            .unwrap();

        // 正文再短也在溢出表
        {
            let conn_m = storage.conn();
            let conn = conn_m.lock().await;
            let pdao = PropextDao::new(&conn);
            assert_eq!(
                pdao.get_one(1, "V", FieldKind::DocContent).unwrap().unwrap(),
                "short"
            );
        }

        // 更新正文走溢出更新路径
        engine
            .push_views(
                &c,
                vec![PushRow::new(ViewDoc {
                    id: "V".to_string(),
                    name: "draft".to_string(),
                    view_type: VIEW_TYPE_DOC,
                    config: "{}".to_string(),
                    content: "updated body".to_string(),
                    update_time: 200,
                    ..Default::default()
                })],
            )
            .await
            .unwrap();

        let bulk = engine.pull_views(1, None, 100).await.unwrap();
        assert_eq!(bulk.documents.len(), 1);
        assert_eq!(bulk.documents[0].content, "updated body");
        assert_eq!(bulk.documents[0].config, "{}");
    }

    #[tokio::test]
    async fn test_pull_checkpoint_progression() {
        let (_t, engine, _storage, _fanout, _updates) = setup().await;
        let c = ctx(1, "s1");

        engine
            .push_cards(
                &c,
                vec![card("A", 100, "a"), card("B", 200, "b"), card("C", 300, "c")],
            )
            .await
            .unwrap();

        let bulk = engine.pull_cards(1, None, 2).await.unwrap();
        assert_eq!(bulk.documents.len(), 2);
        assert_eq!(bulk.checkpoint.update_time, 200);

        let bulk = engine
            .pull_cards(1, Some(bulk.checkpoint), 2)
            .await
            .unwrap();
        assert_eq!(bulk.documents.len(), 1);
        assert_eq!(bulk.documents[0].id, "C");
        assert_eq!(bulk.checkpoint.update_time, 300);

        // 没有新数据时 checkpoint 原样保持，不回退
        let bulk = engine
            .pull_cards(1, Some(bulk.checkpoint), 2)
            .await
            .unwrap();
        assert!(bulk.documents.is_empty());
        assert_eq!(bulk.checkpoint.update_time, 300);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let (_t, engine, _storage, _fanout, _updates) = setup().await;

        engine
            .push_cards(&ctx(1, "s1"), vec![card("A", 100, "mine")])
            .await
            .unwrap();

        let bulk = engine.pull_cards(2, None, 100).await.unwrap();
        assert!(bulk.documents.is_empty());
    }

    #[tokio::test]
    async fn test_push_advances_watermark_and_notifies_siblings() {
        let (_t, engine, _storage, fanout, updates) = setup().await;
        let mut rx_other = fanout.register(1, "s2").unwrap();
        let mut rx_origin = fanout.register(1, "s1").unwrap();

        // 未来时间戳保证超过懒初始化的墙钟种子
        let ut = now_millis() + 60_000;
        engine
            .push_cards(&ctx(1, "s1"), vec![card("A", ut, "a")])
            .await
            .unwrap();

        assert_eq!(updates.get(1).unwrap(), ut);
        assert_eq!(rx_other.try_recv().unwrap(), ut);
        assert!(rx_origin.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_only_push_leaves_watermark_alone() {
        let (_t, engine, _storage, _fanout, updates) = setup().await;
        let c = ctx(1, "s1");

        let ut = now_millis() + 60_000;
        engine.push_cards(&c, vec![card("A", ut, "a")]).await.unwrap();
        assert_eq!(updates.get(1).unwrap(), ut);

        // 整批都是过期写：不落库也不推水位线
        engine
            .push_cards(&c, vec![card("A", ut - 1, "stale")])
            .await
            .unwrap();
        assert_eq!(updates.get(1).unwrap(), ut);
    }

    #[tokio::test]
    async fn test_space_and_tag_round_trip() {
        let (_t, engine, _storage, _fanout, _updates) = setup().await;
        let c = ctx(1, "s1");

        engine
            .push_spaces(
                &c,
                vec![PushRow::new(SpaceDoc {
                    id: "S".to_string(),
                    name: "home".to_string(),
                    update_time: 100,
                    ..Default::default()
                })],
            )
            .await
            .unwrap();
        engine
            .push_tags(
                &c,
                vec![PushRow::new(TagDoc {
                    id: "T".to_string(),
                    name: "inbox".to_string(),
                    color: "#03a9f4".to_string(),
                    update_time: 100,
                    is_deleted: true,
                    ..Default::default()
                })],
            )
            .await
            .unwrap();

        let spaces = engine.pull_spaces(1, None, 100).await.unwrap();
        assert_eq!(spaces.documents[0].name, "home");
        let tags = engine.pull_tags(1, None, 100).await.unwrap();
        // 墓碑标记往返保真
        assert!(tags.documents[0].is_deleted);
        assert!(!tags.documents[0].deleted);
    }

    #[tokio::test]
    async fn test_view_node_and_edge_overflow() {
        let (_t, engine, _storage, _fanout, _updates) = setup().await;
        let c = ctx(1, "s1");

        let node_content = "n".repeat(overflow::LIMIT_VIEW_NODE_CONTENT + 1);
        engine
            .push_view_nodes(
                &c,
                vec![PushRow::new(ViewNodeDoc {
                    id: "N".to_string(),
                    view_id: "V".to_string(),
                    content: node_content.clone(),
                    update_time: 100,
                    ..Default::default()
                })],
            )
            .await
            .unwrap();

        let edge_content = "e".repeat(overflow::LIMIT_VIEW_EDGE_CONTENT + 1);
        engine
            .push_view_edges(
                &c,
                vec![PushRow::new(ViewEdgeDoc {
                    id: "E".to_string(),
                    view_id: "V".to_string(),
                    source: "N".to_string(),
                    target: "M".to_string(),
                    content: edge_content.clone(),
                    update_time: 100,
                    ..Default::default()
                })],
            )
            .await
            .unwrap();

        let nodes = engine.pull_view_nodes(1, None, 100).await.unwrap();
        assert_eq!(nodes.documents[0].content, node_content);
        let edges = engine.pull_view_edges(1, None, 100).await.unwrap();
        assert_eq!(edges.documents[0].content, edge_content);
    }

    #[tokio::test]
    async fn test_card_type_overflow_round_trip() {
        let (_t, engine, _storage, _fanout, _updates) = setup().await;
        let c = ctx(1, "s1");

        let props = "p".repeat(overflow::LIMIT_TYPE_CONFIG + 1);
        engine
            .push_card_types(
                &c,
                vec![PushRow::new(CardTypeDoc {
                    id: "T".to_string(),
                    name: "Person".to_string(),
                    props: props.clone(),
                    styles: "[]".to_string(),
                    update_time: 100,
                    ..Default::default()
                })],
            )
            .await
            .unwrap();

        let bulk = engine.pull_card_types(1, None, 100).await.unwrap();
        assert_eq!(bulk.documents[0].props, props);
        assert_eq!(bulk.documents[0].styles, "[]");
    }

    #[tokio::test]
    async fn test_user_config_paths() {
        let (_t, engine, storage, _fanout, _updates) = setup().await;
        let c = ctx(1, "s1");

        // 建号
        {
            let conn_m = storage.conn();
            let conn = conn_m.lock().await;
            UserDao::new(&conn).ensure(1, 1000).unwrap();
        }

        // 短配置写主表列
        engine.update_user_config(&c, "{\"theme\":\"dark\"}").await.unwrap();
        assert_eq!(
            engine.get_user_config(1).await.unwrap(),
            "{\"theme\":\"dark\"}"
        );

        // 超长配置进溢出表
        let long = "c".repeat(overflow::LIMIT_USER_CONFIG + 1);
        engine.update_user_config(&c, &long).await.unwrap();
        assert_eq!(engine.get_user_config(1).await.unwrap(), long);

        // 已有溢出记录后，短配置也继续走溢出更新
        engine.update_user_config(&c, "tiny").await.unwrap();
        {
            let conn_m = storage.conn();
            let conn = conn_m.lock().await;
            let pdao = PropextDao::new(&conn);
            assert_eq!(
                pdao.get_one(1, USER_CONFIG_ID, FieldKind::UserConfig)
                    .unwrap()
                    .unwrap(),
                "tiny"
            );
        }
    }
}
