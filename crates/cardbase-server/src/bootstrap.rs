//! 账号初始化 - 新用户的种子数据
//!
//! 注册成功后调用一次：建 1 个默认空间、2 个卡片类型、3 张示例卡片、
//! 2 个默认视图（文档视图正文直接写入溢出表），最后把水位线推到
//! `now + 100`，让已在线的其他设备立即拉取到种子数据。
//!
//! 种子 ID 用递增的时间戳生成，保证拉取时按创建顺序返回。

use tracing::info;

use crate::cache::UpdateTimeCache;
use crate::context::RequestContext;
use crate::error::{CardbaseError, Result};
use crate::storage::dao::{EntityDao, UserDao};
use crate::storage::entities::{
    CardRow, CardTypeRow, RowMeta, SpaceRow, ViewRow, VIEW_TYPE_BOARD, VIEW_TYPE_DOC,
};
use crate::storage::propext::{FieldKind, PropextDao, PropextRow};
use crate::storage::StorageManager;
use crate::utils::unid;

/// 人物卡类型的字段配置
fn person_type_props(option_ids: &[String; 3]) -> String {
    format!(
        r##"[{{"id":"name","name":"Name","nameType":1,"type":"name","defaultVal":"","hide":0,"handles":["copy"],"layout":{{"i":"name","w":6,"h":1,"x":0,"y":0,"minW":3,"maxH":1,"static":true}}}},{{"id":"tags","name":"Tags","nameType":1,"type":"tags","defaultVal":[],"hide":0,"layout":{{"i":"tags","w":6,"h":1,"x":0,"y":1,"minW":3,"maxH":1}}}},{{"id":"{}","name":"Birthday","nameType":0,"type":"date","defaultVal":"","hide":0,"handles":["copy"],"show":["inline"],"layout":{{"i":"{}","w":6,"h":1,"x":0,"y":2,"minW":3,"maxH":1}}}},{{"id":"{}","name":"Relation","nameType":0,"type":"select","options":[{{"id":"{}","label":"Family","color":"#ff5722"}},{{"id":"{}","label":"Friend","color":"#03a9f4"}},{{"id":"{}","label":"Colleague","color":"#4caf50"}}],"defaultVal":"{}","hide":0,"layout":{{"i":"{}","w":6,"h":1,"x":0,"y":3,"minW":3,"maxH":1}}}},{{"id":"content","name":"Notes","nameType":1,"type":"content","defaultVal":null,"hide":0,"layout":{{"i":"content","w":6,"h":6,"x":0,"y":4,"minW":3,"maxH":11}}}}]"##,
        "fBirthday_", "fBirthday_", "fRelation_", option_ids[0], option_ids[1], option_ids[2],
        option_ids[1], "fRelation_"
    )
}

/// 日记卡类型的字段配置
fn journal_type_props() -> String {
    r#"[{"id":"name","name":"Title","nameType":1,"type":"name","defaultVal":"{$d}","hide":0,"handles":["copy"],"layout":{"i":"name","w":6,"h":1,"x":0,"y":0,"minW":3,"maxH":1}},{"id":"tags","name":"Tags","nameType":1,"type":"tags","defaultVal":[],"hide":0,"layout":{"i":"tags","w":6,"h":1,"x":0,"y":1,"minW":3,"maxH":1}},{"id":"fDate_","name":"Date","nameType":0,"type":"date","defaultVal":"{$d}","hide":0,"handles":["copy"],"layout":{"i":"fDate_","w":6,"h":1,"x":0,"y":2,"minW":3,"maxH":1}},{"id":"content","name":"Entry","nameType":1,"type":"content","defaultVal":null,"hide":0,"layout":{"i":"content","w":6,"h":9,"x":0,"y":3,"minW":6,"maxH":11}}]"#
        .to_string()
}

/// 带提及节点的示例卡片正文
fn card_content(text: &str, mention_id: &str, mention_label: &str) -> String {
    format!(
        r#"{{"type":"doc","content":[{{"type":"paragraph","content":[{{"type":"text","text":"{}"}},{{"type":"mention","attrs":{{"id":"{}","label":"{}","type":1,"icon":"card"}}}}]}}]}}"#,
        text, mention_id, mention_label
    )
}

/// 文档视图的种子正文
fn doc_view_content(mention_id: &str) -> String {
    format!(
        r#"{{"type":"doc","content":[{{"type":"heading","attrs":{{"level":3}},"content":[{{"type":"text","text":"Welcome to your draft document"}}]}},{{"type":"nbl","content":[{{"type":"nli","attrs":{{"coll":false}},"content":[{{"type":"paragraph","content":[{{"type":"text","text":"Common Markdown syntax is supported"}}]}}]}},{{"type":"nli","attrs":{{"coll":false}},"content":[{{"type":"paragraph","content":[{{"type":"text","text":"Type / to open the command menu"}}]}}]}},{{"type":"nli","attrs":{{"coll":false}},"content":[{{"type":"paragraph","content":[{{"type":"text","text":"Type @ to mention a card, e.g. "}},{{"type":"mention","attrs":{{"id":"{}","label":"Alan Turing","type":1,"icon":"card"}}}}]}}]}}]}}]}}"#,
        mention_id
    )
}

/// 初始化一个新账号的种子数据
pub async fn seed_account(
    storage: &StorageManager,
    updates: &UpdateTimeCache,
    ctx: &RequestContext,
    now: i64,
) -> Result<()> {
    let uid = ctx.uid;
    let sid = unid(now);
    let type_ids = [unid(now + 1), unid(now + 2)];
    let card_ids = [unid(now + 10), unid(now + 11), unid(now + 12)];
    let view_ids = [unid(now + 20), unid(now + 21)];
    let option_ids = [
        format!("{}a", &card_ids[0]),
        format!("{}b", &card_ids[0]),
        format!("{}c", &card_ids[0]),
    ];

    let space = SpaceRow {
        meta: RowMeta::new(uid, sid.clone(), now),
        name: "Default space".to_string(),
        icon: "planet".to_string(),
        desc: "Your default card space".to_string(),
        snum: 10000,
    };

    let types = [
        CardTypeRow {
            meta: RowMeta::new(uid, type_ids[0].clone(), now + 1),
            name: "Person".to_string(),
            icon: "dup".to_string(),
            snum: 0,
            props: person_type_props(&option_ids),
            styles: "[]".to_string(),
            desc: "A card for people you know".to_string(),
        },
        CardTypeRow {
            meta: RowMeta::new(uid, type_ids[1].clone(), now + 2),
            name: "Journal".to_string(),
            icon: "dup".to_string(),
            snum: 0,
            props: journal_type_props(),
            styles: "[]".to_string(),
            desc: "Daily notes and reflections".to_string(),
        },
    ];

    let cards = [
        CardRow {
            meta: RowMeta::new(uid, card_ids[0].clone(), now + 10),
            name: "Ada Lovelace".to_string(),
            space_id: sid.clone(),
            type_id: type_ids[0].clone(),
            tags: "[]".to_string(),
            props: format!(
                r#"{{"fBirthday_":"1815-12-10","fRelation_":"{}","links":["{}"]}}"#,
                option_ids[1], card_ids[1]
            ),
            content: card_content(
                "Wrote the first published algorithm, together with ",
                &card_ids[1],
                "Alan Turing",
            ),
            create_time: 0,
        },
        CardRow {
            meta: RowMeta::new(uid, card_ids[1].clone(), now + 11),
            name: "Alan Turing".to_string(),
            space_id: sid.clone(),
            type_id: type_ids[0].clone(),
            tags: "[]".to_string(),
            props: format!(
                r#"{{"fBirthday_":"1912-06-23","fRelation_":"{}","links":["{}"]}}"#,
                option_ids[1], card_ids[0]
            ),
            content: card_content(
                "Asked whether machines can think; linked with ",
                &card_ids[0],
                "Ada Lovelace",
            ),
            create_time: 0,
        },
        CardRow {
            meta: RowMeta::new(uid, card_ids[2].clone(), now + 12),
            name: "First notebook day".to_string(),
            space_id: sid.clone(),
            type_id: type_ids[1].clone(),
            tags: "[]".to_string(),
            props: format!(r#"{{"fDate_":"{}","links":["{}","{}"]}}"#, "2024-01-01", card_ids[0], card_ids[1]),
            content: card_content(
                "Started collecting notes about computing pioneers like ",
                &card_ids[0],
                "Ada Lovelace",
            ),
            create_time: 0,
        },
    ];

    let views = [
        ViewRow {
            meta: RowMeta::new(uid, view_ids[0].clone(), now + 20),
            name: "Draft document".to_string(),
            space_id: sid.clone(),
            pid: String::new(),
            snum: 10000,
            view_type: VIEW_TYPE_DOC,
            inline_type: 0,
            is_favor: 1,
            icon: "doc".to_string(),
            desc: "Capture first, organize later".to_string(),
            config: r#"{"ruleId":"","rules":[]}"#.to_string(),
        },
        ViewRow {
            meta: RowMeta::new(uid, view_ids[1].clone(), now + 21),
            name: "Whiteboard".to_string(),
            space_id: sid.clone(),
            pid: String::new(),
            snum: 20000,
            view_type: VIEW_TYPE_BOARD,
            inline_type: 0,
            is_favor: 1,
            icon: "board".to_string(),
            desc: "Visual notes, freely arranged".to_string(),
            config: r#"{"ruleId":"","rules":[]}"#.to_string(),
        },
    ];

    let doc_content = PropextRow::new(
        uid,
        view_ids[0].clone(),
        FieldKind::DocContent,
        doc_view_content(&card_ids[1]),
    );

    let conn_m = storage.conn();
    {
        let conn = conn_m.lock().await;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| CardbaseError::Database(format!("开始事务失败: {}", e)))?;
        UserDao::new(&conn).ensure(uid, now)?;
        EntityDao::<SpaceRow>::new(&conn).insert_many(std::slice::from_ref(&space))?;
        EntityDao::<CardTypeRow>::new(&conn).insert_many(&types)?;
        EntityDao::<CardRow>::new(&conn).insert_many(&cards)?;
        EntityDao::<ViewRow>::new(&conn).insert_many(&views)?;
        PropextDao::new(&conn).insert_many(std::slice::from_ref(&doc_content))?;
        tx.commit()
            .map_err(|e| CardbaseError::Database(format!("提交事务失败: {}", e)))?;
    }

    updates.advance(uid, &ctx.rid, now + 100)?;
    info!("账号种子数据初始化完成: uid={}", uid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::UpdateTimeCache;
    use crate::fanout::SessionFanout;
    use crate::sync::SyncEngine;
    use crate::utils::now_millis;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_seed_account() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageManager::new(temp_dir.path()).await.unwrap());
        let fanout = Arc::new(SessionFanout::new());
        let updates = Arc::new(UpdateTimeCache::new(storage.kv(), fanout.clone()));
        let engine = SyncEngine::new(storage.clone(), updates.clone());

        let ctx = RequestContext::new(7, "admin");
        let now = now_millis() + 10_000;
        seed_account(&storage, &updates, &ctx, now).await.unwrap();

        // 1 空间 / 2 类型 / 3 卡片 / 2 视图
        let spaces = engine.pull_spaces(7, None, 100).await.unwrap();
        assert_eq!(spaces.documents.len(), 1);
        assert_eq!(spaces.documents[0].name, "Default space");

        let types = engine.pull_card_types(7, None, 100).await.unwrap();
        assert_eq!(types.documents.len(), 2);

        let cards = engine.pull_cards(7, None, 100).await.unwrap();
        assert_eq!(cards.documents.len(), 3);
        // 种子卡片按创建顺序返回
        assert_eq!(cards.documents[0].name, "Ada Lovelace");
        assert_eq!(cards.documents[2].name, "First notebook day");

        let views = engine.pull_views(7, None, 100).await.unwrap();
        assert_eq!(views.documents.len(), 2);
        // 文档视图正文从溢出表回填
        let doc_view = views
            .documents
            .iter()
            .find(|v| v.name == "Draft document")
            .unwrap();
        assert!(doc_view.content.contains("Welcome to your draft document"));

        // 水位线推到 now + 100
        assert_eq!(updates.get(7).unwrap(), now + 100);

        // 其他账号不受影响
        let other = engine.pull_cards(8, None, 100).await.unwrap();
        assert!(other.documents.is_empty());
    }

    #[tokio::test]
    async fn test_seed_content_is_valid_json() {
        let option_ids = ["a1".to_string(), "b2".to_string(), "c3".to_string()];
        serde_json::from_str::<serde_json::Value>(&person_type_props(&option_ids)).unwrap();
        serde_json::from_str::<serde_json::Value>(&journal_type_props()).unwrap();
        serde_json::from_str::<serde_json::Value>(&card_content("t", "id", "label")).unwrap();
        serde_json::from_str::<serde_json::Value>(&doc_view_content("id")).unwrap();
    }
}
