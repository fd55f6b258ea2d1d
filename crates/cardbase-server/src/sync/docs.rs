//! 同步协议传输模型
//!
//! 客户端可见的文档形态：布尔标记在传输层是 bool，存储层是 0/1 整数；
//! 每种实体共享 `{id, update_time, is_deleted, deleted}` 加各自业务字段。

use serde::{Deserialize, Serialize};

/// 拉取检查点：客户端上次见到的 update_time，作为下次拉取的下界
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub update_time: i64,
}

/// 推送行：RxDB 风格的 assumedMasterState / newDocumentState 对
///
/// assumed_master_state 随协议接收但不参与冲突判定（基线行为）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRow<T> {
    #[serde(default)]
    pub assumed_master_state: Option<T>,
    pub new_document_state: T,
}

impl<T> PushRow<T> {
    pub fn new(doc: T) -> Self {
        Self {
            assumed_master_state: None,
            new_document_state: doc,
        }
    }
}

/// 拉取结果：文档列表 + 新检查点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullBulk<T> {
    pub documents: Vec<T>,
    pub checkpoint: Checkpoint,
}

impl<T> PullBulk<T> {
    /// 新检查点取最后一篇文档的 update_time；无文档时保持输入值不回退
    pub fn from_documents(documents: Vec<T>, prev: i64, update_time_of: impl Fn(&T) -> i64) -> Self {
        let update_time = documents.last().map(&update_time_of).unwrap_or(prev);
        Self {
            documents,
            checkpoint: Checkpoint { update_time },
        }
    }
}

/// 更新信息探针：客户端据此判断是否需要拉取，并估算时钟偏移
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub last_update_time: i64,
    pub current_time: i64,
}

/// 空间文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceDoc {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub desc: String,
    pub snum: i64,
    pub update_time: i64,
    pub is_deleted: bool,
    pub deleted: bool,
}

/// 卡片类型文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardTypeDoc {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub snum: i64,
    pub props: String,
    pub styles: String,
    pub desc: String,
    pub update_time: i64,
    pub is_deleted: bool,
    pub deleted: bool,
}

/// 卡片文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardDoc {
    pub id: String,
    pub name: String,
    pub space_id: String,
    pub type_id: String,
    pub tags: String,
    pub props: String,
    pub content: String,
    #[serde(default)]
    pub create_time: i64,
    pub update_time: i64,
    pub is_deleted: bool,
    pub deleted: bool,
}

/// 标签文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagDoc {
    pub id: String,
    pub name: String,
    pub space_id: String,
    pub pid: String,
    pub color: String,
    pub snum: i64,
    pub update_time: i64,
    pub is_deleted: bool,
    pub deleted: bool,
}

/// 视图文档（content 只在传输层存在，存储层始终走溢出表）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewDoc {
    pub id: String,
    pub name: String,
    pub space_id: String,
    pub pid: String,
    pub snum: i64,
    #[serde(rename = "type")]
    pub view_type: i64,
    pub inline_type: i64,
    pub is_favor: bool,
    pub icon: String,
    pub desc: String,
    pub config: String,
    #[serde(default)]
    pub content: String,
    pub update_time: i64,
    pub is_deleted: bool,
    pub deleted: bool,
}

/// 画布节点文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewNodeDoc {
    pub id: String,
    pub view_id: String,
    pub group_id: String,
    pub pid: String,
    pub node_type: i64,
    pub node_id: String,
    pub vn_type_id: String,
    pub name: String,
    pub content: String,
    pub update_time: i64,
    pub is_deleted: bool,
    pub deleted: bool,
}

/// 画布边文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewEdgeDoc {
    pub id: String,
    pub view_id: String,
    pub source: String,
    pub target: String,
    pub source_handle: String,
    pub target_handle: String,
    pub ve_type_id: String,
    pub name: String,
    pub content: String,
    pub update_time: i64,
    pub is_deleted: bool,
    pub deleted: bool,
}
