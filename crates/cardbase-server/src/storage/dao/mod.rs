//! 数据访问层 (DAO)
//!
//! 七种同步实体共用 `EntityDao` 泛型仓储（表结构差异由 `SyncRecord` 描述），
//! 溢出表与用户表各有专门的 DAO。

pub mod entity;
pub mod user;

pub use entity::EntityDao;
pub use user::UserDao;
