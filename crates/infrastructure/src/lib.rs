//! 编排核心之外的协作方实现
//!
//! - `database`: SQLite 连接池、表结构迁移与三个仓库实现
//! - `storage`: S3 兼容对象存储的转存, 失败时回退为原始 URL

pub mod database;
pub mod storage;

pub use database::*;
pub use storage::*;
