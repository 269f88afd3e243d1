//! # Mediagen Testing Utils
//!
//! 各 crate 共用的测试工具:
//!
//! - **内存协作方**: 积分账本、生成记录、模型目录、对象存储的内存实现
//! - **桩后端**: 可按模型配置返回结果的 [`StubProvider`]
//! - **测试数据构建器**: 生成请求与模型目录条目
//!
//! ```toml
//! [dev-dependencies]
//! mediagen-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;
pub mod stub_provider;

pub use builders::*;
pub use mocks::*;
pub use stub_provider::*;
