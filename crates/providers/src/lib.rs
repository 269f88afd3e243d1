//! 生成后端
//!
//! - [`ParameterResolver`]: 旧版参数与动态参数合并
//! - [`Provider`]: 三类后端的统一接口
//! - [`ProviderFactory`]: 提供方标识到共享实例

pub mod batch;
pub mod catalog;
pub mod chat;
pub mod factory;
mod http;
pub mod params;
pub mod provider;

pub use batch::BatchSubmissionProvider;
pub use catalog::CatalogProvider;
pub use chat::ChatRepurposedProvider;
pub use factory::{infer_legacy_provider, ProviderFactory};
pub use params::{ChatArguments, ParameterResolver};
pub use provider::{ImageGeneration, Provider, ProviderKind, VideoGeneration};
