//! 生成任务编排
//!
//! 计费与后端选择、模型冷却路由、对话模型降级链、后台执行池。

pub mod clock;
pub mod executor;
pub mod fallback;
pub mod pipeline;
pub mod pricing;
pub mod router;
pub mod runner;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use executor::{GenerationExecutor, GENERATIONS_FOLDER};
pub use fallback::ChatFallback;
pub use pipeline::{Collaborators, GenerationPipeline, PipelineOptions, DEFAULT_SITEMAP_LIMIT};
pub use pricing::{CostResolver, ResolvedModel};
pub use router::{ModelRouter, DEFAULT_COOLDOWN};
pub use runner::JobRunner;
