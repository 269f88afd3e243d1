//! 计数器名称
//!
//! 导出器在二进制启动时安装; 未安装时 `metrics` 宏不产生任何开销。

pub const JOBS_CREATED_TOTAL: &str = "mediagen_jobs_created_total";
pub const JOBS_COMPLETED_TOTAL: &str = "mediagen_jobs_completed_total";
pub const JOBS_FAILED_TOTAL: &str = "mediagen_jobs_failed_total";
pub const MODEL_COOLDOWNS_TOTAL: &str = "mediagen_model_cooldowns_total";

pub fn describe_metrics() {
    metrics::describe_counter!(JOBS_CREATED_TOTAL, "已创建的生成任务数");
    metrics::describe_counter!(JOBS_COMPLETED_TOTAL, "成功完成的生成任务数");
    metrics::describe_counter!(JOBS_FAILED_TOTAL, "失败的生成任务数");
    metrics::describe_counter!(MODEL_COOLDOWNS_TOTAL, "模型进入冷却的次数");
}
