use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("请求验证失败: {0}")]
    Validation(String),
    #[error("积分不足: 用户 {requester} 需要 {amount} 积分 - {reason}")]
    InsufficientFunds {
        requester: String,
        amount: i64,
        reason: String,
    },
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("生成失败 [{backend}]: {message}")]
    Generation {
        backend: String,
        message: String,
        status: Option<u16>,
    },
    #[error("存储降级: {0}")]
    StorageDegraded(String),
    #[error("记录存储错误: {0}")]
    RecordStore(String),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("生成记录未找到: {key}")]
    JobNotFound { key: String },
    #[error("所有模型暂时不可用, 已尝试: {attempted:?}")]
    AllModelsUnavailable {
        attempted: Vec<String>,
        cooldowns: BTreeMap<String, u64>,
    },
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type GenerationResult<T> = Result<T, GenerationError>;

impl GenerationError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn generation<B: Into<String>, M: Into<String>>(backend: B, message: M) -> Self {
        Self::Generation {
            backend: backend.into(),
            message: message.into(),
            status: None,
        }
    }
    pub fn generation_with_status<B: Into<String>, M: Into<String>>(
        backend: B,
        message: M,
        status: u16,
    ) -> Self {
        Self::Generation {
            backend: backend.into(),
            message: message.into(),
            status: Some(status),
        }
    }
    pub fn insufficient_funds<R: Into<String>, S: Into<String>>(
        requester: R,
        amount: i64,
        reason: S,
    ) -> Self {
        Self::InsufficientFunds {
            requester: requester.into(),
            amount,
            reason: reason.into(),
        }
    }
    pub fn record_store<S: Into<String>>(msg: S) -> Self {
        Self::RecordStore(msg.into())
    }
    pub fn job_not_found<S: Into<String>>(key: S) -> Self {
        Self::JobNotFound { key: key.into() }
    }

    /// 是否为限流/配额类错误 (按状态码与消息内容识别)
    pub fn is_rate_limited(&self) -> bool {
        match self {
            GenerationError::Generation {
                message, status, ..
            } => *status == Some(429) || is_rate_limit_message(message),
            _ => false,
        }
    }

    /// 在请求路径上同步返回的错误 (任务尚未创建)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GenerationError::Validation(_)
                | GenerationError::InsufficientFunds { .. }
                | GenerationError::RecordStore(_)
                | GenerationError::Database(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            GenerationError::Validation(_) => "请求参数有误",
            GenerationError::InsufficientFunds { .. } => "积分不足或扣费失败",
            GenerationError::JobNotFound { .. } => "生成记录不存在",
            GenerationError::AllModelsUnavailable { .. } => "所有模型暂时不可用, 请稍等片刻后重试",
            GenerationError::Generation { .. } if self.is_rate_limited() => {
                "系统繁忙 (配额超限), 请稍后重试"
            }
            _ => "系统繁忙，请稍后重试",
        }
    }
}

/// 按消息内容判断是否为限流类错误: 包含 `429`、`rate limit` 或 `quota`
pub fn is_rate_limit_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("429") || lowered.contains("rate limit") || lowered.contains("quota")
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        GenerationError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for GenerationError {
    fn from(err: anyhow::Error) -> Self {
        GenerationError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Generation {
            backend: err
                .url()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| "http".to_string()),
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}
