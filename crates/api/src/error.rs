use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mediagen_errors::GenerationError;
use serde_json::{json, Value};
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("生成服务错误: {0}")]
    Generation(#[from] GenerationError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("请求数据格式错误: {0}")]
    Json(#[from] JsonRejection),

    #[error("查询参数错误: {0}")]
    Query(#[from] QueryRejection),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Generation(err) => match err {
                GenerationError::Validation(_) => StatusCode::BAD_REQUEST,
                GenerationError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
                GenerationError::JobNotFound { .. } => StatusCode::NOT_FOUND,
                GenerationError::AllModelsUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                GenerationError::Generation { .. } if err.is_rate_limited() => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                GenerationError::Generation { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) | ApiError::Json(_) | ApiError::Query(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::Generation(err) => match err {
                GenerationError::Validation(_) => "VALIDATION_ERROR",
                GenerationError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
                GenerationError::JobNotFound { .. } => "NOT_FOUND",
                GenerationError::AllModelsUnavailable { .. } => "ALL_MODELS_UNAVAILABLE",
                GenerationError::Generation { .. } => "GENERATION_ERROR",
                GenerationError::RecordStore(_) | GenerationError::Database(_) => {
                    "RECORD_STORE_ERROR"
                }
                _ => "INTERNAL_ERROR",
            },
            ApiError::BadRequest(_) | ApiError::Json(_) | ApiError::Query(_) => "BAD_REQUEST",
        }
    }

    /// 返回给调用方的消息; 服务端错误不暴露内部细节
    fn message(&self) -> String {
        match self {
            ApiError::Generation(err @ GenerationError::Validation(_))
            | ApiError::Generation(err @ GenerationError::JobNotFound { .. }) => err.to_string(),
            ApiError::Generation(err) => err.user_message().to_string(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::Generation(GenerationError::InsufficientFunds { amount, reason, .. }) => {
                Some(json!({ "amount": amount, "reason": reason }))
            }
            ApiError::Generation(GenerationError::AllModelsUnavailable {
                attempted,
                cooldowns,
            }) => Some(json!({ "attempted": attempted, "cooldowns": cooldowns })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "请求处理失败");
        }

        let mut body = json!({
            "message": self.message(),
            "type": self.error_type(),
            "code": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (status, Json(json!({ "error": body }))).into_response()
    }
}
