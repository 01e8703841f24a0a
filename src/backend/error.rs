// ==========================================
// 工序跟踪系统 - 后端协作方错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 传输方式不在本层范围内，任何远程调用失败统一落到这里
// ==========================================

use thiserror::Error;

/// 后端协作方错误
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("后端请求失败: {0}")]
    Transport(String),

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("后端拒绝请求: {0}")]
    Rejected(String),

    #[error("响应解析失败: {0}")]
    Decode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        BackendError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

/// Result 类型别名
pub type BackendResult<T> = Result<T, BackendError>;
