// ==========================================
// 工序跟踪系统 - API层错误类型
// ==========================================
// 职责: 汇总引擎/后端/仓储错误，转换为面向操作员的错误消息
// 分类: 校验 / 前置条件 / 后端 / 未找到 / 解析 / 内部
// ==========================================

use crate::backend::error::BackendError;
use crate::engine::error::{RuleViolation, ViolationKind};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 本地规则拒绝（不发请求、不改状态）
    // ==========================================
    #[error("校验失败: {0}")]
    Validation(RuleViolation),

    #[error("前置条件不满足: {0}")]
    Precondition(RuleViolation),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    // ==========================================
    // 后端 / 数据访问错误
    // ==========================================
    #[error("后端错误: {0}")]
    Backend(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("数据解析失败: {0}")]
    Decode(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 是否为本地规则拒绝
    pub fn is_rule_violation(&self) -> bool {
        matches!(self, ApiError::Validation(_) | ApiError::Precondition(_))
    }

    /// 取出规则违反详情
    pub fn violation(&self) -> Option<&RuleViolation> {
        match self {
            ApiError::Validation(v) | ApiError::Precondition(v) => Some(v),
            _ => None,
        }
    }
}

// ==========================================
// 从 RuleViolation 转换（按类别分流）
// ==========================================
impl From<RuleViolation> for ApiError {
    fn from(v: RuleViolation) -> Self {
        match v.kind() {
            ViolationKind::Validation => ApiError::Validation(v),
            ViolationKind::Precondition => ApiError::Precondition(v),
        }
    }
}

// ==========================================
// 从 BackendError 转换
// ==========================================
impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            BackendError::Decode(msg) => ApiError::Decode(msg),
            BackendError::Other(err) => ApiError::Other(err),
            other => ApiError::Backend(other.to_string()),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_violation_routing() {
        let err: ApiError = RuleViolation::QuantityExceedsTarget { requested: 12, expected: 10 }.into();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(err.is_rule_violation());

        let err: ApiError = RuleViolation::PhasePaused.into();
        assert!(matches!(err, ApiError::Precondition(RuleViolation::PhasePaused)));
    }

    #[test]
    fn test_backend_error_conversion() {
        let err: ApiError = BackendError::not_found("Item", "P-1").into();
        assert!(matches!(err, ApiError::NotFound(ref m) if m.contains("P-1")));

        let err: ApiError = BackendError::Transport("timeout".to_string()).into();
        assert!(matches!(err, ApiError::Backend(_)));
        assert!(err.violation().is_none());
    }

    #[test]
    fn test_repository_error_conversion() {
        let err: ApiError = RepositoryError::LockError("poisoned".to_string()).into();
        assert!(err.to_string().contains("poisoned"));
    }
}
