// ==========================================
// 工序跟踪系统 - 审计日志服务接口
// ==========================================
// 实现者: ActionLogRepository (SQLite) / InMemoryBackend
// ==========================================

use crate::backend::error::BackendResult;
use crate::domain::action_log::AuditEntry;
use async_trait::async_trait;

#[async_trait]
pub trait AuditLogService: Send + Sync {
    /// 写入一条审计记录，返回记录 ID
    async fn create_entry(&self, entry: &AuditEntry) -> BackendResult<String>;
}
