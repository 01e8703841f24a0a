// ==========================================
// 工序跟踪系统 - 工序操作服务接口
// ==========================================
// 实现者: 远程后端适配器 / InMemoryBackend
// ==========================================

use crate::backend::error::BackendResult;
use crate::domain::item::{EmployeeAssignment, Item};
use crate::domain::types::Priority;
use crate::engine::query::{ItemPage, ItemPageRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 子工序完成/撤销请求（可携带分摊时长）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubphaseCompletionRequest {
    pub part_number: String,
    pub phase_id: i64,
    pub subphase_id: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    /// 分钟；None 表示不更新时长
    pub time_duration: Option<i64>,
}

#[async_trait]
pub trait OperationsService: Send + Sync {
    // ===== 工序计时 =====
    async fn start_phase(&self, part_number: &str, phase_id: i64, at: DateTime<Utc>) -> BackendResult<()>;

    async fn pause_phase(&self, part_number: &str, phase_id: i64, at: DateTime<Utc>) -> BackendResult<()>;

    /// 恢复计时，同时写入累计暂停秒数
    async fn resume_phase(&self, part_number: &str, phase_id: i64, paused_duration: i64) -> BackendResult<()>;

    async fn stop_phase(&self, part_number: &str, phase_id: i64, at: DateTime<Utc>) -> BackendResult<()>;

    async fn reset_phase(&self, part_number: &str, phase_id: i64) -> BackendResult<()>;

    // ===== 子工序 =====
    async fn complete_subphase(&self, request: &SubphaseCompletionRequest) -> BackendResult<()>;

    async fn update_subphase_quantity(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
        quantity: i64,
    ) -> BackendResult<()>;

    async fn assign_subphase_employee(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
        employee: &EmployeeAssignment,
    ) -> BackendResult<()>;

    // ===== 件号 =====
    async fn update_item_priority(&self, part_number: &str, priority: Priority) -> BackendResult<()>;

    /// 拉取单个件号（物料列表需另行按子工序拉取）
    async fn get_item(&self, part_number: &str) -> BackendResult<Item>;

    async fn get_items_paginated(&self, request: &ItemPageRequest) -> BackendResult<ItemPage>;

    async fn delete_item(&self, part_number: &str) -> BackendResult<()>;
}
