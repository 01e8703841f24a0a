// ==========================================
// 工序跟踪系统 - 库存服务接口
// ==========================================

use crate::backend::error::BackendResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 库存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub item_type: Option<String>,
    pub balance: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

#[async_trait]
pub trait InventoryService: Send + Sync {
    /// 按名称查找库存条目（精确匹配名称优先由调用方决定）
    async fn find_items_by_name(&self, name: &str) -> BackendResult<Vec<InventoryRecord>>;

    /// 扣减库存，返回扣减后的条目
    async fn remove_stock(
        &self,
        item_id: &str,
        quantity: f64,
        reason: &str,
        actor: &str,
    ) -> BackendResult<InventoryRecord>;
}
