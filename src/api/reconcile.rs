// ==========================================
// 工序跟踪系统 - 对账辅助
// ==========================================
// 职责: 共享件号仓、按件号拉取完整子树（含每个子工序的物料列表）
// 红线: 不在持锁期间发起后端请求
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::backend::materials::{decode_materials_response, MaterialsService};
use crate::backend::operations::OperationsService;
use crate::domain::item::Item;
use crate::engine::store::ItemStore;
use futures::future::try_join_all;
use std::sync::{Arc, Mutex, MutexGuard};

/// 进程内共享的件号仓
pub type SharedStore = Arc<Mutex<ItemStore>>;

pub fn new_shared_store() -> SharedStore {
    Arc::new(Mutex::new(ItemStore::new()))
}

/// 获取件号仓
pub fn lock_store(store: &SharedStore) -> ApiResult<MutexGuard<'_, ItemStore>> {
    store
        .lock()
        .map_err(|e| ApiError::InternalError(format!("件号仓锁获取失败: {}", e)))
}

/// 为件号的每个子工序并发拉取物料列表
pub async fn hydrate_materials(materials: &dyn MaterialsService, item: &mut Item) -> ApiResult<()> {
    let subphase_ids: Vec<i64> = item
        .phases
        .iter()
        .flat_map(|p| p.subphases.iter().map(|s| s.id))
        .collect();

    let lists = try_join_all(subphase_ids.iter().map(|&id| async move {
        let raw = materials.get_subphase_materials(id).await?;
        decode_materials_response(raw)
    }))
    .await?;

    let mut lists = lists.into_iter();
    for sub in item.phases.iter_mut().flat_map(|p| p.subphases.iter_mut()) {
        sub.materials = lists.next().unwrap_or_default();
    }
    Ok(())
}

/// 拉取单个件号的完整子树
pub async fn fetch_item_tree(
    operations: &dyn OperationsService,
    materials: &dyn MaterialsService,
    part_number: &str,
) -> ApiResult<Item> {
    let mut item = operations.get_item(part_number).await?;
    hydrate_materials(materials, &mut item).await?;
    Ok(item)
}
