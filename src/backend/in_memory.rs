// ==========================================
// 工序跟踪系统 - 内存后端
// ==========================================
// 职责: 以内存数据实现全部协作方接口，供演示程序与测试使用
// 能力:
//   - 物料与件号树分开存放，get_item 不带物料（需按子工序另行拉取）
//   - 可切换物料列表响应形状（裸数组 / data 包装 / success 信封）
//   - 一次性失败注入（按操作 / 按物料 ID / 按库存名称）
//   - 可选: 变更后向通知中心广播刷新事件
// ==========================================

use crate::backend::audit_log::AuditLogService;
use crate::backend::error::{BackendError, BackendResult};
use crate::backend::identity::{Employee, IdentityService};
use crate::backend::inventory::{InventoryRecord, InventoryService};
use crate::backend::materials::{MaterialUpdate, MaterialsService};
use crate::backend::notification::LocalNotificationHub;
use crate::backend::operations::{OperationsService, SubphaseCompletionRequest};
use crate::domain::action_log::AuditEntry;
use crate::domain::item::{EmployeeAssignment, Item, Material, Phase, Subphase};
use crate::domain::types::Priority;
use crate::engine::events::{RefreshEvent, RefreshEventKind};
use crate::engine::query::{ItemPage, ItemPageRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// 可注入失败的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    StartPhase,
    PausePhase,
    ResumePhase,
    StopPhase,
    ResetPhase,
    CompleteSubphase,
    UpdateQuantity,
    AssignEmployee,
    UpdatePriority,
    GetItem,
    GetItems,
    DeleteItem,
    GetMaterials,
    UpdateMaterial,
    FindInventory,
    RemoveStock,
    GetEmployee,
    CreateAuditEntry,
}

/// 物料列表响应形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaterialsResponseShape {
    Bare,
    Wrapped,
    #[default]
    Envelope,
}

/// 库存扣减流水
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub item_id: String,
    pub quantity: f64,
    pub reason: String,
    pub actor: String,
}

#[derive(Default)]
struct BackendState {
    items: BTreeMap<String, Item>,
    materials: HashMap<i64, Vec<Material>>, // subphase_id -> 物料
    inventory: BTreeMap<String, InventoryRecord>,
    employees: HashMap<String, Employee>,
    stock_movements: Vec<StockMovement>,
    audit_entries: Vec<(String, AuditEntry)>,
    fail_next: HashSet<BackendOp>,
    fail_materials: HashSet<i64>,
    fail_inventory_names: HashSet<String>,
    calls: HashMap<BackendOp, usize>,
    shape: MaterialsResponseShape,
}

impl BackendState {
    /// 记录调用并消费一次性失败
    fn enter(&mut self, op: BackendOp) -> BackendResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.fail_next.remove(&op) {
            return Err(BackendError::Transport(format!("注入失败: {:?}", op)));
        }
        Ok(())
    }

    fn item_mut(&mut self, part_number: &str) -> BackendResult<&mut Item> {
        self.items
            .get_mut(part_number)
            .ok_or_else(|| BackendError::not_found("Item", part_number))
    }

    fn phase_mut(&mut self, part_number: &str, phase_id: i64) -> BackendResult<&mut Phase> {
        self.item_mut(part_number)?
            .phases
            .iter_mut()
            .find(|p| p.id == phase_id)
            .ok_or_else(|| BackendError::not_found("Phase", phase_id))
    }

    fn subphase_mut(&mut self, part_number: &str, phase_id: i64, subphase_id: i64) -> BackendResult<&mut Subphase> {
        self.phase_mut(part_number, phase_id)?
            .subphases
            .iter_mut()
            .find(|s| s.id == subphase_id)
            .ok_or_else(|| BackendError::not_found("Subphase", subphase_id))
    }

    fn material_mut(&mut self, material_id: i64) -> Option<&mut Material> {
        self.materials
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .find(|m| m.id == material_id)
    }
}

/// 剥离物料，模拟服务端件号接口
fn without_materials(item: &Item) -> Item {
    let mut item = item.clone();
    for phase in &mut item.phases {
        for sub in &mut phase.subphases {
            sub.materials.clear();
        }
    }
    item
}

pub struct InMemoryBackend {
    state: Mutex<BackendState>,
    notifier: Option<(LocalNotificationHub, String)>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BackendState::default()),
            notifier: None,
        }
    }

    /// 变更后向指定房间广播刷新事件
    pub fn with_notifications(mut self, hub: LocalNotificationHub, room: impl Into<String>) -> Self {
        self.notifier = Some((hub, room.into()));
        self
    }

    fn state(&self) -> BackendResult<MutexGuard<'_, BackendState>> {
        self.state
            .lock()
            .map_err(|e| BackendError::Other(anyhow::anyhow!("锁获取失败: {}", e)))
    }

    fn notify(&self, event: RefreshEvent) {
        if let Some((hub, room)) = &self.notifier {
            let delivered = hub.publish(room, event);
            debug!(delivered, "内存后端已广播刷新事件");
        }
    }

    // ===== 种子数据 =====

    /// 写入件号（子工序上的物料转存到物料表）
    pub fn seed_item(&self, item: Item) -> BackendResult<()> {
        let mut state = self.state()?;
        for phase in &item.phases {
            for sub in &phase.subphases {
                state.materials.insert(sub.id, sub.materials.clone());
            }
        }
        state.items.insert(item.part_number.clone(), without_materials(&item));
        Ok(())
    }

    pub fn seed_inventory(&self, record: InventoryRecord) -> BackendResult<()> {
        self.state()?.inventory.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn seed_employee(&self, employee: Employee) -> BackendResult<()> {
        self.state()?.employees.insert(employee.uid.clone(), employee);
        Ok(())
    }

    pub fn set_materials_shape(&self, shape: MaterialsResponseShape) -> BackendResult<()> {
        self.state()?.shape = shape;
        Ok(())
    }

    // ===== 失败注入 =====

    /// 下一次调用该操作失败
    pub fn fail_next(&self, op: BackendOp) -> BackendResult<()> {
        self.state()?.fail_next.insert(op);
        Ok(())
    }

    /// 下一次更新该物料失败
    pub fn fail_material_update(&self, material_id: i64) -> BackendResult<()> {
        self.state()?.fail_materials.insert(material_id);
        Ok(())
    }

    /// 下一次按该名称查找库存失败
    pub fn fail_inventory_lookup(&self, name: &str) -> BackendResult<()> {
        self.state()?.fail_inventory_names.insert(name.to_lowercase());
        Ok(())
    }

    // ===== 观察 =====

    pub fn call_count(&self, op: BackendOp) -> usize {
        self.state()
            .map(|s| s.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// 服务端视角的完整件号（带物料）
    pub fn item_snapshot(&self, part_number: &str) -> Option<Item> {
        let state = self.state().ok()?;
        let mut item = state.items.get(part_number)?.clone();
        for phase in &mut item.phases {
            for sub in &mut phase.subphases {
                sub.materials = state.materials.get(&sub.id).cloned().unwrap_or_default();
            }
        }
        Some(item)
    }

    pub fn material(&self, material_id: i64) -> Option<Material> {
        let state = self.state().ok()?;
        state
            .materials
            .values()
            .flat_map(|list| list.iter())
            .find(|m| m.id == material_id)
            .cloned()
    }

    pub fn inventory(&self, item_id: &str) -> Option<InventoryRecord> {
        self.state().ok()?.inventory.get(item_id).cloned()
    }

    pub fn stock_movements(&self) -> Vec<StockMovement> {
        self.state().map(|s| s.stock_movements.clone()).unwrap_or_default()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state()
            .map(|s| s.audit_entries.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OperationsService for InMemoryBackend {
    async fn start_phase(&self, part_number: &str, phase_id: i64, at: DateTime<Utc>) -> BackendResult<()> {
        {
            let mut state = self.state()?;
            state.enter(BackendOp::StartPhase)?;
            let phase = state.phase_mut(part_number, phase_id)?;
            phase.start_time = Some(at);
            phase.pause_time = None;
            phase.end_time = None;
        }
        self.notify(RefreshEvent::item(RefreshEventKind::PhaseUpdated, part_number));
        Ok(())
    }

    async fn pause_phase(&self, part_number: &str, phase_id: i64, at: DateTime<Utc>) -> BackendResult<()> {
        {
            let mut state = self.state()?;
            state.enter(BackendOp::PausePhase)?;
            state.phase_mut(part_number, phase_id)?.pause_time = Some(at);
        }
        self.notify(RefreshEvent::item(RefreshEventKind::PhaseUpdated, part_number));
        Ok(())
    }

    async fn resume_phase(&self, part_number: &str, phase_id: i64, paused_duration: i64) -> BackendResult<()> {
        {
            let mut state = self.state()?;
            state.enter(BackendOp::ResumePhase)?;
            let phase = state.phase_mut(part_number, phase_id)?;
            phase.pause_time = None;
            phase.paused_duration = paused_duration;
        }
        self.notify(RefreshEvent::item(RefreshEventKind::PhaseUpdated, part_number));
        Ok(())
    }

    async fn stop_phase(&self, part_number: &str, phase_id: i64, at: DateTime<Utc>) -> BackendResult<()> {
        {
            let mut state = self.state()?;
            state.enter(BackendOp::StopPhase)?;
            state.phase_mut(part_number, phase_id)?.end_time = Some(at);
        }
        self.notify(RefreshEvent::item(RefreshEventKind::PhaseUpdated, part_number));
        Ok(())
    }

    async fn reset_phase(&self, part_number: &str, phase_id: i64) -> BackendResult<()> {
        {
            let mut state = self.state()?;
            state.enter(BackendOp::ResetPhase)?;
            let phase = state.phase_mut(part_number, phase_id)?;
            phase.start_time = None;
            phase.pause_time = None;
            phase.end_time = None;
            phase.paused_duration = 0;
        }
        self.notify(RefreshEvent::item(RefreshEventKind::PhaseUpdated, part_number));
        Ok(())
    }

    async fn complete_subphase(&self, request: &SubphaseCompletionRequest) -> BackendResult<()> {
        {
            let mut state = self.state()?;
            state.enter(BackendOp::CompleteSubphase)?;
            let sub = state.subphase_mut(&request.part_number, request.phase_id, request.subphase_id)?;
            sub.completed = request.completed;
            sub.completed_at = if request.completed { request.completed_at } else { None };
            if let Some(minutes) = request.time_duration {
                sub.time_duration = minutes;
            }
        }
        self.notify(RefreshEvent::item(RefreshEventKind::SubphaseUpdated, &request.part_number));
        Ok(())
    }

    async fn update_subphase_quantity(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
        quantity: i64,
    ) -> BackendResult<()> {
        {
            let mut state = self.state()?;
            state.enter(BackendOp::UpdateQuantity)?;
            let sub = state.subphase_mut(part_number, phase_id, subphase_id)?;
            if quantity < 0 || quantity > sub.expected_quantity {
                return Err(BackendError::Rejected(format!("数量越界: {}", quantity)));
            }
            sub.current_completed_quantity = quantity;
            if sub.completed && quantity < sub.expected_quantity {
                sub.completed = false;
                sub.completed_at = None;
            }
        }
        self.notify(RefreshEvent::item(RefreshEventKind::SubphaseUpdated, part_number));
        Ok(())
    }

    async fn assign_subphase_employee(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
        employee: &EmployeeAssignment,
    ) -> BackendResult<()> {
        {
            let mut state = self.state()?;
            state.enter(BackendOp::AssignEmployee)?;
            state.subphase_mut(part_number, phase_id, subphase_id)?.assign(employee);
        }
        self.notify(RefreshEvent::item(RefreshEventKind::EmployeeAssigned, part_number));
        Ok(())
    }

    async fn update_item_priority(&self, part_number: &str, priority: Priority) -> BackendResult<()> {
        {
            let mut state = self.state()?;
            state.enter(BackendOp::UpdatePriority)?;
            state.item_mut(part_number)?.priority = priority;
        }
        self.notify(RefreshEvent::item(RefreshEventKind::ItemUpdated, part_number));
        Ok(())
    }

    async fn get_item(&self, part_number: &str) -> BackendResult<Item> {
        let mut state = self.state()?;
        state.enter(BackendOp::GetItem)?;
        state
            .items
            .get(part_number)
            .cloned()
            .ok_or_else(|| BackendError::not_found("Item", part_number))
    }

    async fn get_items_paginated(&self, request: &ItemPageRequest) -> BackendResult<ItemPage> {
        let mut state = self.state()?;
        state.enter(BackendOp::GetItems)?;
        let sorted = request.query.apply(state.items.values());
        Ok(ItemPage::slice(sorted, request.page, request.page_size))
    }

    async fn delete_item(&self, part_number: &str) -> BackendResult<()> {
        {
            let mut state = self.state()?;
            state.enter(BackendOp::DeleteItem)?;
            let item = state
                .items
                .remove(part_number)
                .ok_or_else(|| BackendError::not_found("Item", part_number))?;
            for phase in &item.phases {
                for sub in &phase.subphases {
                    state.materials.remove(&sub.id);
                }
            }
        }
        self.notify(RefreshEvent::collection(RefreshEventKind::ItemDeleted));
        Ok(())
    }
}

#[async_trait]
impl MaterialsService for InMemoryBackend {
    async fn get_subphase_materials(&self, subphase_id: i64) -> BackendResult<JsonValue> {
        let mut state = self.state()?;
        state.enter(BackendOp::GetMaterials)?;
        let list = state.materials.get(&subphase_id).cloned().unwrap_or_default();
        let list = serde_json::to_value(list)?;
        Ok(match state.shape {
            MaterialsResponseShape::Bare => list,
            MaterialsResponseShape::Wrapped => json!({ "data": list }),
            MaterialsResponseShape::Envelope => json!({ "success": true, "data": list }),
        })
    }

    async fn update_material(&self, material_id: i64, update: &MaterialUpdate) -> BackendResult<()> {
        let mut state = self.state()?;
        state.enter(BackendOp::UpdateMaterial)?;
        if state.fail_materials.remove(&material_id) {
            return Err(BackendError::Transport(format!("注入失败: 物料 {}", material_id)));
        }
        let material = state
            .material_mut(material_id)
            .ok_or_else(|| BackendError::not_found("Material", material_id))?;
        update.apply_to(material);
        Ok(())
    }
}

#[async_trait]
impl InventoryService for InMemoryBackend {
    async fn find_items_by_name(&self, name: &str) -> BackendResult<Vec<InventoryRecord>> {
        let mut state = self.state()?;
        state.enter(BackendOp::FindInventory)?;
        let key = name.trim().to_lowercase();
        if state.fail_inventory_names.remove(&key) {
            return Err(BackendError::Transport(format!("注入失败: 库存查询 {}", name)));
        }
        Ok(state
            .inventory
            .values()
            .filter(|r| r.name.trim().to_lowercase() == key)
            .cloned()
            .collect())
    }

    async fn remove_stock(
        &self,
        item_id: &str,
        quantity: f64,
        reason: &str,
        actor: &str,
    ) -> BackendResult<InventoryRecord> {
        let mut state = self.state()?;
        state.enter(BackendOp::RemoveStock)?;
        let record = state
            .inventory
            .get_mut(item_id)
            .ok_or_else(|| BackendError::not_found("InventoryItem", item_id))?;
        if quantity <= 0.0 {
            return Err(BackendError::Rejected(format!("扣减数量无效: {}", quantity)));
        }
        if record.balance < quantity {
            return Err(BackendError::Rejected(format!(
                "库存不足: {} 余量 {} < {}",
                record.name, record.balance, quantity
            )));
        }
        record.balance -= quantity;
        let updated = record.clone();
        state.stock_movements.push(StockMovement {
            item_id: item_id.to_string(),
            quantity,
            reason: reason.to_string(),
            actor: actor.to_string(),
        });
        Ok(updated)
    }
}

#[async_trait]
impl IdentityService for InMemoryBackend {
    async fn get_employee(&self, uid: &str) -> BackendResult<Employee> {
        let mut state = self.state()?;
        state.enter(BackendOp::GetEmployee)?;
        state
            .employees
            .get(uid)
            .cloned()
            .ok_or_else(|| BackendError::not_found("Employee", uid))
    }
}

#[async_trait]
impl AuditLogService for InMemoryBackend {
    async fn create_entry(&self, entry: &AuditEntry) -> BackendResult<String> {
        let mut state = self.state()?;
        state.enter(BackendOp::CreateAuditEntry)?;
        let id = Uuid::new_v4().to_string();
        state.audit_entries.push((id.clone(), entry.clone()));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::materials::decode_materials_response;
    use crate::domain::types::MaterialStatus;
    use chrono::TimeZone;

    fn material(id: i64) -> Material {
        serde_json::from_value(json!({
            "id": id, "material_name": "钢板", "material_quantity": 2.0, "unit_of_measure": "kg"
        }))
        .unwrap()
    }

    fn item() -> Item {
        let t0 = Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap();
        serde_json::from_value(json!({
            "part_number": "P-1",
            "name": "支架",
            "created_at": t0,
            "phases": [{
                "id": 10, "name": "下料",
                "subphases": [{ "id": 100, "name": "切割", "materials": [material(1)] }]
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_item_strips_materials() {
        let backend = InMemoryBackend::new();
        backend.seed_item(item()).unwrap();

        let fetched = backend.get_item("P-1").await.unwrap();
        assert!(fetched.phases[0].subphases[0].materials.is_empty());

        let raw = backend.get_subphase_materials(100).await.unwrap();
        let list = decode_materials_response(raw).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn test_materials_shapes_decode() {
        let backend = InMemoryBackend::new();
        backend.seed_item(item()).unwrap();
        for shape in [
            MaterialsResponseShape::Bare,
            MaterialsResponseShape::Wrapped,
            MaterialsResponseShape::Envelope,
        ] {
            backend.set_materials_shape(shape).unwrap();
            let raw = backend.get_subphase_materials(100).await.unwrap();
            assert_eq!(decode_materials_response(raw).unwrap()[0].id, 1);
        }
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let backend = InMemoryBackend::new();
        backend.seed_item(item()).unwrap();
        backend.fail_next(BackendOp::GetItem).unwrap();

        assert!(backend.get_item("P-1").await.is_err());
        assert!(backend.get_item("P-1").await.is_ok());
        assert_eq!(backend.call_count(BackendOp::GetItem), 2);
    }

    #[tokio::test]
    async fn test_remove_stock_rejects_overdraw() {
        let backend = InMemoryBackend::new();
        backend
            .seed_inventory(InventoryRecord {
                id: "inv-1".to_string(),
                name: "钢板".to_string(),
                item_type: None,
                balance: 3.0,
                unit: Some("kg".to_string()),
            })
            .unwrap();

        let after = backend.remove_stock("inv-1", 2.0, "领料", "张三").await.unwrap();
        assert_eq!(after.balance, 1.0);
        assert!(backend.remove_stock("inv-1", 2.0, "领料", "张三").await.is_err());
        assert_eq!(backend.stock_movements().len(), 1);
    }

    #[tokio::test]
    async fn test_update_material_applies_fields() {
        let backend = InMemoryBackend::new();
        backend.seed_item(item()).unwrap();
        let update = MaterialUpdate {
            status: Some(MaterialStatus::CheckedOut),
            ..Default::default()
        };
        backend.update_material(1, &update).await.unwrap();
        assert_eq!(backend.material(1).unwrap().status, MaterialStatus::CheckedOut);

        backend.fail_material_update(1).unwrap();
        assert!(backend.update_material(1, &update).await.is_err());
        assert!(backend.update_material(99, &update).await.is_err());
    }
}
