// ==========================================
// 工序跟踪系统 - 领料出库 API
// ==========================================
// 职责:
// 1. 员工门禁: 子工序必须分配员工（uid、条码、姓名齐全）
// 2. 批量领料: 从后端拉取最新物料列表 → 过滤 → 确认摘要 → 逐个扣减
// 3. 单个领料: 同一流程，已领用物料直接拒绝
// 4. 废料复用: 只变更责任人，不动库存，追加备注留痕
// 红线: 每个物料的库存扣减至多一次（扣减台账落库，重启后仍生效）；单个物料失败不中断整批
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::checklist_api::Confirmation;
use crate::api::error::{ApiError, ApiResult};
use crate::api::reconcile::{lock_store, SharedStore};
use crate::backend::inventory::{InventoryRecord, InventoryService};
use crate::backend::audit_log::AuditLogService;
use crate::backend::materials::{decode_materials_response, MaterialUpdate, MaterialsService};
use crate::domain::action_log::{ActionType, AuditEntry, AuditItem};
use crate::domain::deduction::DeductionState;
use crate::domain::item::{EmployeeAssignment, Material};
use crate::domain::types::MaterialStatus;
use crate::engine::clock::Clock;
use crate::engine::error::RuleViolation;
use crate::engine::store::{ItemStore, PhaseSlot};
use crate::i18n::t_with_args;
use crate::repository::material_deduction_repo::{DeductionClaim, MaterialDeductionRepository};

// ==========================================
// 领料计划与结果
// ==========================================

/// 领料目标（件号 / 工序 / 子工序）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutTarget {
    pub part_number: String,
    pub phase_id: i64,
    pub phase_name: String,
    pub subphase_id: i64,
    pub subphase_name: String,
}

/// 领料计划（确认前生成）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutPlan {
    pub target: CheckoutTarget,
    pub employee: EmployeeAssignment,
    /// 待领料物料（已过滤已领用 / 废料复用 / 已扣减）
    pub materials: Vec<Material>,
    /// 确认摘要
    pub summary: String,
}

impl CheckoutPlan {
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

/// 单个物料的失败记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutFailure {
    pub material_id: i64,
    pub material_name: String,
    pub reason: String,
}

/// 领料汇总报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutReport {
    pub succeeded: Vec<i64>,
    pub failed: Vec<CheckoutFailure>,
    /// 非致命警告（库存不足、审计写入失败）
    pub warnings: Vec<String>,
    pub audit_entry_id: Option<String>,
    pub summary: String,
}

impl CheckoutReport {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CheckoutOutcome {
    Cancelled,
    Completed(CheckoutReport),
}

/// 单个物料扣减成功后的明细
struct Deducted {
    material: Material,
    inventory: InventoryRecord,
}

// ==========================================
// CheckoutApi
// ==========================================
pub struct CheckoutApi {
    store: SharedStore,
    materials: Arc<dyn MaterialsService>,
    inventory: Arc<dyn InventoryService>,
    audit: Arc<dyn AuditLogService>,
    clock: Arc<dyn Clock>,
    deductions: Arc<MaterialDeductionRepository>,
}

impl CheckoutApi {
    pub fn new(
        store: SharedStore,
        materials: Arc<dyn MaterialsService>,
        inventory: Arc<dyn InventoryService>,
        audit: Arc<dyn AuditLogService>,
        deductions: Arc<MaterialDeductionRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            materials,
            inventory,
            audit,
            clock,
            deductions,
        }
    }

    /// 物料在扣减台账中的状态（无记录 → None）
    pub fn deduction_state(&self, material_id: i64) -> ApiResult<Option<DeductionState>> {
        Ok(self.deductions.state(material_id)?)
    }

    /// 领料目标（件号 / 工序 / 子工序名称）及子工序员工
    fn describe_target(
        store: &ItemStore,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
    ) -> ApiResult<(CheckoutTarget, Option<EmployeeAssignment>)> {
        let not_found = || {
            ApiError::NotFound(format!(
                "子工序(part={}, phase={}, id={})不存在",
                part_number, phase_id, subphase_id
            ))
        };
        let slot = store
            .locate_subphase(part_number, phase_id, subphase_id)
            .ok_or_else(not_found)?;
        let phase = store
            .phase(PhaseSlot {
                item_idx: slot.item_idx,
                phase_idx: slot.phase_idx,
            })
            .ok_or_else(not_found)?;
        let sub = store.subphase(slot).ok_or_else(not_found)?;

        let target = CheckoutTarget {
            part_number: part_number.to_string(),
            phase_id,
            phase_name: phase.name.clone(),
            subphase_id,
            subphase_name: sub.name.clone(),
        };
        Ok((target, sub.assigned_employee()))
    }

    /// 员工门禁，返回领料目标与责任人
    fn gate(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
    ) -> ApiResult<(CheckoutTarget, EmployeeAssignment)> {
        let store = lock_store(&self.store)?;
        let (target, employee) = Self::describe_target(&store, part_number, phase_id, subphase_id)?;
        let employee = employee
            .filter(EmployeeAssignment::is_complete)
            .ok_or(RuleViolation::CheckoutRequiresEmployee(subphase_id))?;
        Ok((target, employee))
    }

    /// 从后端拉取最新物料列表（不使用缓存）并写回件号仓
    async fn fetch_fresh_materials(&self, target: &CheckoutTarget) -> ApiResult<Vec<Material>> {
        let raw = self.materials.get_subphase_materials(target.subphase_id).await?;
        let materials = decode_materials_response(raw)?;

        let mut store = lock_store(&self.store)?;
        if let Some(slot) = store.locate_subphase(&target.part_number, target.phase_id, target.subphase_id) {
            store.set_subphase_materials(slot, materials.clone());
        }
        Ok(materials)
    }

    // ==========================================
    // 批量领料
    // ==========================================

    /// 生成批量领料计划
    #[instrument(skip(self))]
    pub async fn prepare_bulk_checkout(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
    ) -> ApiResult<CheckoutPlan> {
        let (target, employee) = self.gate(part_number, phase_id, subphase_id)?;
        let fresh = self.fetch_fresh_materials(&target).await?;

        let mut eligible = Vec::new();
        for material in fresh {
            if material.is_checked_out_to_person() || material.is_scrap_reuse() {
                continue;
            }
            // 台账有记录（已扣减或扣减途中中断）的物料不再进入计划
            if self.deductions.state(material.id)?.is_some() {
                continue;
            }
            eligible.push(material);
        }

        let summary = if eligible.is_empty() {
            t_with_args("checkout.nothing_to_checkout", &[("subphase", target.subphase_name.as_str())])
        } else {
            t_with_args(
                "checkout.confirm_summary",
                &[
                    ("count", eligible.len().to_string().as_str()),
                    ("person", employee.name.as_str()),
                    ("materials", describe_materials(&eligible).as_str()),
                ],
            )
        };

        Ok(CheckoutPlan {
            target,
            employee,
            materials: eligible,
            summary,
        })
    }

    /// 执行批量领料（需确认）；逐个物料独立处理，不提前中止
    #[instrument(skip(self, plan), fields(part_number = %plan.target.part_number, count = plan.materials.len()))]
    pub async fn execute_bulk_checkout(
        &self,
        plan: &CheckoutPlan,
        confirmation: Confirmation,
    ) -> ApiResult<CheckoutOutcome> {
        if confirmation == Confirmation::Cancelled {
            return Ok(CheckoutOutcome::Cancelled);
        }

        let mut report = CheckoutReport {
            succeeded: Vec::new(),
            failed: Vec::new(),
            warnings: Vec::new(),
            audit_entry_id: None,
            summary: String::new(),
        };
        let mut deducted = Vec::new();

        for material in &plan.materials {
            match self.checkout_material(plan, material, &mut report.warnings).await {
                Ok(done) => {
                    report.succeeded.push(material.id);
                    deducted.push(done);
                }
                Err(reason) => {
                    warn!(material_id = material.id, reason = %reason, "物料领料失败");
                    report.failed.push(CheckoutFailure {
                        material_id: material.id,
                        material_name: material.material_name.clone(),
                        reason,
                    });
                }
            }
        }

        if !deducted.is_empty() {
            match self.write_checkout_audit(plan, &deducted).await {
                Ok(id) => report.audit_entry_id = Some(id),
                Err(err) => {
                    warn!(error = %err, "领料审计日志写入失败");
                    report.warnings.push(err.to_string());
                }
            }
        }

        report.summary = t_with_args(
            "checkout.report_summary",
            &[
                ("succeeded", report.success_count().to_string().as_str()),
                ("failed", report.failure_count().to_string().as_str()),
            ],
        );
        info!(
            succeeded = report.success_count(),
            failed = report.failure_count(),
            "批量领料完成"
        );
        Ok(CheckoutOutcome::Completed(report))
    }

    /// 单个物料: 占用 → 查库存 → 扣减 → 更新物料行
    ///
    /// 扣减失败释放占用；扣减成功后物料行更新失败仍保持已扣减
    async fn checkout_material(
        &self,
        plan: &CheckoutPlan,
        material: &Material,
        warnings: &mut Vec<String>,
    ) -> Result<Deducted, String> {
        let claim = DeductionClaim {
            material_id: material.id,
            part_number: &plan.target.part_number,
            subphase_id: plan.target.subphase_id,
            quantity: material.material_quantity,
            actor: &plan.employee.name,
        };
        let claimed = self.deductions.claim(&claim).map_err(|e| e.to_string())?;
        if !claimed {
            return Err(RuleViolation::DeductionAlreadyApplied(material.id).to_string());
        }

        let inventory = match self.deduct_stock(plan, material, warnings).await {
            Ok(record) => record,
            Err(reason) => {
                if let Err(err) = self.deductions.release(material.id) {
                    // 占用记录残留: 该物料需人工核对后才能再次领料
                    warn!(material_id = material.id, error = %err, "扣减占用释放失败");
                }
                return Err(reason);
            }
        };
        if let Err(err) = self.deductions.mark_deducted(material.id, &inventory.id) {
            // 占用记录仍在，同样阻止二次扣减
            warn!(material_id = material.id, error = %err, "扣减台账更新失败");
            warnings.push(err.to_string());
        }

        let update = MaterialUpdate {
            checked_out_by: Some(plan.employee.barcode.clone()),
            checked_out_by_uid: Some(plan.employee.uid.clone()),
            checked_out_by_name: Some(plan.employee.name.clone()),
            checkout_date: Some(self.clock.now()),
            status: Some(MaterialStatus::CheckedOut),
            notes: None,
        };
        self.materials
            .update_material(material.id, &update)
            .await
            .map_err(|e| format!("库存已扣减，物料记录更新失败: {}", e))?;

        if let Ok(mut store) = lock_store(&self.store) {
            if let Some(slot) =
                store.locate_subphase(&plan.target.part_number, plan.target.phase_id, plan.target.subphase_id)
            {
                store.update_material(slot, material.id, |m| update.apply_to(m));
            }
        }

        Ok(Deducted {
            material: material.clone(),
            inventory,
        })
    }

    async fn deduct_stock(
        &self,
        plan: &CheckoutPlan,
        material: &Material,
        warnings: &mut Vec<String>,
    ) -> Result<InventoryRecord, String> {
        let candidates = self
            .inventory
            .find_items_by_name(&material.material_name)
            .await
            .map_err(|e| e.to_string())?;
        let wanted = material.material_name.trim().to_lowercase();
        let record = candidates
            .into_iter()
            .find(|r| r.name.trim().to_lowercase() == wanted)
            .ok_or_else(|| t_with_args("checkout.inventory_not_found", &[("material", material.material_name.as_str())]))?;

        if record.balance < material.material_quantity {
            let warning = t_with_args(
                "checkout.insufficient_balance",
                &[
                    ("material", material.material_name.as_str()),
                    ("balance", record.balance.to_string().as_str()),
                    ("required", material.material_quantity.to_string().as_str()),
                ],
            );
            warn!(material_id = material.id, balance = record.balance, "库存余量不足");
            warnings.push(warning);
        }

        let note = t_with_args(
            "checkout.stock_note",
            &[
                ("part", plan.target.part_number.as_str()),
                ("phase", plan.target.phase_name.as_str()),
                ("subphase", plan.target.subphase_name.as_str()),
                ("material", material.material_name.as_str()),
                ("person", plan.employee.name.as_str()),
            ],
        );
        self.inventory
            .remove_stock(&record.id, material.material_quantity, &note, &plan.employee.name)
            .await
            .map_err(|e| e.to_string())
    }

    async fn write_checkout_audit(&self, plan: &CheckoutPlan, deducted: &[Deducted]) -> ApiResult<String> {
        let materials: Vec<Material> = deducted.iter().map(|d| d.material.clone()).collect();
        let entry = AuditEntry {
            action_type: ActionType::MaterialCheckout,
            actor: plan.employee.name.clone(),
            details: t_with_args(
                "checkout.audit_details",
                &[
                    ("person", plan.employee.name.as_str()),
                    ("part", plan.target.part_number.as_str()),
                    ("subphase", plan.target.subphase_name.as_str()),
                    ("materials", describe_materials(&materials).as_str()),
                ],
            ),
            purpose: t_with_args("checkout.audit_purpose", &[("part", plan.target.part_number.as_str())]),
            part_number: Some(plan.target.part_number.clone()),
            items: deducted
                .iter()
                .map(|d| AuditItem {
                    material_id: d.material.id,
                    material_name: d.material.material_name.clone(),
                    quantity: d.material.material_quantity,
                    unit_of_measure: d.material.unit().to_string(),
                    inventory_item_id: Some(d.inventory.id.clone()),
                })
                .collect(),
        };
        Ok(self.audit.create_entry(&entry).await?)
    }

    // ==========================================
    // 单个领料
    // ==========================================

    /// 单个物料领料；已领用 / 废料复用 / 已扣减的物料直接拒绝
    #[instrument(skip(self))]
    pub async fn checkout_single(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
        material_id: i64,
    ) -> ApiResult<CheckoutReport> {
        let (target, employee) = self.gate(part_number, phase_id, subphase_id)?;
        let fresh = self.fetch_fresh_materials(&target).await?;
        let material = fresh
            .into_iter()
            .find(|m| m.id == material_id)
            .ok_or_else(|| ApiError::NotFound(format!("物料{}不存在", material_id)))?;

        if material.is_checked_out_to_person() {
            let holder = material
                .checked_out_by_name
                .clone()
                .or_else(|| material.checked_out_by_uid.clone())
                .unwrap_or_default();
            return Err(RuleViolation::MaterialAlreadyCheckedOut { material_id, holder }.into());
        }
        if material.is_scrap_reuse() {
            return Err(RuleViolation::ScrapReuseNotDeductible(material_id).into());
        }
        if self.deductions.state(material_id)?.is_some() {
            return Err(RuleViolation::DeductionAlreadyApplied(material_id).into());
        }

        let summary = t_with_args(
            "checkout.confirm_summary",
            &[
                ("count", "1"),
                ("person", employee.name.as_str()),
                ("materials", describe_materials(std::slice::from_ref(&material)).as_str()),
            ],
        );
        let plan = CheckoutPlan {
            target,
            employee,
            materials: vec![material],
            summary,
        };
        match self.execute_bulk_checkout(&plan, Confirmation::Confirmed).await? {
            CheckoutOutcome::Completed(report) => Ok(report),
            CheckoutOutcome::Cancelled => Err(ApiError::InternalError("单个领料不应被取消".to_string())),
        }
    }

    // ==========================================
    // 废料复用责任人变更
    // ==========================================

    /// 变更废料复用物料的责任人（不扣库存，追加备注）
    #[instrument(skip(self, assignee))]
    pub async fn update_scrap_assignment(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
        material_id: i64,
        assignee: &EmployeeAssignment,
        actor: &str,
    ) -> ApiResult<Material> {
        if !assignee.is_complete() {
            return Err(ApiError::InvalidInput("责任人信息不完整（uid、条码、姓名）".to_string()));
        }
        let (target, _) = {
            let store = lock_store(&self.store)?;
            Self::describe_target(&store, part_number, phase_id, subphase_id)?
        };

        let material = self
            .fetch_fresh_materials(&target)
            .await?
            .into_iter()
            .find(|m| m.id == material_id)
            .ok_or_else(|| ApiError::NotFound(format!("物料{}不存在", material_id)))?;
        if !material.is_scrap_reuse() {
            return Err(RuleViolation::NotScrapReuse(material_id).into());
        }

        let now = self.clock.now();
        let previous = material
            .checked_out_by_name
            .clone()
            .unwrap_or_else(|| "-".to_string());
        let note = t_with_args(
            "scrap.reassign_note",
            &[
                ("from", previous.as_str()),
                ("to", assignee.name.as_str()),
                ("actor", actor),
                ("at", now.format("%Y-%m-%d %H:%M").to_string().as_str()),
            ],
        );
        let notes = match material.notes.as_deref() {
            Some(existing) if !existing.trim().is_empty() => format!("{}\n{}", existing, note),
            _ => note,
        };

        let update = MaterialUpdate {
            checked_out_by: Some(assignee.barcode.clone()),
            checked_out_by_uid: Some(assignee.uid.clone()),
            checked_out_by_name: Some(assignee.name.clone()),
            notes: Some(notes),
            ..Default::default()
        };
        self.materials.update_material(material_id, &update).await?;

        let mut updated = material.clone();
        update.apply_to(&mut updated);
        {
            let mut store = lock_store(&self.store)?;
            if let Some(slot) = store.locate_subphase(part_number, phase_id, subphase_id) {
                store.update_material(slot, material_id, |m| update.apply_to(m));
            }
        }

        let entry = AuditEntry {
            action_type: ActionType::ScrapReassign,
            actor: actor.to_string(),
            details: t_with_args(
                "scrap.audit_details",
                &[
                    ("material", material.material_name.as_str()),
                    ("from", previous.as_str()),
                    ("to", assignee.name.as_str()),
                ],
            ),
            purpose: t_with_args("scrap.audit_purpose", &[("part", part_number)]),
            part_number: Some(part_number.to_string()),
            items: vec![AuditItem {
                material_id,
                material_name: material.material_name.clone(),
                quantity: material.material_quantity,
                unit_of_measure: material.unit().to_string(),
                inventory_item_id: None,
            }],
        };
        if let Err(err) = self.audit.create_entry(&entry).await {
            warn!(material_id, error = %err, "责任人变更审计日志写入失败");
        }

        info!(material_id, to = %assignee.name, "废料复用责任人已变更");
        Ok(updated)
    }
}

/// 物料合并描述: "钢板 x2kg, 螺栓 x10"
fn describe_materials(materials: &[Material]) -> String {
    materials
        .iter()
        .map(|m| format!("{} x{}{}", m.material_name, m.material_quantity, m.unit()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::reconcile::new_shared_store;
    use crate::backend::in_memory::{BackendOp, InMemoryBackend};
    use crate::domain::item::{Item, SCRAP_REUSE_MARKER};
    use crate::engine::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use rusqlite::Connection;
    use serde_json::json;
    use std::sync::Mutex;

    fn item(with_employee: bool) -> Item {
        let employee = if with_employee {
            json!({ "employee_uid": "u1", "employee_barcode": "B001", "employee_name": "张三" })
        } else {
            json!({})
        };
        let mut sub = json!({
            "id": 100, "name": "焊接",
            "materials": [
                { "id": 1, "material_name": "钢板", "material_quantity": 2.0, "unit_of_measure": "kg" },
                { "id": 2, "material_name": "螺栓", "material_quantity": 10.0 },
                { "id": 3, "material_name": "边角料", "material_quantity": 1.0,
                  "notes": format!("{} 来自 P-0", SCRAP_REUSE_MARKER),
                  "checked_out_by_uid": "u9", "checked_out_by_name": "李四" }
            ]
        });
        if let (Some(s), Some(e)) = (sub.as_object_mut(), employee.as_object()) {
            s.extend(e.clone());
        }
        serde_json::from_value(json!({
            "part_number": "P-1", "name": "支架",
            "created_at": Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap(),
            "phases": [{ "id": 10, "name": "组焊", "subphases": [sub] }]
        }))
        .unwrap()
    }

    fn inventory(id: &str, name: &str, balance: f64) -> InventoryRecord {
        InventoryRecord {
            id: id.to_string(),
            name: name.to_string(),
            item_type: None,
            balance,
            unit: None,
        }
    }

    async fn setup(with_employee: bool) -> (CheckoutApi, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        backend.seed_item(item(with_employee)).unwrap();
        backend.seed_inventory(inventory("INV-1", "钢板", 50.0)).unwrap();
        backend.seed_inventory(inventory("INV-2", "螺栓", 100.0)).unwrap();

        let store = new_shared_store();
        let mut tree = item(with_employee);
        for sub in tree.phases.iter_mut().flat_map(|p| p.subphases.iter_mut()) {
            sub.materials.clear();
        }
        store.lock().unwrap().replace_all(vec![tree]);

        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap()));
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let deductions = Arc::new(MaterialDeductionRepository::new(Arc::new(Mutex::new(conn))));
        let api = CheckoutApi::new(
            store,
            backend.clone(),
            backend.clone(),
            backend.clone(),
            deductions,
            clock,
        );
        (api, backend)
    }

    #[tokio::test]
    async fn test_prepare_requires_employee() {
        let (api, backend) = setup(false).await;
        let err = api.prepare_bulk_checkout("P-1", 10, 100).await.unwrap_err();
        assert_eq!(
            err.violation(),
            Some(&RuleViolation::CheckoutRequiresEmployee(100))
        );
        assert_eq!(backend.call_count(BackendOp::GetMaterials), 0);
    }

    #[tokio::test]
    async fn test_prepare_filters_scrap_and_checked_out() {
        let (api, _backend) = setup(true).await;
        let plan = api.prepare_bulk_checkout("P-1", 10, 100).await.unwrap();
        let ids: Vec<i64> = plan.materials.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(plan.summary.contains("张三"));
    }

    #[tokio::test]
    async fn test_cancelled_checkout_touches_nothing() {
        let (api, backend) = setup(true).await;
        let plan = api.prepare_bulk_checkout("P-1", 10, 100).await.unwrap();
        let outcome = api.execute_bulk_checkout(&plan, Confirmation::Cancelled).await.unwrap();
        assert_eq!(outcome, CheckoutOutcome::Cancelled);
        assert!(backend.stock_movements().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_checkout_updates_rows_and_audits_once() {
        let (api, backend) = setup(true).await;
        let plan = api.prepare_bulk_checkout("P-1", 10, 100).await.unwrap();
        let CheckoutOutcome::Completed(report) =
            api.execute_bulk_checkout(&plan, Confirmation::Confirmed).await.unwrap()
        else {
            panic!("应完成领料");
        };

        assert_eq!(report.succeeded, vec![1, 2]);
        assert!(report.audit_entry_id.is_some());
        assert_eq!(backend.inventory("INV-1").unwrap().balance, 48.0);
        assert_eq!(backend.audit_entries().len(), 1);
        assert_eq!(backend.audit_entries()[0].items.len(), 2);

        let row = backend.material(1).unwrap();
        assert_eq!(row.status, MaterialStatus::CheckedOut);
        assert_eq!(row.checked_out_by.as_deref(), Some("B001"));
    }

    #[tokio::test]
    async fn test_row_update_failure_keeps_deduction() {
        let (api, backend) = setup(true).await;
        backend.fail_material_update(1).unwrap();
        let plan = api.prepare_bulk_checkout("P-1", 10, 100).await.unwrap();
        let CheckoutOutcome::Completed(report) =
            api.execute_bulk_checkout(&plan, Confirmation::Confirmed).await.unwrap()
        else {
            panic!("应完成领料");
        };
        assert_eq!(report.failure_count(), 1);
        assert_eq!(api.deduction_state(1).unwrap(), Some(DeductionState::Deducted));

        // 重试: 物料 1 行仍未领用，但台账阻止二次扣减
        let retry = api.prepare_bulk_checkout("P-1", 10, 100).await.unwrap();
        assert!(retry.is_empty());
        assert_eq!(backend.stock_movements().len(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_balance_warns() {
        let (api, backend) = setup(true).await;
        backend.seed_inventory(inventory("INV-1", "钢板", 1.0)).unwrap();
        let plan = api.prepare_bulk_checkout("P-1", 10, 100).await.unwrap();
        let CheckoutOutcome::Completed(report) =
            api.execute_bulk_checkout(&plan, Confirmation::Confirmed).await.unwrap()
        else {
            panic!("应完成领料");
        };
        assert_eq!(report.warnings.len(), 1);
        // 后端拒绝超额扣减，台账释放以便补货后重试
        assert_eq!(report.failed[0].material_id, 1);
        assert_eq!(api.deduction_state(1).unwrap(), None);
    }

    #[tokio::test]
    async fn test_single_checkout_rejects_held_material() {
        let (api, backend) = setup(true).await;
        let err = api.checkout_single("P-1", 10, 100, 3).await.unwrap_err();
        assert!(matches!(
            err.violation(),
            Some(RuleViolation::MaterialAlreadyCheckedOut { material_id: 3, .. })
        ));
        assert!(backend.stock_movements().is_empty());

        let report = api.checkout_single("P-1", 10, 100, 2).await.unwrap();
        assert_eq!(report.succeeded, vec![2]);
    }

    #[tokio::test]
    async fn test_scrap_reassignment_appends_note() {
        let (api, backend) = setup(true).await;
        let assignee = EmployeeAssignment {
            uid: "u2".to_string(),
            barcode: "B002".to_string(),
            name: "王五".to_string(),
        };
        let updated = api
            .update_scrap_assignment("P-1", 10, 100, 3, &assignee, "班长")
            .await
            .unwrap();
        let notes = updated.notes.unwrap();
        assert!(notes.starts_with(SCRAP_REUSE_MARKER));
        assert!(notes.contains("王五"));
        assert_eq!(backend.material(3).unwrap().checked_out_by_uid.as_deref(), Some("u2"));
        assert!(backend.stock_movements().is_empty());
        assert_eq!(backend.audit_entries()[0].action_type, ActionType::ScrapReassign);

        let err = api
            .update_scrap_assignment("P-1", 10, 100, 1, &assignee, "班长")
            .await
            .unwrap_err();
        assert_eq!(err.violation(), Some(&RuleViolation::NotScrapReuse(1)));
    }
}
