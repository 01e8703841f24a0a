// ==========================================
// 工序跟踪系统 - 件号/工序/子工序/物料 领域模型
// ==========================================
// 所有权: Item 独占 Phase, Phase 独占 Subphase, Subphase 独占 Material
// 红线: 领域层只做派生计算,不含网络调用
// ==========================================

use crate::domain::types::{ItemStatus, MaterialStatus, PhaseRunState, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// "尚未领用到人" 的占位 uid
pub const UNASSIGNED_UID: &str = "UNASSIGNED";

/// 废料复用来源标记（写在 notes 中）
pub const SCRAP_REUSE_MARKER: &str = "[SCRAP_REUSE]";

// ==========================================
// Item - 件号
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub part_number: String, // 唯一键
    pub name: String,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub phases: Vec<Phase>,
}

impl Item {
    /// 按 id 查找工序下标
    pub fn phase_index(&self, phase_id: i64) -> Option<usize> {
        self.phases.iter().position(|p| p.id == phase_id)
    }

    /// 汇总全部子工序完成情况得出件号状态
    pub fn status(&self) -> ItemStatus {
        let (done, total) = self.phases.iter().fold((0usize, 0usize), |(d, t), p| {
            (
                d + p.subphases.iter().filter(|s| s.completed).count(),
                t + p.subphases.len(),
            )
        });

        if total == 0 || done == 0 {
            ItemStatus::NotStarted
        } else if done == total {
            ItemStatus::Completed
        } else {
            ItemStatus::InProgress
        }
    }

    /// 整体完成百分比（0-100）
    pub fn completion_percent(&self) -> f64 {
        let total: usize = self.phases.iter().map(|p| p.subphases.len()).sum();
        if total == 0 {
            return 0.0;
        }
        let done: usize = self
            .phases
            .iter()
            .map(|p| p.subphases.iter().filter(|s| s.completed).count())
            .sum();
        done as f64 * 100.0 / total as f64
    }
}

// ==========================================
// Phase - 工序
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pause_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused_duration: i64, // 累计暂停秒数
    #[serde(default)]
    pub expected_hours: Option<f64>,
    #[serde(default)]
    pub subphases: Vec<Subphase>,
}

impl Phase {
    /// 由时间戳派生运行状态
    pub fn run_state(&self) -> PhaseRunState {
        if self.end_time.is_some() {
            PhaseRunState::Completed
        } else if self.start_time.is_none() {
            PhaseRunState::Idle
        } else if self.pause_time.is_some() {
            PhaseRunState::Paused
        } else {
            PhaseRunState::Running
        }
    }

    /// 是否启用计时（已经开始过）
    pub fn has_time_tracking(&self) -> bool {
        self.start_time.is_some()
    }

    /// 子工序完成百分比（无子工序时为 0）
    pub fn completion_percent(&self) -> f64 {
        if self.subphases.is_empty() {
            return 0.0;
        }
        let done = self.subphases.iter().filter(|s| s.completed).count();
        done as f64 * 100.0 / self.subphases.len() as f64
    }

    /// 子工序是否 100% 完成
    pub fn is_fully_complete(&self) -> bool {
        !self.subphases.is_empty() && self.subphases.iter().all(|s| s.completed)
    }

    pub fn subphase_index(&self, subphase_id: i64) -> Option<usize> {
        self.subphases.iter().position(|s| s.id == subphase_id)
    }
}

// ==========================================
// Subphase - 子工序
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subphase {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_duration: i64, // 分钟，仅完成时写入
    #[serde(default)]
    pub expected_duration: Option<f64>,
    #[serde(default)]
    pub expected_quantity: i64, // 0 表示按时间计
    #[serde(default)]
    pub current_completed_quantity: i64,
    #[serde(default)]
    pub employee_uid: Option<String>,
    #[serde(default)]
    pub employee_barcode: Option<String>,
    #[serde(default)]
    pub employee_name: Option<String>,
    #[serde(default)]
    pub materials: Vec<Material>,
}

impl Subphase {
    pub fn is_quantity_based(&self) -> bool {
        self.expected_quantity > 0
    }

    /// 已分配员工（uid 非空即视为已分配）
    pub fn assigned_employee(&self) -> Option<EmployeeAssignment> {
        let uid = self.employee_uid.as_deref().map(str::trim).unwrap_or("");
        if uid.is_empty() {
            return None;
        }
        Some(EmployeeAssignment {
            uid: uid.to_string(),
            barcode: self.employee_barcode.clone().unwrap_or_default(),
            name: self.employee_name.clone().unwrap_or_default(),
        })
    }

    pub fn assign(&mut self, employee: &EmployeeAssignment) {
        self.employee_uid = Some(employee.uid.clone());
        self.employee_barcode = Some(employee.barcode.clone());
        self.employee_name = Some(employee.name.clone());
    }

    /// 撤销完成（时长与完成时间一并清除）
    pub fn revoke_completion(&mut self) {
        self.completed = false;
        self.completed_at = None;
        self.time_duration = 0;
    }
}

// ==========================================
// EmployeeAssignment - 子工序责任人
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeAssignment {
    pub uid: String,
    pub barcode: String,
    pub name: String,
}

impl EmployeeAssignment {
    /// 领料要求 uid、条码、姓名齐全
    pub fn is_complete(&self) -> bool {
        !self.uid.trim().is_empty() && !self.barcode.trim().is_empty() && !self.name.trim().is_empty()
    }
}

// ==========================================
// Material - 物料
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: i64,
    pub material_name: String,
    #[serde(default)]
    pub material_quantity: f64,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
    #[serde(default)]
    pub status: MaterialStatus,
    #[serde(default)]
    pub checked_out_by: Option<String>,
    #[serde(default)]
    pub checked_out_by_uid: Option<String>,
    #[serde(default)]
    pub checked_out_by_name: Option<String>,
    #[serde(default)]
    pub checkout_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Material {
    /// 是否已真正领用到某个员工（占位 uid 不算）
    pub fn is_checked_out_to_person(&self) -> bool {
        match self.checked_out_by_uid.as_deref().map(str::trim) {
            Some(uid) => !uid.is_empty() && uid != UNASSIGNED_UID,
            None => false,
        }
    }

    /// 是否为废料复用物料
    pub fn is_scrap_reuse(&self) -> bool {
        self.notes
            .as_deref()
            .map(|n| n.contains(SCRAP_REUSE_MARKER))
            .unwrap_or(false)
    }

    pub fn unit(&self) -> &str {
        self.unit_of_measure.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap() + chrono::Duration::minutes(min)
    }

    fn subphase(id: i64, completed: bool) -> Subphase {
        Subphase {
            id,
            name: format!("S{}", id),
            completed,
            completed_at: None,
            time_duration: 0,
            expected_duration: None,
            expected_quantity: 0,
            current_completed_quantity: 0,
            employee_uid: None,
            employee_barcode: None,
            employee_name: None,
            materials: vec![],
        }
    }

    fn phase(subphases: Vec<Subphase>) -> Phase {
        Phase {
            id: 1,
            name: "切割".to_string(),
            start_time: None,
            pause_time: None,
            end_time: None,
            paused_duration: 0,
            expected_hours: None,
            subphases,
        }
    }

    #[test]
    fn test_run_state_derivation() {
        let mut p = phase(vec![]);
        assert_eq!(p.run_state(), PhaseRunState::Idle);

        p.start_time = Some(ts(0));
        assert_eq!(p.run_state(), PhaseRunState::Running);

        p.pause_time = Some(ts(10));
        assert_eq!(p.run_state(), PhaseRunState::Paused);

        p.end_time = Some(ts(20));
        assert_eq!(p.run_state(), PhaseRunState::Completed);
    }

    #[test]
    fn test_completion_percent() {
        let p = phase(vec![subphase(1, true), subphase(2, false)]);
        assert_eq!(p.completion_percent(), 50.0);
        assert!(!p.is_fully_complete());

        let empty = phase(vec![]);
        assert_eq!(empty.completion_percent(), 0.0);
        assert!(!empty.is_fully_complete());
    }

    #[test]
    fn test_item_status() {
        let mut item = Item {
            part_number: "P-001".to_string(),
            name: "支架".to_string(),
            client: None,
            priority: Priority::High,
            quantity: 5,
            remarks: None,
            start_time: None,
            end_time: None,
            created_at: ts(0),
            phases: vec![phase(vec![subphase(1, false), subphase(2, false)])],
        };
        assert_eq!(item.status(), ItemStatus::NotStarted);

        item.phases[0].subphases[0].completed = true;
        assert_eq!(item.status(), ItemStatus::InProgress);

        item.phases[0].subphases[1].completed = true;
        assert_eq!(item.status(), ItemStatus::Completed);
    }

    #[test]
    fn test_material_checked_out_to_person() {
        let mut m = Material {
            id: 1,
            material_name: "钢板".to_string(),
            material_quantity: 2.0,
            unit_of_measure: Some("pcs".to_string()),
            status: MaterialStatus::InUse,
            checked_out_by: None,
            checked_out_by_uid: None,
            checked_out_by_name: None,
            checkout_date: None,
            notes: None,
        };
        assert!(!m.is_checked_out_to_person());

        m.checked_out_by_uid = Some(UNASSIGNED_UID.to_string());
        assert!(!m.is_checked_out_to_person());

        m.checked_out_by_uid = Some("u-42".to_string());
        assert!(m.is_checked_out_to_person());
    }

    #[test]
    fn test_scrap_reuse_marker() {
        let m: Material = serde_json::from_value(serde_json::json!({
            "id": 7,
            "material_name": "边角料",
            "notes": "来自 P-009 [SCRAP_REUSE]"
        }))
        .unwrap();
        assert!(m.is_scrap_reuse());
        assert_eq!(m.status, MaterialStatus::InUse);
    }

    #[test]
    fn test_assigned_employee_requires_uid() {
        let mut s = subphase(1, false);
        assert!(s.assigned_employee().is_none());

        s.employee_uid = Some("  ".to_string());
        assert!(s.assigned_employee().is_none());

        s.assign(&EmployeeAssignment {
            uid: "u-1".to_string(),
            barcode: "B001".to_string(),
            name: "张三".to_string(),
        });
        let emp = s.assigned_employee().unwrap();
        assert!(emp.is_complete());
    }
}
