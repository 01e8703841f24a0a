// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use chrono::{DateTime, TimeZone, Utc};
use ops_checklist::domain::{Item, Material, MaterialStatus, Phase, Priority, Subphase};

/// 测试基准时间 2025-03-01 08:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
}

// ==========================================
// Item 构建器
// ==========================================

pub struct ItemBuilder {
    item: Item,
}

impl ItemBuilder {
    pub fn new(part_number: &str) -> Self {
        Self {
            item: Item {
                part_number: part_number.to_string(),
                name: format!("件号{}", part_number),
                client: None,
                priority: Priority::Medium,
                quantity: 1,
                remarks: None,
                start_time: None,
                end_time: None,
                created_at: t0(),
                phases: Vec::new(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.item.name = name.to_string();
        self
    }

    pub fn client(mut self, client: &str) -> Self {
        self.item.client = Some(client.to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.item.priority = priority;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.item.created_at = at;
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.item.phases.push(phase);
        self
    }

    pub fn build(self) -> Item {
        self.item
    }
}

// ==========================================
// Phase 构建器
// ==========================================

pub struct PhaseBuilder {
    phase: Phase,
}

impl PhaseBuilder {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            phase: Phase {
                id,
                name: name.to_string(),
                start_time: None,
                pause_time: None,
                end_time: None,
                paused_duration: 0,
                expected_hours: None,
                subphases: Vec::new(),
            },
        }
    }

    pub fn subphase(mut self, subphase: Subphase) -> Self {
        self.phase.subphases.push(subphase);
        self
    }

    pub fn build(self) -> Phase {
        self.phase
    }
}

// ==========================================
// Subphase 构建器
// ==========================================

pub struct SubphaseBuilder {
    subphase: Subphase,
}

impl SubphaseBuilder {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            subphase: Subphase {
                id,
                name: name.to_string(),
                completed: false,
                completed_at: None,
                time_duration: 0,
                expected_duration: None,
                expected_quantity: 0,
                current_completed_quantity: 0,
                employee_uid: None,
                employee_barcode: None,
                employee_name: None,
                materials: Vec::new(),
            },
        }
    }

    /// 分配员工（uid / 条码 / 姓名）
    pub fn employee(mut self, uid: &str, barcode: &str, name: &str) -> Self {
        self.subphase.employee_uid = Some(uid.to_string());
        self.subphase.employee_barcode = Some(barcode.to_string());
        self.subphase.employee_name = Some(name.to_string());
        self
    }

    pub fn target_quantity(mut self, quantity: i64) -> Self {
        self.subphase.expected_quantity = quantity;
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.subphase.materials.push(material);
        self
    }

    pub fn build(self) -> Subphase {
        self.subphase
    }
}

// ==========================================
// Material 构建器
// ==========================================

pub struct MaterialBuilder {
    material: Material,
}

impl MaterialBuilder {
    pub fn new(id: i64, name: &str, quantity: f64) -> Self {
        Self {
            material: Material {
                id,
                material_name: name.to_string(),
                material_quantity: quantity,
                unit_of_measure: Some("pcs".to_string()),
                status: MaterialStatus::InUse,
                checked_out_by: None,
                checked_out_by_uid: None,
                checked_out_by_name: None,
                checkout_date: None,
                notes: None,
            },
        }
    }

    pub fn checked_out_to(mut self, uid: &str, name: &str) -> Self {
        self.material.checked_out_by_uid = Some(uid.to_string());
        self.material.checked_out_by_name = Some(name.to_string());
        self.material.status = MaterialStatus::CheckedOut;
        self
    }

    pub fn notes(mut self, notes: &str) -> Self {
        self.material.notes = Some(notes.to_string());
        self
    }

    pub fn build(self) -> Material {
        self.material
    }
}
