// ==========================================
// 工序跟踪系统 - 库存扣减记录
// ==========================================
// 红线: 同一物料的库存扣减至多一次（跨进程重启）
// 流程: Claimed（扣减前落库）→ Deducted（扣减成功）；扣减失败删除 Claimed 记录
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 扣减状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeductionState {
    /// 扣减进行中（或进程在扣减途中退出，需人工核对）
    Claimed,
    /// 已扣减
    Deducted,
}

impl DeductionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeductionState::Claimed => "claimed",
            DeductionState::Deducted => "deducted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "claimed" => Some(DeductionState::Claimed),
            "deducted" => Some(DeductionState::Deducted),
            _ => None,
        }
    }
}

impl fmt::Display for DeductionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 物料扣减记录（material_deduction 表一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDeduction {
    pub material_id: i64,
    pub part_number: String,
    pub subphase_id: i64,
    pub quantity: f64,
    pub actor: String,
    pub state: DeductionState,
    /// 扣减成功后填写
    pub inventory_item_id: Option<String>,
    pub claimed_at: NaiveDateTime,
    pub deducted_at: Option<NaiveDateTime>,
}
