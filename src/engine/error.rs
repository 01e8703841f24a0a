// ==========================================
// 工序跟踪系统 - 引擎层规则违反
// ==========================================
// 所有规则违反均在本地拒绝，不发起网络请求、不改动状态
// ==========================================

use crate::domain::types::PhaseRunState;
use thiserror::Error;

/// 违反类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// 输入校验失败（数量越界、缺少员工）
    Validation,
    /// 前置条件不满足（工序状态、顺序门禁）
    Precondition,
}

/// 引擎层规则违反
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleViolation {
    // ===== 校验类 =====
    #[error("完成数量超出目标: 输入={requested}, 目标={expected}")]
    QuantityExceedsTarget { requested: i64, expected: i64 },

    #[error("完成数量不能为负数: {0}")]
    NegativeQuantity(i64),

    #[error("子工序尚未分配员工: subphase_id={0}")]
    EmployeeNotAssigned(i64),

    #[error("完成数量未达标: 当前={current}, 目标={expected}")]
    QuantityBelowTarget { current: i64, expected: i64 },

    // ===== 前置条件类 =====
    #[error("工序尚未开始，无法完成计时子工序")]
    PhaseNotStarted,

    #[error("工序已暂停，请先恢复计时")]
    PhasePaused,

    #[error("工序已结束，无法再完成计时子工序")]
    PhaseEnded,

    #[error("前序子工序未完成: subphase_id={0}")]
    PreviousSubphaseIncomplete(i64),

    #[error("后续子工序已完成，不能撤销: subphase_id={0}")]
    LaterSubphaseCompleted(i64),

    #[error("无效的状态转换: action={action}, from={from}")]
    InvalidTransition {
        action: &'static str,
        from: PhaseRunState,
    },

    #[error("前一工序尚未完成: phase_id={0}")]
    PreviousPhaseIncomplete(i64),

    #[error("子工序未全部完成，当前进度 {percent:.0}%")]
    SubphasesIncomplete { percent: f64 },

    // ===== 领料前置条件 =====
    #[error("领料前需先为子工序分配员工: subphase_id={0}")]
    CheckoutRequiresEmployee(i64),

    #[error("物料已被 {holder} 领用: material_id={material_id}")]
    MaterialAlreadyCheckedOut { material_id: i64, holder: String },

    #[error("物料已扣减过库存: material_id={0}")]
    DeductionAlreadyApplied(i64),

    #[error("废料复用物料不扣减库存: material_id={0}")]
    ScrapReuseNotDeductible(i64),

    #[error("物料不是废料复用来源: material_id={0}")]
    NotScrapReuse(i64),
}

impl RuleViolation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            RuleViolation::QuantityExceedsTarget { .. }
            | RuleViolation::NegativeQuantity(_)
            | RuleViolation::EmployeeNotAssigned(_)
            | RuleViolation::QuantityBelowTarget { .. } => ViolationKind::Validation,
            _ => ViolationKind::Precondition,
        }
    }
}

pub type RuleResult<T> = Result<T, RuleViolation>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_kind() {
        assert_eq!(
            RuleViolation::EmployeeNotAssigned(1).kind(),
            ViolationKind::Validation
        );
        assert_eq!(RuleViolation::PhasePaused.kind(), ViolationKind::Precondition);
        assert_eq!(
            RuleViolation::CheckoutRequiresEmployee(3).kind(),
            ViolationKind::Precondition
        );
        assert_eq!(
            RuleViolation::SubphasesIncomplete { percent: 50.0 }.kind(),
            ViolationKind::Precondition
        );
    }

    #[test]
    fn test_message_is_explicit() {
        let msg = RuleViolation::SubphasesIncomplete { percent: 66.6 }.to_string();
        assert!(msg.contains("67%"));
    }
}
