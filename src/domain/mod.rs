// ==========================================
// 工序跟踪系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、派生规则
// 红线: 不含网络访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod deduction;
pub mod item;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType, AuditEntry, AuditItem};
pub use deduction::{DeductionState, MaterialDeduction};
pub use item::{
    EmployeeAssignment, Item, Material, Phase, Subphase, SCRAP_REUSE_MARKER, UNASSIGNED_UID,
};
pub use types::{ItemStatus, MaterialStatus, PhaseRunState, Priority, SortKey};
