// ==========================================
// 工序跟踪系统 - API 层
// ==========================================
// 职责: 乐观更新命令、对账、领料出库、分页查询
// 红线: 持有件号仓锁期间不发起后端请求
// ==========================================

pub mod checklist_api;
pub mod checkout_api;
pub mod error;
pub mod item_query_api;
pub mod reconcile;

// 重导出核心类型
pub use checklist_api::{ChecklistApi, CommandOutcome, Confirmation, EventApplication, FollowUp};
pub use checkout_api::{
    CheckoutApi, CheckoutFailure, CheckoutOutcome, CheckoutPlan, CheckoutReport, CheckoutTarget,
};
pub use error::{ApiError, ApiResult};
pub use item_query_api::ItemQueryApi;
pub use reconcile::{fetch_item_tree, hydrate_materials, lock_store, new_shared_store, SharedStore};
