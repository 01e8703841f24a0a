// ==========================================
// 工序跟踪系统 - 后端协作方接口层
// ==========================================
// 职责: 定义工序操作/物料/库存/员工/审计/通知 六类协作方
// 说明: 传输方式不在本层范围内，API 层只依赖这里的 trait
// ==========================================

pub mod audit_log;
pub mod error;
pub mod identity;
pub mod in_memory;
pub mod inventory;
pub mod materials;
pub mod notification;
pub mod operations;

// 重导出
pub use audit_log::AuditLogService;
pub use error::{BackendError, BackendResult};
pub use identity::{Employee, IdentityService};
pub use in_memory::{BackendOp, InMemoryBackend, MaterialsResponseShape, StockMovement};
pub use inventory::{InventoryRecord, InventoryService};
pub use materials::{decode_materials_response, MaterialUpdate, MaterialsService};
pub use notification::{LocalNotificationHub, NotificationChannel, Subscription};
pub use operations::{OperationsService, SubphaseCompletionRequest};
