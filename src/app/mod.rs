// ==========================================
// 工序跟踪系统 - 应用层
// ==========================================
// 职责: 组装后端服务、配置、仓储与 API，管理视图会话生命周期
// ==========================================

pub mod session;
pub mod state;

// 重导出
pub use session::{ChecklistSession, SyncSummary};
pub use state::{get_default_db_path, AppState, BackendServices};
