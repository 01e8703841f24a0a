// ==========================================
// 工序跟踪系统 - 审计日志数据仓储
// ==========================================
// 对齐: db.rs 中的 action_log 表
// 红线: 每次领料 / 责任人变更都必须落库
// ==========================================

mod core;
mod queries;


pub use core::ActionLogRepository;
