// ==========================================
// 工序跟踪系统 - 配置层
// ==========================================
// 职责: 系统配置管理
// 存储: config_kv 表
// ==========================================

pub mod checklist_config_trait;
pub mod config_manager;

// 重导出核心配置管理器
pub use checklist_config_trait::{ChecklistConfigReader, ChecklistSettings, ConfigError};
pub use config_manager::{config_keys, ConfigManager};
