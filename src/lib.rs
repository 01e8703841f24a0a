// ==========================================
// 工序跟踪系统 - 核心库
// ==========================================
// 范围: 工序计时、子工序完成、乐观更新与对账、领料出库、筛选分页
// 技术栈: Rust + tokio + SQLite
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 引擎层 - 业务规则（纯内存）
pub mod engine;

// 后端协作服务 - 接口与内存实现
pub mod backend;

// 数据仓储层 - 审计日志
pub mod repository;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 乐观更新、领料、查询
pub mod api;

// 应用层 - 状态组装与会话
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体
pub use domain::{
    ActionLog, ActionType, AuditEntry, DeductionState, EmployeeAssignment, Item, ItemStatus, Material,
    MaterialStatus, Phase, PhaseRunState, Priority, SortKey, Subphase,
};

// 引擎
pub use engine::{
    ItemQuery, ItemStore, PageNav, PageWindow, PhaseTimer, RefreshEvent,
    RefreshEventKind, RuleViolation, SubphaseCompletionEngine,
};

// API
pub use api::{ApiError, ApiResult, ChecklistApi, CheckoutApi, ItemQueryApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "运营检查表";
