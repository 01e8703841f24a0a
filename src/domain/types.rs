// ==========================================
// 工序跟踪系统 - 领域类型定义
// ==========================================
// 职责: 优先级、工序运行状态、件号状态、物料状态
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 优先级 (Priority)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// 排序权重（数值越小越靠前）
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    /// 宽松解析（大小写不敏感），未知值返回 None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 工序运行状态 (Phase Run State)
// ==========================================
// 由 start_time / pause_time / end_time 派生，不单独存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseRunState {
    Idle,      // 未开始
    Running,   // 计时中
    Paused,    // 已暂停
    Completed, // 已结束
}

impl fmt::Display for PhaseRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseRunState::Idle => write!(f, "IDLE"),
            PhaseRunState::Running => write!(f, "RUNNING"),
            PhaseRunState::Paused => write!(f, "PAUSED"),
            PhaseRunState::Completed => write!(f, "COMPLETED"),
        }
    }
}

// ==========================================
// 件号状态 (Item Status)
// ==========================================
// 由全部子工序的完成情况汇总得出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::NotStarted => "not_started",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 物料状态 (Material Status)
// ==========================================
// 序列化格式与后端一致: checked_out / in_use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialStatus {
    CheckedOut,
    InUse,
}

impl Default for MaterialStatus {
    fn default() -> Self {
        MaterialStatus::InUse
    }
}

impl fmt::Display for MaterialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialStatus::CheckedOut => write!(f, "checked_out"),
            MaterialStatus::InUse => write!(f, "in_use"),
        }
    }
}

// ==========================================
// 排序键 (Sort Key)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    NameAsc,
    NameDesc,
    CreatedAsc,
    CreatedDesc,
    Priority,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::CreatedDesc
    }
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::NameAsc => "name_asc",
            SortKey::NameDesc => "name_desc",
            SortKey::CreatedAsc => "created_asc",
            SortKey::CreatedDesc => "created_desc",
            SortKey::Priority => "priority",
        }
    }
}
