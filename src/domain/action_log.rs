// ==========================================
// 工序跟踪系统 - 审计日志领域模型
// ==========================================
// 红线: 每次领料 / 责任人变更都必须留痕
// 对齐: action_log 表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// AuditEntry - 审计日志写入请求
// ==========================================
// 对应审计服务的 createEntry(actor, details, purpose, structuredItems)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action_type: ActionType,
    pub actor: String,             // 操作人
    pub details: String,           // 可读描述（多个物料合并为一句）
    pub purpose: String,           // 用途说明
    pub part_number: Option<String>,
    pub items: Vec<AuditItem>,     // 结构化明细
}

// ==========================================
// AuditItem - 审计明细（每个物料一行）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditItem {
    pub material_id: i64,
    pub material_name: String,
    pub quantity: f64,
    pub unit_of_measure: String,
    pub inventory_item_id: Option<String>,
}

// ==========================================
// ActionLog - 已落库的审计日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub action_type: String,       // 存储为字符串
    pub action_ts: NaiveDateTime,
    pub actor: String,
    pub purpose: String,
    pub part_number: Option<String>,
    pub payload_json: Option<JsonValue>, // 结构化明细 (JSON)
    pub detail: Option<String>,
}

// ==========================================
// ActionType - 审计操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    MaterialCheckout, // 领料出库
    ScrapReassign,    // 废料复用责任人变更
}

impl ActionType {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::MaterialCheckout => "MaterialCheckout",
            ActionType::ScrapReassign => "ScrapReassign",
        }
    }

    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "MaterialCheckout" => Some(ActionType::MaterialCheckout),
            "ScrapReassign" => Some(ActionType::ScrapReassign),
            _ => None,
        }
    }
}

impl ActionLog {
    /// 由写入请求生成落库记录
    pub fn from_entry(action_id: String, entry: &AuditEntry) -> Self {
        Self {
            action_id,
            action_type: entry.action_type.as_str().to_string(),
            action_ts: chrono::Utc::now().naive_utc(),
            actor: entry.actor.clone(),
            purpose: entry.purpose.clone(),
            part_number: entry.part_number.clone(),
            payload_json: serde_json::to_value(&entry.items).ok(),
            detail: Some(entry.details.clone()),
        }
    }
}
