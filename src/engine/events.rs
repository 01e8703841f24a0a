// ==========================================
// 工序跟踪系统 - 刷新事件
// ==========================================
// 职责: 定义后端推送的刷新事件类型及去重
// 说明: 集合级事件 → 整体重载；件号级事件 → 单件号子树重新拉取
// 红线: 同一事件重复应用必须是空操作
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

// ==========================================
// 事件主题
// ==========================================

/// 订阅主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// 集合级变更（新建/删除/批量导入）
    Collection,
    /// 件号级变更（件号/工序/子工序更新、员工分配）
    Item,
}

impl Topic {
    pub fn as_str(&self) -> &str {
        match self {
            Topic::Collection => "operations:collection",
            Topic::Item => "operations:item",
        }
    }
}

// ==========================================
// 事件类型
// ==========================================

/// 刷新事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshEventKind {
    /// 件号创建
    ItemCreated,
    /// 件号删除
    ItemDeleted,
    /// 批量导入
    BulkImport,
    /// 件号更新
    ItemUpdated,
    /// 工序更新
    PhaseUpdated,
    /// 子工序更新
    SubphaseUpdated,
    /// 员工分配
    EmployeeAssigned,
}

impl RefreshEventKind {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            RefreshEventKind::ItemCreated => "item_created",
            RefreshEventKind::ItemDeleted => "item_deleted",
            RefreshEventKind::BulkImport => "bulk_import",
            RefreshEventKind::ItemUpdated => "item_updated",
            RefreshEventKind::PhaseUpdated => "phase_updated",
            RefreshEventKind::SubphaseUpdated => "subphase_updated",
            RefreshEventKind::EmployeeAssigned => "employee_assigned",
        }
    }

    /// 所属主题
    pub fn topic(&self) -> Topic {
        match self {
            RefreshEventKind::ItemCreated
            | RefreshEventKind::ItemDeleted
            | RefreshEventKind::BulkImport => Topic::Collection,
            _ => Topic::Item,
        }
    }
}

/// 刷新事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshEvent {
    /// 事件 ID（去重依据）
    pub event_id: String,
    /// 事件类型
    pub kind: RefreshEventKind,
    /// 相关件号（集合级事件可为空）
    pub part_number: Option<String>,
}

impl RefreshEvent {
    /// 创建集合级事件
    pub fn collection(kind: RefreshEventKind) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            kind,
            part_number: None,
        }
    }

    /// 创建件号级事件
    pub fn item(kind: RefreshEventKind, part_number: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            kind,
            part_number: Some(part_number.into()),
        }
    }

    /// 对账范围
    pub fn scope(&self) -> RefreshScope {
        match (self.kind.topic(), self.part_number.as_deref()) {
            (Topic::Item, Some(part)) => RefreshScope::Item(part.to_string()),
            // 件号级事件缺少件号时退化为集合重载
            _ => RefreshScope::Collection,
        }
    }
}

/// 对账范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    Collection,
    Item(String),
}

// ==========================================
// 事件去重
// ==========================================

/// 已应用事件记录（有界，超出容量时淘汰最早的）
#[derive(Debug)]
pub struct EventDeduplicator {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl EventDeduplicator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// 记录事件；首次出现返回 true，重复返回 false
    pub fn first_seen(&mut self, event_id: &str) -> bool {
        if self.seen.contains(event_id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(event_id.to_string());
        self.seen.insert(event_id.to_string());
        true
    }

    /// 撤销记录（对账失败后允许同一事件重试）
    pub fn forget(&mut self, event_id: &str) {
        if self.seen.remove(event_id) {
            self.order.retain(|id| id != event_id);
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_scope() {
        let e = RefreshEvent::collection(RefreshEventKind::BulkImport);
        assert_eq!(e.scope(), RefreshScope::Collection);

        let e = RefreshEvent::item(RefreshEventKind::SubphaseUpdated, "P-9");
        assert_eq!(e.scope(), RefreshScope::Item("P-9".to_string()));

        // 删除事件即便带件号也是集合级
        let e = RefreshEvent::item(RefreshEventKind::ItemDeleted, "P-9");
        assert_eq!(e.scope(), RefreshScope::Collection);
    }

    #[test]
    fn test_kind_topic() {
        assert_eq!(RefreshEventKind::ItemCreated.topic(), Topic::Collection);
        assert_eq!(RefreshEventKind::EmployeeAssigned.topic(), Topic::Item);
    }

    #[test]
    fn test_deduplicator_bounded() {
        let mut d = EventDeduplicator::new(2);
        assert!(d.first_seen("a"));
        assert!(!d.first_seen("a"));
        assert!(d.first_seen("b"));
        assert!(d.first_seen("c")); // 淘汰 a
        assert!(d.first_seen("a"));
        assert!(!d.first_seen("c"));
    }

    #[test]
    fn test_deduplicator_forget() {
        let mut d = EventDeduplicator::new(4);
        assert!(d.first_seen("a"));
        d.forget("a");
        assert!(d.first_seen("a"));
        d.forget("missing");
        assert!(!d.first_seen("a"));
    }

    #[test]
    fn test_event_serde() {
        let e = RefreshEvent::item(RefreshEventKind::PhaseUpdated, "P-1");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "phase_updated");
    }
}
