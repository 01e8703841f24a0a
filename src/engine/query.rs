// ==========================================
// 工序跟踪系统 - 筛选/排序/分页规则
// ==========================================
// 查询条件: 关键字、客户、优先级、状态（由子工序完成情况派生）、排序键
// 分页: 按页请求，提供 当前页/总页数/有无上下页 元数据
// ==========================================

use crate::domain::item::Item;
use crate::domain::types::{ItemStatus, Priority, SortKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ==========================================
// ItemQuery - 查询条件
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemQuery {
    /// 关键字（件号/名称/客户/备注，大小写不敏感）
    pub search: String,
    pub client: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<ItemStatus>,
    pub sort: SortKey,
}

impl ItemQuery {
    /// 判断件号是否满足筛选条件
    pub fn matches(&self, item: &Item) -> bool {
        let keyword = self.search.trim().to_lowercase();
        if !keyword.is_empty() {
            let hit = item.part_number.to_lowercase().contains(&keyword)
                || item.name.to_lowercase().contains(&keyword)
                || item
                    .client
                    .as_deref()
                    .map(|c| c.to_lowercase().contains(&keyword))
                    .unwrap_or(false)
                || item
                    .remarks
                    .as_deref()
                    .map(|r| r.to_lowercase().contains(&keyword))
                    .unwrap_or(false);
            if !hit {
                return false;
            }
        }

        if let Some(client) = self.client.as_deref().filter(|c| !c.trim().is_empty()) {
            let same = item
                .client
                .as_deref()
                .map(|c| c.trim().eq_ignore_ascii_case(client.trim()))
                .unwrap_or(false);
            if !same {
                return false;
            }
        }

        if let Some(priority) = self.priority {
            if item.priority != priority {
                return false;
            }
        }

        if let Some(status) = self.status {
            if item.status() != status {
                return false;
            }
        }

        true
    }

    /// 按排序键比较两个件号
    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        match self.sort {
            SortKey::NameAsc => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::NameDesc => b.name.to_lowercase().cmp(&a.name.to_lowercase()),
            SortKey::CreatedAsc => a.created_at.cmp(&b.created_at),
            SortKey::CreatedDesc => b.created_at.cmp(&a.created_at),
            // 优先级相同按创建时间倒序
            SortKey::Priority => a
                .priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| b.created_at.cmp(&a.created_at)),
        }
    }

    /// 筛选 + 排序
    pub fn apply<'a, I>(&self, items: I) -> Vec<Item>
    where
        I: IntoIterator<Item = &'a Item>,
    {
        let mut result: Vec<Item> = items.into_iter().filter(|i| self.matches(i)).cloned().collect();
        result.sort_by(|a, b| self.compare(a, b));
        result
    }
}

// ==========================================
// ItemPageRequest / ItemPage - 分页请求与结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPageRequest {
    pub page: u32, // 从 1 开始
    pub page_size: u32,
    pub query: ItemQuery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPage {
    pub items: Vec<Item>,
    pub total_items: u64,
    pub page: u32,
    pub page_size: u32,
}

impl ItemPage {
    /// 对已筛选排序的完整列表切出一页
    pub fn slice(sorted: Vec<Item>, page: u32, page_size: u32) -> Self {
        let size = page_size.max(1) as usize;
        let total = sorted.len();
        let start = (page.max(1) as usize - 1).saturating_mul(size);
        let items = if start >= total {
            Vec::new()
        } else {
            sorted.into_iter().skip(start).take(size).collect()
        };
        Self {
            items,
            total_items: total as u64,
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }
}

// ==========================================
// PageWindow - 分页导航元数据
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub page_size: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

/// 翻页动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNav {
    First,
    Previous,
    Next,
    Last,
    Page(u32),
}

impl PageWindow {
    pub fn new(current_page: u32, page_size: u32, total_items: u64) -> Self {
        let size = page_size.max(1) as u64;
        // 空结果也视为 1 页
        let total_pages = (((total_items + size - 1) / size).max(1)) as u32;
        let current_page = current_page.clamp(1, total_pages);
        Self {
            current_page,
            total_pages,
            total_items,
            page_size: size as u32,
            has_next: current_page < total_pages,
            has_previous: current_page > 1,
        }
    }

    pub fn from_page(page: &ItemPage) -> Self {
        Self::new(page.page, page.page_size, page.total_items)
    }

    /// 计算翻页目标页；无法翻页时返回 None
    pub fn target(&self, nav: PageNav) -> Option<u32> {
        let target = match nav {
            PageNav::First => 1,
            PageNav::Last => self.total_pages,
            PageNav::Previous if self.has_previous => self.current_page - 1,
            PageNav::Next if self.has_next => self.current_page + 1,
            PageNav::Previous | PageNav::Next => return None,
            PageNav::Page(p) if (1..=self.total_pages).contains(&p) => p,
            PageNav::Page(_) => return None,
        };
        (target != self.current_page).then_some(target)
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self::new(1, 10, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::{Phase, Subphase};
    use chrono::{Duration, TimeZone, Utc};

    fn item(part: &str, name: &str, client: &str, priority: Priority, day: i64, done: usize) -> Item {
        let subphases = (0..2)
            .map(|i| Subphase {
                id: i as i64,
                name: "S".to_string(),
                completed: i < done,
                completed_at: None,
                time_duration: 0,
                expected_duration: None,
                expected_quantity: 0,
                current_completed_quantity: 0,
                employee_uid: None,
                employee_barcode: None,
                employee_name: None,
                materials: vec![],
            })
            .collect();
        Item {
            part_number: part.to_string(),
            name: name.to_string(),
            client: Some(client.to_string()),
            priority,
            quantity: 1,
            remarks: None,
            start_time: None,
            end_time: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            phases: vec![Phase {
                id: 1,
                name: "P".to_string(),
                start_time: None,
                pause_time: None,
                end_time: None,
                paused_duration: 0,
                expected_hours: None,
                subphases,
            }],
        }
    }

    fn sample() -> Vec<Item> {
        vec![
            item("P-1", "Bracket", "Acme", Priority::Low, 1, 0),
            item("P-2", "axle", "Globex", Priority::High, 2, 1),
            item("P-3", "Cover", "acme", Priority::Medium, 3, 2),
        ]
    }

    #[test]
    fn test_filters() {
        let items = sample();

        let q = ItemQuery { client: Some("ACME".to_string()), ..Default::default() };
        assert_eq!(q.apply(&items).len(), 2);

        let q = ItemQuery { search: "AXL".to_string(), ..Default::default() };
        assert_eq!(q.apply(&items)[0].part_number, "P-2");

        let q = ItemQuery { status: Some(ItemStatus::Completed), ..Default::default() };
        assert_eq!(q.apply(&items)[0].part_number, "P-3");

        let q = ItemQuery { priority: Some(Priority::Low), ..Default::default() };
        assert_eq!(q.apply(&items)[0].part_number, "P-1");
    }

    #[test]
    fn test_sort_keys() {
        let items = sample();
        let names = |sort| {
            ItemQuery { sort, ..Default::default() }
                .apply(&items)
                .into_iter()
                .map(|i| i.part_number)
                .collect::<Vec<_>>()
        };

        assert_eq!(names(SortKey::NameAsc), vec!["P-2", "P-1", "P-3"]);
        assert_eq!(names(SortKey::NameDesc), vec!["P-3", "P-1", "P-2"]);
        assert_eq!(names(SortKey::CreatedAsc), vec!["P-1", "P-2", "P-3"]);
        assert_eq!(names(SortKey::CreatedDesc), vec!["P-3", "P-2", "P-1"]);
        assert_eq!(names(SortKey::Priority), vec!["P-2", "P-3", "P-1"]);
    }

    #[test]
    fn test_page_slice() {
        let page = ItemPage::slice(sample(), 2, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_items, 3);

        let empty = ItemPage::slice(sample(), 5, 2);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_page_window_navigation() {
        let w = PageWindow::new(1, 10, 35);
        assert_eq!(w.total_pages, 4);
        assert!(w.has_next);
        assert!(!w.has_previous);
        assert_eq!(w.target(PageNav::Next), Some(2));
        assert_eq!(w.target(PageNav::Previous), None);
        assert_eq!(w.target(PageNav::Last), Some(4));
        assert_eq!(w.target(PageNav::First), None);

        let last = PageWindow::new(4, 10, 35);
        assert!(!last.has_next);
        assert_eq!(last.target(PageNav::Previous), Some(3));
        assert_eq!(last.target(PageNav::Page(9)), None);
    }

    #[test]
    fn test_empty_result_is_single_page() {
        let w = PageWindow::new(3, 10, 0);
        assert_eq!(w.total_pages, 1);
        assert_eq!(w.current_page, 1);
        assert!(!w.has_next && !w.has_previous);
    }
}
