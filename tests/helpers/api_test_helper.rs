// ==========================================
// API集成测试辅助工具
// ==========================================
// 职责: 组装内存后端 + 临时 SQLite + 手动时钟的完整应用状态
// ==========================================

use std::sync::Arc;

use tempfile::TempDir;

use ops_checklist::app::{AppState, BackendServices};
use ops_checklist::backend::{Employee, InMemoryBackend, InventoryRecord, LocalNotificationHub};
use ops_checklist::config::ChecklistSettings;
use ops_checklist::domain::Item;
use ops_checklist::engine::ManualClock;

use super::test_data_builder::t0;

/// API测试环境
pub struct ApiTestEnv {
    pub db_path: String,
    pub backend: Arc<InMemoryBackend>,
    pub hub: LocalNotificationHub,
    pub clock: Arc<ManualClock>,
    pub state: Arc<AppState>,

    // 临时目录（确保生命周期）
    _temp_dir: TempDir,
}

impl ApiTestEnv {
    /// 创建新的API测试环境
    ///
    /// # 说明
    /// - 使用临时数据库文件（配置表 + 审计日志）
    /// - 内存后端变更会向默认房间广播刷新事件
    pub async fn new(items: Vec<Item>) -> Result<Self, String> {
        let temp_dir = tempfile::tempdir().map_err(|e| format!("创建临时目录失败: {}", e))?;
        let db_path = temp_dir.path().join("checklist.db").to_string_lossy().to_string();

        let hub = LocalNotificationHub::new();
        let room = ChecklistSettings::default().notification_room;
        let backend = Arc::new(InMemoryBackend::new().with_notifications(hub.clone(), room));
        for item in items {
            backend.seed_item(item).map_err(|e| e.to_string())?;
        }

        let clock = Arc::new(ManualClock::new(t0()));
        let services = BackendServices::in_memory(backend.clone(), hub.clone());
        let state = AppState::new(db_path.clone(), services, clock.clone()).await?;

        Ok(Self {
            db_path,
            backend,
            hub,
            clock,
            state: Arc::new(state),
            _temp_dir: temp_dir,
        })
    }

    /// 写入库存条目
    pub fn stock(&self, id: &str, name: &str, balance: f64) {
        self.backend
            .seed_inventory(InventoryRecord {
                id: id.to_string(),
                name: name.to_string(),
                item_type: None,
                balance,
                unit: Some("pcs".to_string()),
            })
            .expect("写入库存失败");
    }

    /// 写入员工档案
    pub fn employee(&self, uid: &str, barcode: &str, name: &str) {
        self.backend
            .seed_employee(Employee {
                uid: uid.to_string(),
                username: uid.to_lowercase(),
                id_number: None,
                id_barcode: Some(barcode.to_string()),
                display_name: Some(name.to_string()),
            })
            .expect("写入员工失败");
    }

    /// 当前内存件号仓中的件号快照
    pub fn local_item(&self, part_number: &str) -> Option<Item> {
        self.state.store.lock().unwrap().item(part_number).cloned()
    }
}
