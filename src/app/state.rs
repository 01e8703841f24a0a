// ==========================================
// 工序跟踪系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{new_shared_store, ChecklistApi, CheckoutApi, ItemQueryApi, SharedStore};
use crate::backend::identity::IdentityService;
use crate::backend::in_memory::InMemoryBackend;
use crate::backend::inventory::InventoryService;
use crate::backend::materials::MaterialsService;
use crate::backend::notification::{LocalNotificationHub, NotificationChannel};
use crate::backend::operations::OperationsService;
use crate::config::{ChecklistSettings, ConfigManager};
use crate::db::open_sqlite_connection;
use crate::engine::clock::Clock;
use crate::repository::{ActionLogRepository, MaterialDeductionRepository};

/// 后端协作服务集合
#[derive(Clone)]
pub struct BackendServices {
    pub operations: Arc<dyn OperationsService>,
    pub materials: Arc<dyn MaterialsService>,
    pub inventory: Arc<dyn InventoryService>,
    pub identity: Arc<dyn IdentityService>,
    pub notifications: Arc<dyn NotificationChannel>,
}

impl BackendServices {
    /// 全部由内存后端提供（演示、测试）
    pub fn in_memory(backend: Arc<InMemoryBackend>, hub: LocalNotificationHub) -> Self {
        Self {
            operations: backend.clone(),
            materials: backend.clone(),
            inventory: backend.clone(),
            identity: backend,
            notifications: Arc::new(hub),
        }
    }
}

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 启动时加载的配置
    pub settings: ChecklistSettings,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 审计日志仓储（领料/责任人变更留痕）
    pub action_log_repo: Arc<ActionLogRepository>,

    /// 库存扣减台账（至多一次扣减，跨重启）
    pub deduction_repo: Arc<MaterialDeductionRepository>,

    /// 内存件号仓（当前页）
    pub store: SharedStore,

    /// 件号查询API
    pub item_query_api: Arc<ItemQueryApi>,

    /// 工序清单API
    pub checklist_api: Arc<ChecklistApi>,

    /// 领料出库API
    pub checkout_api: Arc<CheckoutApi>,

    /// 通知通道
    pub notifications: Arc<dyn NotificationChannel>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并初始化表结构
    /// 2. 加载配置并设置界面语言
    /// 3. 创建所有API实例
    pub async fn new(
        db_path: String,
        services: BackendServices,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // 创建数据库连接（共享连接）
        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let settings = ChecklistSettings::load(config_manager.as_ref())
            .await
            .map_err(|e| format!("配置加载失败: {}", e))?;
        let locale = crate::i18n::set_locale(&settings.locale);
        tracing::info!(
            page_size = settings.page_size,
            room = %settings.notification_room,
            locale,
            "配置已加载"
        );

        let deduction_repo = Arc::new(MaterialDeductionRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn));
        let store = new_shared_store();

        let item_query_api = Arc::new(ItemQueryApi::new(
            store.clone(),
            services.operations.clone(),
            services.materials.clone(),
            settings.page_size,
        ));
        let checklist_api = Arc::new(ChecklistApi::new(
            store.clone(),
            services.operations.clone(),
            services.materials.clone(),
            services.identity.clone(),
            clock.clone(),
            item_query_api.clone(),
            settings.event_dedup_capacity,
        ));
        let checkout_api = Arc::new(CheckoutApi::new(
            store.clone(),
            services.materials.clone(),
            services.inventory.clone(),
            action_log_repo.clone(),
            deduction_repo.clone(),
            clock,
        ));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            settings,
            config_manager,
            action_log_repo,
            deduction_repo,
            store,
            item_query_api,
            checklist_api,
            checkout_api,
            notifications: services.notifications,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 OPS_CHECKLIST_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("OPS_CHECKLIST_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./ops_checklist.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("ops-checklist-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("ops-checklist");
        }

        // 确保目录存在
        std::fs::create_dir_all(&path).ok();
        path = path.join("ops_checklist.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_keys;
    use crate::engine::clock::SystemClock;

    #[tokio::test]
    async fn test_app_state_reads_page_size_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db").to_string_lossy().to_string();
        {
            let manager = ConfigManager::new(&db_path).unwrap();
            manager.set_config_value(config_keys::PAGE_SIZE, "25").unwrap();
        }

        let backend = Arc::new(InMemoryBackend::new());
        let services = BackendServices::in_memory(backend, LocalNotificationHub::new());
        let state = AppState::new(db_path, services, Arc::new(SystemClock)).await.unwrap();

        assert_eq!(state.settings.page_size, 25);
        assert_eq!(state.item_query_api.window().unwrap().page_size, 25);
    }
}
