// ==========================================
// 工序跟踪系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::checklist_config_trait::{ChecklistConfigReader, ConfigError};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
            crate::db::ensure_schema(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.get_config_value(key)
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 写入 global scope 配置（UPSERT）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = key.trim();
        if key.is_empty() {
            return Err("配置键不能为空".into());
        }
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式，键有序）
    pub fn get_config_snapshot(&self) -> Result<String, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key"
        )?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

#[async_trait]
impl ChecklistConfigReader for ConfigManager {
    async fn get_page_size(&self) -> Result<u32, ConfigError> {
        let value = self.get_config_or_default(config_keys::PAGE_SIZE, "10")?;
        Ok(value.trim().parse::<u32>().ok().filter(|&n| n > 0).unwrap_or(10))
    }

    async fn get_tick_interval_ms(&self) -> Result<u64, ConfigError> {
        let value = self.get_config_or_default(config_keys::TICK_INTERVAL_MS, "1000")?;
        Ok(value.trim().parse::<u64>().ok().filter(|&n| n > 0).unwrap_or(1_000))
    }

    async fn get_notification_room(&self) -> Result<String, ConfigError> {
        let value = self.get_config_or_default(config_keys::NOTIFICATION_ROOM, "operations")?;
        let value = value.trim();
        if value.is_empty() {
            Ok("operations".to_string())
        } else {
            Ok(value.to_string())
        }
    }

    async fn get_event_dedup_capacity(&self) -> Result<usize, ConfigError> {
        let value = self.get_config_or_default(config_keys::EVENT_DEDUP_CAPACITY, "256")?;
        Ok(value.trim().parse::<usize>().ok().filter(|&n| n > 0).unwrap_or(256))
    }

    async fn get_locale(&self) -> Result<String, ConfigError> {
        let value = self.get_config_or_default(config_keys::LOCALE, crate::i18n::DEFAULT_LOCALE)?;
        Ok(crate::i18n::normalize_locale(&value).to_string())
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 分页
    pub const PAGE_SIZE: &str = "checklist.page_size";

    // 计时显示
    pub const TICK_INTERVAL_MS: &str = "checklist.tick_interval_ms";

    // 通知
    pub const NOTIFICATION_ROOM: &str = "checklist.notification_room";
    pub const EVENT_DEDUP_CAPACITY: &str = "checklist.event_dedup_capacity";

    // 界面
    pub const LOCALE: &str = "checklist.locale";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::checklist_config_trait::ChecklistSettings;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let cm = manager();
        let settings = ChecklistSettings::load(&cm).await.unwrap();
        assert_eq!(settings, ChecklistSettings::default());
    }

    #[tokio::test]
    async fn test_override_and_invalid_values() {
        let cm = manager();
        cm.set_config_value(config_keys::PAGE_SIZE, "20").unwrap();
        cm.set_config_value(config_keys::TICK_INTERVAL_MS, "abc").unwrap();
        cm.set_config_value(config_keys::EVENT_DEDUP_CAPACITY, "0").unwrap();
        cm.set_config_value(config_keys::LOCALE, "en-US").unwrap();

        assert_eq!(cm.get_page_size().await.unwrap(), 20);
        assert_eq!(cm.get_tick_interval_ms().await.unwrap(), 1_000);
        assert_eq!(cm.get_event_dedup_capacity().await.unwrap(), 256);
        assert_eq!(cm.get_locale().await.unwrap(), "en");
    }

    #[test]
    fn test_snapshot_is_sorted_json() {
        let cm = manager();
        cm.set_config_value(config_keys::PAGE_SIZE, "15").unwrap();
        cm.set_config_value(config_keys::LOCALE, "zh-CN").unwrap();
        cm.set_config_value(config_keys::PAGE_SIZE, "30").unwrap();

        let snapshot: BTreeMap<String, String> =
            serde_json::from_str(&cm.get_config_snapshot().unwrap()).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[config_keys::PAGE_SIZE], "30");
        assert!(cm.set_config_value("  ", "x").is_err());
    }
}
