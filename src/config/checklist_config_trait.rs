// ==========================================
// 工序跟踪系统 - 清单配置读取 Trait
// ==========================================
// 职责: 定义清单会话所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;

pub type ConfigError = Box<dyn Error + Send + Sync>;

// ==========================================
// ChecklistConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ChecklistConfigReader: Send + Sync {
    /// 每页件号数
    ///
    /// # 默认值
    /// - 10
    async fn get_page_size(&self) -> Result<u32, ConfigError>;

    /// 计时显示刷新周期（毫秒）
    ///
    /// # 默认值
    /// - 1000
    async fn get_tick_interval_ms(&self) -> Result<u64, ConfigError>;

    /// 通知房间名
    ///
    /// # 默认值
    /// - "operations"
    async fn get_notification_room(&self) -> Result<String, ConfigError>;

    /// 事件去重记录容量
    ///
    /// # 默认值
    /// - 256
    async fn get_event_dedup_capacity(&self) -> Result<usize, ConfigError>;

    /// 界面语言
    ///
    /// # 默认值
    /// - "zh-CN"
    async fn get_locale(&self) -> Result<String, ConfigError>;
}

/// 会话启动时读取的一组配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistSettings {
    pub page_size: u32,
    pub tick_interval_ms: u64,
    pub notification_room: String,
    pub event_dedup_capacity: usize,
    pub locale: String,
}

impl Default for ChecklistSettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            tick_interval_ms: 1_000,
            notification_room: "operations".to_string(),
            event_dedup_capacity: 256,
            locale: "zh-CN".to_string(),
        }
    }
}

impl ChecklistSettings {
    /// 一次性读取全部配置
    pub async fn load(reader: &dyn ChecklistConfigReader) -> Result<Self, ConfigError> {
        Ok(Self {
            page_size: reader.get_page_size().await?,
            tick_interval_ms: reader.get_tick_interval_ms().await?,
            notification_room: reader.get_notification_room().await?,
            event_dedup_capacity: reader.get_event_dedup_capacity().await?,
            locale: reader.get_locale().await?,
        })
    }
}
