// ==========================================
// 工序跟踪系统 - 清单视图会话
// ==========================================
// 生命周期: mount（加入房间 → 订阅两个主题 → 首次加载）
//          → sync_pending（处理积压刷新事件）
//          → teardown（注销订阅 → 清空件号仓）
// 红线: teardown 之后不再处理任何事件
// ==========================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::{lock_store, ApiResult, EventApplication};
use crate::app::state::AppState;
use crate::backend::notification::Subscription;
use crate::engine::events::Topic;
use crate::engine::query::PageWindow;
use crate::engine::ticker::ElapsedTicker;

/// 一次事件同步的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub applied: usize,
    pub duplicates: usize,
    pub failed: usize,
}

pub struct ChecklistSession {
    state: Arc<AppState>,
    room: String,
    subscriptions: Vec<Subscription>,
}

impl ChecklistSession {
    /// 挂载视图
    pub async fn mount(state: Arc<AppState>) -> ApiResult<(Self, PageWindow)> {
        let room = state.settings.notification_room.clone();
        state.notifications.join_room(&room)?;

        let subscriptions = vec![
            state.notifications.subscribe(Topic::Collection),
            state.notifications.subscribe(Topic::Item),
        ];

        let window = state.item_query_api.reload().await?;
        info!(room = %room, total_items = window.total_items, "清单视图已挂载");

        Ok((
            Self {
                state,
                room,
                subscriptions,
            },
            window,
        ))
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// 计时刷新节拍，周期取配置 tick_interval_ms
    pub fn ticker(&self) -> ElapsedTicker {
        ElapsedTicker::new(Duration::from_millis(self.state.settings.tick_interval_ms))
    }

    /// 处理所有已到达的刷新事件（不等待）
    pub async fn sync_pending(&mut self) -> SyncSummary {
        let mut pending = Vec::new();
        for sub in self.subscriptions.iter_mut() {
            while let Some(event) = sub.try_recv() {
                pending.push(event);
            }
        }

        let mut summary = SyncSummary::default();
        for event in pending {
            match self.state.checklist_api.apply_refresh_event(&event).await {
                Ok(EventApplication::Duplicate) => summary.duplicates += 1,
                Ok(result) => {
                    debug!(event_id = %event.event_id, ?result, "刷新事件已应用");
                    summary.applied += 1;
                }
                Err(err) => {
                    warn!(event_id = %event.event_id, error = %err, "刷新事件对账失败");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// 卸载视图
    pub fn teardown(self) -> ApiResult<()> {
        for sub in self.subscriptions {
            sub.unsubscribe();
        }
        self.state.notifications.leave_room(&self.room);
        self.state.checklist_api.reset_event_history();
        lock_store(&self.state.store)?.clear();
        info!(room = %self.room, "清单视图已卸载");
        Ok(())
    }
}
