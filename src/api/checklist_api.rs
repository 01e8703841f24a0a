// ==========================================
// 工序跟踪系统 - 工序清单 API（乐观更新 + 对账）
// ==========================================
// 职责:
// 1. 命令先改内存树，再发后端请求
// 2. 后端失败 → 报错并重新加载受影响的件号（或整个列表）丢弃本地修改
// 3. 后端成功 → 不做修正（后续刷新事件会纠正残余偏差）
// 4. 刷新事件: 集合级 → 重载列表；件号级 → 重新拉取该件号完整子树
// 红线: 不在持锁期间发起后端请求；件号仓下标不跨 await 使用；同一事件重复应用为空操作
// ==========================================

use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::item_query_api::ItemQueryApi;
use crate::api::reconcile::{fetch_item_tree, lock_store, SharedStore};
use crate::backend::error::{BackendError, BackendResult};
use crate::backend::identity::IdentityService;
use crate::backend::materials::MaterialsService;
use crate::backend::operations::{OperationsService, SubphaseCompletionRequest};
use crate::domain::item::{EmployeeAssignment, Phase};
use crate::domain::types::{PhaseRunState, Priority};
use crate::engine::clock::Clock;
use crate::engine::events::{EventDeduplicator, RefreshEvent, RefreshScope};
use crate::engine::phase_timer::PhaseTimer;
use crate::engine::store::{ItemStore, PhaseSlot};
use crate::engine::subphase_completion::SubphaseCompletionEngine;
use crate::engine::ticker::{running_elapsed, ElapsedReading};

// ==========================================
// 命令结果
// ==========================================

/// 操作员确认结果（替代阻塞式确认框）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confirmation {
    Confirmed,
    Cancelled,
}

/// 命令附带触发的后续动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowUp {
    /// 子工序全部完成，工序自动结束
    PhaseAutoStopped(i64),
    /// 前一工序结束，下一工序自动开始
    PhaseAutoStarted(i64),
    /// 数量回落，子工序完成被撤销
    CompletionRevoked(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    Applied { follow_ups: Vec<FollowUp> },
    /// 目标已处于请求的状态，未发请求
    Unchanged,
    Cancelled,
}

impl CommandOutcome {
    fn applied() -> Self {
        CommandOutcome::Applied { follow_ups: Vec::new() }
    }

    pub fn follow_ups(&self) -> &[FollowUp] {
        match self {
            CommandOutcome::Applied { follow_ups } => follow_ups,
            _ => &[],
        }
    }
}

/// 刷新事件处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventApplication {
    /// 已重载整个列表
    CollectionReloaded,
    /// 已替换该件号子树
    ItemReplaced(String),
    /// 件号已不存在，已从本地移除
    ItemRemoved(String),
    /// 件号不在当前页，忽略
    NotLoaded(String),
    /// 重复事件
    Duplicate,
}

// ==========================================
// ChecklistApi
// ==========================================
pub struct ChecklistApi {
    store: SharedStore,
    operations: Arc<dyn OperationsService>,
    materials: Arc<dyn MaterialsService>,
    identity: Arc<dyn IdentityService>,
    clock: Arc<dyn Clock>,
    items: Arc<ItemQueryApi>,
    dedup: Mutex<EventDeduplicator>,
}

impl ChecklistApi {
    pub fn new(
        store: SharedStore,
        operations: Arc<dyn OperationsService>,
        materials: Arc<dyn MaterialsService>,
        identity: Arc<dyn IdentityService>,
        clock: Arc<dyn Clock>,
        items: Arc<ItemQueryApi>,
        dedup_capacity: usize,
    ) -> Self {
        Self {
            store,
            operations,
            materials,
            identity,
            clock,
            items,
            dedup: Mutex::new(EventDeduplicator::new(dedup_capacity)),
        }
    }

    // 位置（下标）只在同一次持锁内使用；每次加锁都按 id 重新定位

    fn phase_not_found(part_number: &str, phase_id: i64) -> ApiError {
        ApiError::NotFound(format!("工序(part={}, id={})不存在", part_number, phase_id))
    }

    fn subphase_not_found(part_number: &str, phase_id: i64, subphase_id: i64) -> ApiError {
        ApiError::NotFound(format!(
            "子工序(part={}, phase={}, id={})不存在",
            part_number, phase_id, subphase_id
        ))
    }

    fn phase_mut<'a>(store: &'a mut ItemStore, part_number: &str, phase_id: i64) -> ApiResult<&'a mut Phase> {
        store
            .locate_phase(part_number, phase_id)
            .and_then(|slot| store.phase_mut(slot))
            .ok_or_else(|| Self::phase_not_found(part_number, phase_id))
    }

    /// 工序所在件号的全部工序，以及该工序的下标
    fn item_phases_mut<'a>(
        store: &'a mut ItemStore,
        part_number: &str,
        phase_id: i64,
    ) -> ApiResult<(&'a mut [Phase], usize)> {
        let slot = store
            .locate_phase(part_number, phase_id)
            .ok_or_else(|| Self::phase_not_found(part_number, phase_id))?;
        let phases = store
            .phases_mut(slot.item_idx)
            .ok_or_else(|| Self::phase_not_found(part_number, phase_id))?;
        Ok((phases, slot.phase_idx))
    }

    /// 子工序所属工序，以及子工序的下标
    fn subphase_parent_mut<'a>(
        store: &'a mut ItemStore,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
    ) -> ApiResult<(&'a mut Phase, usize)> {
        let slot = store
            .locate_subphase(part_number, phase_id, subphase_id)
            .ok_or_else(|| Self::subphase_not_found(part_number, phase_id, subphase_id))?;
        let phase = store
            .phase_mut(PhaseSlot {
                item_idx: slot.item_idx,
                phase_idx: slot.phase_idx,
            })
            .filter(|phase| slot.subphase_idx < phase.subphases.len())
            .ok_or_else(|| Self::subphase_not_found(part_number, phase_id, subphase_id))?;
        Ok((phase, slot.subphase_idx))
    }

    /// 发出后端请求；失败时重新加载件号并返回错误
    async fn commit<F>(&self, part_number: &str, action: &'static str, call: F) -> ApiResult<()>
    where
        F: Future<Output = BackendResult<()>>,
    {
        match call.await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.rollback_item(part_number, action, err).await),
        }
    }

    async fn rollback_item(&self, part_number: &str, action: &'static str, err: BackendError) -> ApiError {
        warn!(part_number, action, error = %err, "后端请求失败，重新加载件号以丢弃本地修改");
        if let Err(reload_err) = self.reload_item(part_number).await {
            warn!(part_number, error = %reload_err, "回滚重载失败");
        }
        ApiError::from(err)
    }

    // ==========================================
    // 工序计时命令
    // ==========================================

    /// 开始计时
    #[instrument(skip(self))]
    pub async fn start_phase(&self, part_number: &str, phase_id: i64) -> ApiResult<CommandOutcome> {
        let now = self.clock.now();
        {
            let mut store = lock_store(&self.store)?;
            let (phases, idx) = Self::item_phases_mut(&mut store, part_number, phase_id)?;
            PhaseTimer::start(phases, idx, now)?;
        }
        self.commit(part_number, "start_phase", self.operations.start_phase(part_number, phase_id, now))
            .await?;
        Ok(CommandOutcome::applied())
    }

    /// 暂停
    #[instrument(skip(self))]
    pub async fn pause_phase(&self, part_number: &str, phase_id: i64) -> ApiResult<CommandOutcome> {
        let now = self.clock.now();
        {
            let mut store = lock_store(&self.store)?;
            PhaseTimer::pause(Self::phase_mut(&mut store, part_number, phase_id)?, now)?;
        }
        self.commit(part_number, "pause_phase", self.operations.pause_phase(part_number, phase_id, now))
            .await?;
        Ok(CommandOutcome::applied())
    }

    /// 恢复（累计暂停秒数一并提交）
    #[instrument(skip(self))]
    pub async fn resume_phase(&self, part_number: &str, phase_id: i64) -> ApiResult<CommandOutcome> {
        let now = self.clock.now();
        let paused_duration = {
            let mut store = lock_store(&self.store)?;
            let phase = Self::phase_mut(&mut store, part_number, phase_id)?;
            PhaseTimer::resume(phase, now)?;
            phase.paused_duration
        };
        self.commit(
            part_number,
            "resume_phase",
            self.operations.resume_phase(part_number, phase_id, paused_duration),
        )
        .await?;
        Ok(CommandOutcome::applied())
    }

    /// 结束计时（子工序需 100% 完成），并尝试自动开始下一工序
    #[instrument(skip(self))]
    pub async fn stop_phase(&self, part_number: &str, phase_id: i64) -> ApiResult<CommandOutcome> {
        let now = self.clock.now();
        {
            let mut store = lock_store(&self.store)?;
            PhaseTimer::stop(Self::phase_mut(&mut store, part_number, phase_id)?, now)?;
        }
        self.commit(part_number, "stop_phase", self.operations.stop_phase(part_number, phase_id, now))
            .await?;

        let mut follow_ups = Vec::new();
        if let Some(next_id) = self.auto_start_after(part_number, phase_id).await? {
            follow_ups.push(FollowUp::PhaseAutoStarted(next_id));
        }
        Ok(CommandOutcome::Applied { follow_ups })
    }

    /// 重置为 Idle（需确认）
    #[instrument(skip(self))]
    pub async fn reset_phase(
        &self,
        part_number: &str,
        phase_id: i64,
        confirmation: Confirmation,
    ) -> ApiResult<CommandOutcome> {
        if confirmation == Confirmation::Cancelled {
            debug!("操作员取消重置");
            return Ok(CommandOutcome::Cancelled);
        }
        {
            let mut store = lock_store(&self.store)?;
            PhaseTimer::reset(Self::phase_mut(&mut store, part_number, phase_id)?);
        }
        self.commit(part_number, "reset_phase", self.operations.reset_phase(part_number, phase_id))
            .await?;
        Ok(CommandOutcome::applied())
    }

    /// 前一工序已结束时自动开始下一工序
    ///
    /// 等待后端期间件号可能已被重载或移除，按 id 重新定位；找不到则不再自动开始
    async fn auto_start_after(&self, part_number: &str, phase_id: i64) -> ApiResult<Option<i64>> {
        let now = self.clock.now();
        let started = {
            let mut store = lock_store(&self.store)?;
            match Self::item_phases_mut(&mut store, part_number, phase_id) {
                Ok((phases, idx)) => PhaseTimer::auto_start_next(phases, idx, now)
                    .and_then(|next| phases.get(next).map(|p| p.id)),
                Err(_) => {
                    debug!(part_number, phase_id, "工序已不在本地，跳过自动开始");
                    None
                }
            }
        };
        let Some(next_id) = started else {
            return Ok(None);
        };
        info!(part_number, phase_id = next_id, "下一工序自动开始");
        self.commit(part_number, "auto_start_phase", self.operations.start_phase(part_number, next_id, now))
            .await?;
        Ok(Some(next_id))
    }

    // ==========================================
    // 子工序命令
    // ==========================================

    /// 切换子工序完成状态
    ///
    /// 完成后若工序计时中且子工序已 100% 完成 → 自动结束工序，再评估自动开始
    #[instrument(skip(self))]
    pub async fn set_subphase_completed(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
        completed: bool,
    ) -> ApiResult<CommandOutcome> {
        let now = self.clock.now();
        let (outcome, auto_stop) = {
            let mut store = lock_store(&self.store)?;
            let (phase, idx) = Self::subphase_parent_mut(&mut store, part_number, phase_id, subphase_id)?;
            if phase.subphases[idx].completed == completed {
                return Ok(CommandOutcome::Unchanged);
            }
            let outcome = SubphaseCompletionEngine::set_completed(phase, idx, completed, now)?;
            let auto_stop = completed && PhaseTimer::should_auto_stop(phase);
            if auto_stop {
                PhaseTimer::stop(phase, now)?;
            }
            (outcome, auto_stop)
        };

        let request = SubphaseCompletionRequest {
            part_number: part_number.to_string(),
            phase_id,
            subphase_id,
            completed: outcome.completed,
            completed_at: outcome.completed_at,
            time_duration: outcome.time_duration,
        };
        self.commit(part_number, "complete_subphase", self.operations.complete_subphase(&request))
            .await?;

        let mut follow_ups = Vec::new();
        if auto_stop {
            info!(part_number, phase_id, "子工序全部完成，工序自动结束");
            self.commit(part_number, "auto_stop_phase", self.operations.stop_phase(part_number, phase_id, now))
                .await?;
            follow_ups.push(FollowUp::PhaseAutoStopped(phase_id));
            if let Some(next_id) = self.auto_start_after(part_number, phase_id).await? {
                follow_ups.push(FollowUp::PhaseAutoStarted(next_id));
            }
        }
        Ok(CommandOutcome::Applied { follow_ups })
    }

    /// 更新完成数量（越界拒绝；回落到目标以下自动撤销完成）
    #[instrument(skip(self))]
    pub async fn update_subphase_quantity(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
        quantity: i64,
    ) -> ApiResult<CommandOutcome> {
        let update = {
            let mut store = lock_store(&self.store)?;
            let (phase, idx) = Self::subphase_parent_mut(&mut store, part_number, phase_id, subphase_id)?;
            SubphaseCompletionEngine::update_quantity(phase, idx, quantity)?
        };
        if update.previous == update.current && !update.revoked {
            return Ok(CommandOutcome::Unchanged);
        }

        self.commit(
            part_number,
            "update_subphase_quantity",
            self.operations
                .update_subphase_quantity(part_number, phase_id, subphase_id, quantity),
        )
        .await?;

        let mut follow_ups = Vec::new();
        if update.revoked {
            let request = SubphaseCompletionRequest {
                part_number: part_number.to_string(),
                phase_id,
                subphase_id,
                completed: false,
                completed_at: None,
                time_duration: Some(0),
            };
            self.commit(part_number, "revoke_subphase", self.operations.complete_subphase(&request))
                .await?;
            follow_ups.push(FollowUp::CompletionRevoked(subphase_id));
        }
        Ok(CommandOutcome::Applied { follow_ups })
    }

    /// 为子工序分配员工（先查员工档案，再乐观写入）
    #[instrument(skip(self))]
    pub async fn assign_employee(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
        uid: &str,
    ) -> ApiResult<EmployeeAssignment> {
        if uid.trim().is_empty() {
            return Err(ApiError::InvalidInput("员工 uid 不能为空".to_string()));
        }
        // 确认目标存在后再查询员工
        lock_store(&self.store)?
            .locate_subphase(part_number, phase_id, subphase_id)
            .ok_or_else(|| Self::subphase_not_found(part_number, phase_id, subphase_id))?;
        let assignment = self.identity.get_employee(uid).await?.to_assignment();

        {
            let mut store = lock_store(&self.store)?;
            let (phase, idx) = Self::subphase_parent_mut(&mut store, part_number, phase_id, subphase_id)?;
            phase.subphases[idx].assign(&assignment);
        }
        self.commit(
            part_number,
            "assign_subphase_employee",
            self.operations
                .assign_subphase_employee(part_number, phase_id, subphase_id, &assignment),
        )
        .await?;
        Ok(assignment)
    }

    // ==========================================
    // 件号命令
    // ==========================================

    /// 更新件号优先级
    #[instrument(skip(self))]
    pub async fn update_priority(&self, part_number: &str, priority: Priority) -> ApiResult<CommandOutcome> {
        {
            let mut store = lock_store(&self.store)?;
            let item = store
                .item_mut(part_number)
                .ok_or_else(|| ApiError::NotFound(format!("件号{}不存在", part_number)))?;
            if item.priority == priority {
                return Ok(CommandOutcome::Unchanged);
            }
            item.priority = priority;
        }
        self.commit(
            part_number,
            "update_item_priority",
            self.operations.update_item_priority(part_number, priority),
        )
        .await?;
        Ok(CommandOutcome::applied())
    }

    /// 删除件号（需确认）；失败时重载整个列表
    #[instrument(skip(self))]
    pub async fn delete_item(&self, part_number: &str, confirmation: Confirmation) -> ApiResult<CommandOutcome> {
        if confirmation == Confirmation::Cancelled {
            return Ok(CommandOutcome::Cancelled);
        }
        lock_store(&self.store)?
            .remove_item(part_number)
            .ok_or_else(|| ApiError::NotFound(format!("件号{}不存在", part_number)))?;

        if let Err(err) = self.operations.delete_item(part_number).await {
            warn!(part_number, error = %err, "删除失败，重新加载列表");
            if let Err(reload_err) = self.items.reload().await {
                warn!(error = %reload_err, "列表重载失败");
            }
            return Err(err.into());
        }
        Ok(CommandOutcome::applied())
    }

    // ==========================================
    // 对账
    // ==========================================

    /// 重新拉取件号完整子树并整体替换；后端已删除则本地移除
    pub async fn reload_item(&self, part_number: &str) -> ApiResult<EventApplication> {
        match fetch_item_tree(self.operations.as_ref(), self.materials.as_ref(), part_number).await {
            Ok(item) => {
                lock_store(&self.store)?.upsert_item(item);
                debug!(part_number, "件号子树已替换");
                Ok(EventApplication::ItemReplaced(part_number.to_string()))
            }
            Err(ApiError::NotFound(_)) => {
                lock_store(&self.store)?.remove_item(part_number);
                info!(part_number, "件号已在后端删除，本地移除");
                Ok(EventApplication::ItemRemoved(part_number.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// 应用刷新事件（按 event_id 去重）
    pub async fn apply_refresh_event(&self, event: &RefreshEvent) -> ApiResult<EventApplication> {
        let first = self
            .dedup
            .lock()
            .map_err(|e| ApiError::InternalError(format!("事件去重锁获取失败: {}", e)))?
            .first_seen(&event.event_id);
        if !first {
            debug!(event_id = %event.event_id, "重复事件，跳过");
            return Ok(EventApplication::Duplicate);
        }

        let result = match event.scope() {
            RefreshScope::Collection => self.items.reload().await.map(|_| EventApplication::CollectionReloaded),
            RefreshScope::Item(part_number) => {
                let loaded = lock_store(&self.store)?.item(&part_number).is_some();
                if loaded {
                    self.reload_item(&part_number).await
                } else {
                    Ok(EventApplication::NotLoaded(part_number))
                }
            }
        };

        if result.is_err() {
            // 对账失败，允许同一事件重试
            if let Ok(mut dedup) = self.dedup.lock() {
                dedup.forget(&event.event_id);
            }
        }
        result
    }

    /// 清空事件去重记录（会话结束时调用）
    pub fn reset_event_history(&self) {
        if let Ok(mut dedup) = self.dedup.lock() {
            dedup.clear();
        }
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 计时中工序的耗时读数
    pub fn elapsed_snapshot(&self) -> ApiResult<Vec<ElapsedReading>> {
        let store = lock_store(&self.store)?;
        Ok(running_elapsed(&store, self.clock.now()))
    }

    /// 单个工序的运行状态与耗时
    pub fn phase_status(&self, part_number: &str, phase_id: i64) -> ApiResult<(PhaseRunState, i64)> {
        let store = lock_store(&self.store)?;
        let phase = store
            .locate_phase(part_number, phase_id)
            .and_then(|slot| store.phase(slot))
            .ok_or_else(|| Self::phase_not_found(part_number, phase_id))?;
        Ok((phase.run_state(), PhaseTimer::elapsed_seconds(phase, self.clock.now())))
    }
}
