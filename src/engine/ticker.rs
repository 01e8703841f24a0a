// ==========================================
// 工序跟踪系统 - 前台计时刷新
// ==========================================
// 只为计时中的工序重新计算显示用的耗时，不修改任何状态
// ==========================================

use crate::engine::phase_timer::PhaseTimer;
use crate::engine::store::ItemStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// 单个计时中工序的耗时读数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElapsedReading {
    pub part_number: String,
    pub phase_id: i64,
    pub elapsed_seconds: i64,
}

/// 读取全部计时中工序的耗时
pub fn running_elapsed(store: &ItemStore, now: DateTime<Utc>) -> Vec<ElapsedReading> {
    store
        .running_phases()
        .map(|(part_number, phase)| ElapsedReading {
            part_number: part_number.to_string(),
            phase_id: phase.id,
            elapsed_seconds: PhaseTimer::elapsed_seconds(phase, now),
        })
        .collect()
}

/// 固定周期的刷新节拍（默认 1 秒）
pub struct ElapsedTicker {
    interval: Interval,
}

impl ElapsedTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period.max(Duration::from_millis(1)));
        // 界面卡顿后不补发积压的节拍
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    /// 节拍周期
    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// 等待下一个节拍
    pub async fn next(&mut self) {
        self.interval.tick().await;
    }
}
