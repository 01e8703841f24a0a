// ==========================================
// 工序跟踪系统 - 子工序完成引擎
// ==========================================
// 规则:
// - 数量型 (expected_quantity > 0): 完成数量达标 + 已分配员工，与工序计时状态无关
// - 计时型: 工序必须处于计时中 + 已分配员工
// - 顺序门禁: 第 i+1 个子工序只有在第 i 个完成后才可操作
// 时长分摊: 工序净耗时 - 前序子工序时长之和，四舍五入到分钟
// ==========================================

use crate::domain::item::Phase;
use crate::domain::types::PhaseRunState;
use crate::engine::error::{RuleResult, RuleViolation};
use crate::engine::phase_timer::PhaseTimer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// 完成/撤销的结果（用于同步到后端）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub subphase_id: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    /// 分钟；None 表示本次未计算时长
    pub time_duration: Option<i64>,
}

/// 数量更新结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityUpdate {
    pub subphase_id: i64,
    pub previous: i64,
    pub current: i64,
    /// 是否因数量回落而自动撤销了完成
    pub revoked: bool,
}

// ==========================================
// SubphaseCompletionEngine
// ==========================================
pub struct SubphaseCompletionEngine;

impl SubphaseCompletionEngine {
    /// 顺序门禁：前一个子工序必须已完成
    pub fn check_actionable(phase: &Phase, idx: usize) -> RuleResult<()> {
        if idx == 0 {
            return Ok(());
        }
        let prev = &phase.subphases[idx - 1];
        if !prev.completed {
            return Err(RuleViolation::PreviousSubphaseIncomplete(prev.id));
        }
        Ok(())
    }

    /// 撤销门禁：后一个子工序不能已完成
    fn check_revocable(phase: &Phase, idx: usize) -> RuleResult<()> {
        match phase.subphases.get(idx + 1) {
            Some(next) if next.completed => Err(RuleViolation::LaterSubphaseCompleted(next.id)),
            _ => Ok(()),
        }
    }

    /// 计时型子工序需要工序处于计时中
    fn check_phase_running(phase: &Phase) -> RuleResult<()> {
        match phase.run_state() {
            PhaseRunState::Running => Ok(()),
            PhaseRunState::Idle => Err(RuleViolation::PhaseNotStarted),
            PhaseRunState::Paused => Err(RuleViolation::PhasePaused),
            PhaseRunState::Completed => Err(RuleViolation::PhaseEnded),
        }
    }

    /// 计算第 idx 个子工序的时长切片（分钟）
    ///
    /// 工序净耗时(秒) - Σ 前序子工序 time_duration × 60，下限为 0，四舍五入到分钟
    pub fn duration_slice_minutes(phase: &Phase, idx: usize, now: DateTime<Utc>) -> i64 {
        let elapsed = PhaseTimer::elapsed_seconds(phase, now);
        let prior_seconds: i64 = phase.subphases[..idx]
            .iter()
            .map(|s| s.time_duration * 60)
            .sum();
        let slice_seconds = (elapsed - prior_seconds).max(0);
        (slice_seconds as f64 / 60.0).round() as i64
    }

    /// 标记完成
    #[instrument(skip(phase, now), fields(phase_id = phase.id))]
    pub fn complete(phase: &mut Phase, idx: usize, now: DateTime<Utc>) -> RuleResult<CompletionOutcome> {
        let sub = &phase.subphases[idx];
        if sub.completed {
            return Ok(CompletionOutcome {
                subphase_id: sub.id,
                completed: true,
                completed_at: sub.completed_at,
                time_duration: Some(sub.time_duration),
            });
        }

        Self::check_actionable(phase, idx)?;

        let sub = &phase.subphases[idx];
        if sub.assigned_employee().is_none() {
            return Err(RuleViolation::EmployeeNotAssigned(sub.id));
        }

        let time_duration = if sub.is_quantity_based() {
            if sub.current_completed_quantity < sub.expected_quantity {
                return Err(RuleViolation::QuantityBelowTarget {
                    current: sub.current_completed_quantity,
                    expected: sub.expected_quantity,
                });
            }
            None
        } else {
            Self::check_phase_running(phase)?;
            if phase.has_time_tracking() {
                Some(Self::duration_slice_minutes(phase, idx, now))
            } else {
                None
            }
        };

        let sub = &mut phase.subphases[idx];
        sub.completed = true;
        sub.completed_at = Some(now);
        if let Some(minutes) = time_duration {
            sub.time_duration = minutes;
        }
        debug!(subphase_id = sub.id, ?time_duration, "子工序已完成");

        Ok(CompletionOutcome {
            subphase_id: sub.id,
            completed: true,
            completed_at: Some(now),
            time_duration,
        })
    }

    /// 撤销完成（时长清零）
    pub fn uncomplete(phase: &mut Phase, idx: usize) -> RuleResult<CompletionOutcome> {
        Self::check_revocable(phase, idx)?;

        let sub = &mut phase.subphases[idx];
        sub.revoke_completion();
        Ok(CompletionOutcome {
            subphase_id: sub.id,
            completed: false,
            completed_at: None,
            time_duration: Some(0),
        })
    }

    /// 设置完成状态（切换入口）
    pub fn set_completed(
        phase: &mut Phase,
        idx: usize,
        completed: bool,
        now: DateTime<Utc>,
    ) -> RuleResult<CompletionOutcome> {
        if completed {
            Self::complete(phase, idx, now)
        } else {
            Self::uncomplete(phase, idx)
        }
    }

    /// 更新完成数量
    ///
    /// - 超出目标或为负数: 拒绝，不改动
    /// - 原已完成且新数量低于目标: 自动撤销完成
    pub fn update_quantity(phase: &mut Phase, idx: usize, quantity: i64) -> RuleResult<QuantityUpdate> {
        let sub = &phase.subphases[idx];
        if quantity < 0 {
            return Err(RuleViolation::NegativeQuantity(quantity));
        }
        if quantity > sub.expected_quantity {
            return Err(RuleViolation::QuantityExceedsTarget {
                requested: quantity,
                expected: sub.expected_quantity,
            });
        }

        let revoke = sub.completed && quantity < sub.expected_quantity;
        if revoke {
            Self::check_revocable(phase, idx)?;
        }

        let sub = &mut phase.subphases[idx];
        let previous = sub.current_completed_quantity;
        sub.current_completed_quantity = quantity;
        if revoke {
            sub.revoke_completion();
            debug!(subphase_id = sub.id, quantity, "数量回落，自动撤销完成");
        }

        Ok(QuantityUpdate {
            subphase_id: sub.id,
            previous,
            current: quantity,
            revoked: revoke,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::{EmployeeAssignment, Subphase};
    use chrono::{Duration, TimeZone};

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn worker() -> EmployeeAssignment {
        EmployeeAssignment {
            uid: "u-7".to_string(),
            barcode: "EMP007".to_string(),
            name: "李四".to_string(),
        }
    }

    fn sub(id: i64, expected_quantity: i64) -> Subphase {
        let mut s = Subphase {
            id,
            name: format!("S{}", id),
            completed: false,
            completed_at: None,
            time_duration: 0,
            expected_duration: None,
            expected_quantity,
            current_completed_quantity: 0,
            employee_uid: None,
            employee_barcode: None,
            employee_name: None,
            materials: vec![],
        };
        s.assign(&worker());
        s
    }

    fn running_phase(subs: Vec<Subphase>) -> Phase {
        Phase {
            id: 10,
            name: "焊接".to_string(),
            start_time: Some(at(0)),
            pause_time: None,
            end_time: None,
            paused_duration: 0,
            expected_hours: None,
            subphases: subs,
        }
    }

    #[test]
    fn test_duration_apportionment_scenario() {
        // A 先完成记录 20 分钟；B 在工序净耗时 50 分钟时完成 → 30 分钟
        let mut phase = running_phase(vec![sub(1, 0), sub(2, 0)]);
        let a = SubphaseCompletionEngine::complete(&mut phase, 0, at(20)).unwrap();
        assert_eq!(a.time_duration, Some(20));

        let b = SubphaseCompletionEngine::complete(&mut phase, 1, at(50)).unwrap();
        assert_eq!(b.time_duration, Some(30));
        assert_eq!(phase.subphases[1].time_duration, 30);
    }

    #[test]
    fn test_duration_rounds_to_nearest_minute_and_floors_at_zero() {
        let mut phase = running_phase(vec![sub(1, 0), sub(2, 0)]);
        phase.subphases[0].completed = true;
        phase.subphases[0].time_duration = 90; // 前序记录超过工序耗时

        let now = at(10) + Duration::seconds(31);
        assert_eq!(SubphaseCompletionEngine::duration_slice_minutes(&phase, 0, now), 11);
        assert_eq!(SubphaseCompletionEngine::duration_slice_minutes(&phase, 1, now), 0);
    }

    #[test]
    fn test_time_based_requires_running_phase() {
        let mut phase = running_phase(vec![sub(1, 0)]);

        phase.pause_time = Some(at(5));
        assert_eq!(
            SubphaseCompletionEngine::complete(&mut phase, 0, at(6)),
            Err(RuleViolation::PhasePaused)
        );

        phase.pause_time = None;
        phase.end_time = Some(at(7));
        assert_eq!(
            SubphaseCompletionEngine::complete(&mut phase, 0, at(8)),
            Err(RuleViolation::PhaseEnded)
        );

        phase.end_time = None;
        phase.start_time = None;
        assert_eq!(
            SubphaseCompletionEngine::complete(&mut phase, 0, at(9)),
            Err(RuleViolation::PhaseNotStarted)
        );
        assert!(!phase.subphases[0].completed);
    }

    #[test]
    fn test_quantity_based_ignores_phase_state() {
        let mut phase = running_phase(vec![sub(1, 10)]);
        phase.start_time = None;

        phase.subphases[0].current_completed_quantity = 9;
        assert_eq!(
            SubphaseCompletionEngine::complete(&mut phase, 0, at(1)),
            Err(RuleViolation::QuantityBelowTarget { current: 9, expected: 10 })
        );

        phase.subphases[0].current_completed_quantity = 10;
        let outcome = SubphaseCompletionEngine::complete(&mut phase, 0, at(2)).unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.time_duration, None);
        assert_eq!(phase.subphases[0].time_duration, 0);
    }

    #[test]
    fn test_employee_required() {
        let mut phase = running_phase(vec![sub(1, 0)]);
        phase.subphases[0].employee_uid = None;
        assert_eq!(
            SubphaseCompletionEngine::complete(&mut phase, 0, at(3)),
            Err(RuleViolation::EmployeeNotAssigned(1))
        );
    }

    #[test]
    fn test_sequential_gate() {
        let mut phase = running_phase(vec![sub(1, 0), sub(2, 5)]);
        phase.subphases[1].current_completed_quantity = 5;

        assert_eq!(
            SubphaseCompletionEngine::complete(&mut phase, 1, at(3)),
            Err(RuleViolation::PreviousSubphaseIncomplete(1))
        );

        SubphaseCompletionEngine::complete(&mut phase, 0, at(4)).unwrap();
        SubphaseCompletionEngine::complete(&mut phase, 1, at(5)).unwrap();

        // 后续已完成时不能撤销前序
        assert_eq!(
            SubphaseCompletionEngine::uncomplete(&mut phase, 0),
            Err(RuleViolation::LaterSubphaseCompleted(2))
        );
    }

    #[test]
    fn test_uncomplete_clears_duration() {
        let mut phase = running_phase(vec![sub(1, 0)]);
        SubphaseCompletionEngine::complete(&mut phase, 0, at(12)).unwrap();
        assert_eq!(phase.subphases[0].time_duration, 12);

        let outcome = SubphaseCompletionEngine::set_completed(&mut phase, 0, false, at(13)).unwrap();
        assert_eq!(outcome.time_duration, Some(0));
        assert!(!phase.subphases[0].completed);
        assert_eq!(phase.subphases[0].time_duration, 0);
        assert!(phase.subphases[0].completed_at.is_none());
    }

    #[test]
    fn test_quantity_drop_revokes_completion() {
        let mut phase = running_phase(vec![sub(1, 10)]);
        SubphaseCompletionEngine::update_quantity(&mut phase, 0, 10).unwrap();
        SubphaseCompletionEngine::complete(&mut phase, 0, at(1)).unwrap();

        let update = SubphaseCompletionEngine::update_quantity(&mut phase, 0, 7).unwrap();
        assert!(update.revoked);
        assert_eq!(update.previous, 10);
        assert!(!phase.subphases[0].completed);
        assert!(phase.subphases[0].completed_at.is_none());
    }

    #[test]
    fn test_quantity_over_target_rejected_without_mutation() {
        let mut phase = running_phase(vec![sub(1, 10)]);
        phase.subphases[0].current_completed_quantity = 4;

        assert_eq!(
            SubphaseCompletionEngine::update_quantity(&mut phase, 0, 11),
            Err(RuleViolation::QuantityExceedsTarget { requested: 11, expected: 10 })
        );
        assert_eq!(
            SubphaseCompletionEngine::update_quantity(&mut phase, 0, -1),
            Err(RuleViolation::NegativeQuantity(-1))
        );
        assert_eq!(phase.subphases[0].current_completed_quantity, 4);
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut phase = running_phase(vec![sub(1, 0)]);
        SubphaseCompletionEngine::complete(&mut phase, 0, at(10)).unwrap();
        let again = SubphaseCompletionEngine::complete(&mut phase, 0, at(40)).unwrap();
        assert_eq!(again.time_duration, Some(10));
        assert_eq!(phase.subphases[0].completed_at, Some(at(10)));
    }
}
