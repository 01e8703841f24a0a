// ==========================================
// 工序跟踪系统 - 工序计时状态机
// ==========================================
// 状态: Idle → Running ⇄ Paused, Running → Completed, 任意 → Idle (重置)
// 红线: 计时结果永远不小于 0
// ==========================================
// 职责: 只做状态转换与时长计算,不直接访问后端
// ==========================================

use crate::domain::item::Phase;
use crate::domain::types::PhaseRunState;
use crate::engine::error::{RuleResult, RuleViolation};
use chrono::{DateTime, Utc};
use tracing::debug;

// ==========================================
// PhaseTimer - 工序计时器（无状态）
// ==========================================
pub struct PhaseTimer;

impl PhaseTimer {
    /// 计算工序净耗时（秒）
    ///
    /// - Completed: (end - start) - paused_duration
    /// - Paused:    (pause - start) - paused_duration（冻结）
    /// - Running:   (now - start) - paused_duration
    /// - Idle:      0
    pub fn elapsed_seconds(phase: &Phase, now: DateTime<Utc>) -> i64 {
        let start = match phase.start_time {
            Some(t) => t,
            None => return 0,
        };

        let until = match phase.run_state() {
            PhaseRunState::Completed => phase.end_time.unwrap_or(now),
            PhaseRunState::Paused => phase.pause_time.unwrap_or(now),
            PhaseRunState::Running => now,
            PhaseRunState::Idle => return 0,
        };

        ((until - start).num_seconds() - phase.paused_duration).max(0)
    }

    /// 校验第 idx 个工序能否离开 Idle
    ///
    /// 第一个工序无门禁；其余要求前一工序已结束且子工序 100% 完成
    pub fn check_start_gate(phases: &[Phase], idx: usize) -> RuleResult<()> {
        if idx == 0 {
            return Ok(());
        }
        let prev = &phases[idx - 1];
        if prev.end_time.is_none() || !prev.is_fully_complete() {
            return Err(RuleViolation::PreviousPhaseIncomplete(prev.id));
        }
        Ok(())
    }

    /// 开始计时（仅限 Idle）
    pub fn start(phases: &mut [Phase], idx: usize, now: DateTime<Utc>) -> RuleResult<()> {
        let from = phases[idx].run_state();
        if from != PhaseRunState::Idle {
            return Err(RuleViolation::InvalidTransition {
                action: "start",
                from,
            });
        }
        Self::check_start_gate(phases, idx)?;

        let phase = &mut phases[idx];
        phase.start_time = Some(now);
        phase.pause_time = None;
        debug!(phase_id = phase.id, "工序开始计时");
        Ok(())
    }

    /// 暂停（仅限 Running）
    pub fn pause(phase: &mut Phase, now: DateTime<Utc>) -> RuleResult<()> {
        let from = phase.run_state();
        if from != PhaseRunState::Running {
            return Err(RuleViolation::InvalidTransition {
                action: "pause",
                from,
            });
        }
        phase.pause_time = Some(now);
        Ok(())
    }

    /// 恢复（仅限 Paused），返回本次暂停的秒数
    pub fn resume(phase: &mut Phase, now: DateTime<Utc>) -> RuleResult<i64> {
        let from = phase.run_state();
        let paused_at = match (from, phase.pause_time) {
            (PhaseRunState::Paused, Some(t)) => t,
            _ => {
                return Err(RuleViolation::InvalidTransition {
                    action: "resume",
                    from,
                })
            }
        };

        let pause_seconds = (now - paused_at).num_seconds().max(0);
        phase.paused_duration += pause_seconds;
        phase.pause_time = None;
        debug!(phase_id = phase.id, pause_seconds, "工序恢复计时");
        Ok(pause_seconds)
    }

    /// 结束（仅限 Running，且子工序需 100% 完成）
    pub fn stop(phase: &mut Phase, now: DateTime<Utc>) -> RuleResult<()> {
        let from = phase.run_state();
        if from != PhaseRunState::Running {
            return Err(RuleViolation::InvalidTransition {
                action: "stop",
                from,
            });
        }
        if !phase.is_fully_complete() {
            return Err(RuleViolation::SubphasesIncomplete {
                percent: phase.completion_percent(),
            });
        }
        phase.end_time = Some(now);
        Ok(())
    }

    /// 重置为 Idle（累计暂停时长一并清零）
    pub fn reset(phase: &mut Phase) {
        phase.start_time = None;
        phase.pause_time = None;
        phase.end_time = None;
        phase.paused_duration = 0;
    }

    /// 计时中且子工序已全部完成 → 需要自动结束
    pub fn should_auto_stop(phase: &Phase) -> bool {
        phase.run_state() == PhaseRunState::Running && phase.is_fully_complete()
    }

    /// 第 idx 个工序结束后，若下一个工序仍为 Idle 则自动开始
    ///
    /// # 返回
    /// - Some(next_idx): 已自动开始的工序下标
    /// - None: 无需自动开始
    pub fn auto_start_next(phases: &mut [Phase], idx: usize, now: DateTime<Utc>) -> Option<usize> {
        let next = idx + 1;
        if next >= phases.len() || phases[idx].end_time.is_none() {
            return None;
        }
        if phases[next].run_state() != PhaseRunState::Idle {
            return None;
        }
        Self::start(phases, next, now).ok().map(|_| next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::Subphase;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()
    }

    fn at(min: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(min)
    }

    fn sub(id: i64, completed: bool) -> Subphase {
        Subphase {
            id,
            name: format!("S{}", id),
            completed,
            completed_at: None,
            time_duration: 0,
            expected_duration: None,
            expected_quantity: 0,
            current_completed_quantity: 0,
            employee_uid: None,
            employee_barcode: None,
            employee_name: None,
            materials: vec![],
        }
    }

    fn phase(id: i64, subs: Vec<Subphase>) -> Phase {
        Phase {
            id,
            name: format!("Phase{}", id),
            start_time: None,
            pause_time: None,
            end_time: None,
            paused_duration: 0,
            expected_hours: Some(2.0),
            subphases: subs,
        }
    }

    #[test]
    fn test_pause_resume_stop_scenario() {
        // 开始 T0，T0+30 暂停，T0+45 恢复，T0+105 结束 → 净耗时 90 分钟
        let mut phases = vec![phase(1, vec![sub(1, false)])];
        PhaseTimer::start(&mut phases, 0, at(0)).unwrap();
        PhaseTimer::pause(&mut phases[0], at(30)).unwrap();
        assert_eq!(PhaseTimer::elapsed_seconds(&phases[0], at(40)), 30 * 60);

        let paused = PhaseTimer::resume(&mut phases[0], at(45)).unwrap();
        assert_eq!(paused, 15 * 60);
        assert_eq!(phases[0].paused_duration, 15 * 60);

        phases[0].subphases[0].completed = true;
        PhaseTimer::stop(&mut phases[0], at(105)).unwrap();
        assert_eq!(phases[0].run_state(), PhaseRunState::Completed);
        assert_eq!(PhaseTimer::elapsed_seconds(&phases[0], at(500)), 90 * 60);
    }

    #[test]
    fn test_elapsed_never_negative() {
        let mut p = phase(1, vec![]);
        assert_eq!(PhaseTimer::elapsed_seconds(&p, at(10)), 0);

        p.start_time = Some(at(10));
        p.paused_duration = 3600;
        assert_eq!(PhaseTimer::elapsed_seconds(&p, at(20)), 0);

        // 时钟回拨
        p.paused_duration = 0;
        assert_eq!(PhaseTimer::elapsed_seconds(&p, at(0)), 0);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut phases = vec![phase(1, vec![sub(1, true)])];
        assert!(matches!(
            PhaseTimer::pause(&mut phases[0], at(1)),
            Err(RuleViolation::InvalidTransition { action: "pause", .. })
        ));
        assert!(PhaseTimer::resume(&mut phases[0], at(1)).is_err());
        assert!(PhaseTimer::stop(&mut phases[0], at(1)).is_err());

        PhaseTimer::start(&mut phases, 0, at(0)).unwrap();
        assert!(PhaseTimer::start(&mut phases, 0, at(1)).is_err());

        PhaseTimer::pause(&mut phases[0], at(2)).unwrap();
        // 暂停状态不能直接结束
        assert!(PhaseTimer::stop(&mut phases[0], at(3)).is_err());
    }

    #[test]
    fn test_stop_requires_all_subphases() {
        let mut phases = vec![phase(1, vec![sub(1, true), sub(2, false)])];
        PhaseTimer::start(&mut phases, 0, at(0)).unwrap();
        let err = PhaseTimer::stop(&mut phases[0], at(10)).unwrap_err();
        assert_eq!(err, RuleViolation::SubphasesIncomplete { percent: 50.0 });
        assert!(phases[0].end_time.is_none());
    }

    #[test]
    fn test_start_gate_on_previous_phase() {
        let mut phases = vec![phase(1, vec![sub(1, false)]), phase(2, vec![sub(2, false)])];
        assert_eq!(
            PhaseTimer::start(&mut phases, 1, at(0)),
            Err(RuleViolation::PreviousPhaseIncomplete(1))
        );

        PhaseTimer::start(&mut phases, 0, at(0)).unwrap();
        phases[0].subphases[0].completed = true;
        PhaseTimer::stop(&mut phases[0], at(10)).unwrap();
        assert!(PhaseTimer::start(&mut phases, 1, at(11)).is_ok());
    }

    #[test]
    fn test_auto_start_next_only_when_idle() {
        let mut phases = vec![phase(1, vec![sub(1, true)]), phase(2, vec![sub(2, false)])];
        PhaseTimer::start(&mut phases, 0, at(0)).unwrap();
        assert!(PhaseTimer::should_auto_stop(&phases[0]));

        // 未结束时不自动开始
        assert_eq!(PhaseTimer::auto_start_next(&mut phases, 0, at(5)), None);

        PhaseTimer::stop(&mut phases[0], at(10)).unwrap();
        assert_eq!(PhaseTimer::auto_start_next(&mut phases, 0, at(10)), Some(1));
        assert_eq!(phases[1].run_state(), PhaseRunState::Running);
        assert_eq!(phases[1].start_time, Some(at(10)));

        // 已在运行，不重复开始
        assert_eq!(PhaseTimer::auto_start_next(&mut phases, 0, at(20)), None);
        assert_eq!(phases[1].start_time, Some(at(10)));

        // 最后一个工序没有后继
        assert_eq!(PhaseTimer::auto_start_next(&mut phases, 1, at(30)), None);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut phases = vec![phase(1, vec![sub(1, false)])];
        PhaseTimer::start(&mut phases, 0, at(0)).unwrap();
        PhaseTimer::pause(&mut phases[0], at(5)).unwrap();
        PhaseTimer::resume(&mut phases[0], at(8)).unwrap();
        PhaseTimer::reset(&mut phases[0]);

        assert_eq!(phases[0].run_state(), PhaseRunState::Idle);
        assert_eq!(phases[0].paused_duration, 0);
        assert_eq!(PhaseTimer::elapsed_seconds(&phases[0], at(60)), 0);
    }
}
