// ==========================================
// 工序跟踪系统 - 时钟
// ==========================================
// 引擎函数全部显式接收 now，由上层通过 Clock 注入
// ==========================================

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动时钟（测试、回放用）
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance_minutes(&self, minutes: i64) {
        if let Ok(mut now) = self.now.lock() {
            *now += Duration::minutes(minutes);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance_minutes(45);
        assert_eq!(clock.now(), start + Duration::minutes(45));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
