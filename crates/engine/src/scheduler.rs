use chrono::{DateTime, Timelike, Utc};
use configuration::SchedulerConfig;

/// What the engine should do on one tick of the polling timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickPlan {
    pub run_cycle: bool,
    pub launch_optimizer: bool,
}

impl TickPlan {
    pub fn is_idle(&self) -> bool {
        !self.run_cycle && !self.launch_optimizer
    }
}

/// Maps wall-clock ticks onto strategy cycles and optimizer launches.
///
/// A minute qualifies when its index since the Unix epoch is divisible by the
/// cadence, which for cadences dividing an hour is the same as the minute of the
/// hour. Each minute fires at most once, on the first tick seen in its first
/// seconds.
#[derive(Debug, Clone)]
pub struct CycleScheduler {
    cycle_every_minutes: i64,
    optimize_every_minutes: i64,
    grace_seconds: u32,
    start_pending: bool,
    last_fired_minute: Option<i64>,
}

impl CycleScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            cycle_every_minutes: i64::from(config.cycle_every_minutes),
            optimize_every_minutes: i64::from(config.optimize_every_minutes),
            // One late tick is tolerated; with 1s ticks this is second 0 or 1.
            grace_seconds: (config.tick_seconds * 2).min(59) as u32,
            start_pending: config.optimize_on_start,
            last_fired_minute: None,
        }
    }

    pub fn plan(&mut self, now: DateTime<Utc>) -> TickPlan {
        let mut plan = TickPlan {
            run_cycle: false,
            launch_optimizer: std::mem::take(&mut self.start_pending),
        };

        let minute = now.timestamp().div_euclid(60);
        if now.second() >= self.grace_seconds || self.last_fired_minute == Some(minute) {
            return plan;
        }

        if minute % self.cycle_every_minutes == 0 {
            plan.run_cycle = true;
        }
        if minute % self.optimize_every_minutes == 0 {
            plan.launch_optimizer = true;
        }
        if !plan.is_idle() {
            self.last_fired_minute = Some(minute);
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap() + chrono::Duration::milliseconds(ms as i64)
    }

    fn scheduler(optimize_on_start: bool) -> CycleScheduler {
        CycleScheduler::new(&SchedulerConfig {
            tick_seconds: 1,
            cycle_every_minutes: 5,
            optimize_every_minutes: 60,
            optimize_on_start,
        })
    }

    #[test]
    fn start_requests_one_optimizer_pass() {
        let mut s = scheduler(true);
        let first = s.plan(at(12, 3, 30, 0));
        assert_eq!(first, TickPlan { run_cycle: false, launch_optimizer: true });
        assert!(s.plan(at(12, 3, 31, 0)).is_idle());

        let mut s = scheduler(false);
        assert!(s.plan(at(12, 3, 30, 0)).is_idle());
    }

    #[test]
    fn cycles_on_cadence_minutes_only() {
        let mut s = scheduler(false);
        assert!(s.plan(at(12, 5, 0, 0)).run_cycle);
        assert!(s.plan(at(12, 6, 0, 0)).is_idle());
        assert!(s.plan(at(12, 10, 0, 0)).run_cycle);
        assert!(s.plan(at(12, 10, 30, 0)).is_idle());
    }

    #[test]
    fn a_minute_fires_once() {
        let mut s = scheduler(false);
        assert!(s.plan(at(12, 5, 0, 100)).run_cycle);
        assert!(s.plan(at(12, 5, 0, 900)).is_idle());
        assert!(s.plan(at(12, 5, 1, 100)).is_idle());
    }

    #[test]
    fn late_tick_still_fires() {
        let mut s = scheduler(false);
        assert!(s.plan(at(12, 15, 1, 2)).run_cycle);
    }

    #[test]
    fn top_of_hour_runs_both() {
        let mut s = scheduler(false);
        assert_eq!(
            s.plan(at(13, 0, 0, 0)),
            TickPlan { run_cycle: true, launch_optimizer: true }
        );
    }
}
