// Wall-clock source for the scheduler and store.
//
// Fire decisions compare local hour:minute and calendar date, so the clock
// hands out naive local time.

use std::sync::Mutex;

use chrono::{Local, NaiveDateTime, TimeDelta};

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to. Used by simulations and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_manual_clock_moves_only_on_demand() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(7, 59, 45)
            .unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(TimeDelta::seconds(17));
        assert_eq!(clock.now(), start + TimeDelta::seconds(17));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
