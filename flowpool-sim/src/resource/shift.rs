//! Calendar mapping and on-shift windows.

use chrono::{Datelike, Days, NaiveDateTime, TimeDelta, Weekday};
use flowpool_core::{ShiftWindow, SimTime};

/// Maps simulated minutes onto calendar datetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftCalendar {
    origin: NaiveDateTime,
}

impl ShiftCalendar {
    /// `origin` is the datetime of simulated time zero.
    pub fn new(origin: NaiveDateTime) -> Self {
        Self { origin }
    }

    /// Calendar datetime at simulated time `t`, to the millisecond.
    pub fn datetime_at(&self, t: SimTime) -> Option<NaiveDateTime> {
        let millis = (t.as_minutes() * 60_000.0).round();
        if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
            return None;
        }
        let delta = TimeDelta::try_milliseconds(millis as i64)?;
        self.origin.checked_add_signed(delta)
    }

    /// Simulated time of a calendar datetime.
    pub fn sim_time_of(&self, at: NaiveDateTime) -> SimTime {
        let millis = (at - self.origin).num_milliseconds();
        SimTime::from_minutes(millis as f64 / 60_000.0)
    }
}

/// The compiled windows of one shift group.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftSchedule {
    windows: Vec<ShiftWindow>,
}

fn runs_on(window: &ShiftWindow, day: Weekday) -> bool {
    window.days.is_empty() || window.days.contains(&day)
}

impl ShiftSchedule {
    /// Builds a schedule; at least one window is required.
    pub fn new(windows: Vec<ShiftWindow>) -> Result<Self, String> {
        if windows.is_empty() {
            return Err("shift group has no schedule windows".to_string());
        }
        Ok(Self { windows })
    }

    /// Whether `at` falls inside any window.
    ///
    /// A window with `end <= start` runs past midnight into the next day.
    pub fn is_on(&self, at: NaiveDateTime) -> bool {
        let day = at.weekday();
        let time = at.time();
        self.windows.iter().any(|w| {
            if w.start < w.end {
                runs_on(w, day) && time >= w.start && time < w.end
            } else {
                (runs_on(w, day) && time >= w.start) || (runs_on(w, day.pred()) && time < w.end)
            }
        })
    }

    /// The first window start strictly after `at`, looking one week ahead.
    pub fn next_start_after(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut best: Option<NaiveDateTime> = None;
        for offset in 0..=7 {
            let Some(date) = at.date().checked_add_days(Days::new(offset)) else {
                break;
            };
            for window in self.windows.iter().filter(|w| runs_on(w, date.weekday())) {
                let candidate = date.and_time(window.start);
                if candidate > at && best.map_or(true, |b| candidate < b) {
                    best = Some(candidate);
                }
            }
        }
        best
    }
}
