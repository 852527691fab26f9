use chrono::{Datelike, Duration, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::collection::PeriodError;
use super::time::{Instant, Period};

/// The set of weekdays on which a recurring period applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicableDays {
  pub monday: bool,
  pub tuesday: bool,
  pub wednesday: bool,
  pub thursday: bool,
  pub friday: bool,
  pub saturday: bool,
  pub sunday: bool,
}

impl ApplicableDays {
  /// Build a day set from a list of weekdays.
  pub fn from_weekdays(days: &[Weekday]) -> Self {
    let mut set = ApplicableDays::default();
    for day in days {
      match day {
        Weekday::Mon => set.monday = true,
        Weekday::Tue => set.tuesday = true,
        Weekday::Wed => set.wednesday = true,
        Weekday::Thu => set.thursday = true,
        Weekday::Fri => set.friday = true,
        Weekday::Sat => set.saturday = true,
        Weekday::Sun => set.sunday = true,
      }
    }
    set
  }

  /// Every day of the week.
  pub fn every_day() -> Self {
    Self::from_weekdays(&[
      Weekday::Mon,
      Weekday::Tue,
      Weekday::Wed,
      Weekday::Thu,
      Weekday::Fri,
      Weekday::Sat,
      Weekday::Sun,
    ])
  }

  /// Monday through Friday.
  pub fn weekdays() -> Self {
    Self::from_weekdays(&[
      Weekday::Mon,
      Weekday::Tue,
      Weekday::Wed,
      Weekday::Thu,
      Weekday::Fri,
    ])
  }

  /// Returns true if the set includes `day`.
  pub fn day_applicable(&self, day: Weekday) -> bool {
    match day {
      Weekday::Mon => self.monday,
      Weekday::Tue => self.tuesday,
      Weekday::Wed => self.wednesday,
      Weekday::Thu => self.thursday,
      Weekday::Fri => self.friday,
      Weekday::Sat => self.saturday,
      Weekday::Sun => self.sunday,
    }
  }

  /// Returns true if at least one day is applicable.
  pub fn any_applicable(&self) -> bool {
    self.monday
      || self.tuesday
      || self.wednesday
      || self.thursday
      || self.friday
      || self.saturday
      || self.sunday
  }
}

/// A daily recurring window `[start, end)` active on a set of weekdays.
///
/// The window is expressed as UTC times of day. A window whose start is
/// not before its end wraps past midnight into the following day; such a
/// window belongs to the day it starts on for applicability purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingPeriod {
  pub start: NaiveTime,
  pub end: NaiveTime,
  pub days: ApplicableDays,
}

impl FloatingPeriod {
  /// Create a floating period.
  ///
  /// # Errors
  /// Returns `InvalidPeriod` when the window is empty (`start == end`)
  /// or no day is applicable.
  pub fn new(start: NaiveTime, end: NaiveTime, days: ApplicableDays) -> Result<Self, PeriodError> {
    if start == end || !days.any_applicable() {
      return Err(PeriodError::InvalidPeriod);
    }
    Ok(FloatingPeriod { start, end, days })
  }

  fn window_length(&self) -> Duration {
    let delta = self.end - self.start;
    if delta <= Duration::zero() {
      delta + Duration::days(1)
    } else {
      delta
    }
  }

  /// The concrete window anchored around `t`: the wrapped window that
  /// began the previous day when `t` still falls inside its tail,
  /// otherwise the window of `t`'s own day.
  fn occurrence(&self, t: Instant) -> (Instant, Instant) {
    let day = t.date_naive();
    let wraps = self.start >= self.end;
    let anchor = if wraps && t.time() < self.end {
      day - Duration::days(1)
    } else {
      day
    };
    let start = anchor.and_time(self.start).and_utc();
    (start, start + self.window_length())
  }

  /// The concrete period produced for `t`. Day applicability filters
  /// containment, not window construction: the window of a non-applicable
  /// day is still returned.
  pub fn at_date(&self, t: Instant) -> Period {
    let (start, end) = self.occurrence(t);
    Period::bounded(start, end)
  }

  /// Returns true if the period applies on `t`'s weekday.
  pub fn day_applicable(&self, t: Instant) -> bool {
    self.days.day_applicable(t.weekday())
  }

  /// Returns true if `t` falls inside an applicable window.
  pub fn contains_time(&self, t: Instant) -> bool {
    let (start, end) = self.occurrence(t);
    self.days.day_applicable(start.weekday()) && start <= t && t < end
  }

  /// Returns true if `period` lies entirely within one applicable window.
  pub fn contains(&self, period: &Period) -> bool {
    match period.start {
      Some(s) if period.end.is_some() => {
        let (start, end) = self.occurrence(s);
        self.days.day_applicable(start.weekday())
          && Period::bounded(start, end).contains(period)
      }
      // A window never contains a period with an unbounded side
      _ => false,
    }
  }

  /// Returns true if any applicable window intersects `period`.
  pub fn intersects(&self, period: &Period) -> bool {
    if !self.days.any_applicable() {
      return false;
    }
    match (period.start, period.end) {
      (Some(s), Some(e)) => {
        // A span of a week or more meets every applicable weekday once
        if e - s >= Duration::days(7) {
          return true;
        }
        let mut day = s.date_naive() - Duration::days(1);
        let last = e.date_naive();
        while day <= last {
          if self.days.day_applicable(day.weekday()) {
            let start = day.and_time(self.start).and_utc();
            let window = Period::bounded(start, start + self.window_length());
            if window.intersects(period) {
              return true;
            }
          }
          day = day + Duration::days(1);
        }
        false
      }
      // A period unbounded on either side reaches an applicable window
      _ => true,
    }
  }

  /// The remainder of the active window from `t` to its end, or `None`
  /// when `t` is outside every applicable window.
  pub fn from_time(&self, t: Instant) -> Option<Period> {
    if !self.contains_time(t) {
      return None;
    }
    let (_, end) = self.occurrence(t);
    Some(Period::bounded(t, end))
  }
}

/// A weekly recurring window anchored to the ISO week (Monday 00:00 UTC).
///
/// The window runs from `start_day`/`start_time` to `end_day`/`end_time`
/// every week; a window whose end offset does not lie after its start
/// offset wraps into the following week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousPeriod {
  pub start_day: Weekday,
  pub start_time: NaiveTime,
  pub end_day: Weekday,
  pub end_time: NaiveTime,
}

impl ContinuousPeriod {
  /// Create a continuous period.
  ///
  /// # Errors
  /// Returns `InvalidPeriod` when the window is empty (start and end at
  /// the same weekly offset).
  pub fn new(
    start_day: Weekday,
    start_time: NaiveTime,
    end_day: Weekday,
    end_time: NaiveTime,
  ) -> Result<Self, PeriodError> {
    let period = ContinuousPeriod {
      start_day,
      start_time,
      end_day,
      end_time,
    };
    if period.start_offset() == period.end_offset() {
      return Err(PeriodError::InvalidPeriod);
    }
    Ok(period)
  }

  fn start_offset(&self) -> Duration {
    Duration::days(i64::from(self.start_day.num_days_from_monday()))
      + (self.start_time - NaiveTime::MIN)
  }

  fn end_offset(&self) -> Duration {
    Duration::days(i64::from(self.end_day.num_days_from_monday()))
      + (self.end_time - NaiveTime::MIN)
  }

  fn window_length(&self) -> Duration {
    let delta = self.end_offset() - self.start_offset();
    if delta <= Duration::zero() {
      delta + Duration::weeks(1)
    } else {
      delta
    }
  }

  /// Monday 00:00 of `t`'s ISO week.
  fn week_anchor(&self, t: Instant) -> Instant {
    let days_back = i64::from(t.weekday().num_days_from_monday());
    (t.date_naive() - Duration::days(days_back))
      .and_time(NaiveTime::MIN)
      .and_utc()
  }

  /// The concrete window anchored around `t`: last week's window when a
  /// wrapped tail still covers `t`, otherwise the window of `t`'s week.
  fn occurrence(&self, t: Instant) -> (Instant, Instant) {
    let start = self.week_anchor(t) + self.start_offset();
    let end = start + self.window_length();
    if t < start && t < end - Duration::weeks(1) {
      return (start - Duration::weeks(1), end - Duration::weeks(1));
    }
    (start, end)
  }

  /// The concrete period produced for `t`.
  pub fn at_date(&self, t: Instant) -> Period {
    let (start, end) = self.occurrence(t);
    Period::bounded(start, end)
  }

  /// Returns true if `t` falls inside the weekly window.
  pub fn contains_time(&self, t: Instant) -> bool {
    let (start, end) = self.occurrence(t);
    start <= t && t < end
  }

  /// Returns true if `period` lies entirely within one weekly window.
  pub fn contains(&self, period: &Period) -> bool {
    match period.start {
      Some(s) if period.end.is_some() => {
        let (start, end) = self.occurrence(s);
        Period::bounded(start, end).contains(period)
      }
      _ => false,
    }
  }

  /// Returns true if any weekly window intersects `period`.
  pub fn intersects(&self, period: &Period) -> bool {
    match (period.start, period.end) {
      (Some(s), Some(e)) => {
        // A span of a week or more meets the window exactly once
        if e - s >= Duration::weeks(1) {
          return true;
        }
        let mut week = self.week_anchor(s) - Duration::weeks(1);
        let last = self.week_anchor(e);
        while week <= last {
          let start = week + self.start_offset();
          let window = Period::bounded(start, start + self.window_length());
          if window.intersects(period) {
            return true;
          }
          week = week + Duration::weeks(1);
        }
        false
      }
      _ => true,
    }
  }

  /// The remainder of the active window from `t` to its end, or `None`
  /// when `t` is outside the window.
  pub fn from_time(&self, t: Instant) -> Option<Period> {
    if !self.contains_time(t) {
      return None;
    }
    let (_, end) = self.occurrence(t);
    Some(Period::bounded(t, end))
  }
}
