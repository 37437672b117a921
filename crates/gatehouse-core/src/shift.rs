//! Guard work shifts.
//!
//! A shift is either open (`active`, no end) or closed (inactive, with an
//! end). Lifecycle: `{no shift} → active → closed`. Rows that drifted from
//! that invariant are found and repaired by [`inspect`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::person::Site;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Period {
  Morning,
  Afternoon,
  Night,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
  pub shift_id:   Uuid,
  pub guard_id:   Uuid,
  pub site:       Site,
  pub period:     Period,
  /// Set at creation; never changes.
  pub started_at: DateTime<Utc>,
  pub ended_at:   Option<DateTime<Utc>>,
  pub active:     bool,
}

impl Shift {
  pub fn is_open(&self) -> bool { self.active && self.ended_at.is_none() }

  /// Close the shift at `at`. Callers check [`Shift::is_open`] first.
  pub fn close(&mut self, at: DateTime<Utc>) {
    self.active = false;
    self.ended_at = Some(at.max(self.started_at));
  }
}

/// Entry/exit counts for the events bound to one shift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSummary {
  pub entries: u64,
  pub exits:   u64,
  pub total:   u64,
}

impl ShiftSummary {
  pub fn new(entries: u64, exits: u64) -> Self {
    Self { entries, exits, total: entries + exits }
  }
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// One way a stored shift can violate the open/closed invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftDefect {
  /// `ended_at < started_at`; repaired by clamping the end to the start.
  EndsBeforeStart,
  /// Marked active but already has an end; repaired by deactivating.
  ActiveWithEnd,
  /// Marked inactive with no end; repaired by ending it at audit time.
  InactiveWithoutEnd,
}

/// List the defects of `shift` and the repaired row, if any repair applies.
pub fn inspect(shift: &Shift, now: DateTime<Utc>) -> (Vec<ShiftDefect>, Option<Shift>) {
  let mut defects = Vec::new();
  let mut fixed = shift.clone();

  if let Some(end) = shift.ended_at
    && end < shift.started_at
  {
    defects.push(ShiftDefect::EndsBeforeStart);
    fixed.ended_at = Some(shift.started_at);
  }
  if shift.active && shift.ended_at.is_some() {
    defects.push(ShiftDefect::ActiveWithEnd);
    fixed.active = false;
  }
  if !shift.active && shift.ended_at.is_none() {
    defects.push(ShiftDefect::InactiveWithoutEnd);
    fixed.ended_at = Some(now.max(shift.started_at));
  }

  let repaired = (!defects.is_empty()).then_some(fixed);
  (defects, repaired)
}

/// Result of a shift audit pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftAudit {
  pub total:        u64,
  /// Number of shifts with at least one defect.
  pub inconsistent: u64,
  /// Number of shifts rewritten; zero on a dry run.
  pub repaired:     u64,
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  fn shift(active: bool, ended: Option<i64>) -> Shift {
    let start = Utc::now();
    Shift {
      shift_id:   Uuid::new_v4(),
      guard_id:   Uuid::new_v4(),
      site:       Site::Cegafe,
      period:     Period::Morning,
      started_at: start,
      ended_at:   ended.map(|mins| start + Duration::minutes(mins)),
      active,
    }
  }

  #[test]
  fn consistent_shifts_have_no_defects() {
    assert_eq!(inspect(&shift(true, None), Utc::now()), (vec![], None));
    assert_eq!(inspect(&shift(false, Some(30)), Utc::now()), (vec![], None));
  }

  #[test]
  fn active_with_end_and_reversed_end() {
    let s = shift(true, Some(-10));
    let (defects, fixed) = inspect(&s, Utc::now());
    assert_eq!(defects, vec![ShiftDefect::EndsBeforeStart, ShiftDefect::ActiveWithEnd]);
    let fixed = fixed.unwrap();
    assert!(!fixed.active);
    assert_eq!(fixed.ended_at, Some(s.started_at));
  }

  #[test]
  fn inactive_without_end_gets_closed() {
    let s = shift(false, None);
    let now = s.started_at + Duration::hours(8);
    let (defects, fixed) = inspect(&s, now);
    assert_eq!(defects, vec![ShiftDefect::InactiveWithoutEnd]);
    assert_eq!(fixed.unwrap().ended_at, Some(now));
  }

  #[test]
  fn summary_totals() {
    assert_eq!(ShiftSummary::new(3, 2).total, 5);
  }
}
