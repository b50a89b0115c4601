//! Schedule computation — pure functions over medicine snapshots.
//!
//! Three pieces share one day-membership rule (weekday ∈ active days and
//! start ≤ date ≤ end):
//! - `expand`: materialise reminder instances for a padded calendar window
//! - `alarm`: resolve the single next alarm of one medicine
//! - `month`: the `YearMonth` the calendar is looking at
//!
//! Nothing here performs I/O or reads the system clock directly; callers
//! pass snapshots and a [`Clock`].

mod alarm;
mod expand;
mod month;

pub use alarm::*;
pub use expand::*;
pub use month::*;

use chrono::{Datelike, NaiveDate};

use crate::models::{parse_date, MedicineDefinition};

/// Inclusive date range during which a medicine is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl ValidityWindow {
    /// Strict parse used by expansion: `None` when the start date, or a
    /// present end date, is malformed.
    pub fn parse(medicine: &MedicineDefinition) -> Option<Self> {
        let start = parse_date(&medicine.start_date)?;
        let end = match &medicine.end_date {
            Some(raw) => Some(parse_date(raw)?),
            None => None,
        };
        Some(Self { start, end })
    }

    /// Lenient parse used by alarm resolution: a malformed start date never
    /// begins, a malformed end date never ends.
    pub fn lenient(medicine: &MedicineDefinition) -> Self {
        Self {
            start: parse_date(&medicine.start_date).unwrap_or(NaiveDate::MAX),
            end: medicine.end_date.as_deref().and_then(parse_date),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.map_or(true, |end| date <= end)
    }
}

/// Whether `medicine` produces a reminder on `date`.
pub fn is_active_on(medicine: &MedicineDefinition, window: &ValidityWindow, date: NaiveDate) -> bool {
    medicine.days.contains(date.weekday()) && window.contains(date)
}
