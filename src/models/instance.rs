use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::enums::DoseStatus;
use super::medicine::{MedicineDefinition, DATE_FORMAT};

/// Stable id of a medicine's occurrence on one calendar day:
/// `{medicine_id}-{YYYY-MM-DD}`. Recomputing the schedule always yields the
/// same id for the same real-world occurrence.
pub fn instance_id(medicine_id: &str, date: NaiveDate) -> String {
    format!("{medicine_id}-{}", date.format(DATE_FORMAT))
}

/// Key of a dose status record: `{instance_id}-{dose_id}`.
pub fn dose_status_key(instance_id: &str, dose_id: &str) -> String {
    format!("{instance_id}-{dose_id}")
}

/// A medicine materialised on one date, with per-dose status resolved.
/// Derived on every refresh, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderInstance {
    pub instance_id: String,
    pub date: NaiveDate,
    pub medicine: MedicineDefinition,
    /// Dose slot id → status; `Pending` when no record exists.
    pub dose_statuses: BTreeMap<String, DoseStatus>,
}

impl ReminderInstance {
    pub fn status_of(&self, dose_id: &str) -> DoseStatus {
        self.dose_statuses
            .get(dose_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_dose_count(&self) -> usize {
        self.medicine.doses.len()
    }

    pub fn taken_dose_count(&self) -> usize {
        self.dose_statuses
            .values()
            .filter(|s| **s == DoseStatus::Taken)
            .count()
    }

    /// True when there is at least one dose and every dose is taken.
    pub fn all_doses_taken(&self) -> bool {
        !self.dose_statuses.is_empty()
            && self.dose_statuses.values().all(|s| *s == DoseStatus::Taken)
    }

    /// At least one dose taken, but not all of them.
    pub fn some_doses_taken(&self) -> bool {
        self.dose_statuses.values().any(|s| *s == DoseStatus::Taken) && !self.all_doses_taken()
    }

    /// Earliest still-pending dose after `now`; if every pending dose is
    /// already behind `now`, the earliest pending dose of the day.
    pub fn next_upcoming_dose_time(&self, now: NaiveTime) -> Option<NaiveTime> {
        let pending: Vec<NaiveTime> = self
            .medicine
            .doses
            .iter()
            .filter(|dose| self.status_of(&dose.id) == DoseStatus::Pending)
            .filter_map(|dose| dose.time_of_day())
            .collect();

        pending
            .iter()
            .copied()
            .filter(|t| *t > now)
            .min()
            .or_else(|| pending.iter().copied().min())
    }
}

/// Latest recorded status of one dose of one instance (last write wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseStatusRecord {
    pub instance_id: String,
    pub dose_id: String,
    pub status: DoseStatus,
    pub last_updated: Option<NaiveDateTime>,
}

impl DoseStatusRecord {
    pub fn key(&self) -> String {
        dose_status_key(&self.instance_id, &self.dose_id)
    }
}
