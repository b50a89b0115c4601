//! Home dashboard state: the reminder calendar and the selected day.
//!
//! `build_home_state` is the pure aggregation step: expand the medicines
//! around the viewed month, drop soft-deleted instances, slice the selected
//! day. `HomeFeed` owns its four inputs and republishes the latest
//! `HomeUiState` on a `watch` channel whenever any one of them changes.
//! Observers only ever see the newest snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::enums::DoseStatus;
use crate::models::{parse_dose_time, MedicineDefinition, ReminderInstance};
use crate::schedule::{expand, RemindersByDate, YearMonth};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything the dashboard is derived from.
#[derive(Debug, Clone)]
pub struct HomeInputs {
    pub medicines: Vec<MedicineDefinition>,
    /// `{instance_id}-{dose_id}` → status.
    pub dose_statuses: HashMap<String, DoseStatus>,
    pub deleted_ids: HashSet<String>,
    pub selected_date: NaiveDate,
    pub viewed_month: YearMonth,
}

impl HomeInputs {
    pub fn empty(today: NaiveDate) -> Self {
        Self {
            medicines: Vec::new(),
            dose_statuses: HashMap::new(),
            deleted_ids: HashSet::new(),
            selected_date: today,
            viewed_month: YearMonth::from_date(today),
        }
    }
}

/// One dose on the selected day, flattened out of its reminder instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDose {
    pub instance_id: String,
    pub medicine_id: String,
    pub medicine_name: String,
    pub dose_id: String,
    pub time: String,
    pub status: DoseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeUiState {
    pub selected_date: NaiveDate,
    pub viewed_month: YearMonth,
    /// Dose slots scheduled on the selected date.
    pub dose_count: usize,
    pub taken_dose_count: usize,
    pub reminders_by_date: RemindersByDate,
    /// Selected date's doses, sorted by time.
    pub selected_day_schedule: Vec<ScheduledDose>,
    pub is_loading: bool,
}

impl HomeUiState {
    pub fn loading(today: NaiveDate) -> Self {
        Self {
            selected_date: today,
            viewed_month: YearMonth::from_date(today),
            dose_count: 0,
            taken_dose_count: 0,
            reminders_by_date: RemindersByDate::new(),
            selected_day_schedule: Vec::new(),
            is_loading: true,
        }
    }

    pub fn reminders_on(&self, date: NaiveDate) -> &[ReminderInstance] {
        self.reminders_by_date
            .get(&date)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Share of the selected day's doses already taken; `None` on a day with no doses.
    pub fn progress(&self) -> Option<f64> {
        (self.dose_count > 0).then(|| self.taken_dose_count as f64 / self.dose_count as f64)
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

pub fn build_home_state(inputs: &HomeInputs) -> HomeUiState {
    let reminders_by_date = expand(
        &inputs.medicines,
        &inputs.dose_statuses,
        &inputs.deleted_ids,
        inputs.viewed_month,
    );

    let selected = reminders_by_date
        .get(&inputs.selected_date)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let dose_count = selected.iter().map(ReminderInstance::total_dose_count).sum();
    let taken_dose_count = selected.iter().map(ReminderInstance::taken_dose_count).sum();
    let selected_day_schedule = daily_schedule(selected);

    HomeUiState {
        selected_date: inputs.selected_date,
        viewed_month: inputs.viewed_month,
        dose_count,
        taken_dose_count,
        reminders_by_date,
        selected_day_schedule,
        is_loading: false,
    }
}

/// Flatten a day's instances into individual doses ordered by time.
/// Doses with an unreadable time go last, in their original order.
pub fn daily_schedule(instances: &[ReminderInstance]) -> Vec<ScheduledDose> {
    let mut doses: Vec<ScheduledDose> = instances
        .iter()
        .flat_map(|inst| {
            inst.medicine.doses.iter().map(move |dose| ScheduledDose {
                instance_id: inst.instance_id.clone(),
                medicine_id: inst.medicine.id.clone(),
                medicine_name: inst.medicine.name.clone(),
                dose_id: dose.id.clone(),
                time: dose.time.clone(),
                status: inst.status_of(&dose.id),
            })
        })
        .collect();

    doses.sort_by_key(|d| match parse_dose_time(&d.time) {
        Some(time) => (false, Some(time)),
        None => (true, None),
    });
    doses
}

// ---------------------------------------------------------------------------
// State container
// ---------------------------------------------------------------------------

/// Single-writer holder of the dashboard inputs. Every setter recomputes the
/// state once and replaces the published snapshot.
pub struct HomeFeed {
    inputs: Mutex<HomeInputs>,
    tx: watch::Sender<HomeUiState>,
}

impl HomeFeed {
    pub fn new(today: NaiveDate) -> Self {
        let (tx, _rx) = watch::channel(HomeUiState::loading(today));
        Self {
            inputs: Mutex::new(HomeInputs::empty(today)),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<HomeUiState> {
        self.tx.subscribe()
    }

    /// Latest published snapshot.
    pub fn current(&self) -> HomeUiState {
        self.tx.borrow().clone()
    }

    /// Replace all three persisted inputs at once (initial load, full refresh).
    pub fn load(
        &self,
        medicines: Vec<MedicineDefinition>,
        dose_statuses: HashMap<String, DoseStatus>,
        deleted_ids: HashSet<String>,
    ) {
        self.update(|inputs| {
            inputs.medicines = medicines;
            inputs.dose_statuses = dose_statuses;
            inputs.deleted_ids = deleted_ids;
        });
    }

    pub fn set_medicines(&self, medicines: Vec<MedicineDefinition>) {
        self.update(|inputs| inputs.medicines = medicines);
    }

    pub fn set_dose_statuses(&self, dose_statuses: HashMap<String, DoseStatus>) {
        self.update(|inputs| inputs.dose_statuses = dose_statuses);
    }

    pub fn set_deleted_ids(&self, deleted_ids: HashSet<String>) {
        self.update(|inputs| inputs.deleted_ids = deleted_ids);
    }

    /// Select a day; the calendar follows to that day's month.
    pub fn select_date(&self, date: NaiveDate) {
        self.update(|inputs| {
            inputs.selected_date = date;
            inputs.viewed_month = YearMonth::from_date(date);
        });
    }

    /// Page the calendar; the first day of the new month becomes selected.
    pub fn change_month(&self, month: YearMonth) {
        self.update(|inputs| {
            inputs.viewed_month = month;
            inputs.selected_date = month.first_day();
        });
    }

    /// Snapshot of the current inputs.
    pub fn inputs(&self) -> HomeInputs {
        self.lock_inputs().clone()
    }

    fn update(&self, apply: impl FnOnce(&mut HomeInputs)) {
        let mut inputs = self.lock_inputs();
        apply(&mut inputs);
        let state = build_home_state(&inputs);
        tracing::debug!(
            selected_date = %state.selected_date,
            dose_count = state.dose_count,
            taken = state.taken_dose_count,
            "Home state recomputed"
        );
        // Publish under the inputs lock: snapshots stay in write order.
        self.tx.send_replace(state);
    }

    fn lock_inputs(&self) -> MutexGuard<'_, HomeInputs> {
        self.inputs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
