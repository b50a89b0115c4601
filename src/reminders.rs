//! Reminder service. Ties the stores, the schedule computations and the
//! platform together.
//!
//! Every mutation follows the same shape: validate, persist, refresh the
//! affected `HomeFeed` input, then re-resolve the owning medicine's alarm.
//! A medicine never has more than one pending alarm: all of its dose-slot
//! requests are cancelled before the next one is registered.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::watch;

use crate::db::{self, DatabaseError};
use crate::forms::MedicineForm;
use crate::home::{HomeFeed, HomeUiState};
use crate::models::enums::DoseStatus;
use crate::models::{DoseSlot, MedicineDefinition, ValidationError};
use crate::platform::{
    request_code, AlarmPayload, AlarmPlatform, AlarmPrecision, AlarmRequest, Notification,
    NotificationPlatform, PlatformError,
};
use crate::schedule::{next_alarm, Clock, NextAlarm, YearMonth};

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid medicine: {0}")]
    Validation(#[from] ValidationError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Internal lock error")]
    LockPoisoned,
}

// ═══════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════

pub struct ReminderService<C: Clock> {
    conn: Mutex<Connection>,
    alarms: Arc<dyn AlarmPlatform>,
    notifier: Arc<dyn NotificationPlatform>,
    clock: C,
    home: HomeFeed,
}

impl<C: Clock> ReminderService<C> {
    /// Wrap an opened database and publish the first home snapshot.
    /// Alarms are left untouched; call [`Self::reschedule_all`] on launch.
    pub fn open(
        conn: Connection,
        alarms: Arc<dyn AlarmPlatform>,
        notifier: Arc<dyn NotificationPlatform>,
        clock: C,
    ) -> Result<Self, ReminderError> {
        let today = clock.now().date_naive();
        let service = Self {
            conn: Mutex::new(conn),
            alarms,
            notifier,
            clock,
            home: HomeFeed::new(today),
        };
        service.reload()?;
        Ok(service)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, ReminderError> {
        self.conn.lock().map_err(|_| ReminderError::LockPoisoned)
    }

    /// Reload all three persisted inputs into the home feed.
    pub fn reload(&self) -> Result<(), ReminderError> {
        let conn = self.lock_conn()?;
        let medicines = db::list_medicines(&conn)?;
        let statuses = db::get_dose_status_map(&conn)?;
        let deleted = db::get_deleted_instance_ids(&conn)?;
        tracing::info!(medicines = medicines.len(), "Reminder data loaded");
        // Publish under the connection guard: snapshots follow write order.
        self.home.load(medicines, statuses, deleted);
        Ok(())
    }

    fn refresh_medicines(&self, conn: &Connection) -> Result<(), ReminderError> {
        self.home.set_medicines(db::list_medicines(conn)?);
        Ok(())
    }

    // ── Alarms ──────────────────────────────────────────────

    /// Re-resolve and re-register every medicine's next alarm. Returns how
    /// many alarms are now pending.
    pub fn reschedule_all(&self) -> Result<usize, ReminderError> {
        let medicines = {
            let conn = self.lock_conn()?;
            db::list_medicines(&conn)?
        };

        let mut scheduled = 0;
        for medicine in &medicines {
            if self.schedule_next(medicine)?.is_some() {
                scheduled += 1;
            }
        }
        tracing::info!(medicines = medicines.len(), scheduled, "Alarms rescheduled");
        Ok(scheduled)
    }

    /// The alarm that would be registered for a medicine right now.
    pub fn next_alarm_for(&self, medicine_id: &str) -> Result<Option<NextAlarm>, ReminderError> {
        let medicine = self.require_medicine(medicine_id)?;
        Ok(next_alarm(&medicine, &self.clock.now()))
    }

    fn schedule_next(&self, medicine: &MedicineDefinition) -> Result<Option<NextAlarm>, ReminderError> {
        self.cancel_doses(&medicine.doses)?;

        let Some(alarm) = next_alarm(medicine, &self.clock.now()) else {
            tracing::debug!(medicine_id = %medicine.id, "No upcoming dose within horizon");
            return Ok(None);
        };

        let precision = if self.alarms.can_schedule_exact() {
            AlarmPrecision::Exact
        } else {
            tracing::warn!(
                medicine_id = %medicine.id,
                "Exact alarms not permitted, falling back to inexact"
            );
            AlarmPrecision::Inexact
        };

        let request = AlarmRequest {
            request_code: request_code(&alarm.dose.id),
            trigger_at: alarm.trigger_at,
            precision,
            payload: AlarmPayload {
                medicine_id: medicine.id.clone(),
                dose_id: alarm.dose.id.clone(),
                medicine_name: medicine.name.clone(),
                dosage: medicine.dosage.clone(),
            },
        };
        self.alarms.schedule(request)?;

        tracing::info!(
            medicine_id = %medicine.id,
            dose_id = %alarm.dose.id,
            trigger_at = %alarm.trigger_at,
            "Next alarm registered"
        );
        Ok(Some(alarm))
    }

    fn cancel_doses(&self, doses: &[DoseSlot]) -> Result<(), ReminderError> {
        for dose in doses {
            self.alarms.cancel(request_code(&dose.id))?;
        }
        Ok(())
    }

    /// Handle a fired alarm: show the reminder, then register the
    /// medicine's following alarm.
    pub fn on_alarm_fired(&self, payload: &AlarmPayload) -> Result<Option<NextAlarm>, ReminderError> {
        let medicine = {
            let conn = self.lock_conn()?;
            db::get_medicine(&conn, &payload.medicine_id)?
        };

        let Some(medicine) = medicine else {
            tracing::info!(
                medicine_id = %payload.medicine_id,
                dose_id = %payload.dose_id,
                "Alarm fired for a deleted medicine, ignoring"
            );
            return Ok(None);
        };

        self.notifier.display(Notification::dose_reminder(payload))?;
        self.schedule_next(&medicine)
    }

    // ── Medicine definitions ────────────────────────────────

    pub fn add_medicine(&self, medicine: MedicineDefinition) -> Result<Option<NextAlarm>, ReminderError> {
        medicine.validate()?;
        {
            let conn = self.lock_conn()?;
            db::insert_medicine(&conn, &medicine)?;
            self.refresh_medicines(&conn)?;
        }
        tracing::info!(medicine_id = %medicine.id, doses = medicine.doses.len(), "Medicine added");
        self.schedule_next(&medicine)
    }

    /// Build a definition from the entry form, starting today, and add it.
    pub fn add_from_form(&self, form: MedicineForm) -> Result<MedicineDefinition, ReminderError> {
        let medicine = form.into_definition(self.today())?;
        self.add_medicine(medicine.clone())?;
        Ok(medicine)
    }

    /// Replace a definition. Alarms of dose slots that no longer exist are
    /// cancelled along with the current ones.
    pub fn update_medicine(&self, medicine: MedicineDefinition) -> Result<Option<NextAlarm>, ReminderError> {
        medicine.validate()?;
        let previous = {
            let conn = self.lock_conn()?;
            let previous = db::get_medicine(&conn, &medicine.id)?.ok_or_else(|| {
                ReminderError::NotFound {
                    entity: "Medicine",
                    id: medicine.id.clone(),
                }
            })?;
            db::replace_medicine(&conn, &medicine)?;
            self.refresh_medicines(&conn)?;
            previous
        };

        self.cancel_doses(&previous.doses)?;
        tracing::info!(medicine_id = %medicine.id, "Medicine updated");
        self.schedule_next(&medicine)
    }

    /// Hard-delete a medicine and cancel every one of its dose alarms.
    /// Status records and soft deletions are left in place.
    pub fn delete_medicine_rule(&self, medicine_id: &str) -> Result<(), ReminderError> {
        let medicine = {
            let conn = self.lock_conn()?;
            let medicine = db::get_medicine(&conn, medicine_id)?.ok_or_else(|| {
                ReminderError::NotFound {
                    entity: "Medicine",
                    id: medicine_id.to_string(),
                }
            })?;
            db::delete_medicine(&conn, medicine_id)?;
            self.refresh_medicines(&conn)?;
            medicine
        };

        self.cancel_doses(&medicine.doses)?;
        tracing::info!(medicine_id, "Medicine deleted");
        Ok(())
    }

    fn require_medicine(&self, medicine_id: &str) -> Result<MedicineDefinition, ReminderError> {
        let conn = self.lock_conn()?;
        db::get_medicine(&conn, medicine_id)?.ok_or_else(|| ReminderError::NotFound {
            entity: "Medicine",
            id: medicine_id.to_string(),
        })
    }

    // ── Dose status ─────────────────────────────────────────

    pub fn set_dose_status(
        &self,
        instance_id: &str,
        dose_id: &str,
        status: DoseStatus,
    ) -> Result<(), ReminderError> {
        let medicine = {
            let conn = self.lock_conn()?;
            self.record_status(&conn, instance_id, dose_id, |_| status)?
        };

        tracing::debug!(instance_id, dose_id, status = %status, "Dose status recorded");
        self.schedule_next(&medicine)?;
        Ok(())
    }

    /// Flip a dose between taken and pending. Returns the new status.
    pub fn toggle_dose(&self, instance_id: &str, dose_id: &str) -> Result<DoseStatus, ReminderError> {
        let mut next = DoseStatus::default();
        let medicine = {
            let conn = self.lock_conn()?;
            self.record_status(&conn, instance_id, dose_id, |current| {
                next = current.toggled();
                next
            })?
        };

        tracing::debug!(instance_id, dose_id, status = %next, "Dose toggled");
        self.schedule_next(&medicine)?;
        Ok(next)
    }

    /// Read, derive and write one dose status under a single connection
    /// guard, then publish the new status map. Returns the owning medicine.
    fn record_status(
        &self,
        conn: &Connection,
        instance_id: &str,
        dose_id: &str,
        derive: impl FnOnce(DoseStatus) -> DoseStatus,
    ) -> Result<MedicineDefinition, ReminderError> {
        let medicine = db::find_medicine_by_dose(conn, dose_id)?.ok_or_else(|| {
            ReminderError::NotFound {
                entity: "Dose",
                id: dose_id.to_string(),
            }
        })?;
        let current = db::get_dose_status(conn, instance_id, dose_id)?.unwrap_or_default();
        db::set_dose_status(conn, instance_id, dose_id, derive(current))?;
        self.home.set_dose_statuses(db::get_dose_status_map(conn)?);
        Ok(medicine)
    }

    // ── Soft deletion ───────────────────────────────────────

    /// Hide one day's occurrence. Its dose statuses are kept, so undo
    /// restores it exactly.
    pub fn delete_instance(&self, instance_id: &str) -> Result<(), ReminderError> {
        let conn = self.lock_conn()?;
        db::add_deleted_instance(&conn, instance_id)?;
        self.home.set_deleted_ids(db::get_deleted_instance_ids(&conn)?);
        tracing::debug!(instance_id, "Instance deleted");
        Ok(())
    }

    /// Returns whether the instance was deleted before.
    pub fn undo_delete_instance(&self, instance_id: &str) -> Result<bool, ReminderError> {
        let conn = self.lock_conn()?;
        let restored = db::remove_deleted_instance(&conn, instance_id)?;
        if restored {
            self.home.set_deleted_ids(db::get_deleted_instance_ids(&conn)?);
        }
        Ok(restored)
    }

    // ── Home view ───────────────────────────────────────────

    pub fn select_date(&self, date: chrono::NaiveDate) {
        self.home.select_date(date);
    }

    pub fn change_month(&self, month: YearMonth) {
        self.home.change_month(month);
    }

    pub fn subscribe(&self) -> watch::Receiver<HomeUiState> {
        self.home.subscribe()
    }

    pub fn snapshot(&self) -> HomeUiState {
        self.home.current()
    }

    pub fn today(&self) -> chrono::NaiveDate {
        self.clock.now().date_naive()
    }
}
