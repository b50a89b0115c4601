use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Days, NaiveDate};

use super::{is_active_on, ValidityWindow, YearMonth};
use crate::config::EXPANSION_PADDING_DAYS;
use crate::models::enums::DoseStatus;
use crate::models::{dose_status_key, instance_id, MedicineDefinition, ReminderInstance};

/// Reminder instances grouped by date, ascending. Dates without instances are absent.
pub type RemindersByDate = BTreeMap<NaiveDate, Vec<ReminderInstance>>;

/// Dates expanded for `month`: the month itself plus
/// [`EXPANSION_PADDING_DAYS`] on each side, inclusive.
pub fn expansion_window(month: YearMonth) -> (NaiveDate, NaiveDate) {
    let pad = Days::new(EXPANSION_PADDING_DAYS);
    let from = month
        .first_day()
        .checked_sub_days(pad)
        .unwrap_or(NaiveDate::MIN);
    let to = month
        .last_day()
        .checked_add_days(pad)
        .unwrap_or(NaiveDate::MAX);
    (from, to)
}

/// Build the reminder instance of `medicine` on `date`, resolving every dose
/// slot against `status_lookup` (keyed `{instance_id}-{dose_id}`).
pub fn materialize(
    medicine: &MedicineDefinition,
    date: NaiveDate,
    status_lookup: &HashMap<String, DoseStatus>,
) -> ReminderInstance {
    let instance_id = instance_id(&medicine.id, date);
    let dose_statuses = medicine
        .doses
        .iter()
        .map(|dose| {
            let status = status_lookup
                .get(&dose_status_key(&instance_id, &dose.id))
                .copied()
                .unwrap_or_default();
            (dose.id.clone(), status)
        })
        .collect();

    ReminderInstance {
        instance_id,
        date,
        medicine: medicine.clone(),
        dose_statuses,
    }
}

/// Expand every definition over the padded window of `month`, without
/// looking at soft deletions. Definitions with malformed dates are skipped.
pub fn expand_window(
    definitions: &[MedicineDefinition],
    status_lookup: &HashMap<String, DoseStatus>,
    month: YearMonth,
) -> RemindersByDate {
    let parsed: Vec<(&MedicineDefinition, ValidityWindow)> = definitions
        .iter()
        .filter_map(|medicine| match ValidityWindow::parse(medicine) {
            Some(window) => Some((medicine, window)),
            None => {
                tracing::warn!(
                    medicine_id = %medicine.id,
                    start_date = %medicine.start_date,
                    end_date = ?medicine.end_date,
                    "Skipping medicine with malformed dates"
                );
                None
            }
        })
        .collect();

    let (from, to) = expansion_window(month);
    let mut reminders = RemindersByDate::new();

    for date in from.iter_days().take_while(|d| *d <= to) {
        let instances: Vec<ReminderInstance> = parsed
            .iter()
            .filter(|(medicine, window)| is_active_on(medicine, window, date))
            .map(|(medicine, _)| materialize(medicine, date, status_lookup))
            .collect();

        if !instances.is_empty() {
            reminders.insert(date, instances);
        }
    }

    reminders
}

/// Drop soft-deleted instances, then any date left without instances.
pub fn exclude_deleted(reminders: RemindersByDate, deleted_ids: &HashSet<String>) -> RemindersByDate {
    if deleted_ids.is_empty() {
        return reminders;
    }

    reminders
        .into_iter()
        .filter_map(|(date, mut instances)| {
            instances.retain(|inst| !deleted_ids.contains(&inst.instance_id));
            (!instances.is_empty()).then_some((date, instances))
        })
        .collect()
}

/// Reminder instances for the calendar around `month`: expansion followed
/// by the soft-deletion pass.
pub fn expand(
    definitions: &[MedicineDefinition],
    status_lookup: &HashMap<String, DoseStatus>,
    deleted_ids: &HashSet<String>,
    month: YearMonth,
) -> RemindersByDate {
    let reminders = exclude_deleted(expand_window(definitions, status_lookup, month), deleted_ids);
    tracing::debug!(
        month = %month,
        definitions = definitions.len(),
        dates = reminders.len(),
        "Expanded reminder window"
    );
    reminders
}
