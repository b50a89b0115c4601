//! Medicine entry form.
//!
//! Collects what the add/edit screen asks for and turns it into a
//! `MedicineDefinition`. A one-time reminder is an ordinary definition that
//! runs on today's weekday and ends today.

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::models::enums::DoseForm;
use crate::models::{ActiveDays, DoseSlot, MedicineDefinition, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineForm {
    pub name: String,
    pub dose_quantity: u32,
    pub dose_form: DoseForm,
    pub times: Vec<NaiveTime>,
    pub days: ActiveDays,
    pub one_time: bool,
}

impl Default for MedicineForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            dose_quantity: 1,
            dose_form: DoseForm::Tablet,
            times: Vec::new(),
            days: ActiveDays::NONE,
            one_time: false,
        }
    }
}

impl MedicineForm {
    /// Whether the save button should be enabled.
    pub fn is_complete(&self) -> bool {
        self.missing_field().is_none()
    }

    fn missing_field(&self) -> Option<&'static str> {
        if self.name.trim().is_empty() {
            Some("name")
        } else if self.dose_quantity == 0 {
            Some("dose quantity")
        } else if self.times.is_empty() {
            Some("dose times")
        } else if self.days.is_empty() && !self.one_time {
            Some("days")
        } else {
            None
        }
    }

    /// Display dosage, e.g. `"2 Tablet"`.
    pub fn dosage(&self) -> String {
        format!("{} {}", self.dose_quantity, self.dose_form)
    }

    /// Build a new definition starting `today`, with fresh ids for the
    /// medicine and every dose slot.
    pub fn into_definition(self, today: NaiveDate) -> Result<MedicineDefinition, ValidationError> {
        if let Some(field) = self.missing_field() {
            return Err(ValidationError::IncompleteForm(field));
        }

        let dosage = self.dosage();
        let mut times = self.times;
        times.sort();
        times.dedup();
        let doses = times.into_iter().map(DoseSlot::new).collect();

        let (days, end_date) = if self.one_time {
            (std::iter::once(today.weekday()).collect::<ActiveDays>(), Some(today))
        } else {
            (self.days, None)
        };

        let definition = MedicineDefinition::new(
            self.name.trim(),
            dosage,
            doses,
            days,
            today,
            end_date,
        );
        definition.validate()?;
        Ok(definition)
    }
}
