use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Storage format for start/end dates (ISO-8601 calendar date).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DOSE_TIME_FORMATS: [&str; 3] = ["%H:%M", "%H:%M:%S", "%H:%M:%S%.f"];

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

// ═══════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════

/// Rejected medicine input. Raised on the write path only; the scheduling
/// algorithms tolerate malformed persisted data instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Medicine name is required")]
    EmptyName,

    #[error("Invalid start date: {0}")]
    InvalidStartDate(String),

    #[error("Invalid end date: {0}")]
    InvalidEndDate(String),

    #[error("End date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("Invalid time '{time}' for dose {dose_id}")]
    InvalidDoseTime { dose_id: String, time: String },

    #[error("Duplicate dose id: {0}")]
    DuplicateDoseId(String),

    #[error("Incomplete form: {0}")]
    IncompleteForm(&'static str),
}

// ═══════════════════════════════════════════
// Active weekdays
// ═══════════════════════════════════════════

/// Set of weekdays on which a medicine is taken. One bit per day, Monday first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct ActiveDays(u8);

fn day_bit(day: Weekday) -> u8 {
    1 << day.num_days_from_monday()
}

impl ActiveDays {
    pub const NONE: Self = Self(0);
    pub const EVERY_DAY: Self = Self(0b111_1111);

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & day_bit(day) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= day_bit(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !day_bit(day);
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Active days in calendar order, Monday first.
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        ALL_WEEKDAYS.into_iter().filter(move |d| self.contains(*d))
    }

    /// Comma-separated short names, e.g. `Mon,Wed,Fri`.
    pub fn to_storage(self) -> String {
        self.iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Inverse of [`ActiveDays::to_storage`]. Unknown tokens are dropped.
    pub fn from_storage(raw: &str) -> Self {
        raw.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .filter_map(|token| match token.parse::<Weekday>() {
                Ok(day) => Some(day),
                Err(_) => {
                    tracing::warn!(token, "Ignoring unknown weekday in stored schedule");
                    None
                }
            })
            .collect()
    }
}

impl FromIterator<Weekday> for ActiveDays {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut days = Self::NONE;
        for day in iter {
            days.insert(day);
        }
        days
    }
}

impl From<Vec<Weekday>> for ActiveDays {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<ActiveDays> for Vec<Weekday> {
    fn from(days: ActiveDays) -> Self {
        days.iter().collect()
    }
}

// ═══════════════════════════════════════════
// Dose slots
// ═══════════════════════════════════════════

/// One scheduled time-of-day within a medicine definition.
///
/// The time is kept as the stored string (`HH:MM` or `HH:MM:SS`, device-local
/// wall clock) so a malformed persisted value can be skipped at resolution
/// time instead of failing the whole load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DoseSlot {
    pub id: String,
    pub time: String,
}

impl DoseSlot {
    pub fn new(time: NaiveTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            time: format_dose_time(time),
        }
    }

    pub fn time_of_day(&self) -> Option<NaiveTime> {
        parse_dose_time(&self.time)
    }
}

/// Parse a stored dose time. Accepts `HH:MM`, `HH:MM:SS` and fractional seconds.
pub fn parse_dose_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    DOSE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
}

/// Format a dose time the way it is stored: seconds only when non-zero.
pub fn format_dose_time(time: NaiveTime) -> String {
    if time.second() == 0 && time.nanosecond() == 0 {
        time.format("%H:%M").to_string()
    } else {
        time.format("%H:%M:%S").to_string()
    }
}

/// Parse a stored calendar date (`YYYY-MM-DD`).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

// ═══════════════════════════════════════════
// Medicine definition
// ═══════════════════════════════════════════

/// A recurring (or one-off) medicine rule: what to take, when, and for how long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineDefinition {
    pub id: String,
    pub name: String,
    /// Free-text dosage label, e.g. "2 Tablet".
    pub dosage: String,
    pub doses: Vec<DoseSlot>,
    pub days: ActiveDays,
    /// Inclusive, `YYYY-MM-DD`.
    pub start_date: String,
    /// Inclusive, `YYYY-MM-DD`; `None` means open-ended.
    pub end_date: Option<String>,
}

impl MedicineDefinition {
    pub fn new(
        name: impl Into<String>,
        dosage: impl Into<String>,
        doses: Vec<DoseSlot>,
        days: ActiveDays,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            dosage: dosage.into(),
            doses,
            days,
            start_date: start_date.format(DATE_FORMAT).to_string(),
            end_date: end_date.map(|d| d.format(DATE_FORMAT).to_string()),
        }
    }

    pub fn dose(&self, dose_id: &str) -> Option<&DoseSlot> {
        self.doses.iter().find(|d| d.id == dose_id)
    }

    /// Check the definition before it is persisted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }

        let start = parse_date(&self.start_date)
            .ok_or_else(|| ValidationError::InvalidStartDate(self.start_date.clone()))?;

        if let Some(raw_end) = &self.end_date {
            let end =
                parse_date(raw_end).ok_or_else(|| ValidationError::InvalidEndDate(raw_end.clone()))?;
            if end < start {
                return Err(ValidationError::EndBeforeStart { start, end });
            }
        }

        let mut seen = HashSet::new();
        for dose in &self.doses {
            if dose.time_of_day().is_none() {
                return Err(ValidationError::InvalidDoseTime {
                    dose_id: dose.id.clone(),
                    time: dose.time.clone(),
                });
            }
            if !seen.insert(dose.id.as_str()) {
                return Err(ValidationError::DuplicateDoseId(dose.id.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn sample() -> MedicineDefinition {
        MedicineDefinition::new(
            "Metformin",
            "1 Tablet",
            vec![DoseSlot::new(time(9, 0)), DoseSlot::new(time(21, 0))],
            [Weekday::Mon, Weekday::Wed, Weekday::Fri].into_iter().collect(),
            date(2024, 1, 1),
            None,
        )
    }

    #[test]
    fn active_days_membership() {
        let days: ActiveDays = [Weekday::Mon, Weekday::Fri].into_iter().collect();
        assert!(days.contains(Weekday::Mon));
        assert!(days.contains(Weekday::Fri));
        assert!(!days.contains(Weekday::Sun));
        assert_eq!(days.len(), 2);
        assert!(ActiveDays::NONE.is_empty());
        assert_eq!(ActiveDays::EVERY_DAY.len(), 7);
    }

    #[test]
    fn active_days_insert_is_idempotent() {
        let mut days = ActiveDays::NONE;
        days.insert(Weekday::Tue);
        days.insert(Weekday::Tue);
        assert_eq!(days.len(), 1);
        days.remove(Weekday::Tue);
        assert!(days.is_empty());
    }

    #[test]
    fn active_days_storage_string() {
        let days: ActiveDays = [Weekday::Fri, Weekday::Mon, Weekday::Wed].into_iter().collect();
        assert_eq!(days.to_storage(), "Mon,Wed,Fri");
        assert_eq!(ActiveDays::from_storage("Mon,Wed,Fri"), days);
    }

    #[test]
    fn active_days_storage_skips_unknown_tokens() {
        let days = ActiveDays::from_storage("monday, Funday,,SUN");
        assert_eq!(days.iter().collect::<Vec<_>>(), vec![Weekday::Mon, Weekday::Sun]);
    }

    #[test]
    fn active_days_serialize_as_weekday_list() {
        let days: ActiveDays = [Weekday::Sat, Weekday::Sun].into_iter().collect();
        let json = serde_json::to_string(&days).unwrap();
        assert_eq!(json, r#"["Sat","Sun"]"#);
        let back: ActiveDays = serde_json::from_str(&json).unwrap();
        assert_eq!(back, days);
    }

    #[test]
    fn dose_time_accepts_seconds_and_fractions() {
        assert_eq!(parse_dose_time("09:00"), Some(time(9, 0)));
        assert_eq!(
            parse_dose_time("09:00:30"),
            NaiveTime::from_hms_opt(9, 0, 30)
        );
        assert!(parse_dose_time("09:00:30.250").is_some());
        assert_eq!(parse_dose_time("noon"), None);
        assert_eq!(parse_dose_time("25:00"), None);
    }

    #[test]
    fn dose_time_format_drops_zero_seconds() {
        assert_eq!(format_dose_time(time(7, 5)), "07:05");
        assert_eq!(
            format_dose_time(NaiveTime::from_hms_opt(7, 5, 9).unwrap()),
            "07:05:09"
        );
    }

    #[test]
    fn new_definition_formats_dates() {
        let med = sample();
        assert_eq!(med.start_date, "2024-01-01");
        assert_eq!(med.end_date, None);
        assert_eq!(med.doses[0].time, "09:00");
        assert!(med.validate().is_ok());
    }

    #[test]
    fn dose_lookup_by_id() {
        let med = sample();
        let second = med.doses[1].id.clone();
        assert_eq!(med.dose(&second).map(|d| d.time.as_str()), Some("21:00"));
        assert!(med.dose("missing").is_none());
    }

    #[test]
    fn validate_rejects_blank_name() {
        let mut med = sample();
        med.name = "   ".into();
        assert_eq!(med.validate(), Err(ValidationError::EmptyName));
    }

    #[test]
    fn validate_rejects_end_before_start() {
        let mut med = sample();
        med.end_date = Some("2023-12-31".into());
        assert_eq!(
            med.validate(),
            Err(ValidationError::EndBeforeStart {
                start: date(2024, 1, 1),
                end: date(2023, 12, 31),
            })
        );
    }

    #[test]
    fn validate_accepts_single_day_window() {
        let mut med = sample();
        med.end_date = Some("2024-01-01".into());
        assert!(med.validate().is_ok());
    }

    #[test]
    fn validate_rejects_malformed_dates() {
        let mut med = sample();
        med.start_date = "01/01/2024".into();
        assert!(matches!(med.validate(), Err(ValidationError::InvalidStartDate(_))));

        let mut med = sample();
        med.end_date = Some("never".into());
        assert!(matches!(med.validate(), Err(ValidationError::InvalidEndDate(_))));
    }

    #[test]
    fn validate_rejects_bad_dose_time_and_duplicates() {
        let mut med = sample();
        med.doses[0].time = "9am".into();
        assert!(matches!(med.validate(), Err(ValidationError::InvalidDoseTime { .. })));

        let mut med = sample();
        med.doses[1].id = med.doses[0].id.clone();
        assert!(matches!(med.validate(), Err(ValidationError::DuplicateDoseId(_))));
    }
}
