use std::sync::Mutex;

use chrono::{DateTime, Days, Local, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{is_active_on, ValidityWindow};
use crate::config::ALARM_HORIZON_DAYS;
use crate::models::{DoseSlot, MedicineDefinition};

// ═══════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════

/// Source of "now" for alarm resolution. The zone of the returned time is
/// the zone dose times are interpreted in.
pub trait Clock: Send + Sync {
    type Tz: TimeZone;

    fn now(&self) -> DateTime<Self::Tz>;
}

/// Device wall clock in the local zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually driven clock for deterministic resolution.
#[derive(Debug)]
pub struct FixedClock<Tz: TimeZone> {
    now: Mutex<DateTime<Tz>>,
}

impl<Tz: TimeZone> FixedClock<Tz> {
    pub fn new(now: DateTime<Tz>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Tz>) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }
}

impl<Tz> Clock for FixedClock<Tz>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Send + Sync,
{
    type Tz = Tz;

    fn now(&self) -> DateTime<Tz> {
        self.now
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

// ═══════════════════════════════════════════
// Next-alarm resolution
// ═══════════════════════════════════════════

/// The single next alarm of a medicine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAlarm {
    /// Absolute trigger instant.
    pub trigger_at: DateTime<Utc>,
    /// Wall-clock date and time the alarm was derived from.
    pub local_time: NaiveDateTime,
    pub dose: DoseSlot,
}

/// Resolve the next dose of `medicine` strictly after `now`.
///
/// Today is considered first (only doses later than `now`'s time of day),
/// then each of the next [`ALARM_HORIZON_DAYS`] days, where the earliest
/// dose of the first active day wins. Dose times are read in `now`'s zone.
/// Returns `None` when nothing qualifies inside the horizon; that is not an
/// error and callers should simply not schedule.
pub fn next_alarm<Tz: TimeZone>(medicine: &MedicineDefinition, now: &DateTime<Tz>) -> Option<NextAlarm> {
    let mut dose_times: Vec<(&DoseSlot, NaiveTime)> = medicine
        .doses
        .iter()
        .filter_map(|dose| match dose.time_of_day() {
            Some(time) => Some((dose, time)),
            None => {
                tracing::warn!(
                    medicine_id = %medicine.id,
                    dose_id = %dose.id,
                    time = %dose.time,
                    "Skipping dose with malformed time"
                );
                None
            }
        })
        .collect();
    dose_times.sort_by_key(|(_, time)| *time);

    let &(first_dose, first_time) = dose_times.first()?;
    let window = ValidityWindow::lenient(medicine);
    let tz = now.timezone();
    let local_now = now.naive_local();
    let today = local_now.date();
    let after = now.with_timezone(&Utc);

    if is_active_on(medicine, &window, today) {
        let later_today = dose_times
            .iter()
            .filter(|(_, time)| *time > local_now.time())
            .find_map(|&(dose, time)| localize(&tz, today.and_time(time), dose, after));
        if later_today.is_some() {
            return later_today;
        }
    }

    for offset in 1..=ALARM_HORIZON_DAYS {
        let Some(day) = today.checked_add_days(Days::new(offset)) else {
            break;
        };
        if is_active_on(medicine, &window, day) {
            if let Some(alarm) = localize(&tz, day.and_time(first_time), first_dose, after) {
                return Some(alarm);
            }
        }
    }

    None
}

/// Pin a wall-clock time to the first instant in `tz` strictly after
/// `after`. Ambiguous times (clocks going back) take the earlier occurrence
/// unless it has already passed; skipped times (clocks going forward) move
/// one hour later.
fn localize<Tz: TimeZone>(
    tz: &Tz,
    local: NaiveDateTime,
    dose: &DoseSlot,
    after: DateTime<Utc>,
) -> Option<NextAlarm> {
    let instant = match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => [first, second]
            .into_iter()
            .map(|t| t.with_timezone(&Utc))
            .find(|t| *t > after),
        LocalResult::None => local
            .checked_add_signed(chrono::Duration::hours(1))
            .and_then(|shifted| tz.from_local_datetime(&shifted).earliest())
            .map(|t| t.with_timezone(&Utc)),
    }
    .filter(|t| *t > after)?;

    Some(NextAlarm {
        trigger_at: instant,
        local_time: local,
        dose: dose.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActiveDays;
    use chrono::{FixedOffset, NaiveDate, Weekday};
    use chrono_tz::America::New_York;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn medicine(days: &[Weekday], end: Option<&str>, times: &[&str]) -> MedicineDefinition {
        MedicineDefinition {
            id: "med".into(),
            name: "Atorvastatin".into(),
            dosage: "1 Tablet".into(),
            doses: times
                .iter()
                .enumerate()
                .map(|(i, t)| DoseSlot {
                    id: format!("dose-{i}"),
                    time: (*t).into(),
                })
                .collect(),
            days: days.iter().copied().collect::<ActiveDays>(),
            start_date: "2024-01-01".into(),
            end_date: end.map(String::from),
        }
    }

    fn mwf() -> [Weekday; 3] {
        [Weekday::Mon, Weekday::Wed, Weekday::Fri]
    }

    #[test]
    fn later_dose_today_wins() {
        let med = medicine(&mwf(), None, &["09:00"]);
        // 2024-01-03 is a Wednesday
        let alarm = next_alarm(&med, &utc(2024, 1, 3, 8, 0)).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 1, 3, 9, 0));
        assert_eq!(alarm.dose.id, "dose-0");
    }

    #[test]
    fn after_last_dose_moves_to_next_active_day() {
        let med = medicine(&mwf(), None, &["09:00"]);
        let alarm = next_alarm(&med, &utc(2024, 1, 3, 10, 0)).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 1, 5, 9, 0));
    }

    #[test]
    fn dose_exactly_now_is_not_later() {
        let med = medicine(&mwf(), None, &["09:00"]);
        let alarm = next_alarm(&med, &utc(2024, 1, 3, 9, 0)).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 1, 5, 9, 0));
    }

    #[test]
    fn picks_earliest_remaining_slot_regardless_of_list_order() {
        let med = medicine(&mwf(), None, &["21:00", "13:00", "08:00"]);
        let alarm = next_alarm(&med, &utc(2024, 1, 3, 10, 0)).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 1, 3, 13, 0));
        assert_eq!(alarm.dose.id, "dose-1");

        // Future day: first slot of the day, not filtered by time of day.
        let alarm = next_alarm(&med, &utc(2024, 1, 3, 22, 0)).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 1, 5, 8, 0));
        assert_eq!(alarm.dose.id, "dose-2");
    }

    #[test]
    fn ended_medicine_has_no_alarm() {
        let med = medicine(&mwf(), Some("2024-01-02"), &["09:00"]);
        assert_eq!(next_alarm(&med, &utc(2024, 1, 3, 8, 0)), None);
    }

    #[test]
    fn end_date_today_still_fires_today() {
        let med = medicine(&mwf(), Some("2024-01-03"), &["09:00"]);
        let alarm = next_alarm(&med, &utc(2024, 1, 3, 8, 0)).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 1, 3, 9, 0));
        assert_eq!(next_alarm(&med, &utc(2024, 1, 3, 10, 0)), None);
    }

    #[test]
    fn future_start_inside_horizon() {
        let mut med = medicine(&[Weekday::Sat], None, &["07:30"]);
        med.start_date = "2024-01-06".into();
        let alarm = next_alarm(&med, &utc(2024, 1, 1, 12, 0)).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 1, 6, 7, 30));
    }

    #[test]
    fn start_beyond_horizon_has_no_alarm() {
        let mut med = medicine(&mwf(), None, &["09:00"]);
        med.start_date = "2024-02-01".into();
        assert_eq!(next_alarm(&med, &utc(2024, 1, 3, 8, 0)), None);
    }

    #[test]
    fn horizon_reaches_same_weekday_next_week() {
        let med = medicine(&[Weekday::Wed], None, &["09:00"]);
        let alarm = next_alarm(&med, &utc(2024, 1, 3, 10, 0)).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 1, 10, 9, 0));
    }

    #[test]
    fn no_doses_or_all_malformed_means_none() {
        let med = medicine(&mwf(), None, &[]);
        assert_eq!(next_alarm(&med, &utc(2024, 1, 3, 8, 0)), None);

        let med = medicine(&mwf(), None, &["morning", "25:99"]);
        assert_eq!(next_alarm(&med, &utc(2024, 1, 3, 8, 0)), None);
    }

    #[test]
    fn malformed_slot_dropped_others_used() {
        let med = medicine(&mwf(), None, &["bogus", "18:00"]);
        let alarm = next_alarm(&med, &utc(2024, 1, 3, 8, 0)).unwrap();
        assert_eq!(alarm.dose.id, "dose-1");
    }

    #[test]
    fn malformed_start_never_fires_malformed_end_never_ends() {
        let mut med = medicine(&mwf(), None, &["09:00"]);
        med.start_date = "garbage".into();
        assert_eq!(next_alarm(&med, &utc(2024, 1, 3, 8, 0)), None);

        let med = medicine(&mwf(), Some("garbage"), &["09:00"]);
        assert!(next_alarm(&med, &utc(2030, 1, 2, 8, 0)).is_some());
    }

    #[test]
    fn no_weekdays_means_none() {
        let med = medicine(&[], None, &["09:00"]);
        assert_eq!(next_alarm(&med, &utc(2024, 1, 3, 8, 0)), None);
    }

    #[test]
    fn dose_time_read_in_callers_zone() {
        let med = medicine(&mwf(), None, &["09:00"]);
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = plus_two.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap();
        let alarm = next_alarm(&med, &now).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 1, 3, 7, 0));
        assert_eq!(
            alarm.local_time,
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap().and_hms_opt(9, 0, 0).unwrap()
        );
    }

    fn every_day() -> [Weekday; 7] {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
    }

    fn new_york(utc_now: DateTime<Utc>) -> DateTime<chrono_tz::Tz> {
        utc_now.with_timezone(&New_York)
    }

    #[test]
    fn spring_forward_gap_moves_one_hour_later() {
        let med = medicine(&every_day(), None, &["02:30"]);
        // 2024-03-10 01:00 EST; 02:00-03:00 does not exist that night
        let alarm = next_alarm(&med, &new_york(utc(2024, 3, 10, 6, 0))).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 3, 10, 7, 30));
        assert_eq!(
            alarm.local_time,
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap().and_hms_opt(2, 30, 0).unwrap()
        );
    }

    #[test]
    fn fall_back_takes_first_occurrence_when_still_ahead() {
        let med = medicine(&every_day(), None, &["01:45"]);
        // 2024-11-03 01:00 EDT, before the first 01:45
        let alarm = next_alarm(&med, &new_york(utc(2024, 11, 3, 5, 0))).unwrap();
        assert_eq!(alarm.trigger_at, utc(2024, 11, 3, 5, 45));
    }

    #[test]
    fn fall_back_uses_second_occurrence_once_first_has_passed() {
        let med = medicine(&every_day(), None, &["01:45"]);
        // 01:30 EST, the repeated hour; 01:45 EDT is already behind us
        let now = utc(2024, 11, 3, 6, 30);
        let alarm = next_alarm(&med, &new_york(now)).unwrap();
        assert!(alarm.trigger_at > now);
        assert_eq!(alarm.trigger_at, utc(2024, 11, 3, 6, 45));
    }

    #[test]
    fn fall_back_never_returns_a_past_instant() {
        let med = medicine(&every_day(), None, &["00:30", "01:15", "01:45", "09:00"]);
        let start = utc(2024, 11, 3, 3, 0);
        for step in 0..(6 * 12) {
            let now = start + chrono::Duration::minutes(5 * step);
            let alarm = next_alarm(&med, &new_york(now)).unwrap();
            assert!(alarm.trigger_at > now, "past trigger at {now}");
        }
    }

    #[test]
    fn resolution_is_monotonic_in_now() {
        let med = medicine(&mwf(), None, &["09:00", "20:00"]);
        let mut previous: Option<DateTime<Utc>> = None;
        let start = utc(2024, 1, 1, 0, 0);
        for step in 0..(7 * 24 * 4) {
            let now = start + chrono::Duration::minutes(15 * step);
            let trigger = next_alarm(&med, &now).unwrap().trigger_at;
            assert!(trigger > now);
            if let Some(prev) = previous {
                assert!(trigger >= prev || prev <= now, "regressed at {now}");
            }
            previous = Some(trigger);
        }
    }

    #[test]
    fn fixed_clock_can_be_moved() {
        let clock = FixedClock::new(utc(2024, 1, 1, 0, 0));
        assert_eq!(clock.now(), utc(2024, 1, 1, 0, 0));
        clock.set(utc(2024, 6, 1, 12, 0));
        assert_eq!(clock.now(), utc(2024, 6, 1, 12, 0));
    }
}
