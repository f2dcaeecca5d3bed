use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_models::{
    parse_weekday, AppointmentMedium, Frequency, OwnerRef, Slot, SlotStatus, WeekdaySet,
};

use crate::error::AvailabilityError;
use crate::models::PatternSpec;

/// A validated, normalized recurrence. Two rules built from equivalent
/// input (weekdays in any order, duplicates, `HH:mm` vs `HH:mm:ss`) compare
/// equal and produce the same canonical string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub weekdays: WeekdaySet,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i64,
}

impl RecurrenceRule {
    /// Inclusive date window. Without an end date the rule covers only its
    /// start date.
    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        (self.start_date, self.end_date.unwrap_or(self.start_date))
    }

    /// Dates the rule fires on, ascending.
    pub fn occurrences(&self) -> Vec<NaiveDate> {
        let (from, to) = self.window();
        let candidates: Vec<NaiveDate> = match self.frequency {
            Frequency::Daily | Frequency::Weekly => from.iter_days().take_while(|d| *d <= to).collect(),
            Frequency::Monthly => {
                let day = from.day();
                month_starts(from, to)
                    .filter_map(|(year, month)| NaiveDate::from_ymd_opt(year, month, day))
                    .collect()
            }
            Frequency::Yearly => (from.year()..=to.year())
                .filter_map(|year| NaiveDate::from_ymd_opt(year, from.month(), from.day()))
                .collect(),
        };

        candidates
            .into_iter()
            .filter(|date| *date >= from && *date <= to)
            .filter(|date| self.weekdays.contains(date.weekday()))
            .collect()
    }

    /// Back-to-back `[t, t + duration)` intervals inside the daily window.
    /// A trailing remainder shorter than the duration is dropped.
    pub fn intervals_on(&self, date: NaiveDate) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        let step = Duration::minutes(self.duration_minutes);
        let day_end = date.and_time(self.end_time).and_utc();
        let mut cursor = date.and_time(self.start_time).and_utc();
        let mut intervals = Vec::new();

        while cursor + step <= day_end {
            intervals.push((cursor, cursor + step));
            cursor += step;
        }
        intervals
    }

    /// Every slot the rule describes, before reconciliation against storage.
    pub fn candidate_slots(
        &self,
        owner: OwnerRef,
        pattern_id: Uuid,
        medium: AppointmentMedium,
        created_at: DateTime<Utc>,
    ) -> Vec<Slot> {
        self.occurrences()
            .into_iter()
            .flat_map(|date| {
                self.intervals_on(date)
                    .into_iter()
                    .map(move |(starts_at, ends_at)| Slot {
                        id: Uuid::new_v4(),
                        owner,
                        pattern_id,
                        date,
                        starts_at,
                        ends_at,
                        status: SlotStatus::Available,
                        medium,
                        created_at,
                    })
            })
            .collect()
    }

    /// RRULE-like canonical form, e.g.
    /// `FREQ=WEEKLY;BYDAY=MO,WE,FR;DTSTART=20250106;UNTIL=20250117;WINDOW=0900-1100;DURATION=PT45M`.
    pub fn canonical(&self) -> String {
        let mut parts = vec![
            format!("FREQ={}", self.frequency.rrule_name()),
            format!("BYDAY={}", self.weekdays.rrule_codes()),
            format!("DTSTART={}", self.start_date.format("%Y%m%d")),
        ];
        if let Some(end) = self.end_date {
            parts.push(format!("UNTIL={}", end.format("%Y%m%d")));
        }
        parts.push(format!(
            "WINDOW={}-{}",
            compact_time(self.start_time),
            compact_time(self.end_time)
        ));
        parts.push(format!("DURATION=PT{}M", self.duration_minutes));
        parts.join(";")
    }

    /// SHA-256 of the canonical form, hex encoded.
    pub fn fingerprint(&self) -> String {
        Sha256::digest(self.canonical().as_bytes())
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    pub fn describe(&self) -> String {
        let days = self
            .weekdays
            .iter()
            .map(|day| day.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let every_day = self.weekdays.len() == 7;

        let cadence = match self.frequency {
            Frequency::Weekly if every_day => "Every day".to_string(),
            Frequency::Weekly => format!("Every {}", days),
            Frequency::Daily if every_day => "Daily".to_string(),
            Frequency::Daily => format!("Daily on {}", days),
            Frequency::Monthly if every_day => format!("Monthly on day {}", self.start_date.day()),
            Frequency::Monthly => format!(
                "Monthly on day {} when it falls on {}",
                self.start_date.day(),
                days
            ),
            Frequency::Yearly if every_day => format!("Yearly on {}", self.start_date.format("%b %-d")),
            Frequency::Yearly => format!(
                "Yearly on {} when it falls on {}",
                self.start_date.format("%b %-d"),
                days
            ),
        };

        let span = match self.end_date {
            Some(end) => format!(
                "starting {} through {}",
                self.start_date.format("%b %-d %Y"),
                end.format("%b %-d %Y")
            ),
            None => format!("on {} only", self.start_date.format("%b %-d %Y")),
        };

        format!(
            "{} from {} to {}, {}",
            cadence,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M"),
            span
        )
    }
}

fn compact_time(time: NaiveTime) -> String {
    if time.second() == 0 {
        time.format("%H%M").to_string()
    } else {
        time.format("%H%M%S").to_string()
    }
}

/// `(year, month)` pairs from the month of `from` through the month of `to`.
fn month_starts(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = (i32, u32)> {
    let first = from.year() * 12 + from.month0() as i32;
    let last = to.year() * 12 + to.month0() as i32;
    (first..=last).map(|index| (index.div_euclid(12), index.rem_euclid(12) as u32 + 1))
}

fn parse_time(field: &'static str, raw: &str) -> Result<NaiveTime, AvailabilityError> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| AvailabilityError::invalid(field, format!("'{}' is not a valid HH:mm time", raw)))
}

/// The compiled form of a pattern plus the derived strings stored with it.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: RecurrenceRule,
    pub canonical: String,
    pub fingerprint: String,
    pub description: String,
    pub occurrences: Vec<NaiveDate>,
}

/// Turns a declarative [`PatternSpec`] into a [`RecurrenceRule`]. Pure and
/// deterministic; no I/O.
#[derive(Debug, Clone)]
pub struct RecurrenceRuleCompiler {
    config: SchedulingConfig,
}

impl RecurrenceRuleCompiler {
    pub fn new(config: &SchedulingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn compile(&self, spec: &PatternSpec) -> Result<CompiledRule, AvailabilityError> {
        debug!(
            "Compiling {:?} pattern {:?} {}-{} from {}",
            spec.frequency, spec.weekdays, spec.start_time, spec.end_time, spec.start_date
        );

        let weekdays = spec
            .weekdays
            .iter()
            .map(|raw| parse_weekday(raw))
            .collect::<Result<WeekdaySet, String>>()
            .map_err(|reason| AvailabilityError::invalid("weekdays", reason))?;
        if weekdays.is_empty() {
            return Err(AvailabilityError::invalid("weekdays", "At least one weekday is required"));
        }

        let start_time = parse_time("start_time", &spec.start_time)?;
        let end_time = parse_time("end_time", &spec.end_time)?;
        if start_time >= end_time {
            return Err(AvailabilityError::invalid(
                "end_time",
                format!("End time {} must be after start time {}", end_time, start_time),
            ));
        }

        if let Some(end_date) = spec.end_date {
            if end_date < spec.start_date {
                return Err(AvailabilityError::invalid(
                    "end_date",
                    format!("End date {} is before start date {}", end_date, spec.start_date),
                ));
            }
            let span = (end_date - spec.start_date).num_days();
            if span > self.config.max_pattern_range_days {
                return Err(AvailabilityError::invalid(
                    "end_date",
                    format!(
                        "Pattern window of {} days exceeds the maximum of {}",
                        span, self.config.max_pattern_range_days
                    ),
                ));
            }
        }

        let duration_minutes = self.resolve_duration(spec.duration_minutes, start_time, end_time)?;

        let rule = RecurrenceRule {
            weekdays,
            frequency: spec.frequency,
            start_date: spec.start_date,
            end_date: spec.end_date,
            start_time,
            end_time,
            duration_minutes,
        };

        let occurrences = rule.occurrences();
        if occurrences.is_empty() && self.config.reject_empty_recurrence {
            return Err(AvailabilityError::invalid(
                "start_date",
                "No date in the pattern window matches the selected weekdays",
            ));
        }

        let per_day = ((end_time - start_time).num_minutes() / duration_minutes) as usize;
        let slot_count = occurrences.len().saturating_mul(per_day);
        if slot_count > self.config.max_pattern_slots {
            return Err(AvailabilityError::invalid(
                "end_date",
                format!(
                    "Pattern would create {} slots, more than the maximum of {}",
                    slot_count, self.config.max_pattern_slots
                ),
            ));
        }

        Ok(CompiledRule {
            canonical: rule.canonical(),
            fingerprint: rule.fingerprint(),
            description: rule.describe(),
            occurrences,
            rule,
        })
    }

    fn resolve_duration(
        &self,
        requested: Option<i64>,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<i64, AvailabilityError> {
        let fixed = self.config.slot_duration_minutes;
        let duration = requested.unwrap_or(fixed);

        if duration <= 0 {
            return Err(AvailabilityError::invalid("duration", "Slot duration must be positive"));
        }
        if duration != fixed && !self.config.allow_custom_slot_duration {
            return Err(AvailabilityError::invalid(
                "duration",
                format!("Slot duration is fixed at {} minutes", fixed),
            ));
        }

        let window = (end_time - start_time).num_minutes();
        if duration > window {
            return Err(AvailabilityError::invalid(
                "duration",
                format!("Slot duration of {} minutes exceeds the {} minute window", duration, window),
            ));
        }

        Ok(duration)
    }
}
