use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// OWNERS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    #[serde(alias = "Doctor")]
    Doctor,
    #[serde(alias = "Organization", alias = "hospital", alias = "Hospital")]
    Organization,
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKind::Doctor => write!(f, "doctor"),
            OwnerKind::Organization => write!(f, "organization"),
        }
    }
}

/// The provider a pattern, slot or appointment belongs to. Owner ids are
/// unique across kinds, so lookups key on `id` alone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: Uuid,
}

impl OwnerRef {
    pub fn doctor(id: Uuid) -> Self {
        Self { kind: OwnerKind::Doctor, id }
    }

    pub fn organization(id: Uuid) -> Self {
        Self { kind: OwnerKind::Organization, id }
    }
}

// ==============================================================================
// PATTERN VOCABULARY
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[serde(alias = "Daily", alias = "DAILY")]
    Daily,
    #[serde(alias = "Weekly", alias = "WEEKLY")]
    Weekly,
    #[serde(alias = "Monthly", alias = "MONTHLY")]
    Monthly,
    #[serde(alias = "Yearly", alias = "YEARLY")]
    Yearly,
}

impl Frequency {
    pub fn rrule_name(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentMedium {
    #[serde(alias = "Virtual", alias = "online")]
    Virtual,
    #[serde(alias = "InPerson", alias = "in-person", alias = "physical")]
    InPerson,
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Set of weekdays stored as a bitmask (bit 0 = Monday). Iteration order is
/// always Monday through Sunday, whatever order the days were inserted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEK.iter().copied().filter(move |day| self.contains(*day))
    }

    /// RFC 5545 two-letter codes, e.g. `MO,WE,FR`.
    pub fn rrule_codes(&self) -> String {
        self.iter()
            .map(|day| match day {
                Weekday::Mon => "MO",
                Weekday::Tue => "TU",
                Weekday::Wed => "WE",
                Weekday::Thu => "TH",
                Weekday::Fri => "FR",
                Weekday::Sat => "SA",
                Weekday::Sun => "SU",
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl TryFrom<Vec<String>> for WeekdaySet {
    type Error = String;

    fn try_from(days: Vec<String>) -> Result<Self, Self::Error> {
        days.iter().map(|raw| parse_weekday(raw)).collect()
    }
}

impl From<WeekdaySet> for Vec<String> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().map(|day| day.to_string()).collect()
    }
}

/// Accepts `Mon`, `monday`, and the RFC 5545 `MO` forms.
pub fn parse_weekday(raw: &str) -> Result<Weekday, String> {
    let trimmed = raw.trim();
    match trimmed.to_ascii_uppercase().as_str() {
        "MO" => return Ok(Weekday::Mon),
        "TU" => return Ok(Weekday::Tue),
        "WE" => return Ok(Weekday::Wed),
        "TH" => return Ok(Weekday::Thu),
        "FR" => return Ok(Weekday::Fri),
        "SA" => return Ok(Weekday::Sat),
        "SU" => return Ok(Weekday::Sun),
        _ => {}
    }
    Weekday::from_str(trimmed).map_err(|_| format!("unknown weekday '{}'", raw))
}

// ==============================================================================
// PATTERNS AND SLOTS
// ==============================================================================

/// A provider's declared recurring availability. Never edited after
/// creation; a new pattern supersedes or extends an old one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotPattern {
    pub id: Uuid,
    pub owner: OwnerRef,
    pub weekdays: WeekdaySet,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i64,
    pub medium: AppointmentMedium,
    /// Canonical recurrence rule string the pattern compiled to.
    pub rule: String,
    pub fingerprint: String,
    pub description: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    #[serde(alias = "Available")]
    Available,
    #[serde(alias = "Booked")]
    Booked,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Available => write!(f, "available"),
            SlotStatus::Booked => write!(f, "booked"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: Uuid,
    pub owner: OwnerRef,
    pub pattern_id: Uuid,
    pub date: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: SlotStatus,
    pub medium: AppointmentMedium,
    pub created_at: DateTime<Utc>,
}

impl Slot {
    /// Half-open interval overlap: a slot ending at 09:45 does not overlap
    /// one starting at 09:45.
    pub fn overlaps(&self, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        self.starts_at < ends_at && starts_at < self.ends_at
    }
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "Accepted")]
    Accepted,
    #[serde(alias = "Declined")]
    Declined,
    #[serde(alias = "Cancelled")]
    Cancelled,
    #[serde(alias = "Completed")]
    Completed,
}

impl AppointmentStatus {
    /// Active appointments occupy their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Accepted)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Accepted => write!(f, "accepted"),
            AppointmentStatus::Declined => write!(f, "declined"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub owner: OwnerRef,
    pub patient_id: Uuid,
    pub status: AppointmentStatus,
    pub reason: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_weekday_set_orders_monday_first() {
        let set: WeekdaySet = [Weekday::Fri, Weekday::Mon, Weekday::Wed, Weekday::Mon]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
        assert_eq!(set.rrule_codes(), "MO,WE,FR");
    }

    #[test]
    fn test_weekday_set_serde() {
        let set: WeekdaySet = serde_json::from_str(r#"["friday", "MO", "Wed"]"#).unwrap();
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["Mon","Wed","Fri"]"#);

        let bad = serde_json::from_str::<WeekdaySet>(r#"["Funday"]"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_slot_overlap_is_half_open() {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 6, 9, 45, 0).unwrap();
        let slot = Slot {
            id: Uuid::new_v4(),
            owner: OwnerRef::doctor(Uuid::new_v4()),
            pattern_id: Uuid::new_v4(),
            date: start.date_naive(),
            starts_at: start,
            ends_at: end,
            status: SlotStatus::Available,
            medium: AppointmentMedium::InPerson,
            created_at: Utc::now(),
        };

        let later = Utc.with_ymd_and_hms(2025, 1, 6, 10, 30, 0).unwrap();
        assert!(!slot.overlaps(end, later));
        assert!(slot.overlaps(start + chrono::Duration::minutes(30), later));
    }

    #[test]
    fn test_active_statuses() {
        assert!(AppointmentStatus::Pending.is_active());
        assert!(AppointmentStatus::Accepted.is_active());
        assert!(!AppointmentStatus::Declined.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
        assert!(!AppointmentStatus::Completed.is_active());
    }
}
