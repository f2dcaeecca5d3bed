use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate};
use tracing::debug;
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_database::{retry_transient, SchedulingStore, SlotKey, SlotQuery};
use shared_models::{Slot, SlotStatus};

use crate::error::AvailabilityError;
use crate::models::{DatePage, DaySlots, SlotPage, SlotView};
use crate::services::cursor::{decode_cursor, encode_cursor};

/// Read path over materialized slots. Queries the store directly; there is
/// no cache to invalidate when a booking lands.
pub struct AvailabilityIndex {
    store: Arc<dyn SchedulingStore>,
    config: SchedulingConfig,
}

impl AvailabilityIndex {
    pub fn new(store: Arc<dyn SchedulingStore>, config: &SchedulingConfig) -> Self {
        Self {
            store,
            config: config.clone(),
        }
    }

    fn backoff(&self) -> StdDuration {
        StdDuration::from_millis(self.config.persistence_retry_backoff_ms)
    }

    fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size.max(1))
    }

    fn check_range(&self, from: NaiveDate, to: NaiveDate) -> Result<(), AvailabilityError> {
        if to < from {
            return Err(AvailabilityError::InvalidQuery(format!(
                "End date {} is before start date {}",
                to, from
            )));
        }
        let span = (to - from).num_days();
        if span > self.config.max_query_range_days {
            return Err(AvailabilityError::InvalidQuery(format!(
                "Date range of {} days exceeds the maximum of {}",
                span, self.config.max_query_range_days
            )));
        }
        Ok(())
    }

    async fn fetch(&self, query: SlotQuery) -> Result<Vec<Slot>, AvailabilityError> {
        let store = &self.store;
        let query = &query;
        let slots = retry_transient("list slots", self.backoff(), move || store.list_slots(query)).await?;
        Ok(slots)
    }

    /// Available slots on one date, by start time.
    pub async fn slots_for_date(&self, owner_id: Uuid, date: NaiveDate) -> Result<Vec<Slot>, AvailabilityError> {
        debug!("Listing available slots for {} on {}", owner_id, date);
        self.fetch(SlotQuery::range(owner_id, date, date).with_status(SlotStatus::Available))
            .await
    }

    /// Dates in `[from, to]` with at least one available slot.
    pub async fn dates_with_availability(
        &self,
        owner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        cursor: Option<&str>,
        page_size: Option<usize>,
    ) -> Result<DatePage, AvailabilityError> {
        self.check_range(from, to)?;
        let page_size = self.page_size(page_size);
        let after: Option<NaiveDate> = decode_cursor(cursor)?;

        let store = &self.store;
        let mut dates = retry_transient("list available dates", self.backoff(), move || {
            store.available_dates(owner_id, from, to, after, page_size + 1)
        })
        .await?;

        let next_cursor = if dates.len() > page_size {
            dates.truncate(page_size);
            dates.last().map(encode_cursor).transpose()?
        } else {
            None
        };

        Ok(DatePage {
            owner_id,
            dates,
            page_size,
            next_cursor,
        })
    }

    /// Keyset-paginated slots ordered by `(date, start, id)`, grouped by day.
    /// A booking between two page requests can remove a slot from later
    /// pages but never shifts the boundary, so nothing is skipped or repeated.
    pub async fn available_slots_paged(
        &self,
        owner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        status: Option<SlotStatus>,
        cursor: Option<&str>,
        page_size: Option<usize>,
    ) -> Result<SlotPage, AvailabilityError> {
        self.check_range(from, to)?;
        let page_size = self.page_size(page_size);
        let status = status.unwrap_or(SlotStatus::Available);
        let after: Option<SlotKey> = decode_cursor(cursor)?;

        debug!(
            "Paging {} slots for {} in {}..={} after {:?} (size {})",
            status, owner_id, from, to, after, page_size
        );

        let mut slots = self
            .fetch(
                SlotQuery::range(owner_id, from, to)
                    .with_status(status)
                    .after(after)
                    .limit(page_size + 1),
            )
            .await?;

        let next_cursor = if slots.len() > page_size {
            slots.truncate(page_size);
            slots.last().map(|slot| encode_cursor(&SlotKey::from(slot))).transpose()?
        } else {
            None
        };

        Ok(SlotPage {
            owner_id,
            status,
            days: group_by_day(&slots),
            page_size,
            next_cursor,
        })
    }

    /// Earliest available slot on or after `from`, looking at most
    /// `horizon_days` ahead (capped by the range guard).
    pub async fn first_available(
        &self,
        owner_id: Uuid,
        from: NaiveDate,
        horizon_days: Option<i64>,
    ) -> Result<Option<Slot>, AvailabilityError> {
        let max = self.config.max_query_range_days;
        let horizon = horizon_days.unwrap_or(max);
        if horizon < 0 {
            return Err(AvailabilityError::InvalidQuery("Horizon must not be negative".to_string()));
        }
        // Near the end of the calendar the horizon is cut short.
        let to = from
            .checked_add_signed(Duration::days(horizon.min(max)))
            .unwrap_or(NaiveDate::MAX);

        let slots = self
            .fetch(
                SlotQuery::range(owner_id, from, to)
                    .with_status(SlotStatus::Available)
                    .limit(1),
            )
            .await?;
        Ok(slots.into_iter().next())
    }
}

fn group_by_day(slots: &[Slot]) -> Vec<DaySlots> {
    let mut days: Vec<DaySlots> = Vec::new();
    for slot in slots {
        match days.last_mut() {
            Some(day) if day.date == slot.date => day.slots.push(SlotView::from(slot)),
            _ => days.push(DaySlots {
                date: slot.date,
                slots: vec![SlotView::from(slot)],
            }),
        }
    }
    days
}
