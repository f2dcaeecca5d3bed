use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_database::{retry_transient, SchedulingStore, SlotQuery, StoreError};
use shared_models::{AppointmentMedium, OwnerRef, Slot, SlotPattern};

use crate::error::AvailabilityError;
use crate::models::{MaterializationReport, NoSlotsGeneratedWarning, NoSlotsReason, PatternSpec};
use crate::services::recurrence::RecurrenceRuleCompiler;

const MAX_RECONCILE_ATTEMPTS: u32 = 3;

/// Expands patterns into slots and persists them atomically.
pub struct SlotMaterializer {
    store: Arc<dyn SchedulingStore>,
    compiler: RecurrenceRuleCompiler,
    retry_backoff: Duration,
}

impl SlotMaterializer {
    pub fn new(store: Arc<dyn SchedulingStore>, config: &SchedulingConfig) -> Self {
        Self {
            store,
            compiler: RecurrenceRuleCompiler::new(config),
            retry_backoff: Duration::from_millis(config.persistence_retry_backoff_ms),
        }
    }

    pub async fn materialize(
        &self,
        owner: OwnerRef,
        spec: &PatternSpec,
        medium: AppointmentMedium,
        created_by: Option<String>,
    ) -> Result<MaterializationReport, AvailabilityError> {
        let compiled = self.compiler.compile(spec)?;
        let (covered_from, covered_to) = compiled.rule.window();
        let now = Utc::now();

        let pattern = SlotPattern {
            id: Uuid::new_v4(),
            owner,
            weekdays: compiled.rule.weekdays,
            frequency: compiled.rule.frequency,
            start_date: compiled.rule.start_date,
            end_date: compiled.rule.end_date,
            start_time: compiled.rule.start_time,
            end_time: compiled.rule.end_time,
            duration_minutes: compiled.rule.duration_minutes,
            medium,
            rule: compiled.canonical.clone(),
            fingerprint: compiled.fingerprint.clone(),
            description: compiled.description.clone(),
            created_by,
            created_at: now,
        };

        let candidates = compiled.rule.candidate_slots(owner, pattern.id, medium, now);
        debug!(
            "Pattern {} for {} {} yields {} candidate slots over {} dates",
            pattern.id,
            owner.kind,
            owner.id,
            candidates.len(),
            compiled.occurrences.len()
        );

        for attempt in 1..=MAX_RECONCILE_ATTEMPTS {
            let survivors = self.reconcile(&pattern, &candidates, covered_from, covered_to).await?;

            match self.commit(&pattern, &survivors).await {
                Ok(()) => {
                    let created = survivors.len();
                    let skipped = candidates.len() - created;
                    let warning = if candidates.is_empty() {
                        Some(NoSlotsGeneratedWarning::new(NoSlotsReason::EmptyRecurrence))
                    } else if created == 0 {
                        Some(NoSlotsGeneratedWarning::new(NoSlotsReason::AlreadyMaterialized))
                    } else {
                        None
                    };

                    info!(
                        "Materialized pattern {} for {} {}: {} created, {} skipped",
                        pattern.id, owner.kind, owner.id, created, skipped
                    );

                    return Ok(MaterializationReport {
                        pattern_id: pattern.id,
                        created,
                        skipped,
                        covered_from,
                        covered_to,
                        rule: compiled.canonical,
                        description: compiled.description,
                        warning,
                    });
                }
                Err(StoreError::SlotOverlap(reason)) => {
                    info!(
                        "Pattern {} raced a concurrent materialization (attempt {}/{}): {}",
                        pattern.id, attempt, MAX_RECONCILE_ATTEMPTS, reason
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            "Giving up on pattern {} after {} overlapping attempts",
            pattern.id, MAX_RECONCILE_ATTEMPTS
        );
        Err(AvailabilityError::MaterializationContention {
            attempts: MAX_RECONCILE_ATTEMPTS,
        })
    }

    pub async fn get_pattern(&self, id: Uuid) -> Result<SlotPattern, AvailabilityError> {
        let store = &self.store;
        retry_transient("load pattern", self.retry_backoff, move || store.get_pattern(id))
            .await?
            .ok_or(AvailabilityError::PatternNotFound(id))
    }

    /// Candidates that do not overlap any stored slot of the owner.
    async fn reconcile(
        &self,
        pattern: &SlotPattern,
        candidates: &[Slot],
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> Result<Vec<Slot>, AvailabilityError> {
        if candidates.is_empty() {
            return Ok(vec![]);
        }

        let store = &self.store;
        let query = SlotQuery::range(pattern.owner.id, from, to);
        let query = &query;
        let existing = retry_transient("load existing slots", self.retry_backoff, move || {
            store.list_slots(query)
        })
        .await?;

        let survivors: Vec<Slot> = candidates
            .iter()
            .filter(|candidate| {
                !existing
                    .iter()
                    .any(|slot| slot.date == candidate.date && slot.overlaps(candidate.starts_at, candidate.ends_at))
            })
            .cloned()
            .collect();

        if survivors.len() < candidates.len() {
            debug!(
                "Pattern {}: {} of {} candidates already covered by existing slots",
                pattern.id,
                candidates.len() - survivors.len(),
                candidates.len()
            );
        }
        Ok(survivors)
    }

    async fn commit(&self, pattern: &SlotPattern, slots: &[Slot]) -> Result<(), StoreError> {
        let store = &self.store;
        retry_transient("commit pattern", self.retry_backoff, move || {
            store.commit_pattern(pattern, slots)
        })
        .await
    }
}
