use crate::domain::{ActionType, QuotaCounter, Reservation};
use crate::infrastructure::{QuotaRepository, RepositoryError};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-account, per-action-type daily counters. The atomic check-and-increment
/// lives in the store; this wrapper adds the lane-facing vocabulary.
#[derive(Clone)]
pub struct QuotaTracker {
    repo: Arc<dyn QuotaRepository>,
}

impl QuotaTracker {
    pub fn new(repo: Arc<dyn QuotaRepository>) -> Self {
        Self { repo }
    }

    pub async fn try_reserve(
        &self,
        account_id: Uuid,
        action_type: ActionType,
        day: NaiveDate,
        daily_max: i32,
    ) -> Result<Reservation, RepositoryError> {
        if daily_max <= 0 {
            return Ok(Reservation::denied());
        }

        let reservation = self
            .repo
            .try_reserve(account_id, action_type, day, daily_max)
            .await?;

        debug!(
            %account_id,
            %action_type,
            %day,
            allowed = reservation.allowed,
            remaining = reservation.remaining,
            "Quota reservation"
        );
        Ok(reservation)
    }

    /// Hand back a reservation whose action never reached the executor.
    /// Failures are logged and swallowed: a leaked unit only makes the
    /// account more conservative for the rest of the day.
    pub async fn refund(&self, account_id: Uuid, action_type: ActionType, day: NaiveDate) {
        if let Err(e) = self.repo.release(account_id, action_type, day).await {
            warn!(%account_id, %action_type, %day, "Failed to refund quota: {}", e);
        }
    }

    pub async fn usage(
        &self,
        account_id: Uuid,
        day: NaiveDate,
    ) -> Result<Vec<QuotaCounter>, RepositoryError> {
        self.repo.usage_for_day(account_id, day).await
    }
}
