use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{BackgroundCheck, CheckId, CheckStatus, VolunteerId};
use super::error::MatchingError;
use super::notify::{Notification, NotificationGateway, NotificationKind, Notifier};
use super::repository::{MatchingStore, RepositoryError};

/// Result reported by the external verification process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Failed,
}

impl From<CheckOutcome> for CheckStatus {
    fn from(value: CheckOutcome) -> Self {
        match value {
            CheckOutcome::Passed => CheckStatus::Passed,
            CheckOutcome::Failed => CheckStatus::Failed,
        }
    }
}

/// Background-check records consulted by the approval workflow.
pub struct EligibilityTracker<S, N> {
    store: Arc<S>,
    notifier: Notifier<N>,
}

impl<S, N> EligibilityTracker<S, N>
where
    S: MatchingStore,
    N: NotificationGateway,
{
    pub(crate) fn new(store: Arc<S>, notifier: Notifier<N>) -> Self {
        Self { store, notifier }
    }

    /// Creates a pending check, or returns the pending one of the same type.
    pub fn request_check(
        &self,
        volunteer_id: &VolunteerId,
        check_type: &str,
    ) -> Result<BackgroundCheck, MatchingError> {
        let check_type = check_type.trim().to_ascii_lowercase();
        if check_type.is_empty() {
            return Err(MatchingError::Validation(
                "check_type must not be empty".to_string(),
            ));
        }
        if self.store.fetch_profile(volunteer_id)?.is_none() {
            return Err(MatchingError::not_found("volunteer", volunteer_id));
        }

        if let Some(pending) = self.pending_of_type(volunteer_id, &check_type)? {
            return Ok(pending);
        }

        let check = BackgroundCheck {
            check_id: CheckId::new(),
            volunteer_id: volunteer_id.clone(),
            check_type: check_type.clone(),
            status: CheckStatus::Pending,
            requested_at: Utc::now(),
            completed_at: None,
        };

        match self.store.insert_check(check) {
            Ok(stored) => {
                info!(
                    volunteer = %volunteer_id,
                    check = %stored.check_id,
                    kind = %stored.check_type,
                    "background check requested"
                );
                self.notifier.dispatch(
                    Notification::new(
                        volunteer_id.to_string(),
                        NotificationKind::BackgroundCheckRequested,
                        "Background check requested",
                        format!("A {} check has been requested for you.", stored.check_type),
                    )
                    .with_metadata("check_id", stored.check_id),
                );
                Ok(stored)
            }
            // A concurrent request created the pending row first.
            Err(RepositoryError::Conflict) => {
                self.pending_of_type(volunteer_id, &check_type)?
                    .ok_or(MatchingError::Repository(RepositoryError::Conflict))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Most recently requested check of any type. Checks requested at the same
    /// instant resolve to the one stored last.
    pub fn get_status(
        &self,
        volunteer_id: &VolunteerId,
    ) -> Result<Option<BackgroundCheck>, MatchingError> {
        Ok(self
            .store
            .checks_for(volunteer_id)?
            .into_iter()
            .max_by_key(|check| check.requested_at))
    }

    /// Clearance follows the most recently requested check only; a newer
    /// pending or failed check overrides an older pass.
    pub fn has_passed(&self, volunteer_id: &VolunteerId) -> Result<bool, MatchingError> {
        Ok(self
            .get_status(volunteer_id)?
            .is_some_and(|latest| latest.status == CheckStatus::Passed))
    }

    /// Records the verification result; only pending checks can complete.
    pub fn record_result(
        &self,
        check_id: &CheckId,
        outcome: CheckOutcome,
    ) -> Result<BackgroundCheck, MatchingError> {
        let current = self
            .store
            .fetch_check(check_id)?
            .ok_or_else(|| MatchingError::not_found("background check", check_id))?;
        let status = CheckStatus::from(outcome);
        if current.status != CheckStatus::Pending {
            return Err(MatchingError::transition(
                "background check",
                check_id,
                current.status.label(),
                status.label(),
            ));
        }

        let mut next = current;
        next.status = status;
        next.completed_at = Some(Utc::now());
        let stored = self
            .store
            .replace_check(CheckStatus::Pending, next)
            .map_err(|err| match err {
                RepositoryError::StaleState { found, .. } => MatchingError::transition(
                    "background check",
                    check_id,
                    found,
                    status.label(),
                ),
                other => other.into(),
            })?;

        info!(
            volunteer = %stored.volunteer_id,
            check = %check_id,
            status = status.label(),
            "background check completed"
        );
        self.notifier.dispatch(
            Notification::new(
                stored.volunteer_id.to_string(),
                NotificationKind::BackgroundCheckCompleted,
                "Background check completed",
                format!("Your {} check is {}.", stored.check_type, status.label()),
            )
            .with_metadata("check_id", check_id),
        );
        Ok(stored)
    }

    fn pending_of_type(
        &self,
        volunteer_id: &VolunteerId,
        check_type: &str,
    ) -> Result<Option<BackgroundCheck>, MatchingError> {
        Ok(self
            .store
            .checks_for(volunteer_id)?
            .into_iter()
            .find(|check| check.status == CheckStatus::Pending && check.check_type == check_type))
    }
}
