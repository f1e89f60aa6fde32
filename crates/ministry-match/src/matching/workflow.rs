//! Application state machine.
//!
//! ```text
//! Match.volunteer_response:  none -> applied -> {approved, rejected}
//! Registration.status:       pending_approval -> {confirmed, cancelled}
//!                            confirmed -> cancelled (withdrawal)
//! ```
//!
//! Every step that touches more than one row writes them in a fixed order and
//! undoes the rows it already wrote when a later write fails, so a failing
//! transition leaves Match, Registration, and Opportunity as it found them.
//! Capacity only moves together with a registration: the store confirms a
//! registration and takes its slot in one step, and releases both together.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::domain::{
    CoordinatorId, Decision, Match, MatchId, Opportunity, OpportunityId, OpportunityStatus,
    Registration, RegistrationId, RegistrationStatus, VolunteerId, VolunteerResponse,
};
use super::eligibility::EligibilityTracker;
use super::engine::MatchEngine;
use super::error::MatchingError;
use super::notify::{Notification, NotificationGateway, NotificationKind, Notifier};
use super::profiles::ProfileStore;
use super::repository::{MatchingStore, RepositoryError};

/// Result of a coordinator decision. `alternatives` is the detached
/// follow-up search started after a rejection; callers may await or drop it.
#[derive(Debug)]
pub struct DecisionReceipt {
    pub registration: Registration,
    pub alternatives: Option<JoinHandle<()>>,
}

pub struct ApplicationWorkflow<S, N> {
    store: Arc<S>,
    profiles: Arc<ProfileStore<S>>,
    engine: Arc<MatchEngine<S, N>>,
    eligibility: Arc<EligibilityTracker<S, N>>,
    notifier: Notifier<N>,
}

impl<S, N> ApplicationWorkflow<S, N>
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    pub(crate) fn new(
        store: Arc<S>,
        profiles: Arc<ProfileStore<S>>,
        engine: Arc<MatchEngine<S, N>>,
        eligibility: Arc<EligibilityTracker<S, N>>,
        notifier: Notifier<N>,
    ) -> Self {
        Self {
            store,
            profiles,
            engine,
            eligibility,
            notifier,
        }
    }

    pub fn get_registration(&self, id: &RegistrationId) -> Result<Registration, MatchingError> {
        self.store
            .fetch_registration(id)?
            .ok_or_else(|| MatchingError::not_found("registration", id))
    }

    /// `none -> applied` on the Match together with a `pending_approval`
    /// Registration; neither survives without the other.
    pub fn apply(
        &self,
        match_id: &MatchId,
        volunteer_id: &VolunteerId,
    ) -> Result<Registration, MatchingError> {
        let current = self
            .store
            .fetch_match(match_id)?
            .filter(|candidate| &candidate.volunteer_id == volunteer_id)
            .ok_or_else(|| MatchingError::not_found("match", match_id))?;
        if current.volunteer_response != VolunteerResponse::NoResponse {
            return Err(MatchingError::transition(
                "match",
                match_id,
                current.volunteer_response.label(),
                VolunteerResponse::Applied.label(),
            ));
        }

        let opportunity = self.opportunity(&current.opportunity_id)?;
        if opportunity.status == OpportunityStatus::Closed {
            return Err(MatchingError::transition(
                "opportunity",
                opportunity.opportunity_id,
                OpportunityStatus::Closed.label(),
                VolunteerResponse::Applied.label(),
            ));
        }

        let now = Utc::now();
        let mut applied = current.clone();
        applied.volunteer_response = VolunteerResponse::Applied;
        applied.responded_at = Some(now);
        self.store
            .replace_match(VolunteerResponse::NoResponse, applied)
            .map_err(|err| stale_as_transition(err, "match", match_id, VolunteerResponse::Applied.label()))?;

        let registration = Registration {
            registration_id: RegistrationId::new(),
            match_id: *match_id,
            volunteer_id: volunteer_id.clone(),
            opportunity_id: current.opportunity_id,
            status: RegistrationStatus::PendingApproval,
            notes: String::new(),
            created_at: now,
            decided_at: None,
            decided_by: None,
        };

        let registration = match self.store.insert_registration(registration) {
            Ok(registration) => registration,
            Err(err) => {
                self.restore_match(VolunteerResponse::Applied, current);
                return Err(match err {
                    RepositoryError::Conflict => MatchingError::transition(
                        "registration",
                        format!("{volunteer_id}/{}", opportunity.opportunity_id),
                        RegistrationStatus::PendingApproval.label(),
                        RegistrationStatus::PendingApproval.label(),
                    ),
                    other => other.into(),
                });
            }
        };

        info!(
            volunteer = %volunteer_id,
            opportunity = %opportunity.opportunity_id,
            registration = %registration.registration_id,
            "application submitted"
        );
        self.notifier.dispatch(
            Notification::new(
                volunteer_id.to_string(),
                NotificationKind::ApplicationReceived,
                "Application received",
                format!("Your application for {} is awaiting approval.", opportunity.title),
            )
            .with_metadata("registration_id", registration.registration_id),
        );
        self.notifier.dispatch(
            Notification::new(
                opportunity.coordinator_id.to_string(),
                NotificationKind::NewApplication,
                "New volunteer application",
                format!("A volunteer applied for {}.", opportunity.title),
            )
            .with_action_url(format!(
                "/registrations/{}/decision",
                registration.registration_id
            ))
            .with_metadata("registration_id", registration.registration_id)
            .with_metadata("volunteer_id", volunteer_id),
        );

        Ok(registration)
    }

    pub fn decide(
        &self,
        registration_id: &RegistrationId,
        coordinator: &CoordinatorId,
        decision: Decision,
        message: Option<&str>,
    ) -> Result<DecisionReceipt, MatchingError> {
        let registration = self.get_registration(registration_id)?;
        let opportunity = self.opportunity(&registration.opportunity_id)?;
        self.profiles
            .ensure_coordinator(&opportunity.organization_id, coordinator)?;

        let target = match decision {
            Decision::Approve => RegistrationStatus::Confirmed,
            Decision::Reject => RegistrationStatus::Cancelled,
        };
        if registration.status != RegistrationStatus::PendingApproval {
            return Err(MatchingError::transition(
                "registration",
                registration_id,
                registration.status.label(),
                target.label(),
            ));
        }

        let matched = self
            .store
            .fetch_match(&registration.match_id)?
            .ok_or_else(|| MatchingError::not_found("match", registration.match_id))?;
        if matched.volunteer_response != VolunteerResponse::Applied {
            let to = match decision {
                Decision::Approve => VolunteerResponse::Approved,
                Decision::Reject => VolunteerResponse::Rejected,
            };
            return Err(MatchingError::transition(
                "match",
                matched.match_id,
                matched.volunteer_response.label(),
                to.label(),
            ));
        }

        match decision {
            Decision::Approve => self
                .approve(registration, matched, &opportunity, coordinator, message)
                .map(|registration| DecisionReceipt {
                    registration,
                    alternatives: None,
                }),
            Decision::Reject => {
                let registration =
                    self.reject(registration, matched, &opportunity, coordinator, message)?;
                let alternatives = self.spawn_alternatives(
                    registration.volunteer_id.clone(),
                    registration.opportunity_id,
                );
                Ok(DecisionReceipt {
                    registration,
                    alternatives,
                })
            }
        }
    }

    fn approve(
        &self,
        registration: Registration,
        matched: Match,
        opportunity: &Opportunity,
        coordinator: &CoordinatorId,
        message: Option<&str>,
    ) -> Result<Registration, MatchingError> {
        let registration_id = registration.registration_id;
        let volunteer_id = registration.volunteer_id.clone();

        if opportunity.requires_clearance() && !self.eligibility.has_passed(&volunteer_id)? {
            info!(
                volunteer = %volunteer_id,
                opportunity = %opportunity.opportunity_id,
                "approval blocked pending background check"
            );
            return Err(MatchingError::BackgroundCheckRequired(volunteer_id));
        }

        let confirmed = decided(
            &registration,
            RegistrationStatus::Confirmed,
            coordinator,
            message,
        );
        let (confirmed, reserved) = self
            .store
            .confirm_registration(confirmed)
            .map_err(|err| match err {
                RepositoryError::CapacityExhausted => {
                    MatchingError::CapacityExceeded(opportunity.opportunity_id)
                }
                RepositoryError::OpportunityClosed => MatchingError::transition(
                    "opportunity",
                    opportunity.opportunity_id,
                    OpportunityStatus::Closed.label(),
                    OpportunityStatus::Filled.label(),
                ),
                other => stale_as_transition(
                    other,
                    "registration",
                    registration_id,
                    RegistrationStatus::Confirmed.label(),
                ),
            })?;

        let mut approved = matched;
        approved.volunteer_response = VolunteerResponse::Approved;
        if let Err(err) = self.store.replace_match(VolunteerResponse::Applied, approved) {
            self.revert_confirmation(registration);
            return Err(stale_as_transition(
                err,
                "match",
                confirmed.match_id,
                VolunteerResponse::Approved.label(),
            ));
        }

        info!(
            volunteer = %volunteer_id,
            opportunity = %opportunity.opportunity_id,
            registration = %registration_id,
            registered = reserved.volunteers_registered,
            needed = reserved.volunteers_needed,
            "registration confirmed"
        );
        let mut notification = Notification::new(
            volunteer_id.to_string(),
            NotificationKind::ApplicationApproved,
            "You're confirmed!",
            format!("You have been approved to serve in {}.", opportunity.title),
        )
        .with_metadata("registration_id", registration_id);
        if let Some(message) = message {
            notification = notification.with_metadata("coordinator_message", message);
        }
        self.notifier.dispatch(notification);

        Ok(confirmed)
    }

    fn reject(
        &self,
        registration: Registration,
        matched: Match,
        opportunity: &Opportunity,
        coordinator: &CoordinatorId,
        message: Option<&str>,
    ) -> Result<Registration, MatchingError> {
        let registration_id = registration.registration_id;

        let cancelled = decided(
            &registration,
            RegistrationStatus::Cancelled,
            coordinator,
            message,
        );
        let cancelled = self
            .store
            .replace_registration(RegistrationStatus::PendingApproval, cancelled)
            .map_err(|err| {
                stale_as_transition(
                    err,
                    "registration",
                    registration_id,
                    RegistrationStatus::Cancelled.label(),
                )
            })?;

        let mut rejected = matched;
        rejected.volunteer_response = VolunteerResponse::Rejected;
        if let Err(err) = self.store.replace_match(VolunteerResponse::Applied, rejected) {
            self.restore_registration(RegistrationStatus::Cancelled, registration);
            return Err(stale_as_transition(
                err,
                "match",
                cancelled.match_id,
                VolunteerResponse::Rejected.label(),
            ));
        }

        info!(
            volunteer = %cancelled.volunteer_id,
            opportunity = %opportunity.opportunity_id,
            registration = %registration_id,
            "registration rejected"
        );
        let mut notification = Notification::new(
            cancelled.volunteer_id.to_string(),
            NotificationKind::ApplicationRejected,
            "Application update",
            format!(
                "Your application for {} was not approved this time.",
                opportunity.title
            ),
        )
        .with_metadata("registration_id", registration_id);
        if let Some(message) = message {
            notification = notification.with_metadata("coordinator_message", message);
        }
        self.notifier.dispatch(notification);

        Ok(cancelled)
    }

    /// Volunteer pulls out. A pending application also rejects its Match; a
    /// confirmed one gives its slot back.
    pub fn withdraw(
        &self,
        registration_id: &RegistrationId,
        volunteer_id: &VolunteerId,
    ) -> Result<Registration, MatchingError> {
        let registration = self
            .store
            .fetch_registration(registration_id)?
            .filter(|registration| &registration.volunteer_id == volunteer_id)
            .ok_or_else(|| MatchingError::not_found("registration", registration_id))?;
        let opportunity = self.opportunity(&registration.opportunity_id)?;

        let mut cancelled = registration.clone();
        cancelled.status = RegistrationStatus::Cancelled;
        append_note(&mut cancelled.notes, "withdrawn by volunteer");

        let cancelled = match registration.status {
            RegistrationStatus::PendingApproval => {
                let cancelled = self
                    .store
                    .replace_registration(RegistrationStatus::PendingApproval, cancelled)
                    .map_err(|err| {
                        stale_as_transition(
                            err,
                            "registration",
                            registration_id,
                            RegistrationStatus::Cancelled.label(),
                        )
                    })?;
                if let Some(matched) = self.store.fetch_match(&registration.match_id)? {
                    let mut rejected = matched;
                    rejected.volunteer_response = VolunteerResponse::Rejected;
                    if let Err(err) = self.store.replace_match(VolunteerResponse::Applied, rejected)
                    {
                        self.restore_registration(RegistrationStatus::Cancelled, registration);
                        return Err(stale_as_transition(
                            err,
                            "match",
                            cancelled.match_id,
                            VolunteerResponse::Rejected.label(),
                        ));
                    }
                }
                cancelled
            }
            RegistrationStatus::Confirmed => {
                let (cancelled, _) = self
                    .store
                    .release_registration(cancelled)
                    .map_err(|err| {
                        stale_as_transition(
                            err,
                            "registration",
                            registration_id,
                            RegistrationStatus::Cancelled.label(),
                        )
                    })?;
                cancelled
            }
            RegistrationStatus::Cancelled => {
                return Err(MatchingError::transition(
                    "registration",
                    registration_id,
                    RegistrationStatus::Cancelled.label(),
                    RegistrationStatus::Cancelled.label(),
                ));
            }
        };

        info!(
            volunteer = %volunteer_id,
            opportunity = %opportunity.opportunity_id,
            registration = %registration_id,
            "registration withdrawn"
        );
        self.notifier.dispatch(
            Notification::new(
                opportunity.coordinator_id.to_string(),
                NotificationKind::RegistrationWithdrawn,
                "Volunteer withdrew",
                format!("A volunteer withdrew from {}.", opportunity.title),
            )
            .with_metadata("registration_id", registration_id)
            .with_metadata("volunteer_id", volunteer_id),
        );

        Ok(cancelled)
    }

    fn opportunity(&self, id: &OpportunityId) -> Result<Opportunity, MatchingError> {
        self.store
            .fetch_opportunity(id)?
            .ok_or_else(|| MatchingError::not_found("opportunity", id))
    }

    fn spawn_alternatives(
        &self,
        volunteer_id: VolunteerId,
        excluded: OpportunityId,
    ) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(volunteer = %volunteer_id, "no runtime available, skipping alternative search");
            return None;
        };
        let engine = Arc::clone(&self.engine);
        Some(runtime.spawn(async move {
            match engine.suggest_alternatives(&volunteer_id, &excluded).await {
                Ok(matches) => debug!(
                    volunteer = %volunteer_id,
                    alternatives = matches.len(),
                    "alternative search finished"
                ),
                Err(err) => warn!(
                    volunteer = %volunteer_id,
                    error = %err,
                    "alternative search failed"
                ),
            }
        }))
    }

    fn restore_match(&self, expected: VolunteerResponse, original: Match) {
        let id = original.match_id;
        if let Err(err) = self.store.replace_match(expected, original) {
            error!(match_id = %id, error = %err, "failed to restore match after aborted transition");
        }
    }

    fn restore_registration(&self, expected: RegistrationStatus, original: Registration) {
        let id = original.registration_id;
        if let Err(err) = self.store.replace_registration(expected, original) {
            error!(registration = %id, error = %err, "failed to restore registration after aborted transition");
        }
    }

    /// Puts a confirmed registration back to its pending original and frees
    /// the slot it took.
    fn revert_confirmation(&self, original: Registration) {
        let id = original.registration_id;
        if let Err(err) = self.store.release_registration(original) {
            error!(registration = %id, error = %err, "failed to revert confirmation after aborted approval");
        }
    }
}

fn decided(
    registration: &Registration,
    status: RegistrationStatus,
    coordinator: &CoordinatorId,
    message: Option<&str>,
) -> Registration {
    let mut next = registration.clone();
    next.status = status;
    next.decided_at = Some(Utc::now());
    next.decided_by = Some(coordinator.clone());
    if let Some(message) = message {
        append_note(&mut next.notes, message);
    }
    next
}

fn append_note(notes: &mut String, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if !notes.is_empty() {
        notes.push('\n');
    }
    notes.push_str(line);
}

fn stale_as_transition(
    err: RepositoryError,
    entity: &'static str,
    id: impl ToString,
    to: &'static str,
) -> MatchingError {
    match err {
        RepositoryError::StaleState { found, .. } => MatchingError::transition(entity, id, found, to),
        other => other.into(),
    }
}
