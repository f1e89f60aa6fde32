use std::sync::Arc;

use super::domain::{
    BackgroundCheck, CheckId, CoordinatorId, Decision, Match, MatchId, Opportunity,
    OpportunityDraft, OpportunityId, OrganizationId, ProfileStatus, Registration, RegistrationId,
    VolunteerId, VolunteerProfile,
};
use super::eligibility::{CheckOutcome, EligibilityTracker};
use super::engine::MatchEngine;
use super::error::MatchingError;
use super::notify::{NotificationGateway, Notifier};
use super::profiles::{AssessmentResponses, AssessmentResult, ProfileStore};
use super::repository::MatchingStore;
use super::scoring::ScoringAdapter;
use super::workflow::{ApplicationWorkflow, DecisionReceipt};

/// Service composing the profile store, match engine, application workflow,
/// and eligibility tracker over one shared store and notification gateway.
pub struct MatchingService<S, N> {
    profiles: Arc<ProfileStore<S>>,
    engine: Arc<MatchEngine<S, N>>,
    eligibility: Arc<EligibilityTracker<S, N>>,
    workflow: ApplicationWorkflow<S, N>,
}

impl<S, N> MatchingService<S, N>
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    pub fn new(store: Arc<S>, gateway: Arc<N>, scoring: ScoringAdapter) -> Self {
        let notifier = Notifier::new(gateway);
        let profiles = Arc::new(ProfileStore::new(Arc::clone(&store)));
        let engine = Arc::new(MatchEngine::new(
            Arc::clone(&store),
            scoring,
            notifier.clone(),
        ));
        let eligibility = Arc::new(EligibilityTracker::new(
            Arc::clone(&store),
            notifier.clone(),
        ));
        let workflow = ApplicationWorkflow::new(
            store,
            Arc::clone(&profiles),
            Arc::clone(&engine),
            Arc::clone(&eligibility),
            notifier,
        );

        Self {
            profiles,
            engine,
            eligibility,
            workflow,
        }
    }

    /// Scores a raw questionnaire and merges it into the volunteer's profile.
    pub fn submit_assessment(
        &self,
        volunteer_id: &VolunteerId,
        responses: AssessmentResponses,
    ) -> Result<VolunteerProfile, MatchingError> {
        let assessment = AssessmentResult::from_responses(responses)?;
        self.profiles.upsert_assessment(volunteer_id, assessment)
    }

    pub fn upsert_assessment(
        &self,
        volunteer_id: &VolunteerId,
        assessment: AssessmentResult,
    ) -> Result<VolunteerProfile, MatchingError> {
        self.profiles.upsert_assessment(volunteer_id, assessment)
    }

    pub fn get_profile(&self, volunteer_id: &VolunteerId) -> Result<VolunteerProfile, MatchingError> {
        self.profiles.get_profile(volunteer_id)
    }

    pub fn set_profile_status(
        &self,
        volunteer_id: &VolunteerId,
        status: ProfileStatus,
    ) -> Result<VolunteerProfile, MatchingError> {
        self.profiles.set_profile_status(volunteer_id, status)
    }

    pub fn register_coordinator(
        &self,
        organization: &OrganizationId,
        coordinator: &CoordinatorId,
    ) -> Result<(), MatchingError> {
        self.profiles.register_coordinator(organization, coordinator)
    }

    pub fn create_opportunity(
        &self,
        coordinator: &CoordinatorId,
        draft: OpportunityDraft,
    ) -> Result<Opportunity, MatchingError> {
        self.profiles.create_opportunity(coordinator, draft)
    }

    pub fn get_opportunity(&self, id: &OpportunityId) -> Result<Opportunity, MatchingError> {
        self.profiles.get_opportunity(id)
    }

    pub fn close_opportunity(
        &self,
        coordinator: &CoordinatorId,
        id: &OpportunityId,
    ) -> Result<Opportunity, MatchingError> {
        self.profiles.close_opportunity(coordinator, id)
    }

    pub fn list_open_opportunities(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<Opportunity>, MatchingError> {
        self.profiles.list_open_opportunities(organization)
    }

    pub async fn find_matches(&self, volunteer_id: &VolunteerId) -> Result<Vec<Match>, MatchingError> {
        self.engine.find_matches(volunteer_id).await
    }

    pub fn get_match(&self, id: &MatchId) -> Result<Match, MatchingError> {
        self.engine.get_match(id)
    }

    /// Volunteer accepts a match, opening a pending registration.
    pub fn respond_to_match(
        &self,
        match_id: &MatchId,
        volunteer_id: &VolunteerId,
    ) -> Result<Registration, MatchingError> {
        self.workflow.apply(match_id, volunteer_id)
    }

    pub fn decide(
        &self,
        registration_id: &RegistrationId,
        coordinator: &CoordinatorId,
        decision: Decision,
        message: Option<&str>,
    ) -> Result<DecisionReceipt, MatchingError> {
        self.workflow
            .decide(registration_id, coordinator, decision, message)
    }

    pub fn withdraw(
        &self,
        registration_id: &RegistrationId,
        volunteer_id: &VolunteerId,
    ) -> Result<Registration, MatchingError> {
        self.workflow.withdraw(registration_id, volunteer_id)
    }

    pub fn get_registration(&self, id: &RegistrationId) -> Result<Registration, MatchingError> {
        self.workflow.get_registration(id)
    }

    pub fn request_background_check(
        &self,
        volunteer_id: &VolunteerId,
        check_type: &str,
    ) -> Result<BackgroundCheck, MatchingError> {
        self.eligibility.request_check(volunteer_id, check_type)
    }

    pub fn background_check_status(
        &self,
        volunteer_id: &VolunteerId,
    ) -> Result<Option<BackgroundCheck>, MatchingError> {
        self.eligibility.get_status(volunteer_id)
    }

    pub fn has_passed_background_check(
        &self,
        volunteer_id: &VolunteerId,
    ) -> Result<bool, MatchingError> {
        self.eligibility.has_passed(volunteer_id)
    }

    pub fn record_background_check_result(
        &self,
        check_id: &CheckId,
        outcome: CheckOutcome,
    ) -> Result<BackgroundCheck, MatchingError> {
        self.eligibility.record_result(check_id, outcome)
    }
}
