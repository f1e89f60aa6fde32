use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{Utc, Weekday};
use serde_json::Value;

use crate::matching::domain::{
    Availability, BackgroundCheck, CheckId, CheckStatus, CoordinatorId, Match, MatchId,
    Opportunity, OpportunityDraft, OpportunityId, OpportunityStatus, OrganizationId,
    ProfileStatus, Registration, RegistrationId, RegistrationStatus, ServingStyle, TimeSlot,
    VolunteerId, VolunteerProfile, VolunteerResponse,
};
use crate::matching::memory::MemoryStore;
use crate::matching::notify::{Notification, NotificationGateway, NotificationKind, NotifyError};
use crate::matching::repository::{MatchingStore, RepositoryError};
use crate::matching::profiles::AssessmentResult;
use crate::matching::scoring::oracle::{
    OracleError, OracleMatch, ScoringOracle, ScoringRequest, ScoringResponse, UnavailableOracle,
};
use crate::matching::scoring::ScoringAdapter;
use crate::matching::service::MatchingService;

pub(super) const ORGANIZATION: &str = "grace-fellowship";
pub(super) const COORDINATOR: &str = "coord-ruth";

pub(super) fn organization() -> OrganizationId {
    OrganizationId::from(ORGANIZATION)
}

pub(super) fn coordinator() -> CoordinatorId {
    CoordinatorId::from(COORDINATOR)
}

pub(super) fn volunteer(id: &str) -> VolunteerId {
    VolunteerId::from(id)
}

fn tags(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub(super) fn availability() -> Availability {
    Availability {
        weekdays: vec![Weekday::Sun, Weekday::Wed],
        time_slots: vec![TimeSlot::Morning],
        hours_per_month: Some(8),
    }
}

/// Profile built directly, bypassing the assessment scoring.
pub(super) fn profile(gifts: &[&str], skills: &[&str]) -> VolunteerProfile {
    let now = Utc::now();
    VolunteerProfile {
        volunteer_id: volunteer("vol-ada"),
        organization_id: organization(),
        display_name: Some("Ada".to_string()),
        spiritual_gifts: tags(gifts),
        gift_scores: gifts.iter().map(|gift| (gift.to_string(), 100)).collect(),
        serving_style: ServingStyle::HandsOn,
        ministry_passions: tags(&["children"]),
        skills: tags(skills),
        availability: availability(),
        status: ProfileStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

/// Opportunity built directly; capacity fields are not validated here.
pub(super) fn opportunity(
    gifts: &[&str],
    skills: &[&str],
    needed: u32,
    registered: u32,
) -> Opportunity {
    Opportunity {
        opportunity_id: OpportunityId::new(),
        organization_id: organization(),
        coordinator_id: coordinator(),
        title: "Sunday kitchen".to_string(),
        description: "Prepare the fellowship meal".to_string(),
        ministry_area: Some("hospitality".to_string()),
        required_gifts: tags(gifts),
        required_skills: tags(skills),
        volunteers_needed: needed,
        volunteers_registered: registered,
        background_check_required: false,
        is_leadership_role: false,
        status: OpportunityStatus::Open,
        created_at: Utc::now(),
    }
}

/// Assessment where every listed gift scores 100.
pub(super) fn assessment(gifts: &[&str], skills: &[&str]) -> AssessmentResult {
    AssessmentResult {
        organization_id: organization(),
        display_name: None,
        gift_scores: gifts.iter().map(|gift| (gift.to_string(), 100)).collect(),
        serving_style: ServingStyle::HandsOn,
        ministry_passions: tags(&["children"]),
        skills: tags(skills),
        availability: availability(),
    }
}

pub(super) fn draft(title: &str, gifts: &[&str], skills: &[&str], needed: u32) -> OpportunityDraft {
    OpportunityDraft {
        organization_id: organization(),
        title: title.to_string(),
        description: format!("{title} team"),
        ministry_area: None,
        required_gifts: gifts.iter().map(|gift| gift.to_string()).collect(),
        required_skills: skills.iter().map(|skill| skill.to_string()).collect(),
        volunteers_needed: needed,
        background_check_required: false,
        is_leadership_role: false,
    }
}

pub(super) type TestService = MatchingService<MemoryStore, RecordingGateway>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) gateway: Arc<RecordingGateway>,
}

impl Harness {
    /// Registers a volunteer with the given gifts and skills.
    pub(super) fn enroll(&self, id: &str, gifts: &[&str], skills: &[&str]) -> VolunteerProfile {
        self.service
            .upsert_assessment(&volunteer(id), assessment(gifts, skills))
            .expect("assessment stored")
    }

    pub(super) fn post(&self, draft: OpportunityDraft) -> Opportunity {
        self.service
            .create_opportunity(&coordinator(), draft)
            .expect("opportunity created")
    }
}

/// Service over the fallback scorer only.
pub(super) fn harness() -> Harness {
    harness_with(Arc::new(UnavailableOracle), Duration::from_secs(1))
}

pub(super) fn harness_with(oracle: Arc<dyn ScoringOracle>, timeout: Duration) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(RecordingGateway::default());
    let service = MatchingService::new(
        store.clone(),
        gateway.clone(),
        ScoringAdapter::new(oracle, timeout),
    );
    service
        .register_coordinator(&organization(), &coordinator())
        .expect("coordinator registered");
    Harness {
        service: Arc::new(service),
        store,
        gateway,
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingGateway {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingGateway {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("gateway mutex poisoned").clone()
    }

    pub(super) fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|notification| notification.kind == kind)
            .collect()
    }
}

impl NotificationGateway for RecordingGateway {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("gateway mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingGateway;

impl NotificationGateway for FailingGateway {
    fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay offline".to_string()))
    }
}

/// Gateway that blocks the calling thread before accepting one kind of
/// notification.
pub(super) struct StallingGateway {
    pub(super) kind: NotificationKind,
    pub(super) stall: Duration,
}

impl NotificationGateway for StallingGateway {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        if notification.kind == self.kind {
            std::thread::sleep(self.stall);
        }
        Ok(())
    }
}

/// [`MemoryStore`] that waits before every registration confirmation, so
/// concurrent approvals all reach the store together.
pub(super) struct PausingStore {
    inner: MemoryStore,
    pause: Duration,
}

impl PausingStore {
    pub(super) fn new(pause: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            pause,
        }
    }
}

impl MatchingStore for PausingStore {
    fn fetch_profile(&self, id: &VolunteerId) -> Result<Option<VolunteerProfile>, RepositoryError> {
        self.inner.fetch_profile(id)
    }

    fn save_profile(&self, profile: VolunteerProfile) -> Result<VolunteerProfile, RepositoryError> {
        self.inner.save_profile(profile)
    }

    fn add_coordinator(
        &self,
        organization: &OrganizationId,
        coordinator: &CoordinatorId,
    ) -> Result<(), RepositoryError> {
        self.inner.add_coordinator(organization, coordinator)
    }

    fn is_coordinator(
        &self,
        organization: &OrganizationId,
        coordinator: &CoordinatorId,
    ) -> Result<bool, RepositoryError> {
        self.inner.is_coordinator(organization, coordinator)
    }

    fn insert_opportunity(&self, opportunity: Opportunity) -> Result<Opportunity, RepositoryError> {
        self.inner.insert_opportunity(opportunity)
    }

    fn fetch_opportunity(&self, id: &OpportunityId) -> Result<Option<Opportunity>, RepositoryError> {
        self.inner.fetch_opportunity(id)
    }

    fn opportunities_for(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<Opportunity>, RepositoryError> {
        self.inner.opportunities_for(organization)
    }

    fn set_opportunity_status(
        &self,
        id: &OpportunityId,
        status: OpportunityStatus,
    ) -> Result<Opportunity, RepositoryError> {
        self.inner.set_opportunity_status(id, status)
    }

    fn fetch_match(&self, id: &MatchId) -> Result<Option<Match>, RepositoryError> {
        self.inner.fetch_match(id)
    }

    fn matches_for(&self, volunteer: &VolunteerId) -> Result<Vec<Match>, RepositoryError> {
        self.inner.matches_for(volunteer)
    }

    fn insert_matches(&self, matches: Vec<Match>) -> Result<Vec<Match>, RepositoryError> {
        self.inner.insert_matches(matches)
    }

    fn replace_match(
        &self,
        expected: VolunteerResponse,
        next: Match,
    ) -> Result<Match, RepositoryError> {
        self.inner.replace_match(expected, next)
    }

    fn insert_registration(
        &self,
        registration: Registration,
    ) -> Result<Registration, RepositoryError> {
        self.inner.insert_registration(registration)
    }

    fn fetch_registration(
        &self,
        id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError> {
        self.inner.fetch_registration(id)
    }

    fn registrations_for(
        &self,
        volunteer: &VolunteerId,
    ) -> Result<Vec<Registration>, RepositoryError> {
        self.inner.registrations_for(volunteer)
    }

    fn replace_registration(
        &self,
        expected: RegistrationStatus,
        next: Registration,
    ) -> Result<Registration, RepositoryError> {
        self.inner.replace_registration(expected, next)
    }

    fn confirm_registration(
        &self,
        next: Registration,
    ) -> Result<(Registration, Opportunity), RepositoryError> {
        std::thread::sleep(self.pause);
        self.inner.confirm_registration(next)
    }

    fn release_registration(
        &self,
        next: Registration,
    ) -> Result<(Registration, Opportunity), RepositoryError> {
        self.inner.release_registration(next)
    }

    fn insert_check(&self, check: BackgroundCheck) -> Result<BackgroundCheck, RepositoryError> {
        self.inner.insert_check(check)
    }

    fn fetch_check(&self, id: &CheckId) -> Result<Option<BackgroundCheck>, RepositoryError> {
        self.inner.fetch_check(id)
    }

    fn checks_for(&self, volunteer: &VolunteerId) -> Result<Vec<BackgroundCheck>, RepositoryError> {
        self.inner.checks_for(volunteer)
    }

    fn replace_check(
        &self,
        expected: CheckStatus,
        next: BackgroundCheck,
    ) -> Result<BackgroundCheck, RepositoryError> {
        self.inner.replace_check(expected, next)
    }
}

type Script = dyn Fn(&ScoringRequest) -> ScoringResponse + Send + Sync;

/// Oracle answering from a closure over the request it receives.
pub(super) struct ScriptedOracle {
    script: Box<Script>,
    calls: Mutex<usize>,
}

impl ScriptedOracle {
    pub(super) fn new(
        script: impl Fn(&ScoringRequest) -> ScoringResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        *self.calls.lock().expect("oracle mutex poisoned")
    }
}

#[async_trait]
impl ScoringOracle for ScriptedOracle {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn score(&self, request: ScoringRequest) -> Result<ScoringResponse, OracleError> {
        *self.calls.lock().expect("oracle mutex poisoned") += 1;
        Ok((self.script)(&request))
    }
}

pub(super) struct SlowOracle(pub(super) Duration);

#[async_trait]
impl ScoringOracle for SlowOracle {
    fn id(&self) -> &str {
        "slow"
    }

    async fn score(&self, _request: ScoringRequest) -> Result<ScoringResponse, OracleError> {
        tokio::time::sleep(self.0).await;
        Ok(ScoringResponse::default())
    }
}

pub(super) struct BrokenOracle;

#[async_trait]
impl ScoringOracle for BrokenOracle {
    fn id(&self) -> &str {
        "broken"
    }

    async fn score(&self, _request: ScoringRequest) -> Result<ScoringResponse, OracleError> {
        Err(OracleError::ParseError("expected value at line 1".to_string()))
    }
}

pub(super) fn oracle_entry(
    opportunity_id: &str,
    spiritual: f64,
    skill: f64,
    availability: f64,
    passion: f64,
) -> OracleMatch {
    OracleMatch {
        opportunity_id: opportunity_id.to_string(),
        spiritual_fit_score: Some(spiritual),
        skill_fit_score: Some(skill),
        availability_score: Some(availability),
        passion_score: Some(passion),
        explanation: "strong gift alignment".to_string(),
        reasons: vec!["teaches weekly".to_string()],
    }
}

pub(super) fn gift_ratings(ratings: &[(&str, u8)]) -> BTreeMap<String, u8> {
    ratings
        .iter()
        .map(|(gift, score)| (gift.to_string(), *score))
        .collect()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
