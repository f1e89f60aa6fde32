use super::domain::{
    BackgroundCheck, CheckId, CheckStatus, CoordinatorId, Match, MatchId, Opportunity,
    OpportunityId, OpportunityStatus, OrganizationId, Registration, RegistrationId,
    RegistrationStatus, VolunteerId, VolunteerProfile, VolunteerResponse,
};

/// Storage abstraction behind every matching component.
///
/// Row updates are compare-and-swap: `replace_*` only writes when the stored
/// row is still in the expected state, otherwise it fails with
/// [`RepositoryError::StaleState`] and leaves the row untouched. Capacity is
/// only ever mutated through [`MatchingStore::confirm_registration`] and
/// [`MatchingStore::release_registration`], which move a registration and its
/// opportunity's slot count together in one atomic step.
pub trait MatchingStore: Send + Sync {
    fn fetch_profile(&self, id: &VolunteerId) -> Result<Option<VolunteerProfile>, RepositoryError>;
    fn save_profile(&self, profile: VolunteerProfile) -> Result<VolunteerProfile, RepositoryError>;

    fn add_coordinator(
        &self,
        organization: &OrganizationId,
        coordinator: &CoordinatorId,
    ) -> Result<(), RepositoryError>;
    fn is_coordinator(
        &self,
        organization: &OrganizationId,
        coordinator: &CoordinatorId,
    ) -> Result<bool, RepositoryError>;

    fn insert_opportunity(&self, opportunity: Opportunity) -> Result<Opportunity, RepositoryError>;
    fn fetch_opportunity(&self, id: &OpportunityId) -> Result<Option<Opportunity>, RepositoryError>;
    /// All opportunities of an organization, oldest first.
    fn opportunities_for(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<Opportunity>, RepositoryError>;
    fn set_opportunity_status(
        &self,
        id: &OpportunityId,
        status: OpportunityStatus,
    ) -> Result<Opportunity, RepositoryError>;

    fn fetch_match(&self, id: &MatchId) -> Result<Option<Match>, RepositoryError>;
    /// Matches for a volunteer in insertion order.
    fn matches_for(&self, volunteer: &VolunteerId) -> Result<Vec<Match>, RepositoryError>;
    /// Persists a scoring round. Fails with [`RepositoryError::Conflict`] and
    /// writes nothing when any pair already holds an active Match.
    fn insert_matches(&self, matches: Vec<Match>) -> Result<Vec<Match>, RepositoryError>;
    fn replace_match(
        &self,
        expected: VolunteerResponse,
        next: Match,
    ) -> Result<Match, RepositoryError>;

    /// Fails with [`RepositoryError::Conflict`] when the pair already holds an
    /// active registration.
    fn insert_registration(
        &self,
        registration: Registration,
    ) -> Result<Registration, RepositoryError>;
    fn fetch_registration(
        &self,
        id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError>;
    fn registrations_for(
        &self,
        volunteer: &VolunteerId,
    ) -> Result<Vec<Registration>, RepositoryError>;
    fn replace_registration(
        &self,
        expected: RegistrationStatus,
        next: Registration,
    ) -> Result<Registration, RepositoryError>;
    /// Writes `next` over a `pending_approval` registration and takes one slot
    /// of its opportunity, or writes nothing. Fails with
    /// [`RepositoryError::StaleState`] once the registration left
    /// `pending_approval`, and with [`RepositoryError::CapacityExhausted`] or
    /// [`RepositoryError::OpportunityClosed`] when no slot can be taken. The
    /// last slot flips the opportunity to `filled`.
    fn confirm_registration(
        &self,
        next: Registration,
    ) -> Result<(Registration, Opportunity), RepositoryError>;
    /// Writes `next` over a `confirmed` registration and gives its slot back;
    /// a `filled` opportunity reopens.
    fn release_registration(
        &self,
        next: Registration,
    ) -> Result<(Registration, Opportunity), RepositoryError>;

    /// Fails with [`RepositoryError::Conflict`] while a pending check of the
    /// same type exists for the volunteer.
    fn insert_check(&self, check: BackgroundCheck) -> Result<BackgroundCheck, RepositoryError>;
    fn fetch_check(&self, id: &CheckId) -> Result<Option<BackgroundCheck>, RepositoryError>;
    /// Checks for a volunteer in request order.
    fn checks_for(&self, volunteer: &VolunteerId) -> Result<Vec<BackgroundCheck>, RepositoryError>;
    fn replace_check(
        &self,
        expected: CheckStatus,
        next: BackgroundCheck,
    ) -> Result<BackgroundCheck, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record changed concurrently (expected {expected}, found {found})")]
    StaleState {
        expected: &'static str,
        found: &'static str,
    },
    #[error("opportunity has no remaining capacity")]
    CapacityExhausted,
    #[error("opportunity is closed")]
    OpportunityClosed,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
