//! Volunteer to opportunity matching and the approval workflow that follows.
//!
//! A scoring round ranks open opportunities for one volunteer and persists the
//! results as matches. Accepting a match opens a registration that a
//! coordinator confirms or rejects; confirmed registrations consume the
//! opportunity's capacity.

pub mod domain;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod memory;
pub mod notify;
pub mod profiles;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use domain::{
    Availability, BackgroundCheck, CheckId, CheckStatus, ComponentScores, CoordinatorId, Decision,
    Match, MatchId, Opportunity, OpportunityDraft, OpportunityId, OpportunityStatus,
    OrganizationId, ProfileStatus, RecommendationTier, Registration, RegistrationId,
    RegistrationStatus, RoundId, ScoreSource, ServingStyle, TimeSlot, VolunteerId,
    VolunteerProfile, VolunteerResponse,
};
pub use eligibility::CheckOutcome;
pub use error::MatchingError;
pub use memory::MemoryStore;
pub use notify::{Notification, NotificationGateway, NotificationKind, NotifyError};
pub use profiles::{AssessmentResponses, AssessmentResult, GiftRating};
pub use repository::{MatchingStore, RepositoryError};
pub use router::matching_router;
pub use scoring::http::HttpScoringOracle;
pub use scoring::oracle::{OracleError, ScoringOracle, UnavailableOracle};
pub use scoring::{MatchScoreResult, ScoringAdapter};
pub use service::MatchingService;
pub use workflow::DecisionReceipt;
