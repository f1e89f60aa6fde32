use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

macro_rules! external_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

external_identifier!(
    /// Identity of a volunteer as issued by the organization's account system.
    VolunteerId
);
external_identifier!(OrganizationId);
external_identifier!(CoordinatorId);

uuid_identifier!(OpportunityId);
uuid_identifier!(MatchId);
uuid_identifier!(
    /// Shared by every Match persisted during one scoring round.
    RoundId
);
uuid_identifier!(RegistrationId);
uuid_identifier!(CheckId);

/// Canonical form for gift, skill, and passion names: trimmed, lower-cased,
/// inner whitespace collapsed to `_`.
pub fn normalize_tag(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

pub(crate) fn normalize_tags<I, T>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    raw.into_iter()
        .map(|tag| normalize_tag(tag.as_ref()))
        .filter(|tag| !tag.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServingStyle {
    HandsOn,
    BehindScenes,
    Leadership,
    Support,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    #[default]
    Active,
    Inactive,
}

impl ProfileStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ProfileStatus::Active => "active",
            ProfileStatus::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
}

/// When a volunteer can serve.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Availability {
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub hours_per_month: Option<u16>,
}

/// Assessment-derived volunteer profile. Never hard-deleted; deactivation
/// flips `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolunteerProfile {
    pub volunteer_id: VolunteerId,
    pub organization_id: OrganizationId,
    pub display_name: Option<String>,
    pub spiritual_gifts: BTreeSet<String>,
    pub gift_scores: BTreeMap<String, u8>,
    pub serving_style: ServingStyle,
    pub ministry_passions: BTreeSet<String>,
    pub skills: BTreeSet<String>,
    pub availability: Availability,
    pub status: ProfileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VolunteerProfile {
    pub fn is_active(&self) -> bool {
        self.status == ProfileStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Open,
    Filled,
    Closed,
}

impl OpportunityStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OpportunityStatus::Open => "open",
            OpportunityStatus::Filled => "filled",
            OpportunityStatus::Closed => "closed",
        }
    }
}

/// Coordinator supplied description of a new serving need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityDraft {
    pub organization_id: OrganizationId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ministry_area: Option<String>,
    #[serde(default)]
    pub required_gifts: Vec<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    pub volunteers_needed: u32,
    #[serde(default)]
    pub background_check_required: bool,
    #[serde(default)]
    pub is_leadership_role: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity_id: OpportunityId,
    pub organization_id: OrganizationId,
    pub coordinator_id: CoordinatorId,
    pub title: String,
    pub description: String,
    pub ministry_area: Option<String>,
    pub required_gifts: BTreeSet<String>,
    pub required_skills: BTreeSet<String>,
    pub volunteers_needed: u32,
    pub volunteers_registered: u32,
    pub background_check_required: bool,
    pub is_leadership_role: bool,
    pub status: OpportunityStatus,
    pub created_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn remaining_capacity(&self) -> u32 {
        self.volunteers_needed
            .saturating_sub(self.volunteers_registered)
    }

    /// Open and not yet at capacity.
    pub fn accepting_volunteers(&self) -> bool {
        self.status == OpportunityStatus::Open && self.remaining_capacity() > 0
    }

    /// Approval must wait for a passed background check.
    pub fn requires_clearance(&self) -> bool {
        self.background_check_required || self.is_leadership_role
    }
}

/// The four component fits, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub spiritual_fit: f64,
    pub skill_fit: f64,
    pub availability: f64,
    pub passion: f64,
}

impl ComponentScores {
    pub fn in_range(&self) -> bool {
        [
            self.spiritual_fit,
            self.skill_fit,
            self.availability,
            self.passion,
        ]
        .iter()
        .all(|score| score.is_finite() && (0.0..=1.0).contains(score))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationTier {
    HighlyRecommended,
    Recommended,
    Consider,
    NotRecommended,
}

impl RecommendationTier {
    pub const fn label(self) -> &'static str {
        match self {
            RecommendationTier::HighlyRecommended => "highly_recommended",
            RecommendationTier::Recommended => "recommended",
            RecommendationTier::Consider => "consider",
            RecommendationTier::NotRecommended => "not_recommended",
        }
    }
}

/// Where a Match's component scores came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Oracle,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolunteerResponse {
    #[serde(rename = "none")]
    NoResponse,
    Applied,
    Approved,
    Rejected,
}

impl VolunteerResponse {
    pub const fn label(self) -> &'static str {
        match self {
            VolunteerResponse::NoResponse => "none",
            VolunteerResponse::Applied => "applied",
            VolunteerResponse::Approved => "approved",
            VolunteerResponse::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: MatchId,
    pub round_id: RoundId,
    pub volunteer_id: VolunteerId,
    pub opportunity_id: OpportunityId,
    pub scores: ComponentScores,
    pub divine_appointment_score: f64,
    pub recommendation_tier: RecommendationTier,
    pub source: ScoreSource,
    pub explanation: String,
    pub reasons: Vec<String>,
    pub volunteer_response: VolunteerResponse,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Match {
    /// Anything but `rejected` blocks another Match for the same pair.
    pub fn is_active(&self) -> bool {
        self.volunteer_response != VolunteerResponse::Rejected
    }

    pub fn is_unanswered(&self) -> bool {
        self.volunteer_response == VolunteerResponse::NoResponse
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    PendingApproval,
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RegistrationStatus::PendingApproval => "pending_approval",
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(self) -> bool {
        self != RegistrationStatus::Cancelled
    }
}

/// Durable application record created when a volunteer applies to a Match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub registration_id: RegistrationId,
    pub match_id: MatchId,
    pub volunteer_id: VolunteerId,
    pub opportunity_id: OpportunityId,
    pub status: RegistrationStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<CoordinatorId>,
}

/// Coordinator verdict on a pending registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pending,
    Passed,
    Failed,
}

impl CheckStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CheckStatus::Pending => "pending",
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundCheck {
    pub check_id: CheckId,
    pub volunteer_id: VolunteerId,
    pub check_type: String,
    pub status: CheckStatus,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
