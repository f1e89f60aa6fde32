//! Wire contract with the external scoring oracle.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::matching::domain::{Availability, Opportunity, ServingStyle, VolunteerProfile};

/// Errors a scoring oracle may report. Any of them sends the whole round
/// through the fallback scorer.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle request failed: {0}")]
    RequestFailed(String),
    #[error("oracle response could not be decoded: {0}")]
    ParseError(String),
    #[error("oracle did not answer within {0:?}")]
    Timeout(Duration),
}

/// Non-deterministic capability that rates opportunities for a profile.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    /// Identifier used in logs (model or endpoint name).
    fn id(&self) -> &str;

    async fn score(&self, request: ScoringRequest) -> Result<ScoringResponse, OracleError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub profile: ProfileSummary,
    pub opportunities: Vec<OpportunitySummary>,
}

impl ScoringRequest {
    pub fn new(profile: &VolunteerProfile, opportunities: &[Opportunity]) -> Self {
        Self {
            profile: ProfileSummary::from(profile),
            opportunities: opportunities.iter().map(OpportunitySummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub spiritual_gifts: BTreeSet<String>,
    pub gift_scores: BTreeMap<String, u8>,
    pub serving_style: ServingStyle,
    pub ministry_passions: BTreeSet<String>,
    pub skills: BTreeSet<String>,
    pub availability: Availability,
}

impl From<&VolunteerProfile> for ProfileSummary {
    fn from(profile: &VolunteerProfile) -> Self {
        Self {
            spiritual_gifts: profile.spiritual_gifts.clone(),
            gift_scores: profile.gift_scores.clone(),
            serving_style: profile.serving_style,
            ministry_passions: profile.ministry_passions.clone(),
            skills: profile.skills.clone(),
            availability: profile.availability.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunitySummary {
    pub opportunity_id: String,
    pub title: String,
    pub description: String,
    pub ministry_area: Option<String>,
    pub required_gifts: BTreeSet<String>,
    pub required_skills: BTreeSet<String>,
    pub is_leadership_role: bool,
}

impl From<&Opportunity> for OpportunitySummary {
    fn from(opportunity: &Opportunity) -> Self {
        Self {
            opportunity_id: opportunity.opportunity_id.to_string(),
            title: opportunity.title.clone(),
            description: opportunity.description.clone(),
            ministry_area: opportunity.ministry_area.clone(),
            required_gifts: opportunity.required_gifts.clone(),
            required_skills: opportunity.required_skills.clone(),
            is_leadership_role: opportunity.is_leadership_role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoringResponse {
    #[serde(default)]
    pub matches: Vec<OracleMatch>,
}

/// One oracle verdict. Scores are optional on the wire so a single malformed
/// entry only costs that opportunity, not the whole response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OracleMatch {
    pub opportunity_id: String,
    #[serde(default)]
    pub spiritual_fit_score: Option<f64>,
    #[serde(default)]
    pub skill_fit_score: Option<f64>,
    #[serde(default)]
    pub availability_score: Option<f64>,
    #[serde(default)]
    pub passion_score: Option<f64>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Stand-in used when no oracle endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableOracle;

#[async_trait]
impl ScoringOracle for UnavailableOracle {
    fn id(&self) -> &str {
        "unconfigured"
    }

    async fn score(&self, _request: ScoringRequest) -> Result<ScoringResponse, OracleError> {
        Err(OracleError::Unavailable(
            "no scoring oracle configured".to_string(),
        ))
    }
}
