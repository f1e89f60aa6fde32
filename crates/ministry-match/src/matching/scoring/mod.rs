//! Scoring adapter: oracle delegation, range validation, fallback, and the
//! one normative composite/tier mapping shared by every score source.

pub mod fallback;
pub mod http;
pub mod oracle;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{
    ComponentScores, Opportunity, OpportunityId, RecommendationTier, ScoreSource,
    VolunteerProfile,
};
use oracle::{OracleError, OracleMatch, ScoringOracle, ScoringRequest, ScoringResponse};

pub const SPIRITUAL_WEIGHT: f64 = 0.4;
pub const SKILL_WEIGHT: f64 = 0.3;
pub const AVAILABILITY_WEIGHT: f64 = 0.2;
pub const PASSION_WEIGHT: f64 = 0.1;

pub const HIGHLY_RECOMMENDED_THRESHOLD: f64 = 0.85;
pub const RECOMMENDED_THRESHOLD: f64 = 0.65;
pub const CONSIDER_THRESHOLD: f64 = 0.4;

/// Weighted composite ("divine appointment score"), rounded to four places
/// so tier boundaries are not decided by float noise.
pub fn composite_score(scores: &ComponentScores) -> f64 {
    let raw = SPIRITUAL_WEIGHT * scores.spiritual_fit
        + SKILL_WEIGHT * scores.skill_fit
        + AVAILABILITY_WEIGHT * scores.availability
        + PASSION_WEIGHT * scores.passion;
    (raw * 10_000.0).round() / 10_000.0
}

impl RecommendationTier {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGHLY_RECOMMENDED_THRESHOLD {
            RecommendationTier::HighlyRecommended
        } else if score >= RECOMMENDED_THRESHOLD {
            RecommendationTier::Recommended
        } else if score >= CONSIDER_THRESHOLD {
            RecommendationTier::Consider
        } else {
            RecommendationTier::NotRecommended
        }
    }
}

/// Validated score for one opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScoreResult {
    pub opportunity_id: OpportunityId,
    pub scores: ComponentScores,
    pub composite: f64,
    pub tier: RecommendationTier,
    pub source: ScoreSource,
    pub explanation: String,
    pub reasons: Vec<String>,
}

impl MatchScoreResult {
    pub fn new(
        opportunity_id: OpportunityId,
        scores: ComponentScores,
        source: ScoreSource,
        explanation: String,
        reasons: Vec<String>,
    ) -> Self {
        let composite = composite_score(&scores);
        Self {
            opportunity_id,
            scores,
            composite,
            tier: RecommendationTier::from_score(composite),
            source,
            explanation,
            reasons,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("{0}")]
    Unavailable(String),
}

/// Delegates to the oracle under a timeout and never trusts its raw output.
pub struct ScoringAdapter {
    oracle: Arc<dyn ScoringOracle>,
    timeout: Duration,
}

impl ScoringAdapter {
    pub fn new(oracle: Arc<dyn ScoringOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// One result per opportunity that survived validation, in input order.
    pub async fn score_opportunities(
        &self,
        profile: &VolunteerProfile,
        opportunities: &[Opportunity],
    ) -> Result<Vec<MatchScoreResult>, ScoringError> {
        if opportunities.is_empty() {
            return Ok(Vec::new());
        }

        match self.call_oracle(profile, opportunities).await {
            Ok(response) => {
                let results = normalize_response(response, opportunities);
                debug!(
                    oracle = self.oracle.id(),
                    requested = opportunities.len(),
                    accepted = results.len(),
                    "oracle scores accepted"
                );
                Ok(results)
            }
            Err(err) => {
                warn!(
                    oracle = self.oracle.id(),
                    error = %err,
                    "scoring oracle failed, using fallback scorer"
                );
                fallback::score_all(profile, opportunities)
            }
        }
    }

    async fn call_oracle(
        &self,
        profile: &VolunteerProfile,
        opportunities: &[Opportunity],
    ) -> Result<ScoringResponse, OracleError> {
        let request = ScoringRequest::new(profile, opportunities);
        match tokio::time::timeout(self.timeout, self.oracle.score(request)).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.timeout)),
        }
    }
}

/// Pairs oracle entries with the requested opportunities. Missing, duplicate
/// (after the first), unknown, and out-of-range entries are dropped; any
/// oracle-supplied composite is ignored in favour of [`composite_score`].
pub fn normalize_response(
    response: ScoringResponse,
    opportunities: &[Opportunity],
) -> Vec<MatchScoreResult> {
    let mut by_id: HashMap<String, OracleMatch> = HashMap::new();
    for entry in response.matches {
        by_id.entry(entry.opportunity_id.trim().to_string()).or_insert(entry);
    }

    opportunities
        .iter()
        .filter_map(|opportunity| {
            let id = opportunity.opportunity_id;
            let Some(entry) = by_id.remove(&id.to_string()) else {
                warn!(opportunity = %id, "oracle omitted opportunity, discarding");
                return None;
            };
            let scores = match validated_scores(&entry) {
                Some(scores) => scores,
                None => {
                    warn!(opportunity = %id, "oracle scores missing or out of range, discarding");
                    return None;
                }
            };
            Some(MatchScoreResult::new(
                id,
                scores,
                ScoreSource::Oracle,
                entry.explanation,
                entry.reasons,
            ))
        })
        .collect()
}

fn validated_scores(entry: &OracleMatch) -> Option<ComponentScores> {
    let scores = ComponentScores {
        spiritual_fit: entry.spiritual_fit_score?,
        skill_fit: entry.skill_fit_score?,
        availability: entry.availability_score?,
        passion: entry.passion_score?,
    };
    scores.in_range().then_some(scores)
}
