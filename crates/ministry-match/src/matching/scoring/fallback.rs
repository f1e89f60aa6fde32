//! Deterministic heuristic scorer used when the oracle cannot answer.

use std::collections::BTreeSet;

use tracing::warn;

use super::{MatchScoreResult, ScoringError};
use crate::matching::domain::{ComponentScores, Opportunity, ScoreSource, VolunteerProfile};

pub const FALLBACK_AVAILABILITY: f64 = 0.7;
pub const FALLBACK_PASSION: f64 = 0.5;

/// Share of the required tags the volunteer holds; no requirement is a full fit.
pub fn overlap_ratio(held: &BTreeSet<String>, required: &BTreeSet<String>) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    let shared = required.intersection(held).count();
    shared as f64 / required.len() as f64
}

pub fn score_one(profile: &VolunteerProfile, opportunity: &Opportunity) -> Option<MatchScoreResult> {
    if opportunity.volunteers_needed == 0
        || opportunity.volunteers_registered > opportunity.volunteers_needed
    {
        return None;
    }

    let scores = ComponentScores {
        spiritual_fit: overlap_ratio(&profile.spiritual_gifts, &opportunity.required_gifts),
        skill_fit: overlap_ratio(&profile.skills, &opportunity.required_skills),
        availability: FALLBACK_AVAILABILITY,
        passion: FALLBACK_PASSION,
    };

    let mut reasons = Vec::new();
    let shared_gifts: Vec<&str> = opportunity
        .required_gifts
        .intersection(&profile.spiritual_gifts)
        .map(String::as_str)
        .collect();
    if !shared_gifts.is_empty() {
        reasons.push(format!("shares gifts: {}", shared_gifts.join(", ")));
    }
    let shared_skills: Vec<&str> = opportunity
        .required_skills
        .intersection(&profile.skills)
        .map(String::as_str)
        .collect();
    if !shared_skills.is_empty() {
        reasons.push(format!("brings skills: {}", shared_skills.join(", ")));
    }

    Some(MatchScoreResult::new(
        opportunity.opportunity_id,
        scores,
        ScoreSource::Fallback,
        format!(
            "heuristic fit: {:.0}% of required gifts, {:.0}% of required skills",
            scores.spiritual_fit * 100.0,
            scores.skill_fit * 100.0
        ),
        reasons,
    ))
}

/// Scores every candidate. Candidates with malformed capacity data are
/// skipped; if nothing can be scored the round is unavailable.
pub fn score_all(
    profile: &VolunteerProfile,
    opportunities: &[Opportunity],
) -> Result<Vec<MatchScoreResult>, ScoringError> {
    let mut results = Vec::with_capacity(opportunities.len());
    for opportunity in opportunities {
        match score_one(profile, opportunity) {
            Some(result) => results.push(result),
            None => warn!(
                opportunity = %opportunity.opportunity_id,
                needed = opportunity.volunteers_needed,
                registered = opportunity.volunteers_registered,
                "skipping opportunity with malformed capacity"
            ),
        }
    }

    if results.is_empty() && !opportunities.is_empty() {
        return Err(ScoringError::Unavailable(format!(
            "fallback scorer could not score any of {} opportunities",
            opportunities.len()
        )));
    }
    Ok(results)
}
