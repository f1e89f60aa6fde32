//! Volunteer profiles, assessment scoring, and opportunity records.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    normalize_tag, normalize_tags, Availability, CoordinatorId, Opportunity, OpportunityDraft,
    OpportunityId, OpportunityStatus, OrganizationId, ProfileStatus, ServingStyle, VolunteerId,
    VolunteerProfile,
};
use super::error::MatchingError;
use super::repository::MatchingStore;

const MAX_SPIRITUAL_GIFTS: usize = 3;
const SPIRITUAL_GIFT_THRESHOLD: u8 = 50;

/// One answered assessment question: how strongly a statement about a gift
/// applies, on a 1-5 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftRating {
    pub gift: String,
    pub rating: u8,
}

/// Raw questionnaire submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentResponses {
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub display_name: Option<String>,
    pub answers: Vec<GiftRating>,
    pub serving_style: ServingStyle,
    #[serde(default)]
    pub ministry_passions: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub availability: Availability,
}

/// Scored assessment ready to be merged into a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub organization_id: OrganizationId,
    pub display_name: Option<String>,
    pub gift_scores: BTreeMap<String, u8>,
    pub serving_style: ServingStyle,
    pub ministry_passions: BTreeSet<String>,
    pub skills: BTreeSet<String>,
    pub availability: Availability,
}

impl AssessmentResult {
    /// Averages the ratings per gift and rescales them to `0..=100`.
    pub fn from_responses(responses: AssessmentResponses) -> Result<Self, MatchingError> {
        if responses.answers.is_empty() {
            return Err(MatchingError::Validation(
                "assessment contains no answers".to_string(),
            ));
        }

        let mut totals: BTreeMap<String, (u32, u32)> = BTreeMap::new();
        for answer in &responses.answers {
            if !(1..=5).contains(&answer.rating) {
                return Err(MatchingError::Validation(format!(
                    "rating {} for '{}' is outside 1..=5",
                    answer.rating, answer.gift
                )));
            }
            let gift = normalize_tag(&answer.gift);
            if gift.is_empty() {
                return Err(MatchingError::Validation(
                    "assessment answer names no gift".to_string(),
                ));
            }
            let entry = totals.entry(gift).or_insert((0, 0));
            entry.0 += u32::from(answer.rating);
            entry.1 += 1;
        }

        let gift_scores = totals
            .into_iter()
            .map(|(gift, (sum, count))| {
                let mean = f64::from(sum) / f64::from(count);
                let scaled = ((mean - 1.0) / 4.0 * 100.0).round().clamp(0.0, 100.0) as u8;
                (gift, scaled)
            })
            .collect();

        Ok(Self {
            organization_id: responses.organization_id,
            display_name: responses.display_name,
            gift_scores,
            serving_style: responses.serving_style,
            ministry_passions: normalize_tags(&responses.ministry_passions),
            skills: normalize_tags(&responses.skills),
            availability: responses.availability,
        })
    }
}

/// Top gifts by score (ties broken by name) that clear the threshold.
pub fn spiritual_gifts_from(scores: &BTreeMap<String, u8>) -> BTreeSet<String> {
    let mut ranked: Vec<(&String, &u8)> = scores
        .iter()
        .filter(|(_, score)| **score >= SPIRITUAL_GIFT_THRESHOLD)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(MAX_SPIRITUAL_GIFTS)
        .map(|(gift, _)| gift.clone())
        .collect()
}

/// Single source of truth for profile and opportunity records.
pub struct ProfileStore<S> {
    store: Arc<S>,
}

impl<S> ProfileStore<S>
where
    S: MatchingStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn get_profile(&self, volunteer_id: &VolunteerId) -> Result<VolunteerProfile, MatchingError> {
        self.store
            .fetch_profile(volunteer_id)?
            .ok_or_else(|| MatchingError::not_found("volunteer", volunteer_id))
    }

    /// Creates the profile on first submission, otherwise merges: gift scores
    /// key by key, passions and skills by union; style and availability are
    /// replaced and the gift set is recomputed from the merged scores.
    pub fn upsert_assessment(
        &self,
        volunteer_id: &VolunteerId,
        assessment: AssessmentResult,
    ) -> Result<VolunteerProfile, MatchingError> {
        if let Some(score) = assessment.gift_scores.values().find(|score| **score > 100) {
            return Err(MatchingError::Validation(format!(
                "gift score {score} is outside 0..=100"
            )));
        }
        let now = Utc::now();

        let profile = match self.store.fetch_profile(volunteer_id)? {
            Some(mut profile) => {
                if profile.organization_id != assessment.organization_id {
                    return Err(MatchingError::Validation(format!(
                        "volunteer {volunteer_id} belongs to organization {}",
                        profile.organization_id
                    )));
                }
                profile
                    .gift_scores
                    .extend(normalize_scores(assessment.gift_scores));
                profile.spiritual_gifts = spiritual_gifts_from(&profile.gift_scores);
                profile
                    .ministry_passions
                    .extend(normalize_tags(&assessment.ministry_passions));
                profile.skills.extend(normalize_tags(&assessment.skills));
                profile.serving_style = assessment.serving_style;
                profile.availability = assessment.availability;
                if assessment.display_name.is_some() {
                    profile.display_name = assessment.display_name;
                }
                profile.updated_at = now;
                profile
            }
            None => {
                let gift_scores = normalize_scores(assessment.gift_scores);
                VolunteerProfile {
                    volunteer_id: volunteer_id.clone(),
                    organization_id: assessment.organization_id,
                    display_name: assessment.display_name,
                    spiritual_gifts: spiritual_gifts_from(&gift_scores),
                    gift_scores,
                    serving_style: assessment.serving_style,
                    ministry_passions: normalize_tags(&assessment.ministry_passions),
                    skills: normalize_tags(&assessment.skills),
                    availability: assessment.availability,
                    status: ProfileStatus::Active,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        let saved = self.store.save_profile(profile)?;
        info!(
            volunteer = %saved.volunteer_id,
            gifts = saved.spiritual_gifts.len(),
            "assessment recorded"
        );
        Ok(saved)
    }

    pub fn set_profile_status(
        &self,
        volunteer_id: &VolunteerId,
        status: ProfileStatus,
    ) -> Result<VolunteerProfile, MatchingError> {
        let mut profile = self.get_profile(volunteer_id)?;
        if profile.status == status {
            return Ok(profile);
        }
        profile.status = status;
        profile.updated_at = Utc::now();
        let saved = self.store.save_profile(profile)?;
        info!(volunteer = %volunteer_id, status = status.label(), "profile status changed");
        Ok(saved)
    }

    pub fn register_coordinator(
        &self,
        organization: &OrganizationId,
        coordinator: &CoordinatorId,
    ) -> Result<(), MatchingError> {
        self.store.add_coordinator(organization, coordinator)?;
        Ok(())
    }

    pub(crate) fn ensure_coordinator(
        &self,
        organization: &OrganizationId,
        coordinator: &CoordinatorId,
    ) -> Result<(), MatchingError> {
        if self.store.is_coordinator(organization, coordinator)? {
            Ok(())
        } else {
            Err(MatchingError::Forbidden {
                coordinator: coordinator.clone(),
                organization: organization.clone(),
            })
        }
    }

    pub fn create_opportunity(
        &self,
        coordinator: &CoordinatorId,
        draft: OpportunityDraft,
    ) -> Result<Opportunity, MatchingError> {
        self.ensure_coordinator(&draft.organization_id, coordinator)?;

        let title = draft.title.trim();
        if title.is_empty() {
            return Err(MatchingError::Validation(
                "opportunity title must not be empty".to_string(),
            ));
        }
        if draft.volunteers_needed == 0 {
            return Err(MatchingError::Validation(
                "volunteers_needed must be at least 1".to_string(),
            ));
        }

        let opportunity = Opportunity {
            opportunity_id: OpportunityId::new(),
            organization_id: draft.organization_id,
            coordinator_id: coordinator.clone(),
            title: title.to_string(),
            description: draft.description,
            ministry_area: draft.ministry_area,
            required_gifts: normalize_tags(&draft.required_gifts),
            required_skills: normalize_tags(&draft.required_skills),
            volunteers_needed: draft.volunteers_needed,
            volunteers_registered: 0,
            background_check_required: draft.background_check_required,
            is_leadership_role: draft.is_leadership_role,
            status: OpportunityStatus::Open,
            created_at: Utc::now(),
        };

        let stored = self.store.insert_opportunity(opportunity)?;
        info!(
            opportunity = %stored.opportunity_id,
            organization = %stored.organization_id,
            needed = stored.volunteers_needed,
            "opportunity created"
        );
        Ok(stored)
    }

    pub fn get_opportunity(&self, id: &OpportunityId) -> Result<Opportunity, MatchingError> {
        self.store
            .fetch_opportunity(id)?
            .ok_or_else(|| MatchingError::not_found("opportunity", id))
    }

    pub fn close_opportunity(
        &self,
        coordinator: &CoordinatorId,
        id: &OpportunityId,
    ) -> Result<Opportunity, MatchingError> {
        let opportunity = self.get_opportunity(id)?;
        self.ensure_coordinator(&opportunity.organization_id, coordinator)?;
        if opportunity.status == OpportunityStatus::Closed {
            return Ok(opportunity);
        }
        let closed = self
            .store
            .set_opportunity_status(id, OpportunityStatus::Closed)?;
        info!(opportunity = %id, "opportunity closed");
        Ok(closed)
    }

    /// Open opportunities with remaining capacity, oldest first.
    pub fn list_open_opportunities(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<Opportunity>, MatchingError> {
        Ok(self
            .store
            .opportunities_for(organization)?
            .into_iter()
            .filter(Opportunity::accepting_volunteers)
            .collect())
    }
}

fn normalize_scores(scores: BTreeMap<String, u8>) -> BTreeMap<String, u8> {
    scores
        .into_iter()
        .map(|(gift, score)| (normalize_tag(&gift), score))
        .filter(|(gift, _)| !gift.is_empty())
        .collect()
}
