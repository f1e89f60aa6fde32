use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};

use super::domain::{Match, MatchId, OpportunityId, RoundId, VolunteerId, VolunteerResponse};
use super::error::MatchingError;
use super::notify::{Notification, NotificationGateway, NotificationKind, Notifier};
use super::repository::{MatchingStore, RepositoryError};
use super::scoring::{ScoringAdapter, ScoringError};

/// Orchestrates scoring rounds for a volunteer.
pub struct MatchEngine<S, N> {
    store: Arc<S>,
    scoring: ScoringAdapter,
    notifier: Notifier<N>,
    rounds: Mutex<HashMap<VolunteerId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S, N> MatchEngine<S, N>
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    pub(crate) fn new(store: Arc<S>, scoring: ScoringAdapter, notifier: Notifier<N>) -> Self {
        Self {
            store,
            scoring,
            notifier,
            rounds: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the volunteer's unanswered matches if any exist, otherwise
    /// scores a fresh round over the open opportunities not already held.
    pub async fn find_matches(&self, volunteer_id: &VolunteerId) -> Result<Vec<Match>, MatchingError> {
        let round = self.run_round(volunteer_id, None).await?;
        if let Some(round_id) = round.scored {
            if !round.matches.is_empty() {
                self.notifier.dispatch(
                    Notification::new(
                        volunteer_id.to_string(),
                        NotificationKind::NewMatches,
                        "New serving matches",
                        format!(
                            "{} opportunities fit your gifts and skills.",
                            round.matches.len()
                        ),
                    )
                    .with_action_url(format!("/volunteers/{volunteer_id}/matches"))
                    .with_metadata("round_id", round_id),
                );
            }
        }
        Ok(round.matches)
    }

    /// Follow-up after a rejection: same rules as [`Self::find_matches`] with
    /// the rejected opportunity left out.
    pub async fn suggest_alternatives(
        &self,
        volunteer_id: &VolunteerId,
        excluded: &OpportunityId,
    ) -> Result<Vec<Match>, MatchingError> {
        let matches = self.run_round(volunteer_id, Some(excluded)).await?.matches;
        if !matches.is_empty() {
            self.notifier.dispatch(
                Notification::new(
                    volunteer_id.to_string(),
                    NotificationKind::AlternativeMatches,
                    "Other places to serve",
                    format!(
                        "We found {} other opportunities that fit your gifts.",
                        matches.len()
                    ),
                )
                .with_action_url(format!("/volunteers/{volunteer_id}/matches"))
                .with_metadata("excluded_opportunity", excluded),
            );
        }
        Ok(matches)
    }

    pub fn get_match(&self, id: &MatchId) -> Result<Match, MatchingError> {
        self.store
            .fetch_match(id)?
            .ok_or_else(|| MatchingError::not_found("match", id))
    }

    fn round_lock(&self, volunteer_id: &VolunteerId) -> Result<Arc<tokio::sync::Mutex<()>>, MatchingError> {
        let mut rounds = self.rounds.lock().map_err(|_| {
            RepositoryError::Unavailable("match round registry lock poisoned".to_string())
        })?;
        Ok(Arc::clone(rounds.entry(volunteer_id.clone()).or_default()))
    }

    /// Drops the volunteer's lock entry once no round holds or awaits it.
    fn forget_round_lock(&self, volunteer_id: &VolunteerId) {
        let Ok(mut rounds) = self.rounds.lock() else {
            return;
        };
        if rounds
            .get(volunteer_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            rounds.remove(volunteer_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_rounds(&self) -> usize {
        self.rounds
            .lock()
            .map(|rounds| rounds.len())
            .unwrap_or_default()
    }

    /// Serializes rounds per volunteer. Notifications are left to the caller
    /// so a slow gateway never holds the lock.
    async fn run_round(
        &self,
        volunteer_id: &VolunteerId,
        excluded: Option<&OpportunityId>,
    ) -> Result<Round, MatchingError> {
        let lock = self.round_lock(volunteer_id)?;
        let outcome = {
            let _round = lock.lock().await;
            self.score_round(volunteer_id, excluded).await
        };
        drop(lock);
        self.forget_round_lock(volunteer_id);
        outcome
    }

    async fn score_round(
        &self,
        volunteer_id: &VolunteerId,
        excluded: Option<&OpportunityId>,
    ) -> Result<Round, MatchingError> {
        let existing = self.store.matches_for(volunteer_id)?;
        let unanswered: Vec<Match> = existing
            .iter()
            .filter(|candidate| candidate.is_unanswered())
            .filter(|candidate| Some(&candidate.opportunity_id) != excluded)
            .cloned()
            .collect();
        if !unanswered.is_empty() {
            debug!(
                volunteer = %volunteer_id,
                pending = unanswered.len(),
                "returning unanswered matches without rescoring"
            );
            return Ok(Round {
                matches: ranked(unanswered),
                scored: None,
            });
        }

        let profile = self
            .store
            .fetch_profile(volunteer_id)?
            .ok_or_else(|| MatchingError::not_found("volunteer", volunteer_id))?;
        if !profile.is_active() {
            return Err(MatchingError::transition(
                "volunteer",
                volunteer_id,
                profile.status.label(),
                "matching",
            ));
        }

        let mut held: HashSet<OpportunityId> = existing
            .iter()
            .filter(|candidate| candidate.is_active())
            .map(|candidate| candidate.opportunity_id)
            .collect();
        held.extend(
            self.store
                .registrations_for(volunteer_id)?
                .into_iter()
                .filter(|registration| registration.status.is_active())
                .map(|registration| registration.opportunity_id),
        );
        held.extend(excluded.copied());

        let candidates: Vec<_> = self
            .store
            .opportunities_for(&profile.organization_id)?
            .into_iter()
            .filter(|opportunity| opportunity.accepting_volunteers())
            .filter(|opportunity| !held.contains(&opportunity.opportunity_id))
            .collect();
        if candidates.is_empty() {
            debug!(volunteer = %volunteer_id, "no open opportunities left to score");
            return Ok(Round {
                matches: Vec::new(),
                scored: None,
            });
        }

        let results = self
            .scoring
            .score_opportunities(&profile, &candidates)
            .await
            .map_err(|ScoringError::Unavailable(reason)| MatchingError::ScoringUnavailable(reason))?;

        let round_id = RoundId::new();
        let now = Utc::now();
        let matches: Vec<Match> = results
            .into_iter()
            .map(|result| Match {
                match_id: MatchId::new(),
                round_id,
                volunteer_id: volunteer_id.clone(),
                opportunity_id: result.opportunity_id,
                scores: result.scores,
                divine_appointment_score: result.composite,
                recommendation_tier: result.tier,
                source: result.source,
                explanation: result.explanation,
                reasons: result.reasons,
                volunteer_response: VolunteerResponse::NoResponse,
                created_at: now,
                responded_at: None,
            })
            .collect();
        let matches = ranked(matches);

        let stored = self.store.insert_matches(matches)?;
        info!(
            volunteer = %volunteer_id,
            round = %round_id,
            candidates = candidates.len(),
            matched = stored.len(),
            "scoring round persisted"
        );

        Ok(Round {
            matches: stored,
            scored: Some(round_id),
        })
    }
}

/// Outcome of one locked round. `scored` carries the round id when fresh
/// matches were persisted rather than returned from an earlier round.
struct Round {
    matches: Vec<Match>,
    scored: Option<RoundId>,
}

/// Descending composite; the stable sort keeps creation order (oldest
/// opportunity first) among equal scores.
fn ranked(mut matches: Vec<Match>) -> Vec<Match> {
    matches.sort_by(|a, b| {
        b.divine_appointment_score
            .total_cmp(&a.divine_appointment_score)
    });
    matches
}
