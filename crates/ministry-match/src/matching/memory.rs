use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    BackgroundCheck, CheckId, CheckStatus, CoordinatorId, Match, MatchId, Opportunity,
    OpportunityId, OpportunityStatus, OrganizationId, Registration, RegistrationId,
    RegistrationStatus, VolunteerId, VolunteerProfile, VolunteerResponse,
};
use super::repository::{MatchingStore, RepositoryError};

/// Process-local [`MatchingStore`] used by the API binary, the demo, and tests.
///
/// Each table sits behind its own mutex so row updates in one table never
/// wait on another. Capacity changes lock the opportunity table and then the
/// registration table, always in that order, for the whole check-then-write.
#[derive(Default, Clone)]
pub struct MemoryStore {
    profiles: Arc<Mutex<HashMap<VolunteerId, VolunteerProfile>>>,
    coordinators: Arc<Mutex<HashSet<(OrganizationId, CoordinatorId)>>>,
    opportunities: Arc<Mutex<Vec<Opportunity>>>,
    matches: Arc<Mutex<Vec<Match>>>,
    registrations: Arc<Mutex<Vec<Registration>>>,
    checks: Arc<Mutex<Vec<BackgroundCheck>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn take_slot(row: &mut Opportunity) -> Result<(), RepositoryError> {
    match row.status {
        OpportunityStatus::Closed => return Err(RepositoryError::OpportunityClosed),
        OpportunityStatus::Filled => return Err(RepositoryError::CapacityExhausted),
        OpportunityStatus::Open => {}
    }
    if row.volunteers_registered >= row.volunteers_needed {
        return Err(RepositoryError::CapacityExhausted);
    }

    row.volunteers_registered += 1;
    if row.volunteers_registered == row.volunteers_needed {
        row.status = OpportunityStatus::Filled;
    }
    Ok(())
}

fn give_slot(row: &mut Opportunity) {
    row.volunteers_registered = row.volunteers_registered.saturating_sub(1);
    if row.status == OpportunityStatus::Filled
        && row.volunteers_registered < row.volunteers_needed
    {
        row.status = OpportunityStatus::Open;
    }
}

fn lock<T>(table: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    table
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory table lock poisoned".to_string()))
}

impl MatchingStore for MemoryStore {
    fn fetch_profile(&self, id: &VolunteerId) -> Result<Option<VolunteerProfile>, RepositoryError> {
        Ok(lock(&self.profiles)?.get(id).cloned())
    }

    fn save_profile(&self, profile: VolunteerProfile) -> Result<VolunteerProfile, RepositoryError> {
        lock(&self.profiles)?.insert(profile.volunteer_id.clone(), profile.clone());
        Ok(profile)
    }

    fn add_coordinator(
        &self,
        organization: &OrganizationId,
        coordinator: &CoordinatorId,
    ) -> Result<(), RepositoryError> {
        lock(&self.coordinators)?.insert((organization.clone(), coordinator.clone()));
        Ok(())
    }

    fn is_coordinator(
        &self,
        organization: &OrganizationId,
        coordinator: &CoordinatorId,
    ) -> Result<bool, RepositoryError> {
        Ok(lock(&self.coordinators)?.contains(&(organization.clone(), coordinator.clone())))
    }

    fn insert_opportunity(&self, opportunity: Opportunity) -> Result<Opportunity, RepositoryError> {
        let mut table = lock(&self.opportunities)?;
        if table
            .iter()
            .any(|existing| existing.opportunity_id == opportunity.opportunity_id)
        {
            return Err(RepositoryError::Conflict);
        }
        table.push(opportunity.clone());
        Ok(opportunity)
    }

    fn fetch_opportunity(&self, id: &OpportunityId) -> Result<Option<Opportunity>, RepositoryError> {
        Ok(lock(&self.opportunities)?
            .iter()
            .find(|opportunity| &opportunity.opportunity_id == id)
            .cloned())
    }

    fn opportunities_for(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<Opportunity>, RepositoryError> {
        Ok(lock(&self.opportunities)?
            .iter()
            .filter(|opportunity| &opportunity.organization_id == organization)
            .cloned()
            .collect())
    }

    fn set_opportunity_status(
        &self,
        id: &OpportunityId,
        status: OpportunityStatus,
    ) -> Result<Opportunity, RepositoryError> {
        let mut table = lock(&self.opportunities)?;
        let row = table
            .iter_mut()
            .find(|opportunity| &opportunity.opportunity_id == id)
            .ok_or(RepositoryError::NotFound)?;
        row.status = status;
        Ok(row.clone())
    }

    fn fetch_match(&self, id: &MatchId) -> Result<Option<Match>, RepositoryError> {
        Ok(lock(&self.matches)?
            .iter()
            .find(|candidate| &candidate.match_id == id)
            .cloned())
    }

    fn matches_for(&self, volunteer: &VolunteerId) -> Result<Vec<Match>, RepositoryError> {
        Ok(lock(&self.matches)?
            .iter()
            .filter(|candidate| &candidate.volunteer_id == volunteer)
            .cloned()
            .collect())
    }

    fn insert_matches(&self, matches: Vec<Match>) -> Result<Vec<Match>, RepositoryError> {
        let mut table = lock(&self.matches)?;
        let mut pairs = HashSet::new();
        for candidate in &matches {
            let pair = (&candidate.volunteer_id, candidate.opportunity_id);
            let taken = table.iter().any(|existing| {
                existing.is_active()
                    && existing.volunteer_id == candidate.volunteer_id
                    && existing.opportunity_id == candidate.opportunity_id
            });
            if taken || !pairs.insert(pair) {
                return Err(RepositoryError::Conflict);
            }
        }
        table.extend(matches.iter().cloned());
        Ok(matches)
    }

    fn replace_match(
        &self,
        expected: VolunteerResponse,
        next: Match,
    ) -> Result<Match, RepositoryError> {
        let mut table = lock(&self.matches)?;
        let row = table
            .iter_mut()
            .find(|candidate| candidate.match_id == next.match_id)
            .ok_or(RepositoryError::NotFound)?;
        if row.volunteer_response != expected {
            return Err(RepositoryError::StaleState {
                expected: expected.label(),
                found: row.volunteer_response.label(),
            });
        }
        *row = next.clone();
        Ok(next)
    }

    fn insert_registration(
        &self,
        registration: Registration,
    ) -> Result<Registration, RepositoryError> {
        let mut table = lock(&self.registrations)?;
        let duplicate = table.iter().any(|existing| {
            existing.registration_id == registration.registration_id
                || (existing.status.is_active()
                    && existing.volunteer_id == registration.volunteer_id
                    && existing.opportunity_id == registration.opportunity_id)
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        table.push(registration.clone());
        Ok(registration)
    }

    fn fetch_registration(
        &self,
        id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError> {
        Ok(lock(&self.registrations)?
            .iter()
            .find(|registration| &registration.registration_id == id)
            .cloned())
    }

    fn registrations_for(
        &self,
        volunteer: &VolunteerId,
    ) -> Result<Vec<Registration>, RepositoryError> {
        Ok(lock(&self.registrations)?
            .iter()
            .filter(|registration| &registration.volunteer_id == volunteer)
            .cloned()
            .collect())
    }

    fn replace_registration(
        &self,
        expected: RegistrationStatus,
        next: Registration,
    ) -> Result<Registration, RepositoryError> {
        let mut table = lock(&self.registrations)?;
        let row = table
            .iter_mut()
            .find(|registration| registration.registration_id == next.registration_id)
            .ok_or(RepositoryError::NotFound)?;
        if row.status != expected {
            return Err(RepositoryError::StaleState {
                expected: expected.label(),
                found: row.status.label(),
            });
        }
        *row = next.clone();
        Ok(next)
    }

    fn confirm_registration(
        &self,
        next: Registration,
    ) -> Result<(Registration, Opportunity), RepositoryError> {
        let mut opportunities = lock(&self.opportunities)?;
        let mut registrations = lock(&self.registrations)?;
        let row = registrations
            .iter_mut()
            .find(|registration| registration.registration_id == next.registration_id)
            .ok_or(RepositoryError::NotFound)?;
        if row.status != RegistrationStatus::PendingApproval {
            return Err(RepositoryError::StaleState {
                expected: RegistrationStatus::PendingApproval.label(),
                found: row.status.label(),
            });
        }
        let opportunity = opportunities
            .iter_mut()
            .find(|opportunity| opportunity.opportunity_id == row.opportunity_id)
            .ok_or(RepositoryError::NotFound)?;

        take_slot(opportunity)?;
        *row = next.clone();
        Ok((next, opportunity.clone()))
    }

    fn release_registration(
        &self,
        next: Registration,
    ) -> Result<(Registration, Opportunity), RepositoryError> {
        let mut opportunities = lock(&self.opportunities)?;
        let mut registrations = lock(&self.registrations)?;
        let row = registrations
            .iter_mut()
            .find(|registration| registration.registration_id == next.registration_id)
            .ok_or(RepositoryError::NotFound)?;
        if row.status != RegistrationStatus::Confirmed {
            return Err(RepositoryError::StaleState {
                expected: RegistrationStatus::Confirmed.label(),
                found: row.status.label(),
            });
        }
        let opportunity = opportunities
            .iter_mut()
            .find(|opportunity| opportunity.opportunity_id == row.opportunity_id)
            .ok_or(RepositoryError::NotFound)?;

        give_slot(opportunity);
        *row = next.clone();
        Ok((next, opportunity.clone()))
    }

    fn insert_check(&self, check: BackgroundCheck) -> Result<BackgroundCheck, RepositoryError> {
        let mut table = lock(&self.checks)?;
        let duplicate = table.iter().any(|existing| {
            existing.check_id == check.check_id
                || (existing.status == CheckStatus::Pending
                    && existing.volunteer_id == check.volunteer_id
                    && existing.check_type == check.check_type)
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        table.push(check.clone());
        Ok(check)
    }

    fn fetch_check(&self, id: &CheckId) -> Result<Option<BackgroundCheck>, RepositoryError> {
        Ok(lock(&self.checks)?
            .iter()
            .find(|check| &check.check_id == id)
            .cloned())
    }

    fn checks_for(&self, volunteer: &VolunteerId) -> Result<Vec<BackgroundCheck>, RepositoryError> {
        Ok(lock(&self.checks)?
            .iter()
            .filter(|check| &check.volunteer_id == volunteer)
            .cloned()
            .collect())
    }

    fn replace_check(
        &self,
        expected: CheckStatus,
        next: BackgroundCheck,
    ) -> Result<BackgroundCheck, RepositoryError> {
        let mut table = lock(&self.checks)?;
        let row = table
            .iter_mut()
            .find(|check| check.check_id == next.check_id)
            .ok_or(RepositoryError::NotFound)?;
        if row.status != expected {
            return Err(RepositoryError::StaleState {
                expected: expected.label(),
                found: row.status.label(),
            });
        }
        *row = next.clone();
        Ok(next)
    }
}
