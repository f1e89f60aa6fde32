use super::common::*;
use std::sync::Arc;
use std::time::Duration;

use crate::matching::domain::{
    Decision, Match, Opportunity, OpportunityStatus, Registration, RegistrationStatus,
    VolunteerResponse,
};
use crate::matching::eligibility::CheckOutcome;
use crate::matching::error::MatchingError;
use crate::matching::memory::MemoryStore;
use crate::matching::notify::NotificationKind;
use crate::matching::repository::MatchingStore;
use crate::matching::scoring::oracle::UnavailableOracle;
use crate::matching::scoring::ScoringAdapter;
use crate::matching::service::MatchingService;

async fn match_for(harness: &Harness, volunteer_id: &str, opportunity: &Opportunity) -> Match {
    harness
        .service
        .find_matches(&volunteer(volunteer_id))
        .await
        .expect("round scored")
        .into_iter()
        .find(|m| m.opportunity_id == opportunity.opportunity_id)
        .expect("opportunity matched")
}

async fn apply(harness: &Harness, volunteer_id: &str, opportunity: &Opportunity) -> Registration {
    let matched = match_for(harness, volunteer_id, opportunity).await;
    harness
        .service
        .respond_to_match(&matched.match_id, &volunteer(volunteer_id))
        .expect("applied")
}

fn stored_opportunity(harness: &Harness, opportunity: &Opportunity) -> Opportunity {
    harness
        .service
        .get_opportunity(&opportunity.opportunity_id)
        .expect("opportunity present")
}

#[tokio::test]
async fn accepting_a_match_opens_a_pending_registration() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 2));

    let matched = match_for(&harness, "vol-ada", &kids).await;
    let registration = harness
        .service
        .respond_to_match(&matched.match_id, &volunteer("vol-ada"))
        .expect("applied");

    assert_eq!(registration.status, RegistrationStatus::PendingApproval);
    assert_eq!(registration.match_id, matched.match_id);
    let stored = harness.service.get_match(&matched.match_id).expect("match");
    assert_eq!(stored.volunteer_response, VolunteerResponse::Applied);
    assert!(stored.responded_at.is_some());
    assert_eq!(stored_opportunity(&harness, &kids).volunteers_registered, 0);

    let received = harness.gateway.of_kind(NotificationKind::ApplicationReceived);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].recipient_id, "vol-ada");
    let coordinator_alerts = harness.gateway.of_kind(NotificationKind::NewApplication);
    assert_eq!(coordinator_alerts.len(), 1);
    assert_eq!(coordinator_alerts[0].recipient_id, COORDINATOR);
}

#[tokio::test]
async fn accepting_twice_is_an_invalid_transition() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 2));
    let matched = match_for(&harness, "vol-ada", &kids).await;
    harness
        .service
        .respond_to_match(&matched.match_id, &volunteer("vol-ada"))
        .expect("first accept");

    match harness
        .service
        .respond_to_match(&matched.match_id, &volunteer("vol-ada"))
    {
        Err(MatchingError::InvalidTransition { from, to, .. }) => {
            assert_eq!(from, "applied");
            assert_eq!(to, "applied");
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    assert_eq!(
        harness
            .store
            .registrations_for(&volunteer("vol-ada"))
            .expect("registrations")
            .len(),
        1
    );
}

#[tokio::test]
async fn another_volunteers_match_is_not_found() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    harness.enroll("vol-ben", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 2));
    let matched = match_for(&harness, "vol-ada", &kids).await;

    match harness
        .service
        .respond_to_match(&matched.match_id, &volunteer("vol-ben"))
    {
        Err(MatchingError::NotFound { entity, .. }) => assert_eq!(entity, "match"),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn approval_confirms_and_consumes_capacity() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 1));
    let registration = apply(&harness, "vol-ada", &kids).await;

    let receipt = harness
        .service
        .decide(
            &registration.registration_id,
            &coordinator(),
            Decision::Approve,
            Some("See you Sunday"),
        )
        .expect("approved");

    assert_eq!(receipt.registration.status, RegistrationStatus::Confirmed);
    assert_eq!(receipt.registration.decided_by, Some(coordinator()));
    assert_eq!(receipt.registration.notes, "See you Sunday");
    assert!(receipt.alternatives.is_none());
    let opportunity = stored_opportunity(&harness, &kids);
    assert_eq!(opportunity.volunteers_registered, 1);
    assert_eq!(opportunity.status, OpportunityStatus::Filled);
    let matched = harness
        .service
        .get_match(&registration.match_id)
        .expect("match");
    assert_eq!(matched.volunteer_response, VolunteerResponse::Approved);

    let approved = harness.gateway.of_kind(NotificationKind::ApplicationApproved);
    assert_eq!(approved.len(), 1);
    assert_eq!(
        approved[0].metadata.get("coordinator_message").map(String::as_str),
        Some("See you Sunday")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_never_overfill_a_single_slot() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    harness.enroll("vol-ben", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 1));
    let ada = apply(&harness, "vol-ada", &kids).await;
    let ben = apply(&harness, "vol-ben", &kids).await;

    let tasks: Vec<_> = [ada.registration_id, ben.registration_id]
        .into_iter()
        .map(|id| {
            let service = Arc::clone(&harness.service);
            tokio::task::spawn_blocking(move || {
                service
                    .decide(&id, &coordinator(), Decision::Approve, None)
                    .map(|receipt| receipt.registration)
            })
        })
        .collect();

    let mut confirmed = 0;
    let mut rejected_for_capacity = 0;
    for task in tasks {
        match task.await.expect("task joined") {
            Ok(registration) => {
                assert_eq!(registration.status, RegistrationStatus::Confirmed);
                confirmed += 1;
            }
            Err(MatchingError::CapacityExceeded(id)) => {
                assert_eq!(id, kids.opportunity_id);
                rejected_for_capacity += 1;
            }
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    assert_eq!(confirmed, 1);
    assert_eq!(rejected_for_capacity, 1);
    let statuses: Vec<_> = [ada.registration_id, ben.registration_id]
        .iter()
        .map(|id| harness.service.get_registration(id).expect("present").status)
        .collect();
    assert!(statuses.contains(&RegistrationStatus::Confirmed));
    assert!(statuses.contains(&RegistrationStatus::PendingApproval));
    assert_eq!(stored_opportunity(&harness, &kids).volunteers_registered, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn confirmed_count_never_exceeds_capacity() {
    let harness = harness();
    let choir = harness.post(draft("Choir", &["music"], &[], 3));
    let mut pending = Vec::new();
    for index in 0..8 {
        let id = format!("vol-{index}");
        harness.enroll(&id, &["music"], &[]);
        pending.push(apply(&harness, &id, &choir).await.registration_id);
    }

    let tasks: Vec<_> = pending
        .iter()
        .copied()
        .map(|id| {
            let service = Arc::clone(&harness.service);
            tokio::task::spawn_blocking(move || {
                service.decide(&id, &coordinator(), Decision::Approve, None)
            })
        })
        .collect();

    let mut confirmed = 0;
    for task in tasks {
        match task.await.expect("task joined") {
            Ok(_) => confirmed += 1,
            Err(MatchingError::CapacityExceeded(_)) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    assert_eq!(confirmed, 3);
    let opportunity = stored_opportunity(&harness, &choir);
    assert_eq!(opportunity.volunteers_registered, 3);
    assert_eq!(opportunity.status, OpportunityStatus::Filled);
    let stored_confirmed = pending
        .iter()
        .filter(|id| {
            harness.service.get_registration(id).expect("present").status
                == RegistrationStatus::Confirmed
        })
        .count();
    assert_eq!(stored_confirmed, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retried_approval_leaves_room_for_another_registration() {
    let service = Arc::new(MatchingService::new(
        Arc::new(PausingStore::new(Duration::from_millis(200))),
        Arc::new(RecordingGateway::default()),
        ScoringAdapter::new(Arc::new(UnavailableOracle), Duration::from_secs(1)),
    ));
    service
        .register_coordinator(&organization(), &coordinator())
        .expect("coordinator registered");
    let choir = service
        .create_opportunity(&coordinator(), draft("Choir", &["music"], &[], 2))
        .expect("opportunity");
    let mut pending = Vec::new();
    for id in ["vol-ada", "vol-ben"] {
        service
            .upsert_assessment(&volunteer(id), assessment(&["music"], &[]))
            .expect("profile");
        let matches = service
            .find_matches(&volunteer(id))
            .await
            .expect("round scored");
        let registration = service
            .respond_to_match(&matches[0].match_id, &volunteer(id))
            .expect("applied");
        pending.push(registration.registration_id);
    }

    let attempts = [pending[0], pending[0], pending[1]];
    let tasks: Vec<_> = attempts
        .into_iter()
        .map(|id| {
            let service = Arc::clone(&service);
            tokio::task::spawn_blocking(move || {
                service
                    .decide(&id, &coordinator(), Decision::Approve, None)
                    .map(|receipt| receipt.registration)
            })
        })
        .collect();
    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.expect("task joined"));
    }

    assert_eq!(outcomes[..2].iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes[..2].iter().any(|outcome| matches!(
        outcome,
        Err(MatchingError::InvalidTransition {
            entity: "registration",
            ..
        })
    )));
    match &outcomes[2] {
        Ok(registration) => assert_eq!(registration.status, RegistrationStatus::Confirmed),
        other => panic!("expected second volunteer confirmed, got {other:?}"),
    }
    let choir = service
        .get_opportunity(&choir.opportunity_id)
        .expect("opportunity");
    assert_eq!(choir.volunteers_registered, 2);
    assert_eq!(choir.status, OpportunityStatus::Filled);
}

#[tokio::test]
async fn clearance_gates_approval_until_a_check_passes() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let mut nursery = draft("Nursery", &["teaching"], &[], 2);
    nursery.background_check_required = true;
    let nursery = harness.post(nursery);
    let registration = apply(&harness, "vol-ada", &nursery).await;

    match harness.service.decide(
        &registration.registration_id,
        &coordinator(),
        Decision::Approve,
        None,
    ) {
        Err(MatchingError::BackgroundCheckRequired(id)) => assert_eq!(id, volunteer("vol-ada")),
        other => panic!("expected background check required, got {other:?}"),
    }
    assert_eq!(
        harness
            .service
            .get_registration(&registration.registration_id)
            .expect("present")
            .status,
        RegistrationStatus::PendingApproval
    );
    assert_eq!(stored_opportunity(&harness, &nursery).volunteers_registered, 0);

    let check = harness
        .service
        .request_background_check(&volunteer("vol-ada"), "criminal")
        .expect("requested");
    harness
        .service
        .record_background_check_result(&check.check_id, CheckOutcome::Passed)
        .expect("recorded");

    let receipt = harness
        .service
        .decide(
            &registration.registration_id,
            &coordinator(),
            Decision::Approve,
            None,
        )
        .expect("approved after clearance");
    assert_eq!(receipt.registration.status, RegistrationStatus::Confirmed);
}

#[tokio::test]
async fn a_newer_failed_check_revokes_clearance() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let mut nursery = draft("Nursery", &["teaching"], &[], 2);
    nursery.background_check_required = true;
    let nursery = harness.post(nursery);
    let registration = apply(&harness, "vol-ada", &nursery).await;

    let identity = harness
        .service
        .request_background_check(&volunteer("vol-ada"), "identity")
        .expect("requested");
    harness
        .service
        .record_background_check_result(&identity.check_id, CheckOutcome::Passed)
        .expect("recorded");
    let criminal = harness
        .service
        .request_background_check(&volunteer("vol-ada"), "criminal")
        .expect("requested");
    harness
        .service
        .record_background_check_result(&criminal.check_id, CheckOutcome::Failed)
        .expect("recorded");

    let result = harness.service.decide(
        &registration.registration_id,
        &coordinator(),
        Decision::Approve,
        None,
    );

    assert!(matches!(
        result,
        Err(MatchingError::BackgroundCheckRequired(_))
    ));
    assert_eq!(
        harness
            .service
            .get_registration(&registration.registration_id)
            .expect("present")
            .status,
        RegistrationStatus::PendingApproval
    );
    assert_eq!(stored_opportunity(&harness, &nursery).volunteers_registered, 0);
}

#[tokio::test]
async fn leadership_roles_require_clearance() {
    let harness = harness();
    harness.enroll("vol-ada", &["leadership"], &[]);
    let mut elder = draft("Small group lead", &["leadership"], &[], 1);
    elder.is_leadership_role = true;
    let elder = harness.post(elder);
    let registration = apply(&harness, "vol-ada", &elder).await;

    let result = harness.service.decide(
        &registration.registration_id,
        &coordinator(),
        Decision::Approve,
        None,
    );

    assert!(matches!(
        result,
        Err(MatchingError::BackgroundCheckRequired(_))
    ));
}

#[tokio::test]
async fn rejection_cancels_and_suggests_alternatives() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 2));
    let youth = harness.post(draft("Youth", &["teaching"], &[], 2));
    let registration = apply(&harness, "vol-ada", &kids).await;

    let receipt = harness
        .service
        .decide(
            &registration.registration_id,
            &coordinator(),
            Decision::Reject,
            Some("Team is full for this season"),
        )
        .expect("rejected");

    assert_eq!(receipt.registration.status, RegistrationStatus::Cancelled);
    let matched = harness
        .service
        .get_match(&registration.match_id)
        .expect("match");
    assert_eq!(matched.volunteer_response, VolunteerResponse::Rejected);
    assert_eq!(stored_opportunity(&harness, &kids).volunteers_registered, 0);
    assert_eq!(
        harness
            .gateway
            .of_kind(NotificationKind::ApplicationRejected)
            .len(),
        1
    );

    receipt
        .alternatives
        .expect("alternative search scheduled")
        .await
        .expect("alternative search finished");

    let alternatives = harness
        .gateway
        .of_kind(NotificationKind::AlternativeMatches);
    assert_eq!(alternatives.len(), 1);
    assert_eq!(
        alternatives[0].metadata.get("excluded_opportunity"),
        Some(&kids.opportunity_id.to_string())
    );
    let live: Vec<_> = harness
        .store
        .matches_for(&volunteer("vol-ada"))
        .expect("matches")
        .into_iter()
        .filter(Match::is_unanswered)
        .map(|m| m.opportunity_id)
        .collect();
    assert_eq!(live, vec![youth.opportunity_id]);
}

#[tokio::test]
async fn decisions_require_a_coordinator_of_the_organization() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 2));
    let registration = apply(&harness, "vol-ada", &kids).await;

    let outsider = crate::matching::domain::CoordinatorId::from("coord-mallory");
    match harness.service.decide(
        &registration.registration_id,
        &outsider,
        Decision::Approve,
        None,
    ) {
        Err(MatchingError::Forbidden { coordinator, .. }) => assert_eq!(coordinator, outsider),
        other => panic!("expected forbidden, got {other:?}"),
    }
    assert_eq!(
        harness
            .service
            .get_registration(&registration.registration_id)
            .expect("present")
            .status,
        RegistrationStatus::PendingApproval
    );
}

#[tokio::test]
async fn deciding_twice_is_an_invalid_transition() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 2));
    let registration = apply(&harness, "vol-ada", &kids).await;
    harness
        .service
        .decide(
            &registration.registration_id,
            &coordinator(),
            Decision::Approve,
            None,
        )
        .expect("approved");

    match harness.service.decide(
        &registration.registration_id,
        &coordinator(),
        Decision::Reject,
        None,
    ) {
        Err(MatchingError::InvalidTransition { from, to, .. }) => {
            assert_eq!(from, "confirmed");
            assert_eq!(to, "cancelled");
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    assert_eq!(stored_opportunity(&harness, &kids).volunteers_registered, 1);
}

#[tokio::test]
async fn approval_on_closed_opportunity_is_refused() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 2));
    let registration = apply(&harness, "vol-ada", &kids).await;
    harness
        .service
        .close_opportunity(&coordinator(), &kids.opportunity_id)
        .expect("closed");

    let result = harness.service.decide(
        &registration.registration_id,
        &coordinator(),
        Decision::Approve,
        None,
    );

    assert!(matches!(
        result,
        Err(MatchingError::InvalidTransition { entity: "opportunity", .. })
    ));
    let stored = harness
        .service
        .get_registration(&registration.registration_id)
        .expect("present");
    assert_eq!(stored.status, RegistrationStatus::PendingApproval);
    let matched = harness
        .service
        .get_match(&registration.match_id)
        .expect("match");
    assert_eq!(matched.volunteer_response, VolunteerResponse::Applied);
}

#[tokio::test]
async fn withdrawing_a_confirmed_registration_reopens_the_slot() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 1));
    let registration = apply(&harness, "vol-ada", &kids).await;
    harness
        .service
        .decide(
            &registration.registration_id,
            &coordinator(),
            Decision::Approve,
            None,
        )
        .expect("approved");
    assert_eq!(
        stored_opportunity(&harness, &kids).status,
        OpportunityStatus::Filled
    );

    let withdrawn = harness
        .service
        .withdraw(&registration.registration_id, &volunteer("vol-ada"))
        .expect("withdrawn");

    assert_eq!(withdrawn.status, RegistrationStatus::Cancelled);
    let opportunity = stored_opportunity(&harness, &kids);
    assert_eq!(opportunity.volunteers_registered, 0);
    assert_eq!(opportunity.status, OpportunityStatus::Open);
    let notices = harness
        .gateway
        .of_kind(NotificationKind::RegistrationWithdrawn);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].recipient_id, COORDINATOR);

    match harness
        .service
        .withdraw(&registration.registration_id, &volunteer("vol-ada"))
    {
        Err(MatchingError::InvalidTransition { from, .. }) => assert_eq!(from, "cancelled"),
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[tokio::test]
async fn withdrawing_a_pending_registration_rejects_the_match() {
    let harness = harness();
    harness.enroll("vol-ada", &["teaching"], &[]);
    let kids = harness.post(draft("Kids church", &["teaching"], &[], 2));
    let registration = apply(&harness, "vol-ada", &kids).await;

    harness
        .service
        .withdraw(&registration.registration_id, &volunteer("vol-ada"))
        .expect("withdrawn");

    let matched = harness
        .service
        .get_match(&registration.match_id)
        .expect("match");
    assert_eq!(matched.volunteer_response, VolunteerResponse::Rejected);
    assert_eq!(stored_opportunity(&harness, &kids).volunteers_registered, 0);
}

#[tokio::test]
async fn failed_notifications_do_not_undo_transitions() {
    let store = Arc::new(MemoryStore::new());
    let service = MatchingService::new(
        store.clone(),
        Arc::new(FailingGateway),
        ScoringAdapter::new(Arc::new(UnavailableOracle), Duration::from_secs(1)),
    );
    service
        .register_coordinator(&organization(), &coordinator())
        .expect("coordinator registered");
    service
        .upsert_assessment(&volunteer("vol-ada"), assessment(&["teaching"], &[]))
        .expect("profile");
    let kids = service
        .create_opportunity(&coordinator(), draft("Kids church", &["teaching"], &[], 1))
        .expect("opportunity");

    let matches = service
        .find_matches(&volunteer("vol-ada"))
        .await
        .expect("round scored despite gateway outage");
    let registration = service
        .respond_to_match(&matches[0].match_id, &volunteer("vol-ada"))
        .expect("applied despite gateway outage");
    let receipt = service
        .decide(
            &registration.registration_id,
            &coordinator(),
            Decision::Approve,
            None,
        )
        .expect("approved despite gateway outage");

    assert_eq!(receipt.registration.status, RegistrationStatus::Confirmed);
    let opportunity = store
        .fetch_opportunity(&kids.opportunity_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(opportunity.volunteers_registered, 1);
}
