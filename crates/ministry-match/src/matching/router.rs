use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::domain::{
    CheckId, CoordinatorId, Decision, MatchId, OpportunityDraft, OpportunityId, OrganizationId,
    ProfileStatus, Registration, RegistrationId, VolunteerId,
};
use super::eligibility::CheckOutcome;
use super::notify::NotificationGateway;
use super::profiles::AssessmentResponses;
use super::repository::MatchingStore;
use super::service::MatchingService;

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptRequest {
    pub volunteer_id: VolunteerId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileStatusRequest {
    pub status: ProfileStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorRequest {
    pub coordinator_id: CoordinatorId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOpportunityRequest {
    pub coordinator_id: CoordinatorId,
    #[serde(flatten)]
    pub draft: OpportunityDraft,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    pub coordinator_id: CoordinatorId,
    pub decision: Decision,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawRequest {
    pub volunteer_id: VolunteerId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    pub volunteer_id: VolunteerId,
    pub check_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckResultRequest {
    pub outcome: CheckOutcome,
}

/// Body returned for a coordinator decision.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionView {
    pub registration: Registration,
    pub alternatives_requested: bool,
}

/// Router builder exposing the matching and approval workflow over HTTP.
pub fn matching_router<S, N>(service: Arc<MatchingService<S, N>>) -> Router
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    Router::new()
        .route(
            "/api/v1/volunteers/:volunteer_id/assessment",
            post(assessment_handler::<S, N>),
        )
        .route(
            "/api/v1/volunteers/:volunteer_id/profile",
            get(profile_handler::<S, N>),
        )
        .route(
            "/api/v1/volunteers/:volunteer_id/status",
            post(profile_status_handler::<S, N>),
        )
        .route(
            "/api/v1/volunteers/:volunteer_id/matches",
            get(matches_handler::<S, N>),
        )
        .route(
            "/api/v1/matches/:match_id/accept",
            post(accept_handler::<S, N>),
        )
        .route("/api/v1/opportunities", post(create_opportunity_handler::<S, N>))
        .route(
            "/api/v1/opportunities/:opportunity_id/close",
            post(close_opportunity_handler::<S, N>),
        )
        .route(
            "/api/v1/organizations/:org_id/coordinators",
            post(coordinator_handler::<S, N>),
        )
        .route(
            "/api/v1/organizations/:org_id/opportunities",
            get(open_opportunities_handler::<S, N>),
        )
        .route(
            "/api/v1/registrations/:registration_id/decision",
            post(decision_handler::<S, N>),
        )
        .route(
            "/api/v1/registrations/:registration_id/withdraw",
            post(withdraw_handler::<S, N>),
        )
        .route(
            "/api/v1/background-checks",
            post(request_check_handler::<S, N>),
        )
        .route(
            "/api/v1/background-checks/status/:volunteer_id",
            get(check_status_handler::<S, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id/result",
            post(check_result_handler::<S, N>),
        )
        .with_state(service)
}

pub(crate) async fn assessment_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(volunteer_id): Path<String>,
    Json(responses): Json<AssessmentResponses>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    let volunteer_id = VolunteerId(volunteer_id);
    match service.submit_assessment(&volunteer_id, responses) {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn profile_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(volunteer_id): Path<String>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.get_profile(&VolunteerId(volunteer_id)) {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn profile_status_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(volunteer_id): Path<String>,
    Json(request): Json<ProfileStatusRequest>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.set_profile_status(&VolunteerId(volunteer_id), request.status) {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn matches_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(volunteer_id): Path<String>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.find_matches(&VolunteerId(volunteer_id)).await {
        Ok(matches) => (StatusCode::OK, Json(matches)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn accept_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(match_id): Path<MatchId>,
    Json(request): Json<AcceptRequest>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.respond_to_match(&match_id, &request.volunteer_id) {
        Ok(registration) => (StatusCode::CREATED, Json(registration)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn create_opportunity_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Json(request): Json<CreateOpportunityRequest>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.create_opportunity(&request.coordinator_id, request.draft) {
        Ok(opportunity) => (StatusCode::CREATED, Json(opportunity)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn close_opportunity_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(opportunity_id): Path<OpportunityId>,
    Json(request): Json<CoordinatorRequest>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.close_opportunity(&request.coordinator_id, &opportunity_id) {
        Ok(opportunity) => (StatusCode::OK, Json(opportunity)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn coordinator_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(org_id): Path<String>,
    Json(request): Json<CoordinatorRequest>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.register_coordinator(&OrganizationId(org_id), &request.coordinator_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn open_opportunities_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(org_id): Path<String>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.list_open_opportunities(&OrganizationId(org_id)) {
        Ok(opportunities) => (StatusCode::OK, Json(opportunities)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn decision_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(registration_id): Path<RegistrationId>,
    Json(request): Json<DecisionRequest>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.decide(
        &registration_id,
        &request.coordinator_id,
        request.decision,
        request.message.as_deref(),
    ) {
        // The alternative search keeps running after the handle is dropped.
        Ok(receipt) => {
            let view = DecisionView {
                alternatives_requested: receipt.alternatives.is_some(),
                registration: receipt.registration,
            };
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn withdraw_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(registration_id): Path<RegistrationId>,
    Json(request): Json<WithdrawRequest>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.withdraw(&registration_id, &request.volunteer_id) {
        Ok(registration) => (StatusCode::OK, Json(registration)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn request_check_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Json(request): Json<CheckRequest>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.request_background_check(&request.volunteer_id, &request.check_type) {
        Ok(check) => (StatusCode::ACCEPTED, Json(check)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn check_status_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(volunteer_id): Path<String>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.background_check_status(&VolunteerId(volunteer_id)) {
        Ok(latest) => (StatusCode::OK, Json(latest)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn check_result_handler<S, N>(
    State(service): State<Arc<MatchingService<S, N>>>,
    Path(check_id): Path<CheckId>,
    Json(request): Json<CheckResultRequest>,
) -> Response
where
    S: MatchingStore + 'static,
    N: NotificationGateway + 'static,
{
    match service.record_background_check_result(&check_id, request.outcome) {
        Ok(check) => (StatusCode::OK, Json(check)).into_response(),
        Err(err) => err.into_response(),
    }
}
