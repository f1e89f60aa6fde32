use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::domain::{CoordinatorId, OpportunityId, OrganizationId, VolunteerId};
use super::repository::RepositoryError;

/// Error surfaced by every matching operation.
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: &'static str,
        to: &'static str,
    },
    #[error("opportunity {0} has no remaining capacity")]
    CapacityExceeded(OpportunityId),
    #[error("volunteer {0} needs a passed background check before approval")]
    BackgroundCheckRequired(VolunteerId),
    #[error("scoring unavailable: {0}")]
    ScoringUnavailable(String),
    #[error("{coordinator} does not coordinate organization {organization}")]
    Forbidden {
        coordinator: CoordinatorId,
        organization: OrganizationId,
    },
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl MatchingError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn transition(
        entity: &'static str,
        id: impl ToString,
        from: &'static str,
        to: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id: id.to_string(),
            from,
            to,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MatchingError::NotFound { .. } => StatusCode::NOT_FOUND,
            MatchingError::InvalidTransition { .. }
            | MatchingError::CapacityExceeded(_)
            | MatchingError::BackgroundCheckRequired(_) => StatusCode::CONFLICT,
            MatchingError::ScoringUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MatchingError::Forbidden { .. } => StatusCode::FORBIDDEN,
            MatchingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MatchingError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable tag for clients rendering precise messages.
    pub fn kind(&self) -> &'static str {
        match self {
            MatchingError::NotFound { .. } => "not_found",
            MatchingError::InvalidTransition { .. } => "invalid_transition",
            MatchingError::CapacityExceeded(_) => "capacity_exceeded",
            MatchingError::BackgroundCheckRequired(_) => "background_check_required",
            MatchingError::ScoringUnavailable(_) => "scoring_unavailable",
            MatchingError::Forbidden { .. } => "forbidden",
            MatchingError::Validation(_) => "validation",
            MatchingError::Repository(_) => "repository",
        }
    }
}

impl IntoResponse for MatchingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        (status, body).into_response()
    }
}
