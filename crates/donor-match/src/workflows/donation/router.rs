use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Actor, DonorId, MatchId, RequestId};
use super::matching::{LogisticsUpdate, MatchStatus};
use super::repository::{AuthorizationBoundary, DonationStore, NotificationRouter};
use super::request::{NewRequest, RequestDetailsUpdate, RequestStatus};
use super::service::{DonationLifecycleService, LifecycleError, TransitionTarget};

type SharedService<S, N, A> = Arc<DonationLifecycleService<S, N, A>>;

/// Router exposing request intake, candidate search and the match lifecycle.
///
/// The acting party is carried in each mutating body as `actor: { id, role }`.
pub fn donation_router<S, N, A>(service: SharedService<S, N, A>) -> Router
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    Router::new()
        .route("/api/v1/requests", post(create_request_handler::<S, N, A>))
        .route(
            "/api/v1/requests/:request_id",
            get(get_request_handler::<S, N, A>).patch(update_request_handler::<S, N, A>),
        )
        .route(
            "/api/v1/requests/:request_id/candidates",
            get(candidates_handler::<S, N, A>),
        )
        .route(
            "/api/v1/requests/:request_id/matches",
            post(propose_handler::<S, N, A>),
        )
        .route(
            "/api/v1/requests/:request_id/transitions",
            post(request_transition_handler::<S, N, A>),
        )
        .route("/api/v1/matches/:match_id", get(get_match_handler::<S, N, A>))
        .route(
            "/api/v1/matches/:match_id/transitions",
            post(match_transition_handler::<S, N, A>),
        )
        .route(
            "/api/v1/matches/:match_id/logistics",
            put(logistics_handler::<S, N, A>),
        )
        .route(
            "/api/v1/matches/:match_id/outcome",
            post(outcome_handler::<S, N, A>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRequestBody {
    actor: Actor,
    request: NewRequest,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateRequestBody {
    actor: Actor,
    #[serde(default)]
    update: RequestDetailsUpdate,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProposeBody {
    actor: Actor,
    donor_id: DonorId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionBody<T> {
    actor: Actor,
    status: T,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogisticsBody {
    actor: Actor,
    #[serde(default)]
    logistics: LogisticsUpdate,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OutcomeBody {
    actor: Actor,
    successful: bool,
    #[serde(default)]
    notes: Option<String>,
}

/// HTTP status for a lifecycle failure, shared by the route handlers and [`crate::error::AppError`].
pub(crate) fn status_for(error: &LifecycleError) -> StatusCode {
    match error {
        LifecycleError::NotFound { .. } => StatusCode::NOT_FOUND,
        LifecycleError::Ineligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LifecycleError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
        LifecycleError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        LifecycleError::InvalidTransition(_)
        | LifecycleError::StaleState { .. }
        | LifecycleError::DuplicateMatch { .. }
        | LifecycleError::Immutable { .. }
        | LifecycleError::DetailLocked { .. } => StatusCode::CONFLICT,
    }
}

fn error_response(error: LifecycleError) -> Response {
    let mut payload = json!({
        "error": error.to_string(),
        "retryable": error.is_retryable(),
    });
    if let LifecycleError::Ineligible(reason) = &error {
        payload["reason"] = json!(reason);
    }
    (status_for(&error), Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, LifecycleError>,
) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_request_handler<S, N, A>(
    State(service): State<SharedService<S, N, A>>,
    Json(body): Json<CreateRequestBody>,
) -> Response
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    respond(
        StatusCode::CREATED,
        service.create_request(body.request, &body.actor),
    )
}

pub(crate) async fn get_request_handler<S, N, A>(
    State(service): State<SharedService<S, N, A>>,
    Path(request_id): Path<String>,
) -> Response
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    respond(StatusCode::OK, service.get_request(&RequestId(request_id)))
}

pub(crate) async fn update_request_handler<S, N, A>(
    State(service): State<SharedService<S, N, A>>,
    Path(request_id): Path<String>,
    Json(body): Json<UpdateRequestBody>,
) -> Response
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    respond(
        StatusCode::OK,
        service.update_request_details(&RequestId(request_id), body.update, &body.actor),
    )
}

pub(crate) async fn candidates_handler<S, N, A>(
    State(service): State<SharedService<S, N, A>>,
    Path(request_id): Path<String>,
) -> Response
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    let id = RequestId(request_id);
    match service.find_candidates(&id) {
        Ok(candidates) => {
            let payload = json!({
                "request_id": id,
                "candidates": candidates,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn propose_handler<S, N, A>(
    State(service): State<SharedService<S, N, A>>,
    Path(request_id): Path<String>,
    Json(body): Json<ProposeBody>,
) -> Response
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    respond(
        StatusCode::CREATED,
        service.propose_match(&RequestId(request_id), &body.donor_id, &body.actor),
    )
}

pub(crate) async fn request_transition_handler<S, N, A>(
    State(service): State<SharedService<S, N, A>>,
    Path(request_id): Path<String>,
    Json(body): Json<TransitionBody<RequestStatus>>,
) -> Response
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    let target = TransitionTarget::Request {
        id: RequestId(request_id),
        status: body.status,
    };
    respond(
        StatusCode::OK,
        service.apply_transition(target, &body.actor, body.note),
    )
}

pub(crate) async fn get_match_handler<S, N, A>(
    State(service): State<SharedService<S, N, A>>,
    Path(match_id): Path<String>,
) -> Response
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    respond(StatusCode::OK, service.get_match(&MatchId(match_id)))
}

pub(crate) async fn match_transition_handler<S, N, A>(
    State(service): State<SharedService<S, N, A>>,
    Path(match_id): Path<String>,
    Json(body): Json<TransitionBody<MatchStatus>>,
) -> Response
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    let target = TransitionTarget::Match {
        id: MatchId(match_id),
        status: body.status,
    };
    respond(
        StatusCode::OK,
        service.apply_transition(target, &body.actor, body.note),
    )
}

pub(crate) async fn logistics_handler<S, N, A>(
    State(service): State<SharedService<S, N, A>>,
    Path(match_id): Path<String>,
    Json(body): Json<LogisticsBody>,
) -> Response
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    respond(
        StatusCode::OK,
        service.update_logistics(&MatchId(match_id), body.logistics, &body.actor),
    )
}

pub(crate) async fn outcome_handler<S, N, A>(
    State(service): State<SharedService<S, N, A>>,
    Path(match_id): Path<String>,
    Json(body): Json<OutcomeBody>,
) -> Response
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    respond(
        StatusCode::OK,
        service.report_outcome(&MatchId(match_id), body.successful, body.notes, &body.actor),
    )
}
