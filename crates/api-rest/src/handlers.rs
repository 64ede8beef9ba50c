use crate::error::ApiError;
use crate::extract::CurrentActor;
use crate::AppState;
use api_shared::{
    AddNoteReq, AssignReviewerReq, CatalogEntryRes, CatalogRes, ChangeStatusReq, CreateRequestReq,
    ErrorRes, HealthRes, HealthService, HistoryRes, ListQuery, RequestPageRes, RequestRes,
    ReprioritizeReq, SummaryRes, UpdateRequestReq,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use regulacao_core::{
    Actor, Priority, RegulationError, RequestFilter, RequestId, Role,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_requests,
        list_unit_requests,
        list_central_requests,
        list_my_central_requests,
        create_request,
        get_request,
        update_request,
        delete_request,
        history,
        change_status,
        reprioritize,
        add_note,
        assign_reviewer,
        summary,
        catalog,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        api_shared::ActorRes,
        api_shared::PatientDataDto,
        api_shared::AuditEventRes,
        RequestRes,
        RequestPageRes,
        HistoryRes,
        SummaryRes,
        CatalogEntryRes,
        CatalogRes,
        CreateRequestReq,
        UpdateRequestReq,
        ChangeStatusReq,
        ReprioritizeReq,
        AddNoteReq,
        AssignReviewerReq,
    ))
)]
pub struct ApiDoc;

fn parse_id(raw: &str) -> Result<RequestId, ApiError> {
    RequestId::parse(raw).map_err(|e| ApiError::from(RegulationError::from(e)))
}

/// Listing shared by every list route. `force_mine` applies the route's own scoping.
async fn page_of(
    state: &AppState,
    actor: &Actor,
    query: &ListQuery,
    force_mine: bool,
) -> Result<Json<RequestPageRes>, ApiError> {
    let mut filter: RequestFilter = query.to_filter()?;
    if force_mine {
        filter.only_mine = true;
    }
    let page = state
        .service()
        .query_page(&filter, query.page.unwrap_or(1), query.per_page, actor)
        .await?;
    Ok(Json(RequestPageRes::from(&page)))
}

fn require_central(actor: &Actor) -> Result<(), ApiError> {
    if actor.role == Role::Unit {
        return Err(RegulationError::PermissionDenied(
            "central listings are restricted to regulators and admins".into(),
        )
        .into());
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used by monitoring and load balancers. Needs neither API key nor actor headers.
#[axum::debug_handler]
pub(crate) async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/solicitacoes",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of requests visible to the caller", body = RequestPageRes),
        (status = 400, description = "Unknown status or type", body = ErrorRes),
        (status = 401, description = "Missing actor headers", body = ErrorRes)
    )
)]
/// List requests
///
/// `ubs` callers only ever see their own unit's requests; `onlyMine` narrows reviewers to
/// requests assigned to them.
#[axum::debug_handler]
pub(crate) async fn list_requests(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ListQuery>,
) -> Result<Json<RequestPageRes>, ApiError> {
    page_of(&state, &actor, &query, false).await
}

#[utoipa::path(
    get,
    path = "/ubs/solicitacoes",
    params(ListQuery),
    responses(
        (status = 200, description = "Requests of the caller's unit", body = RequestPageRes),
        (status = 401, description = "Missing actor headers", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_unit_requests(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ListQuery>,
) -> Result<Json<RequestPageRes>, ApiError> {
    page_of(&state, &actor, &query, true).await
}

#[utoipa::path(
    get,
    path = "/central/solicitacoes",
    params(ListQuery),
    responses(
        (status = 200, description = "All requests", body = RequestPageRes),
        (status = 403, description = "Caller is a unit", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_central_requests(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ListQuery>,
) -> Result<Json<RequestPageRes>, ApiError> {
    require_central(&actor)?;
    page_of(&state, &actor, &query, false).await
}

#[utoipa::path(
    get,
    path = "/central/solicitacoes/minhas",
    params(ListQuery),
    responses(
        (status = 200, description = "Requests assigned to the calling reviewer", body = RequestPageRes),
        (status = 403, description = "Caller is a unit", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_my_central_requests(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ListQuery>,
) -> Result<Json<RequestPageRes>, ApiError> {
    require_central(&actor)?;
    page_of(&state, &actor, &query, true).await
}

#[utoipa::path(
    post,
    path = "/solicitacoes",
    request_body = CreateRequestReq,
    responses(
        (status = 201, description = "Request created", body = RequestRes),
        (status = 400, description = "Invalid patient data or type", body = ErrorRes),
        (status = 403, description = "Caller may not create requests", body = ErrorRes)
    )
)]
/// Create a request
///
/// Created as `enviado` unless `asDraft` is set.
#[axum::debug_handler]
pub(crate) async fn create_request(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateRequestReq>,
) -> Result<(StatusCode, Json<RequestRes>), ApiError> {
    let new = req.into_new_request()?;
    let created = state.service().create(new, &actor).await?;
    Ok((StatusCode::CREATED, Json(RequestRes::from(&created))))
}

#[utoipa::path(
    get,
    path = "/solicitacoes/{id}",
    params(("id" = String, Path, description = "Request identifier")),
    responses(
        (status = 200, description = "The request", body = RequestRes),
        (status = 403, description = "Request belongs to another unit", body = ErrorRes),
        (status = 404, description = "No such request", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn get_request(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<RequestRes>, ApiError> {
    let request = state.service().get(parse_id(&id)?, &actor).await?;
    Ok(Json(RequestRes::from(&request)))
}

#[utoipa::path(
    put,
    path = "/solicitacoes/{id}",
    params(("id" = String, Path, description = "Request identifier")),
    request_body = UpdateRequestReq,
    responses(
        (status = 200, description = "Request updated", body = RequestRes),
        (status = 403, description = "Caller may not edit this request", body = ErrorRes),
        (status = 404, description = "No such request", body = ErrorRes),
        (status = 409, description = "Request is no longer editable", body = ErrorRes)
    )
)]
/// Amend a draft or returned request
#[axum::debug_handler]
pub(crate) async fn update_request(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequestReq>,
) -> Result<Json<RequestRes>, ApiError> {
    let updated = state
        .service()
        .update(parse_id(&id)?, req.into(), &actor)
        .await?;
    Ok(Json(RequestRes::from(&updated)))
}

#[utoipa::path(
    delete,
    path = "/solicitacoes/{id}",
    params(("id" = String, Path, description = "Request identifier")),
    responses(
        (status = 204, description = "Request deleted"),
        (status = 403, description = "Caller is not an admin", body = ErrorRes),
        (status = 404, description = "No such request", body = ErrorRes),
        (status = 409, description = "Request is not in a terminal status", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn delete_request(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service().delete(parse_id(&id)?, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/solicitacoes/{id}/historico",
    params(("id" = String, Path, description = "Request identifier")),
    responses(
        (status = 200, description = "Audit trail, oldest first", body = HistoryRes),
        (status = 404, description = "No such request", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn history(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<HistoryRes>, ApiError> {
    let id = parse_id(&id)?;
    let events = state.service().history(id, &actor).await?;
    Ok(Json(HistoryRes {
        id: id.to_string(),
        events: events.iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    patch,
    path = "/solicitacoes/{id}/status",
    params(("id" = String, Path, description = "Request identifier")),
    request_body = ChangeStatusReq,
    responses(
        (status = 200, description = "Status changed", body = RequestRes),
        (status = 400, description = "Missing justification or reason, or unknown status", body = ErrorRes),
        (status = 403, description = "Caller may not perform this transition", body = ErrorRes),
        (status = 404, description = "No such request", body = ErrorRes),
        (status = 409, description = "Transition not allowed from the current status", body = ErrorRes)
    )
)]
/// Change the status of a request
#[axum::debug_handler]
pub(crate) async fn change_status(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(req): Json<ChangeStatusReq>,
) -> Result<Json<RequestRes>, ApiError> {
    let id = parse_id(&id)?;
    let (target, details) = req.into_parts()?;
    let updated = state
        .service()
        .change_status(id, target, &actor, details)
        .await?;
    Ok(Json(RequestRes::from(&updated)))
}

#[utoipa::path(
    patch,
    path = "/solicitacoes/{id}/prioridade",
    params(("id" = String, Path, description = "Request identifier")),
    request_body = ReprioritizeReq,
    responses(
        (status = 200, description = "Priority changed", body = RequestRes),
        (status = 403, description = "Caller may not reprioritise", body = ErrorRes),
        (status = 404, description = "No such request", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn reprioritize(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(req): Json<ReprioritizeReq>,
) -> Result<Json<RequestRes>, ApiError> {
    let id = parse_id(&id)?;
    let priority: Priority = req.priority.parse()?;
    let updated = state.service().reprioritize(id, priority, &actor).await?;
    Ok(Json(RequestRes::from(&updated)))
}

#[utoipa::path(
    post,
    path = "/solicitacoes/{id}/eventos",
    params(("id" = String, Path, description = "Request identifier")),
    request_body = AddNoteReq,
    responses(
        (status = 200, description = "Event appended", body = RequestRes),
        (status = 404, description = "No such request", body = ErrorRes)
    )
)]
/// Append an informational event to the audit trail
#[axum::debug_handler]
pub(crate) async fn add_note(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(req): Json<AddNoteReq>,
) -> Result<Json<RequestRes>, ApiError> {
    let updated = state
        .service()
        .add_note(parse_id(&id)?, &req.message, req.details, &actor)
        .await?;
    Ok(Json(RequestRes::from(&updated)))
}

#[utoipa::path(
    post,
    path = "/solicitacoes/{id}/atribuicao",
    params(("id" = String, Path, description = "Request identifier")),
    request_body = AssignReviewerReq,
    responses(
        (status = 200, description = "Reviewer assigned", body = RequestRes),
        (status = 403, description = "Caller may not assign reviewers", body = ErrorRes),
        (status = 409, description = "Request is already closed", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn assign_reviewer(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(req): Json<AssignReviewerReq>,
) -> Result<Json<RequestRes>, ApiError> {
    let id = parse_id(&id)?;
    let role = match req.reviewer_role.as_deref() {
        Some(role) => role.parse::<Role>()?,
        None => Role::Reviewer,
    };
    let reviewer = Actor::new(&req.reviewer_id, &req.reviewer_name, role, None)?;
    let updated = state
        .service()
        .assign_reviewer(id, &reviewer, &actor)
        .await?;
    Ok(Json(RequestRes::from(&updated)))
}

#[utoipa::path(
    get,
    path = "/solicitacoes/resumo",
    params(ListQuery),
    responses(
        (status = 200, description = "Counts per status, type and category, and mean review time", body = SummaryRes)
    )
)]
/// Dashboard counts over the caller's visible, filtered requests
#[axum::debug_handler]
pub(crate) async fn summary(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ListQuery>,
) -> Result<Json<SummaryRes>, ApiError> {
    let filter = query.to_filter()?;
    let summary = state.service().summary(&filter, &actor).await?;
    Ok(Json(summary.into()))
}

#[utoipa::path(
    get,
    path = "/catalogo/tipos",
    responses(
        (status = 200, description = "Request type catalog", body = CatalogRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn catalog(State(state): State<AppState>) -> Json<CatalogRes> {
    Json(CatalogRes {
        types: state
            .service()
            .catalog()
            .iter()
            .map(CatalogEntryRes::from)
            .collect(),
    })
}
