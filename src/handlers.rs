use crate::{
    AppState,
    access::{Scope, can_manage},
    auth::AuthUser,
    models::{
        CreateFundCodeRequest, CreateOrganizationRequest, CreateProgramRequest,
        CreateUserRequest, CreateWorkflowTeamRequest, FundCode, FundCodeFilter, GrantRoleRequest,
        Organization, Principal, Program, UpdateFundCodeRequest, User, WhoAmI, WorkflowTeam,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

// --- Shared checks ---

fn require_superuser(principal: &Principal) -> Result<(), StatusCode> {
    if principal.is_superuser {
        Ok(())
    } else {
        tracing::warn!(user = %principal.user_id, "admin endpoint refused");
        Err(StatusCode::FORBIDDEN)
    }
}

fn require_name(name: &str) -> Result<String, StatusCode> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(name.to_string())
}

/// Loads a fund code and hides it unless the principal's scope covers its organization.
/// Out-of-scope rows are reported as missing so their existence does not leak.
async fn visible_fund_code(
    state: &AppState,
    principal: &Principal,
    id: i64,
) -> Result<FundCode, StatusCode> {
    let scope = Scope::for_principal(principal);
    match state.repo.get_fund_code(id).await? {
        Some(fund_code) if scope.permits(fund_code.organization_id) => Ok(fund_code),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

// --- FundCode Handlers ---

/// list_fund_codes
///
/// Lists the fund codes visible to the caller. Superusers see every row; everyone else
/// sees rows of their own organization and of organizations reached through WorkflowTeam
/// membership. `organization__id` narrows that set further and never widens it.
///
/// A caller entitled to nothing gets an empty list, not an error.
#[utoipa::path(
    get,
    path = "/api/fundcode/",
    params(FundCodeFilter),
    responses((status = 200, description = "Visible fund codes", body = [FundCode]))
)]
pub async fn list_fund_codes(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<FundCodeFilter>,
) -> Result<Json<Vec<FundCode>>, StatusCode> {
    let scope = Scope::for_principal(&principal).narrow(filter.organization_id);
    tracing::debug!(user = %principal.user_id, ?scope, "listing fund codes");

    if scope.is_empty() {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(state.repo.list_fund_codes(&scope).await?))
}

#[utoipa::path(
    get,
    path = "/api/fundcode/{id}/",
    params(("id" = i64, Path, description = "FundCode ID")),
    responses(
        (status = 200, description = "Found", body = FundCode),
        (status = 404, description = "Missing or not visible")
    )
)]
pub async fn get_fund_code(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FundCode>, StatusCode> {
    visible_fund_code(&state, &principal, id).await.map(Json)
}

/// create_fund_code
///
/// Creates a fund code in the requested organization, or the caller's home organization
/// when none is given. Only principals that can manage that organization may write.
#[utoipa::path(
    post,
    path = "/api/fundcode/",
    request_body = CreateFundCodeRequest,
    responses(
        (status = 201, description = "Created", body = FundCode),
        (status = 400, description = "Missing name or organization"),
        (status = 403, description = "Not allowed to write in this organization")
    )
)]
pub async fn create_fund_code(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateFundCodeRequest>,
) -> Result<(StatusCode, Json<FundCode>), StatusCode> {
    let name = require_name(&payload.name)?;
    let organization_id = payload
        .organization
        .or(principal.organization_id)
        .ok_or(StatusCode::BAD_REQUEST)?;

    if !can_manage(&principal, organization_id) {
        return Err(StatusCode::FORBIDDEN);
    }

    let fund_code = state.repo.create_fund_code(name, organization_id).await?;
    tracing::info!(
        user = %principal.user_id,
        fund_code = fund_code.id,
        organization = organization_id,
        "fund code created"
    );
    Ok((StatusCode::CREATED, Json(fund_code)))
}

/// update_fund_code
///
/// Partial update. Moving a fund code requires write access to both the current and the
/// target organization.
#[utoipa::path(
    put,
    path = "/api/fundcode/{id}/",
    params(("id" = i64, Path, description = "FundCode ID")),
    request_body = UpdateFundCodeRequest,
    responses(
        (status = 200, description = "Updated", body = FundCode),
        (status = 403, description = "Read-only access"),
        (status = 404, description = "Missing or not visible")
    )
)]
pub async fn update_fund_code(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateFundCodeRequest>,
) -> Result<Json<FundCode>, StatusCode> {
    let current = visible_fund_code(&state, &principal, id).await?;

    let writable = can_manage(&principal, current.organization_id)
        && payload
            .organization
            .is_none_or(|target| can_manage(&principal, target));
    if !writable {
        return Err(StatusCode::FORBIDDEN);
    }

    let name = payload.name.as_deref().map(require_name).transpose()?;

    match state
        .repo
        .update_fund_code(id, name, payload.organization)
        .await?
    {
        Some(fund_code) => Ok(Json(fund_code)),
        // Deleted between the visibility check and the update.
        None => Err(StatusCode::NOT_FOUND),
    }
}

#[utoipa::path(
    delete,
    path = "/api/fundcode/{id}/",
    params(("id" = i64, Path, description = "FundCode ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Read-only access"),
        (status = 404, description = "Missing or not visible")
    )
)]
pub async fn delete_fund_code(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let current = visible_fund_code(&state, &principal, id).await?;
    if !can_manage(&principal, current.organization_id) {
        return Err(StatusCode::FORBIDDEN);
    }

    if state.repo.delete_fund_code(id).await? {
        tracing::info!(user = %principal.user_id, fund_code = id, "fund code deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

// --- Organization & Identity Handlers ---

/// list_organizations
///
/// Organizations visible to the caller, under the same rules as fund codes.
#[utoipa::path(
    get,
    path = "/api/organization/",
    responses((status = 200, description = "Visible organizations", body = [Organization]))
)]
pub async fn list_organizations(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Organization>>, StatusCode> {
    let scope = Scope::for_principal(&principal);
    if scope.is_empty() {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(state.repo.list_organizations(&scope).await?))
}

/// get_me
///
/// Echoes the resolved principal and the organization ids it is entitled to.
#[utoipa::path(
    get,
    path = "/api/me/",
    responses((status = 200, description = "Resolved principal", body = WhoAmI))
)]
pub async fn get_me(AuthUser(principal): AuthUser) -> Json<WhoAmI> {
    let organizations = Scope::for_principal(&principal).organization_ids();
    Json(WhoAmI {
        principal,
        organizations,
    })
}

// --- Admin Handlers (superuser only) ---

#[utoipa::path(
    post,
    path = "/admin/organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Created", body = Organization),
        (status = 403, description = "Not a superuser")
    )
)]
pub async fn create_organization(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Organization>), StatusCode> {
    require_superuser(&principal)?;
    let name = require_name(&payload.name)?;
    let org = state.repo.create_organization(name).await?;
    tracing::info!(organization = org.id, "organization created");
    Ok((StatusCode::CREATED, Json(org)))
}

#[utoipa::path(
    post,
    path = "/admin/programs",
    request_body = CreateProgramRequest,
    responses(
        (status = 201, description = "Created", body = Program),
        (status = 404, description = "Unknown organization")
    )
)]
pub async fn create_program(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<CreateProgramRequest>,
) -> Result<(StatusCode, Json<Program>), StatusCode> {
    require_superuser(&principal)?;
    payload.name = require_name(&payload.name)?;
    let program = state.repo.create_program(payload).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

/// create_user
///
/// Creates a user and, when `organization` is set, its TolaUser profile.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = User),
        (status = 404, description = "Unknown organization"),
        (status = 409, description = "Username taken")
    )
)]
pub async fn create_user(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), StatusCode> {
    require_superuser(&principal)?;
    payload.username = require_name(&payload.username)?;
    let user = state.repo.create_user(payload).await?;
    tracing::info!(user = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    post,
    path = "/admin/users/{id}/groups",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = GrantRoleRequest,
    responses(
        (status = 204, description = "Granted"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn grant_role(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<GrantRoleRequest>,
) -> Result<StatusCode, StatusCode> {
    require_superuser(&principal)?;
    state.repo.grant_role(user_id, payload.role).await?;
    tracing::info!(user = %user_id, role = %payload.role, "role granted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/admin/workflowteams",
    request_body = CreateWorkflowTeamRequest,
    responses(
        (status = 201, description = "Created", body = WorkflowTeam),
        (status = 404, description = "User has no profile, or unknown program")
    )
)]
pub async fn create_workflow_team(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowTeamRequest>,
) -> Result<(StatusCode, Json<WorkflowTeam>), StatusCode> {
    require_superuser(&principal)?;
    let team = state.repo.create_workflow_team(payload).await?;
    tracing::info!(team = team.id, role = %team.role, "workflow team membership created");
    Ok((StatusCode::CREATED, Json(team)))
}
