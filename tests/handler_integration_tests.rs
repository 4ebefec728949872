mod common;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use common::Fixture;
use tola_admin::{
    AppState,
    auth::AuthUser,
    handlers,
    models::{
        CreateFundCodeRequest, CreateOrganizationRequest, CreateProgramRequest, CreateUserRequest,
        FundCode, FundCodeFilter, GrantRoleRequest, Organization, Principal, Role,
        UpdateFundCodeRequest,
    },
};
use uuid::Uuid;

// --- Test Utilities ---

async fn list(state: &AppState, principal: &Principal, organization: Option<i64>) -> Vec<FundCode> {
    let result = handlers::list_fund_codes(
        AuthUser(principal.clone()),
        State(state.clone()),
        Query(FundCodeFilter {
            organization_id: organization,
        }),
    )
    .await;

    let Json(rows) = result.expect("list should succeed");
    rows
}

/// The shared setup of the listing tests: one organization holding two fund codes and a
/// TolaUser whose home organization is a different, empty one.
async fn listing_fixture() -> (Fixture, Organization, Uuid) {
    let fx = Fixture::new();
    let seeded = fx.organization("Seeded Org").await;
    fx.fund_code("FC-001", &seeded).await;
    fx.fund_code("FC-002", &seeded).await;

    let home = fx.organization("Home Org").await;
    let user = fx.user("tola", Some(&home)).await;
    (fx, home, user)
}

// --- Listing by role ---

#[tokio::test]
async fn test_list_fundcode_superuser() {
    let (fx, _home, _user) = listing_fixture().await;
    let admin = fx.superuser("root").await;
    let principal = fx.principal(admin).await;

    let rows = list(&fx.state, &principal, None).await;

    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_list_fundcode_org_admin() {
    let (fx, home, user) = listing_fixture().await;
    fx.grant(user, Role::OrgAdmin).await;

    let principal = fx.principal(user).await;
    assert_eq!(list(&fx.state, &principal, None).await.len(), 0);

    fx.fund_code("FC-home", &home).await;
    assert_eq!(list(&fx.state, &principal, None).await.len(), 1);
}

#[tokio::test]
async fn test_list_fundcode_team_roles() {
    for role in [Role::ProgramAdmin, Role::ProgramTeam, Role::ViewOnly] {
        let (fx, home, user) = listing_fixture().await;
        fx.team(user, role, None).await;

        let principal = fx.principal(user).await;
        assert_eq!(
            list(&fx.state, &principal, None).await.len(),
            0,
            "{role} should see nothing before a record exists in its organization"
        );

        fx.fund_code("FC-home", &home).await;
        assert_eq!(
            list(&fx.state, &principal, None).await.len(),
            1,
            "{role} should see the new record in its organization"
        );
    }
}

#[tokio::test]
async fn test_list_fundcode_without_entitlements_is_empty() {
    let (fx, _home, _user) = listing_fixture().await;
    let orphan = fx.user("orphan", None).await;
    let principal = fx.principal(orphan).await;

    assert!(list(&fx.state, &principal, None).await.is_empty());
    assert!(list(&fx.state, &principal, Some(1)).await.is_empty());
}

#[tokio::test]
async fn test_team_membership_reaches_program_organization() {
    let (fx, home, user) = listing_fixture().await;
    let partner = fx.organization("Partner Org").await;
    let program = fx.program("Shared Program", &partner).await;
    fx.team(user, Role::ProgramTeam, Some(program)).await;

    fx.fund_code("FC-home", &home).await;
    fx.fund_code("FC-partner", &partner).await;

    let principal = fx.principal(user).await;
    let names: Vec<String> = list(&fx.state, &principal, None)
        .await
        .into_iter()
        .map(|f| f.name)
        .collect();

    assert_eq!(names, vec!["FC-home", "FC-partner"]);
}

// --- organization__id filtering ---

#[tokio::test]
async fn test_filter_fundcode_superuser() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    let another = fx.organization("Another Org").await;
    let mine = fx.fund_code("FC-home", &home).await;
    fx.fund_code("Another FundCode", &another).await;
    let admin = fx.superuser("root").await;
    let principal = fx.principal(admin).await;

    let rows = list(&fx.state, &principal, Some(home.id)).await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, mine.name);
}

#[tokio::test]
async fn test_filter_fundcode_normaluser() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    let another = fx.organization("Another Org").await;
    let mine = fx.fund_code("FC-home", &home).await;
    fx.fund_code("Another FundCode", &another).await;
    let user = fx.user("tola", Some(&home)).await;
    let principal = fx.principal(user).await;

    let rows = list(&fx.state, &principal, Some(home.id)).await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, mine.name);
}

#[tokio::test]
async fn test_filter_cannot_widen_visibility() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    let another = fx.organization("Another Org").await;
    fx.fund_code("Another FundCode", &another).await;
    let user = fx.user("tola", Some(&home)).await;
    let principal = fx.principal(user).await;

    assert!(list(&fx.state, &principal, Some(another.id)).await.is_empty());
}

#[tokio::test]
async fn test_list_preserves_storage_order() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    for name in ["c", "a", "b"] {
        fx.fund_code(name, &home).await;
    }
    let admin = fx.superuser("root").await;
    let principal = fx.principal(admin).await;

    let names: Vec<String> = list(&fx.state, &principal, None)
        .await
        .into_iter()
        .map(|f| f.name)
        .collect();

    assert_eq!(names, vec!["c", "a", "b"]);
}

// --- Detail and writes ---

#[tokio::test]
async fn test_get_fund_code_out_of_scope_is_not_found() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    let another = fx.organization("Another Org").await;
    let hidden = fx.fund_code("Hidden", &another).await;
    let visible = fx.fund_code("Visible", &home).await;
    let user = fx.user("tola", Some(&home)).await;
    let principal = fx.principal(user).await;

    let hidden_result =
        handlers::get_fund_code(AuthUser(principal.clone()), State(fx.state.clone()), Path(hidden.id))
            .await;
    assert_eq!(hidden_result.unwrap_err(), StatusCode::NOT_FOUND);

    let Json(found) =
        handlers::get_fund_code(AuthUser(principal), State(fx.state.clone()), Path(visible.id))
            .await
            .expect("visible fund code");
    assert_eq!(found, visible);
}

#[tokio::test]
async fn test_create_fund_code_org_admin_defaults_to_home_organization() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    let user = fx.user("tola", Some(&home)).await;
    fx.grant(user, Role::OrgAdmin).await;
    let principal = fx.principal(user).await;

    let (status, Json(created)) = handlers::create_fund_code(
        AuthUser(principal),
        State(fx.state.clone()),
        Json(CreateFundCodeRequest {
            name: "  FC-new  ".to_string(),
            organization: None,
        }),
    )
    .await
    .expect("org admin may create");

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.organization_id, home.id);
    assert_eq!(created.name, "FC-new");
}

#[tokio::test]
async fn test_create_fund_code_read_only_roles_forbidden() {
    for role in [Role::ProgramTeam, Role::ViewOnly] {
        let fx = Fixture::new();
        let home = fx.organization("Home Org").await;
        let user = fx.user("tola", Some(&home)).await;
        fx.team(user, role, None).await;
        let principal = fx.principal(user).await;

        let result = handlers::create_fund_code(
            AuthUser(principal),
            State(fx.state.clone()),
            Json(CreateFundCodeRequest {
                name: "FC-new".to_string(),
                organization: Some(home.id),
            }),
        )
        .await;

        assert_eq!(result.unwrap_err(), StatusCode::FORBIDDEN, "{role} must not write");
    }
}

#[tokio::test]
async fn test_create_fund_code_without_organization_is_bad_request() {
    let fx = Fixture::new();
    let admin = fx.superuser("root").await;
    let principal = fx.principal(admin).await;

    let result = handlers::create_fund_code(
        AuthUser(principal),
        State(fx.state.clone()),
        Json(CreateFundCodeRequest {
            name: "FC-new".to_string(),
            organization: None,
        }),
    )
    .await;

    assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_fund_code_unknown_organization_is_not_found() {
    let fx = Fixture::new();
    let admin = fx.superuser("root").await;
    let principal = fx.principal(admin).await;

    let result = handlers::create_fund_code(
        AuthUser(principal),
        State(fx.state.clone()),
        Json(CreateFundCodeRequest {
            name: "FC-new".to_string(),
            organization: Some(9_999),
        }),
    )
    .await;

    assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_fund_code_program_admin() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    let fund_code = fx.fund_code("Old", &home).await;
    let user = fx.user("tola", Some(&home)).await;
    fx.team(user, Role::ProgramAdmin, None).await;
    let principal = fx.principal(user).await;

    let Json(updated) = handlers::update_fund_code(
        AuthUser(principal),
        State(fx.state.clone()),
        Path(fund_code.id),
        Json(UpdateFundCodeRequest {
            name: Some("New".to_string()),
            organization: None,
        }),
    )
    .await
    .expect("program admin may update");

    assert_eq!(updated.name, "New");
    assert_eq!(updated.organization_id, home.id);
}

#[tokio::test]
async fn test_update_fund_code_cannot_move_into_foreign_organization() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    let another = fx.organization("Another Org").await;
    let fund_code = fx.fund_code("Mine", &home).await;
    let user = fx.user("tola", Some(&home)).await;
    fx.grant(user, Role::OrgAdmin).await;
    let principal = fx.principal(user).await;

    let result = handlers::update_fund_code(
        AuthUser(principal),
        State(fx.state.clone()),
        Path(fund_code.id),
        Json(UpdateFundCodeRequest {
            name: None,
            organization: Some(another.id),
        }),
    )
    .await;

    assert_eq!(result.unwrap_err(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_fund_code() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    let fund_code = fx.fund_code("Doomed", &home).await;

    let viewer = fx.user("viewer", Some(&home)).await;
    fx.team(viewer, Role::ViewOnly, None).await;
    let viewer = fx.principal(viewer).await;
    let refused =
        handlers::delete_fund_code(AuthUser(viewer), State(fx.state.clone()), Path(fund_code.id))
            .await;
    assert_eq!(refused.unwrap_err(), StatusCode::FORBIDDEN);

    let admin = fx.superuser("root").await;
    let admin = fx.principal(admin).await;
    let deleted = handlers::delete_fund_code(
        AuthUser(admin.clone()),
        State(fx.state.clone()),
        Path(fund_code.id),
    )
    .await;
    assert_eq!(deleted, Ok(StatusCode::NO_CONTENT));

    let again =
        handlers::delete_fund_code(AuthUser(admin), State(fx.state.clone()), Path(fund_code.id))
            .await;
    assert_eq!(again.unwrap_err(), StatusCode::NOT_FOUND);
}

// --- Organizations, identity and admin ---

#[tokio::test]
async fn test_list_organizations_scoped() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    fx.organization("Another Org").await;
    let user = fx.user("tola", Some(&home)).await;
    let principal = fx.principal(user).await;

    let Json(orgs) = handlers::list_organizations(AuthUser(principal), State(fx.state.clone()))
        .await
        .expect("list organizations");

    assert_eq!(orgs.len(), 1);
    assert_eq!(orgs[0].id, home.id);
}

#[tokio::test]
async fn test_get_me_reports_entitlements() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    let user = fx.user("tola", Some(&home)).await;
    let principal = fx.principal(user).await;

    let Json(me) = handlers::get_me(AuthUser(principal)).await;
    assert_eq!(me.organizations, Some(vec![home.id]));

    let admin = fx.superuser("root").await;
    let Json(me) = handlers::get_me(AuthUser(fx.principal(admin).await)).await;
    assert_eq!(me.organizations, None);
}

#[tokio::test]
async fn test_admin_endpoints_require_superuser() {
    let fx = Fixture::new();
    let home = fx.organization("Home Org").await;
    let user = fx.user("tola", Some(&home)).await;
    fx.grant(user, Role::OrgAdmin).await;
    let principal = fx.principal(user).await;

    let org = handlers::create_organization(
        AuthUser(principal.clone()),
        State(fx.state.clone()),
        Json(CreateOrganizationRequest {
            name: "Rogue Org".to_string(),
        }),
    )
    .await;
    assert_eq!(org.unwrap_err(), StatusCode::FORBIDDEN);

    let grant = handlers::grant_role(
        AuthUser(principal),
        State(fx.state.clone()),
        Path(user),
        Json(GrantRoleRequest {
            role: Role::ProgramAdmin,
        }),
    )
    .await;
    assert_eq!(grant.unwrap_err(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_create_program_unknown_organization() {
    let fx = Fixture::new();
    let admin = fx.superuser("root").await;
    let principal = fx.principal(admin).await;

    let result = handlers::create_program(
        AuthUser(principal),
        State(fx.state.clone()),
        Json(CreateProgramRequest {
            name: "Orphan Program".to_string(),
            organization: 4_242,
        }),
    )
    .await;

    assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_create_program_and_user_store_trimmed_names() {
    let fx = Fixture::new();
    let org = fx.organization("Field Office").await;
    let admin = fx.superuser("root").await;
    let principal = fx.principal(admin).await;

    let (status, Json(program)) = handlers::create_program(
        AuthUser(principal.clone()),
        State(fx.state.clone()),
        Json(CreateProgramRequest {
            name: "  Padded  ".to_string(),
            organization: org.id,
        }),
    )
    .await
    .expect("program created");
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(program.name, "Padded");

    let (_, Json(user)) = handlers::create_user(
        AuthUser(principal.clone()),
        State(fx.state.clone()),
        Json(CreateUserRequest {
            username: " tola ".to_string(),
            email: "tola@example.org".to_string(),
            ..Default::default()
        }),
    )
    .await
    .expect("user created");
    assert_eq!(user.username, "tola");

    // Padding no longer sneaks a second "root" past the uniqueness check.
    let duplicate = handlers::create_user(
        AuthUser(principal),
        State(fx.state.clone()),
        Json(CreateUserRequest {
            username: " root".to_string(),
            email: "root2@example.org".to_string(),
            ..Default::default()
        }),
    )
    .await;
    assert_eq!(duplicate.unwrap_err(), StatusCode::CONFLICT);
}
