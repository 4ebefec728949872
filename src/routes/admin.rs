use crate::{AppState, handlers};
use axum::{Router, routing::post};

/// Admin Router Module
///
/// Tenancy management: organizations, programs, users, role groups and WorkflowTeam
/// memberships. Authentication comes from the middleware layer; every handler
/// additionally refuses non-superusers with 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /admin/organizations
        .route("/organizations", post(handlers::create_organization))
        // POST /admin/programs
        .route("/programs", post(handlers::create_program))
        // POST /admin/users
        // Creates the user and, optionally, its TolaUser profile.
        .route("/users", post(handlers::create_user))
        // POST /admin/users/{id}/groups
        // Idempotent role-group grant.
        .route("/users/{id}/groups", post(handlers::grant_role))
        // POST /admin/workflowteams
        .route("/workflowteams", post(handlers::create_workflow_team))
}
