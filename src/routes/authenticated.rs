use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// The organization-scoped REST API. Every handler receives the caller's resolved
/// `AuthUser` and derives its visibility `Scope` from it; no handler here returns a row
/// outside that scope.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/me/
        // The resolved principal: groups, memberships and entitled organizations.
        .route("/api/me/", get(handlers::get_me))
        // GET /api/organization/
        // Organizations visible to the caller.
        .route("/api/organization/", get(handlers::list_organizations))
        // GET/POST /api/fundcode/?organization__id=...
        // Scoped listing with optional organization filter; creation checks write access.
        .route(
            "/api/fundcode/",
            get(handlers::list_fund_codes).post(handlers::create_fund_code),
        )
        // GET/PUT/DELETE /api/fundcode/{id}/
        // Out-of-scope ids answer 404; read-only roles get 403 on writes.
        .route(
            "/api/fundcode/{id}/",
            get(handlers::get_fund_code)
                .put(handlers::update_fund_code)
                .delete(handlers::delete_fund_code),
        )
}
