use axum::{
    extract::{FromRef, Request},
    http::HeaderName,
    Router,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod repository;

pub mod routes;
use routes::{admin, authenticated, public};
use auth::AuthUser;

// --- Public Re-exports ---

pub use access::Scope;
pub use config::AppConfig;
pub use error::RepositoryError;
pub use memory::InMemoryRepository;
pub use repository::{PostgresRepository, Repository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every `#[utoipa::path]` handler, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_fund_codes, handlers::get_fund_code, handlers::create_fund_code,
        handlers::update_fund_code, handlers::delete_fund_code, handlers::list_organizations,
        handlers::get_me, handlers::create_organization, handlers::create_program,
        handlers::create_user, handlers::grant_role, handlers::create_workflow_team
    ),
    components(
        schemas(
            models::FundCode, models::Organization, models::Program, models::User,
            models::Role, models::WorkflowTeam, models::TeamMembership, models::Principal,
            models::WhoAmI, models::CreateFundCodeRequest, models::UpdateFundCodeRequest,
            models::CreateOrganizationRequest, models::CreateProgramRequest,
            models::CreateUserRequest, models::GrantRoleRequest,
            models::CreateWorkflowTeamRequest,
        )
    ),
    tags(
        (name = "tola-admin", description = "Organization-scoped administrative data API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, cloneable application state. Handlers and extractors pull the pieces they need
/// through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    pub config: AppConfig,
}

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Runs the `AuthUser` extractor before any protected handler. A failed extraction
/// rejects the request with 401 before the handler is reached; on success the
/// `Principal` is stored in the request extensions so handlers do not look it up again.
async fn auth_middleware(
    AuthUser(principal): AuthUser,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(principal);
    next.run(request).await
}

/// create_router
///
/// Assembles the public, authenticated and admin routers, then wraps everything in the
/// request-id, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    // Outermost: request id first so the trace span can record it.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// One `http_request` span per request, tagged with method, uri and `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
