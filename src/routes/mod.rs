/// Router Module Index
///
/// Routing is split by access level, and each level's access control is applied
/// as a layer on its router in `create_router`.

/// Routes open to anonymous clients.
pub mod public;

/// Routes behind the `AuthUser` extractor middleware. Row visibility is then decided
/// per request by the caller's scope.
pub mod authenticated;

/// Superuser-only tenancy management, nested under `/admin`.
pub mod admin;
