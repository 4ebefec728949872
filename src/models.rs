use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Tenancy Schemas (Mapped to Database) ---

/// Organization
///
/// The tenant boundary. Every scoped resource (FundCode, Program) belongs to exactly one
/// organization, and visibility is always decided by organization id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    #[ts(type = "string")]
    pub create_date: DateTime<Utc>,
    #[ts(type = "string")]
    pub edit_date: DateTime<Utc>,
}

/// Program
///
/// A program run by an organization. WorkflowTeam memberships that name a program reach
/// the program's organization.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Program {
    pub id: i64,
    pub name: String,
    #[serde(rename = "organization")]
    pub organization_id: i64,
}

/// FundCode
///
/// The representative organization-scoped resource served by `/api/fundcode/`.
/// Serialized flat: the owning organization is emitted as its id under `organization`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct FundCode {
    pub id: i64,
    pub name: String,
    #[serde(rename = "organization")]
    pub organization_id: i64,
    #[ts(type = "string")]
    pub create_date: DateTime<Utc>,
    #[ts(type = "string")]
    pub edit_date: DateTime<Utc>,
}

/// User
///
/// The authentication principal as stored in the `users` table. The `sub` claim of an
/// incoming JWT is looked up against `id`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_superuser: bool,
    pub is_staff: bool,
}

/// TolaUser
///
/// Profile wrapping a `User`, tying it to its home organization.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct TolaUser {
    pub id: i64,
    pub user_id: Uuid,
    pub organization_id: Option<i64>,
}

/// Role
///
/// The closed set of role groups. Wire and storage names follow the group names used by
/// the admin front-end (`OrgAdmin`, `ProgramAdmin`, `ProgramTeam`, `ViewOnly`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum Role {
    OrgAdmin,
    ProgramAdmin,
    ProgramTeam,
    ViewOnly,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::OrgAdmin,
        Role::ProgramAdmin,
        Role::ProgramTeam,
        Role::ViewOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::OrgAdmin => "OrgAdmin",
            Role::ProgramAdmin => "ProgramAdmin",
            Role::ProgramTeam => "ProgramTeam",
            Role::ViewOnly => "ViewOnly",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored role name is not one of the known groups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// WorkflowTeam
///
/// Membership granting a TolaUser a role, optionally within a program.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct WorkflowTeam {
    pub id: i64,
    #[serde(rename = "workflow_user")]
    pub tola_user_id: i64,
    #[serde(rename = "program")]
    pub program_id: Option<i64>,
    pub role: Role,
}

// --- Resolved Identity ---

/// TeamMembership
///
/// A WorkflowTeam row as seen by the authorization layer: the role, plus the organization
/// it reaches (the program's organization, else the member's own).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TeamMembership {
    pub role: Role,
    pub program_id: Option<i64>,
    pub organization_id: Option<i64>,
}

/// Principal
///
/// The output of the Role/Membership Lookup: everything the access rules need to know
/// about the requesting user, loaded once per request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    /// Home organization from the TolaUser profile, if the user has one.
    pub organization_id: Option<i64>,
    /// Role groups granted directly to the user.
    pub groups: Vec<Role>,
    pub teams: Vec<TeamMembership>,
}

// --- Request Payloads (Input Schemas) ---

/// Query parameters accepted by `GET /api/fundcode/`.
#[derive(Debug, Clone, Deserialize, Default, utoipa::IntoParams)]
pub struct FundCodeFilter {
    /// Restrict the listing to one organization (within the caller's visibility).
    #[serde(rename = "organization__id", default, deserialize_with = "empty_string_as_none")]
    pub organization_id: Option<i64>,
}

/// `?organization__id=` (present but blank) means "no filter", not a parse error.
fn empty_string_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = Option::<String>::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// CreateFundCodeRequest
///
/// `organization` defaults to the caller's home organization when omitted.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateFundCodeRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<i64>,
}

/// UpdateFundCodeRequest
///
/// Partial update; only provided fields change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateFundCodeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateOrganizationRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateProgramRequest {
    pub name: String,
    pub organization: i64,
}

/// CreateUserRequest
///
/// Creates the `User` and, when `organization` is given, its TolaUser profile.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GrantRoleRequest {
    pub role: Role,
}

/// CreateWorkflowTeamRequest
///
/// `user` is the auth user id; the membership attaches to that user's TolaUser profile.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateWorkflowTeamRequest {
    pub user: Uuid,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<i64>,
}

// --- Output Schemas ---

/// WhoAmI
///
/// Output of `GET /api/me/`. `organizations` is `null` for superusers (no restriction).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct WhoAmI {
    pub principal: Principal,
    pub organizations: Option<Vec<i64>>,
}
