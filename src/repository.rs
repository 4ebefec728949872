use crate::{
    access::Scope,
    error::RepositoryError,
    models::{
        CreateProgramRequest, CreateUserRequest, CreateWorkflowTeamRequest, FundCode,
        Organization, Principal, Program, Role, TeamMembership, User, WorkflowTeam,
    },
};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// The persistence contract shared by the Postgres store and the in-memory store.
/// Handlers only ever see `Arc<dyn Repository>`.
///
/// Scoped listings take the caller's [`Scope`] so the visibility predicate is applied by
/// the store itself (as SQL in Postgres); single-row lookups are unscoped and the handler
/// checks the row's organization against the scope.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identity ---
    // Role/Membership Lookup. `None` for unknown users.
    async fn get_principal(&self, user_id: Uuid) -> Result<Option<Principal>, RepositoryError>;
    async fn create_user(&self, req: CreateUserRequest) -> Result<User, RepositoryError>;
    // Idempotent: granting a role the user already holds is a no-op.
    async fn grant_role(&self, user_id: Uuid, role: Role) -> Result<(), RepositoryError>;
    async fn create_workflow_team(
        &self,
        req: CreateWorkflowTeamRequest,
    ) -> Result<WorkflowTeam, RepositoryError>;

    // --- Tenancy ---
    async fn create_organization(&self, name: String) -> Result<Organization, RepositoryError>;
    async fn list_organizations(&self, scope: &Scope) -> Result<Vec<Organization>, RepositoryError>;
    async fn create_program(&self, req: CreateProgramRequest) -> Result<Program, RepositoryError>;

    // --- FundCodes ---
    // Ordered by id (storage order).
    async fn list_fund_codes(&self, scope: &Scope) -> Result<Vec<FundCode>, RepositoryError>;
    async fn get_fund_code(&self, id: i64) -> Result<Option<FundCode>, RepositoryError>;
    async fn create_fund_code(
        &self,
        name: String,
        organization_id: i64,
    ) -> Result<FundCode, RepositoryError>;
    // Partial update; `None` fields are left untouched.
    async fn update_fund_code(
        &self,
        id: i64,
        name: Option<String>,
        organization_id: Option<i64>,
    ) -> Result<Option<FundCode>, RepositoryError>;
    async fn delete_fund_code(&self, id: i64) -> Result<bool, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Private row shapes (role columns are TEXT) ---

#[derive(FromRow)]
struct PrincipalRow {
    id: Uuid,
    username: String,
    is_superuser: bool,
    is_staff: bool,
    organization_id: Option<i64>,
}

#[derive(FromRow)]
struct TeamRow {
    role: String,
    program_id: Option<i64>,
    organization_id: Option<i64>,
}

#[derive(FromRow)]
struct WorkflowTeamRow {
    id: i64,
    tola_user_id: i64,
    program_id: Option<i64>,
    role: String,
}

impl TryFrom<WorkflowTeamRow> for WorkflowTeam {
    type Error = RepositoryError;

    fn try_from(row: WorkflowTeamRow) -> Result<Self, Self::Error> {
        Ok(WorkflowTeam {
            id: row.id,
            tola_user_id: row.tola_user_id,
            program_id: row.program_id,
            role: row.role.parse()?,
        })
    }
}

/// Maps constraint violations on writes to the domain errors handlers understand.
fn write_error(err: sqlx::Error, missing: &'static str) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_foreign_key_violation() {
            return RepositoryError::NotFound(missing);
        }
        if db.is_unique_violation() {
            return RepositoryError::Conflict(db.message().to_string());
        }
    }
    RepositoryError::Database(err)
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by the PostgreSQL database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations from `./migrations`.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// get_principal
    ///
    /// Loads the user with its TolaUser organization, then its role groups and its
    /// WorkflowTeam memberships. A membership without a program reaches the member's own
    /// organization.
    async fn get_principal(&self, user_id: Uuid) -> Result<Option<Principal>, RepositoryError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT u.id, u.username, u.is_superuser, u.is_staff, t.organization_id
            FROM users u
            LEFT JOIN tola_users t ON t.user_id = u.id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let groups = sqlx::query_scalar::<_, String>(
            "SELECT role FROM user_groups WHERE user_id = $1 ORDER BY role",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|name| name.parse::<Role>())
        .collect::<Result<Vec<_>, _>>()?;

        let teams = sqlx::query_as::<_, TeamRow>(
            r#"
            SELECT wt.role, wt.program_id,
                   COALESCE(p.organization_id, t.organization_id) AS organization_id
            FROM workflow_teams wt
            JOIN tola_users t ON t.id = wt.tola_user_id
            LEFT JOIN programs p ON p.id = wt.program_id
            WHERE t.user_id = $1
            ORDER BY wt.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|team| {
            Ok(TeamMembership {
                role: team.role.parse()?,
                program_id: team.program_id,
                organization_id: team.organization_id,
            })
        })
        .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(Some(Principal {
            user_id: row.id,
            username: row.username,
            is_superuser: row.is_superuser,
            is_staff: row.is_staff,
            organization_id: row.organization_id,
            groups,
            teams,
        }))
    }

    /// create_user
    ///
    /// Inserts the user and, when an organization is given, its TolaUser profile in one
    /// transaction.
    async fn create_user(&self, req: CreateUserRequest) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, is_superuser, is_staff)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, username, email, is_superuser, is_staff
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&req.username)
        .bind(&req.email)
        .bind(req.is_superuser)
        .bind(req.is_staff)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error(e, "user"))?;

        if let Some(organization_id) = req.organization {
            sqlx::query("INSERT INTO tola_users (user_id, organization_id) VALUES ($1, $2)")
                .bind(user.id)
                .bind(organization_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| write_error(e, "organization"))?;
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn grant_role(&self, user_id: Uuid, role: Role) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_groups (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "user"))?;
        Ok(())
    }

    /// create_workflow_team
    ///
    /// Attaches the membership to the user's TolaUser profile; users without a profile
    /// cannot join a team.
    async fn create_workflow_team(
        &self,
        req: CreateWorkflowTeamRequest,
    ) -> Result<WorkflowTeam, RepositoryError> {
        let tola_user_id =
            sqlx::query_scalar::<_, i64>("SELECT id FROM tola_users WHERE user_id = $1")
                .bind(req.user)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(RepositoryError::NotFound("tola user"))?;

        let row = sqlx::query_as::<_, WorkflowTeamRow>(
            r#"
            INSERT INTO workflow_teams (tola_user_id, program_id, role)
            VALUES ($1, $2, $3)
            RETURNING id, tola_user_id, program_id, role
            "#,
        )
        .bind(tola_user_id)
        .bind(req.program)
        .bind(req.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "program"))?;

        row.try_into()
    }

    async fn create_organization(&self, name: String) -> Result<Organization, RepositoryError> {
        let org = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (name, create_date, edit_date)
            VALUES ($1, NOW(), NOW())
            RETURNING id, name, create_date, edit_date
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(org)
    }

    async fn list_organizations(&self, scope: &Scope) -> Result<Vec<Organization>, RepositoryError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, name, create_date, edit_date FROM organizations");
        if let Some(ids) = scope.organization_ids() {
            builder.push(" WHERE id = ANY(");
            builder.push_bind(ids);
            builder.push(")");
        }
        builder.push(" ORDER BY id");

        Ok(builder
            .build_query_as::<Organization>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_program(&self, req: CreateProgramRequest) -> Result<Program, RepositoryError> {
        sqlx::query_as::<_, Program>(
            r#"
            INSERT INTO programs (name, organization_id)
            VALUES ($1, $2)
            RETURNING id, name, organization_id
            "#,
        )
        .bind(req.name)
        .bind(req.organization)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "organization"))
    }

    /// list_fund_codes
    ///
    /// The SQL rendition of the Authorization Filter: unrestricted scopes read the whole
    /// table, restricted scopes add `organization_id = ANY($1)`.
    async fn list_fund_codes(&self, scope: &Scope) -> Result<Vec<FundCode>, RepositoryError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, name, organization_id, create_date, edit_date FROM fund_codes",
        );
        if let Some(ids) = scope.organization_ids() {
            builder.push(" WHERE organization_id = ANY(");
            builder.push_bind(ids);
            builder.push(")");
        }
        builder.push(" ORDER BY id");

        Ok(builder
            .build_query_as::<FundCode>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_fund_code(&self, id: i64) -> Result<Option<FundCode>, RepositoryError> {
        Ok(sqlx::query_as::<_, FundCode>(
            "SELECT id, name, organization_id, create_date, edit_date FROM fund_codes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_fund_code(
        &self,
        name: String,
        organization_id: i64,
    ) -> Result<FundCode, RepositoryError> {
        sqlx::query_as::<_, FundCode>(
            r#"
            INSERT INTO fund_codes (name, organization_id, create_date, edit_date)
            VALUES ($1, $2, NOW(), NOW())
            RETURNING id, name, organization_id, create_date, edit_date
            "#,
        )
        .bind(name)
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "organization"))
    }

    /// update_fund_code
    ///
    /// Uses `COALESCE` so only provided fields change.
    async fn update_fund_code(
        &self,
        id: i64,
        name: Option<String>,
        organization_id: Option<i64>,
    ) -> Result<Option<FundCode>, RepositoryError> {
        sqlx::query_as::<_, FundCode>(
            r#"
            UPDATE fund_codes
            SET name = COALESCE($2, name),
                organization_id = COALESCE($3, organization_id),
                edit_date = NOW()
            WHERE id = $1
            RETURNING id, name, organization_id, create_date, edit_date
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, "organization"))
    }

    async fn delete_fund_code(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM fund_codes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
