use async_trait::async_trait;
use chrono::Utc;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::{
    access::Scope,
    error::RepositoryError,
    models::{
        CreateProgramRequest, CreateUserRequest, CreateWorkflowTeamRequest, FundCode,
        Organization, Principal, Program, Role, TeamMembership, TolaUser, User, WorkflowTeam,
    },
    repository::Repository,
};

#[derive(Default)]
struct Tables {
    organizations: Vec<Organization>,
    programs: Vec<Program>,
    users: Vec<User>,
    tola_users: Vec<TolaUser>,
    user_groups: Vec<(Uuid, Role)>,
    workflow_teams: Vec<WorkflowTeam>,
    fund_codes: Vec<FundCode>,
    next_id: i64,
}

impl Tables {
    // Single sequence shared by every table.
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn organization_exists(&self, id: i64) -> bool {
        self.organizations.iter().any(|org| org.id == id)
    }
}

/// InMemoryRepository
///
/// A `Repository` backed by plain vectors behind a lock. Used by the test suite and for
/// running the API without Postgres. Rows are appended, so iteration order is id order,
/// matching the `ORDER BY id` of the Postgres store.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored: no write leaves the tables half-updated.
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_principal(&self, user_id: Uuid) -> Result<Option<Principal>, RepositoryError> {
        let tables = self.read();

        let Some(user) = tables.users.iter().find(|u| u.id == user_id) else {
            return Ok(None);
        };
        let profile = tables.tola_users.iter().find(|t| t.user_id == user_id);
        let home = profile.and_then(|t| t.organization_id);

        let groups = tables
            .user_groups
            .iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, role)| *role)
            .collect();

        let teams = match profile {
            Some(profile) => tables
                .workflow_teams
                .iter()
                .filter(|team| team.tola_user_id == profile.id)
                .map(|team| TeamMembership {
                    role: team.role,
                    program_id: team.program_id,
                    organization_id: team
                        .program_id
                        .and_then(|pid| tables.programs.iter().find(|p| p.id == pid))
                        .map(|p| p.organization_id)
                        .or(home),
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(Some(Principal {
            user_id: user.id,
            username: user.username.clone(),
            is_superuser: user.is_superuser,
            is_staff: user.is_staff,
            organization_id: home,
            groups,
            teams,
        }))
    }

    async fn create_user(&self, req: CreateUserRequest) -> Result<User, RepositoryError> {
        let mut tables = self.write();

        if tables.users.iter().any(|u| u.username == req.username) {
            return Err(RepositoryError::Conflict(format!(
                "username {} already exists",
                req.username
            )));
        }
        if let Some(org) = req.organization {
            if !tables.organization_exists(org) {
                return Err(RepositoryError::NotFound("organization"));
            }
        }

        let user = User {
            id: Uuid::new_v4(),
            username: req.username,
            email: req.email,
            is_superuser: req.is_superuser,
            is_staff: req.is_staff,
        };
        tables.users.push(user.clone());

        if let Some(org) = req.organization {
            let id = tables.next_id();
            tables.tola_users.push(TolaUser {
                id,
                user_id: user.id,
                organization_id: Some(org),
            });
        }

        Ok(user)
    }

    async fn grant_role(&self, user_id: Uuid, role: Role) -> Result<(), RepositoryError> {
        let mut tables = self.write();
        if !tables.users.iter().any(|u| u.id == user_id) {
            return Err(RepositoryError::NotFound("user"));
        }
        if !tables.user_groups.contains(&(user_id, role)) {
            tables.user_groups.push((user_id, role));
        }
        Ok(())
    }

    async fn create_workflow_team(
        &self,
        req: CreateWorkflowTeamRequest,
    ) -> Result<WorkflowTeam, RepositoryError> {
        let mut tables = self.write();

        let tola_user_id = tables
            .tola_users
            .iter()
            .find(|t| t.user_id == req.user)
            .map(|t| t.id)
            .ok_or(RepositoryError::NotFound("tola user"))?;
        if let Some(pid) = req.program {
            if !tables.programs.iter().any(|p| p.id == pid) {
                return Err(RepositoryError::NotFound("program"));
            }
        }

        let team = WorkflowTeam {
            id: tables.next_id(),
            tola_user_id,
            program_id: req.program,
            role: req.role,
        };
        tables.workflow_teams.push(team.clone());
        Ok(team)
    }

    async fn create_organization(&self, name: String) -> Result<Organization, RepositoryError> {
        let mut tables = self.write();
        let now = Utc::now();
        let org = Organization {
            id: tables.next_id(),
            name,
            create_date: now,
            edit_date: now,
        };
        tables.organizations.push(org.clone());
        Ok(org)
    }

    async fn list_organizations(&self, scope: &Scope) -> Result<Vec<Organization>, RepositoryError> {
        Ok(scope.filter(self.read().organizations.iter().cloned()))
    }

    async fn create_program(&self, req: CreateProgramRequest) -> Result<Program, RepositoryError> {
        let mut tables = self.write();
        if !tables.organization_exists(req.organization) {
            return Err(RepositoryError::NotFound("organization"));
        }
        let program = Program {
            id: tables.next_id(),
            name: req.name,
            organization_id: req.organization,
        };
        tables.programs.push(program.clone());
        Ok(program)
    }

    async fn list_fund_codes(&self, scope: &Scope) -> Result<Vec<FundCode>, RepositoryError> {
        Ok(scope.filter(self.read().fund_codes.iter().cloned()))
    }

    async fn get_fund_code(&self, id: i64) -> Result<Option<FundCode>, RepositoryError> {
        Ok(self.read().fund_codes.iter().find(|f| f.id == id).cloned())
    }

    async fn create_fund_code(
        &self,
        name: String,
        organization_id: i64,
    ) -> Result<FundCode, RepositoryError> {
        let mut tables = self.write();
        if !tables.organization_exists(organization_id) {
            return Err(RepositoryError::NotFound("organization"));
        }
        let now = Utc::now();
        let fund_code = FundCode {
            id: tables.next_id(),
            name,
            organization_id,
            create_date: now,
            edit_date: now,
        };
        tables.fund_codes.push(fund_code.clone());
        Ok(fund_code)
    }

    async fn update_fund_code(
        &self,
        id: i64,
        name: Option<String>,
        organization_id: Option<i64>,
    ) -> Result<Option<FundCode>, RepositoryError> {
        let mut tables = self.write();
        if let Some(org) = organization_id {
            if !tables.organization_exists(org) {
                return Err(RepositoryError::NotFound("organization"));
            }
        }

        let Some(fund_code) = tables.fund_codes.iter_mut().find(|f| f.id == id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            fund_code.name = name;
        }
        if let Some(org) = organization_id {
            fund_code.organization_id = org;
        }
        fund_code.edit_date = Utc::now();
        Ok(Some(fund_code.clone()))
    }

    async fn delete_fund_code(&self, id: i64) -> Result<bool, RepositoryError> {
        let mut tables = self.write();
        let before = tables.fund_codes.len();
        tables.fund_codes.retain(|f| f.id != id);
        Ok(tables.fund_codes.len() < before)
    }
}
