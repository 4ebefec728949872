#![allow(dead_code)]

use std::sync::Arc;
use tola_admin::{
    AppConfig, AppState, InMemoryRepository, Repository,
    models::{
        CreateProgramRequest, CreateUserRequest, CreateWorkflowTeamRequest, FundCode, Organization,
        Principal, Role,
    },
};
use uuid::Uuid;

// --- Shared fixtures for the in-memory store ---

pub struct Fixture {
    pub repo: Arc<InMemoryRepository>,
    pub state: AppState,
}

impl Fixture {
    pub fn new() -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let state = AppState {
            repo: repo.clone(),
            config: AppConfig::default(),
        };
        Fixture { repo, state }
    }

    pub async fn organization(&self, name: &str) -> Organization {
        self.repo
            .create_organization(name.to_string())
            .await
            .expect("create organization")
    }

    pub async fn fund_code(&self, name: &str, organization: &Organization) -> FundCode {
        self.repo
            .create_fund_code(name.to_string(), organization.id)
            .await
            .expect("create fund code")
    }

    /// A user with a TolaUser profile in `organization` (or no profile at all).
    pub async fn user(&self, username: &str, organization: Option<&Organization>) -> Uuid {
        self.repo
            .create_user(CreateUserRequest {
                username: username.to_string(),
                email: format!("{}@example.org", username),
                is_superuser: false,
                is_staff: false,
                organization: organization.map(|org| org.id),
            })
            .await
            .expect("create user")
            .id
    }

    pub async fn superuser(&self, username: &str) -> Uuid {
        self.repo
            .create_user(CreateUserRequest {
                username: username.to_string(),
                email: format!("{}@example.org", username),
                is_superuser: true,
                is_staff: true,
                organization: None,
            })
            .await
            .expect("create superuser")
            .id
    }

    pub async fn grant(&self, user: Uuid, role: Role) {
        self.repo.grant_role(user, role).await.expect("grant role");
    }

    pub async fn program(&self, name: &str, organization: &Organization) -> i64 {
        self.repo
            .create_program(CreateProgramRequest {
                name: name.to_string(),
                organization: organization.id,
            })
            .await
            .expect("create program")
            .id
    }

    pub async fn team(&self, user: Uuid, role: Role, program: Option<i64>) {
        self.repo
            .create_workflow_team(CreateWorkflowTeamRequest { user, role, program })
            .await
            .expect("create workflow team");
    }

    pub async fn principal(&self, user: Uuid) -> Principal {
        self.repo
            .get_principal(user)
            .await
            .expect("principal lookup")
            .expect("user exists")
    }
}
