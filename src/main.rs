use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tola_admin::{
    AppState, InMemoryRepository, PostgresRepository, Repository,
    config::{AppConfig, Env},
    create_router,
    models::CreateUserRequest,
    repository::RepositoryState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `DATABASE_URL` value that selects the in-memory store (local demos only).
const MEMORY_URL: &str = "memory://";

/// main
///
/// Loads configuration, initializes logging, connects the repository and serves the API.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tola_admin=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    let repo = if config.db_url == MEMORY_URL && config.env == Env::Local {
        memory_repository().await
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.db_url)
            .await
            .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

        let repo = PostgresRepository::new(pool);
        repo.migrate()
            .await
            .expect("FATAL: Failed to apply database migrations.");
        Arc::new(repo) as RepositoryState
    };

    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState { repo, config });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}

/// Builds an empty in-memory store with one superuser, whose id is logged for use with the
/// `x-user-id` header.
async fn memory_repository() -> RepositoryState {
    let repo = InMemoryRepository::new();
    let admin = repo
        .create_user(CreateUserRequest {
            username: "admin".to_string(),
            email: "admin@localhost".to_string(),
            is_superuser: true,
            is_staff: true,
            organization: None,
        })
        .await
        .expect("FATAL: Failed to seed the in-memory superuser.");

    tracing::warn!(
        "Using the in-memory store; data is lost on exit. Superuser x-user-id: {}",
        admin.id
    );
    Arc::new(repo) as RepositoryState
}
