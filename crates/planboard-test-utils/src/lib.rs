//! Shared test utilities for planboard integration tests.
//!
//! One PostgreSQL server is shared by every test in a binary; each test gets
//! its own freshly migrated database on it.
//!
//! - **`PLANBOARD_TEST_PG_URL`** set (CI service container or a local
//!   server): connect to it directly, no container is started.
//! - **No env var**: start a container via testcontainers on first use and
//!   keep it for the lifetime of the test binary.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use planboard_db::models::Project;
use planboard_db::pool;
use planboard_db::queries::projects;

struct SharedPg {
    /// Server root URL, no database name appended.
    base_url: String,
    /// Held to keep the container alive. `None` when using an external URL.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn start_shared_pg() -> SharedPg {
    if let Ok(url) = std::env::var("PLANBOARD_TEST_PG_URL") {
        return SharedPg {
            base_url: url.trim_end_matches('/').to_owned(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("failed to start PostgreSQL container");
    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedPg {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

async fn maintenance_pool() -> PgPool {
    let shared = SHARED_PG.get_or_init(start_shared_pg).await;
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&format!("{}/postgres", shared.base_url))
        .await
        .expect("failed to connect to maintenance database")
}

/// A migrated, uniquely named database. Call [`TestDb::drop`] at the end of
/// the test; a panicking test leaks the database until the server goes away.
pub struct TestDb {
    pub pool: PgPool,
    pub name: String,
}

impl TestDb {
    /// Create a new database on the shared server and run migrations on it.
    pub async fn create() -> Self {
        let name = format!("planboard_test_{}", Uuid::new_v4().simple());

        let maint = maintenance_pool().await;
        maint
            .execute(format!("CREATE DATABASE {name}").as_str())
            .await
            .unwrap_or_else(|e| panic!("failed to create temp database {name}: {e}"));
        maint.close().await;

        let base_url = &SHARED_PG
            .get()
            .expect("shared server initialized above")
            .base_url;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("{base_url}/{name}"))
            .await
            .unwrap_or_else(|e| panic!("failed to connect to temp database {name}: {e}"));

        pool::run_migrations(&pool)
            .await
            .expect("migrations should succeed");

        Self { pool, name }
    }

    /// Insert a project with a fixed title.
    pub async fn seed_project(&self) -> Project {
        projects::insert_project(&self.pool, "test project", Some("seeded by tests"), None)
            .await
            .expect("insert_project should succeed")
    }

    /// Close the pool, terminate stray connections, and drop the database.
    pub async fn drop(self) {
        self.pool.close().await;

        let maint = maintenance_pool().await;
        let terminate = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = '{}' AND pid <> pg_backend_pid()",
            self.name
        );
        let _ = maint.execute(terminate.as_str()).await;
        let _ = maint
            .execute(format!("DROP DATABASE IF EXISTS {}", self.name).as_str())
            .await;
        maint.close().await;
    }
}
