mod board_cmds;
mod config;
mod plan_cmds;
mod project_cmds;
mod resolve;
mod serve_cmd;

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use planboard_core::BoardService;
use planboard_core::plan::IngestRequest;
use planboard_core::store::PgStore;
use planboard_db::pool;

use config::PlanboardConfig;

#[derive(Parser)]
#[command(
    name = "planboard",
    about = "Turn a goal and a time budget into a dependency-aware plan and track it on a board"
)]
struct Cli {
    /// Database URL (overrides PLANBOARD_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a planboard config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/planboard")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the planboard database
    DbInit,
    /// Project management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Generate plans and ingest them into projects
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Show and move tasks on a project board
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },
    /// Serve the JSON API over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Print shell completions to stdout
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create an empty project
    Create {
        /// Project title
        title: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },
    /// List all projects
    List,
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Ask the model for a plan and print it without saving (no database required)
    Generate {
        /// What the plan should achieve
        objective: String,
        /// Time budget in days
        #[arg(long)]
        days: i64,
        /// Number of people available
        #[arg(long)]
        team_size: Option<i64>,
    },
    /// Generate a plan and commit it into a project
    Ingest {
        /// Project ID to add the plan to
        project_id: String,
        /// What the plan should achieve
        objective: String,
        /// Time budget in days
        #[arg(long)]
        days: i64,
        /// Number of people available
        #[arg(long)]
        team_size: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum BoardCommands {
    /// Show a project's columns, ready work, and tasks needing review
    Show {
        /// Project ID
        project_id: String,
    },
    /// Move a task to another state (todo, doing, done, blocked)
    Move {
        /// Task ID
        task_id: String,
        /// Target state
        status: String,
    },
    /// Move a task to a position within a column
    Reorder {
        /// Task ID
        task_id: String,
        /// Target column
        status: String,
        /// Zero-based position in the column
        index: usize,
    },
}

fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        ..config::ConfigFile::default()
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  model.base_url = {}", cfg.model.base_url);
    println!("  model.model = {}", cfg.model.model);
    println!();
    println!("Next: run `planboard db-init` to create and migrate the database.");

    Ok(())
}

async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = PlanboardConfig::resolve(cli_db_url)?;

    println!("Initializing planboard database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("planboard db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "planboard", &mut std::io::stdout());
        }
        Commands::Project { command } => {
            let resolved = PlanboardConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let board = BoardService::new(Arc::new(PgStore::new(db_pool.clone())));
            let result = project_cmds::run_project_command(command, &board).await;
            db_pool.close().await;
            result?;
        }
        Commands::Plan { command } => {
            let resolved = PlanboardConfig::resolve(cli.database_url.as_deref())?;
            let ingestor = plan_cmds::build_ingestor(&resolved.model, &resolved.planner)?;
            match command {
                PlanCommands::Generate {
                    objective,
                    days,
                    team_size,
                } => {
                    let request = IngestRequest {
                        team_size,
                        ..IngestRequest::new(objective, days)
                    };
                    plan_cmds::run_generate(&ingestor, &request).await?;
                }
                command => {
                    let db_pool = pool::create_pool(&resolved.db_config).await?;
                    let board = BoardService::new(Arc::new(PgStore::new(db_pool.clone())));
                    let result = plan_cmds::run_plan_command(command, &board, &ingestor).await;
                    db_pool.close().await;
                    result?;
                }
            }
        }
        Commands::Board { command } => {
            let resolved = PlanboardConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let board = BoardService::new(Arc::new(PgStore::new(db_pool.clone())));
            let result = board_cmds::run_board_command(command, &board).await;
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = PlanboardConfig::resolve(cli.database_url.as_deref())?;
            let ingestor = plan_cmds::build_ingestor(&resolved.model, &resolved.planner)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let state = serve_cmd::AppState {
                board: Arc::new(BoardService::new(Arc::new(PgStore::new(db_pool.clone())))),
                ingestor: Arc::new(ingestor),
                shutdown: CancellationToken::new(),
            };
            let result = serve_cmd::run_serve(state, &bind, port).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
