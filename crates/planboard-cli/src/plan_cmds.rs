//! CLI handlers for `planboard plan` subcommands.
//!
//! Implements:
//! - `planboard plan generate <objective> --days N` -- print a validated plan
//!   (summary on stderr, JSON on stdout)
//! - `planboard plan ingest <project-id> <objective> --days N` -- generate
//!   and commit a plan into a project

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use planboard_core::BoardService;
use planboard_core::config::{ModelConfig, PlannerConfig};
use planboard_core::model::openai::OpenAiClient;
use planboard_core::plan::{IngestRequest, Plan, PlanIngestor};

use crate::PlanCommands;
use crate::resolve::parse_id;

/// Build an ingestor backed by the configured model endpoint.
pub fn build_ingestor(model: &ModelConfig, planner: &PlannerConfig) -> Result<PlanIngestor> {
    let client = OpenAiClient::from_config(model).context("failed to configure model client")?;
    Ok(PlanIngestor::new(Arc::new(client), planner.clone()))
}

/// A token cancelled when the user presses Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            trigger.cancel();
        }
    });
    token
}

/// Run `plan generate`. Needs no database.
pub async fn run_generate(ingestor: &PlanIngestor, request: &IngestRequest) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let plan = ingestor.generate_plan(request, &cancel).await?;
    eprint!("{}", summarize(&plan));
    let json = serde_json::to_string_pretty(&plan).context("failed to serialize plan")?;
    println!("{json}");
    Ok(())
}

/// Dispatch the database-backed `PlanCommands` variants.
pub async fn run_plan_command(
    command: PlanCommands,
    board: &BoardService,
    ingestor: &PlanIngestor,
) -> Result<()> {
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
            run_generate(ingestor, &request).await
        }
        PlanCommands::Ingest {
            project_id,
            objective,
            days,
            team_size,
        } => {
            let project_id = parse_id("project", &project_id)?;
            let request = IngestRequest {
                team_size,
                ..IngestRequest::new(objective, days)
            };
            cmd_ingest(board, ingestor, project_id, &request).await
        }
    }
}

async fn cmd_ingest(
    board: &BoardService,
    ingestor: &PlanIngestor,
    project_id: uuid::Uuid,
    request: &IngestRequest,
) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    println!("Asking the model for a plan...");
    let commit = ingestor.ingest(board, project_id, request, &cancel).await?;

    let graph = board.graph(project_id).await?;
    println!("Plan committed.");
    println!();
    println!("  Project ID:       {project_id}");
    println!("  Milestones:       {}", commit.milestone_ids.len());
    println!("  Tasks:            {}", commit.task_ids.len());
    println!("  Dependency edges: {}", graph.edges().len());
    println!("  Version:          {}", commit.version);
    println!();
    println!("Ready to start:");
    for id in graph.ready_tasks() {
        if let Some(task) = graph.task(id) {
            println!("  - {} ({:.1}h)  {}", task.title, task.effort_hours, task.id);
        }
    }
    Ok(())
}

/// One line per milestone and task, for human eyes.
pub fn summarize(plan: &Plan) -> String {
    let mut out = String::new();
    for (i, m) in plan.milestones.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, m.name));
        for t in &m.tasks {
            out.push_str(&format!("   - {} ({:.1}h)", t.title, t.effort_hours));
            if !t.depends_on.is_empty() {
                out.push_str(&format!(" after {}", t.depends_on.join(", ")));
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use planboard_core::plan::{PlannedMilestone, PlannedTask};

    #[test]
    fn summary_lists_milestones_tasks_and_dependencies() {
        let plan = Plan {
            milestones: vec![PlannedMilestone {
                name: "Foundations".into(),
                summary: None,
                tasks: vec![
                    PlannedTask {
                        key: "scope".into(),
                        title: "Define scope".into(),
                        description: None,
                        effort_hours: 3.0,
                        depends_on: vec![],
                    },
                    PlannedTask {
                        key: "wire".into(),
                        title: "Design wireframes".into(),
                        description: None,
                        effort_hours: 5.0,
                        depends_on: vec!["scope".into()],
                    },
                ],
            }],
        };
        let summary = summarize(&plan);
        assert_eq!(
            summary,
            "1. Foundations\n   - Define scope (3.0h)\n   - Design wireframes (5.0h) after scope\n"
        );
    }
}
