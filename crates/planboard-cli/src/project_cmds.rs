//! CLI handlers for `planboard project` subcommands.
//!
//! Implements:
//! - `planboard project create <title>` -- create an empty project
//! - `planboard project list`           -- list all projects

use anyhow::Result;

use planboard_core::BoardService;

use crate::ProjectCommands;

/// Dispatch a `ProjectCommands` variant to the appropriate handler.
pub async fn run_project_command(command: ProjectCommands, board: &BoardService) -> Result<()> {
    match command {
        ProjectCommands::Create { title, description } => {
            cmd_create(board, &title, description.as_deref()).await
        }
        ProjectCommands::List => cmd_list(board).await,
    }
}

async fn cmd_create(board: &BoardService, title: &str, description: Option<&str>) -> Result<()> {
    let project = board.create_project(title, description).await?;

    println!("Project created.");
    println!();
    println!("  Project ID: {}", project.id);
    println!("  Title:      {}", project.title);
    println!("  Status:     {}", project.status);
    println!();
    println!(
        "Next: run `planboard plan ingest {} \"<objective>\" --days N` to fill it.",
        project.id
    );
    Ok(())
}

async fn cmd_list(board: &BoardService) -> Result<()> {
    let projects = board.list_projects().await?;

    if projects.is_empty() {
        println!("No projects found. Use `planboard project create <title>` to create one.");
        return Ok(());
    }

    let id_w = 36;
    let title_w = projects
        .iter()
        .map(|p| p.title.len())
        .max()
        .unwrap_or(5)
        .max(5);
    let status_w = 9;

    println!(
        "{:<id_w$}  {:<title_w$}  {:<status_w$}  CREATED",
        "ID", "TITLE", "STATUS"
    );
    println!(
        "{:-<id_w$}  {:-<title_w$}  {:-<status_w$}  {:-<16}",
        "", "", "", ""
    );
    for p in &projects {
        println!(
            "{:<id_w$}  {:<title_w$}  {:<status_w$}  {}",
            p.id,
            p.title,
            p.status.to_string(),
            p.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}
