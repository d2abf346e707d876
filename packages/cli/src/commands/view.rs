use super::formula::{load_database, parse_now};
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use folio_editor::{DatabaseEngine, ResolvedRow, ViewRows};
use folio_model::{ActorContext, Database, PropertyId, ViewId, WorkspaceId};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ViewArgs {
    /// Database JSON file
    pub database: PathBuf,

    /// View id (the default view when omitted)
    #[arg(long)]
    pub view: Option<String>,

    /// Evaluation instant for formulas, e.g. 2024-06-01
    #[arg(long)]
    pub now: Option<String>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub fn view(args: ViewArgs, cwd: &str, actor: &str) -> Result<()> {
    let database = load_database(&PathBuf::from(cwd).join(&args.database))?;
    let view_id = match &args.view {
        Some(id) => ViewId::from(id.as_str()),
        None => database
            .default_view()
            .map(|v| v.id.clone())
            .ok_or_else(|| anyhow!("Database {} has no default view", database.name))?,
    };

    let context = ActorContext::new(actor, WorkspaceId::from("local"));
    let mut engine = DatabaseEngine::open(database, context)?;
    engine.pin_now(parse_now(args.now.as_deref())?);
    let rows = engine.get_rows_for_view(&view_id)?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
        "text" => print!("{}", render(engine.database(), &view_id, &rows)),
        other => return Err(anyhow!("Unknown format: {}", other)),
    }
    Ok(())
}

/// Plain-text rendering: one line per row, kanban rows under their column
pub fn render(database: &Database, view_id: &ViewId, rows: &ViewRows) -> String {
    let name = database.view(view_id).map(|v| v.name.as_str()).unwrap_or("view");
    let columns: Vec<&PropertyId> = database.properties.keys().collect();
    let mut out = format!("{} / {}\n", database.name.bold(), name);

    match rows {
        ViewRows::Flat { rows } => {
            let header: Vec<&str> = database.properties.values().map(|p| p.name.as_str()).collect();
            out.push_str(&format!("{}\n", header.join(" | ").dimmed()));
            for row in rows {
                out.push_str(&format!("{}\n", row_line(row, &columns)));
            }
        }
        ViewRows::Kanban { columns: lanes, .. } => {
            for lane in lanes {
                out.push_str(&format!("{} ({})\n", lane.title.bold(), lane.rows.len()));
                for row in &lane.rows {
                    out.push_str(&format!("  - {}\n", row_line(row, &columns)));
                }
            }
        }
    }
    out
}

fn row_line(row: &ResolvedRow, columns: &[&PropertyId]) -> String {
    let cells: Vec<String> = columns.iter().map(|id| row.get(id).to_string()).collect();
    let mut line = cells.join(" | ");
    for (property, error) in &row.errors {
        line.push_str(&format!("  {} {}: {}", "!".red(), property, error));
    }
    line
}
