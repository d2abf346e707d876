use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, Utc};
use clap::Args;
use colored::Colorize;
use folio_formula::parser::parse_date_literal;
use folio_formula::{evaluate_standalone, format_error, FormulaError, FormulaEvaluator};
use folio_model::{Database, FormulaValue, RowId};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Args)]
pub struct FormulaArgs {
    /// Formula source, e.g. 'dateBetween(prop("Due"), now(), "days")'
    pub expression: String,

    /// Database JSON file providing properties
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// Row to evaluate against (first row when omitted)
    #[arg(short, long, requires = "database")]
    pub row: Option<String>,

    /// Evaluation instant, e.g. 2024-06-01 or 2024-06-01T09:30
    #[arg(long)]
    pub now: Option<String>,
}

pub fn parse_now(now: Option<&str>) -> Result<NaiveDateTime> {
    match now {
        Some(text) => parse_date_literal(text).ok_or_else(|| anyhow!("Invalid --now value: {}", text)),
        None => Ok(Utc::now().naive_utc()),
    }
}

pub fn load_database(path: &PathBuf) -> Result<Database> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Database::from_json(&json).with_context(|| format!("parsing {}", path.display()))
}

pub fn formula(args: FormulaArgs, cwd: &str) -> Result<()> {
    let now = parse_now(args.now.as_deref())?;
    debug!(expression = %args.expression, %now, "Evaluating formula");

    let result = match &args.database {
        None => evaluate_standalone(&args.expression, now),
        Some(path) => {
            let database = load_database(&PathBuf::from(cwd).join(path))?;
            let row = match &args.row {
                Some(id) => database
                    .row(&RowId::from(id.as_str()))
                    .ok_or_else(|| anyhow!("Row '{}' not found in {}", id, database.name))?,
                None => database
                    .rows
                    .first()
                    .ok_or_else(|| anyhow!("Database {} has no rows", database.name))?,
            };
            FormulaEvaluator::new(&database, now).evaluate(&args.expression, row)
        }
    };

    match result {
        Ok(value) => {
            println!("{}", render_value(&value));
            Ok(())
        }
        Err(FormulaError::Parse(error)) => Err(anyhow!("\n{}", format_error(&args.expression, "formula", &error))),
        Err(error) => Err(error.into()),
    }
}

fn render_value(value: &FormulaValue) -> String {
    match value {
        FormulaValue::Empty => "(empty)".dimmed().to_string(),
        FormulaValue::Boolean(true) => "true".green().to_string(),
        FormulaValue::Boolean(false) => "false".red().to_string(),
        other => other.to_string().bright_white().to_string(),
    }
}
