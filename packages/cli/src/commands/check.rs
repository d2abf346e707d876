use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use folio_formula::{format_error, Formula};
use folio_model::{Database, Page, PageTree};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Page or database JSON files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Also require every page parent to be among the checked pages, with no cycles
    #[arg(long)]
    pub hierarchy: bool,
}

/// What a document file turned out to hold
#[derive(Debug)]
pub enum Checked {
    Page(Page),
    Database(Database),
}

pub fn check(args: CheckArgs, cwd: &str) -> Result<()> {
    println!("{}", "🔍 Checking Folio documents...".bright_blue().bold());

    let mut pages = Vec::new();
    let mut error_count = 0;

    for file in &args.files {
        let path = PathBuf::from(cwd).join(file);
        match check_file(&path) {
            Ok(Checked::Page(page)) => {
                println!("  {} {} (page, {} blocks)", "✓".green(), file.display(), page.content.len());
                pages.push(page);
            }
            Ok(Checked::Database(database)) => {
                println!(
                    "  {} {} (database, {} rows, {} views)",
                    "✓".green(),
                    file.display(),
                    database.rows.len(),
                    database.views.len()
                );
            }
            Err(e) => {
                error_count += 1;
                eprintln!("  {} {} - {}", "✗".red(), file.display(), e.to_string().red());
            }
        }
    }

    if args.hierarchy {
        match PageTree::from_pages(&pages) {
            Ok(tree) => println!("  {} page hierarchy ({} roots)", "✓".green(), tree.roots().len()),
            Err(e) => {
                error_count += 1;
                eprintln!("  {} page hierarchy - {}", "✗".red(), e.to_string().red());
            }
        }
    }

    println!();
    if error_count == 0 {
        println!("{} {} documents valid", "✅".green(), args.files.len());
        Ok(())
    } else {
        Err(anyhow!("{} problem(s) found", error_count))
    }
}

pub fn check_file(path: &Path) -> Result<Checked> {
    let json = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&json)?;

    if value.get("content").is_some() {
        let page: Page = serde_json::from_value(value)?;
        page.validate()?;
        return Ok(Checked::Page(page));
    }

    let database: Database = serde_json::from_value(value)?;
    database.validate()?;
    for definition in database.properties.values() {
        if let Some(source) = &definition.formula {
            Formula::parse(source).map_err(|e| {
                anyhow!("formula '{}':\n{}", definition.name, format_error(source, &definition.name, &e))
            })?;
        }
    }
    Ok(Checked::Database(database))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use folio_model::{PageId, PropertyDefinition, PropertyId, WorkspaceId};

    #[test]
    fn test_check_file_detects_kind() {
        let dir = tempfile::tempdir().unwrap();

        let page = Page::new(PageId::from("p1"), "Notes", WorkspaceId::from("ws"), "ana", Utc::now());
        let page_path = dir.path().join("page.json");
        fs::write(&page_path, page.to_json().unwrap()).unwrap();
        assert!(matches!(check_file(&page_path).unwrap(), Checked::Page(_)));

        let database_path = dir.path().join("db.json");
        fs::write(&database_path, Database::new("db", "Tasks").to_json().unwrap()).unwrap();
        assert!(matches!(check_file(&database_path).unwrap(), Checked::Database(_)));
    }

    #[test]
    fn test_check_file_reports_broken_formula() {
        let dir = tempfile::tempdir().unwrap();
        let mut database = Database::new("db", "Tasks");
        database.properties.insert(
            PropertyId::from("score"),
            PropertyDefinition::formula("score", "Score", "round(prop(\"Points\") *"),
        );
        let path = dir.path().join("db.json");
        fs::write(&path, database.to_json().unwrap()).unwrap();

        let error = check_file(&path).unwrap_err().to_string();
        assert!(error.starts_with("formula 'Score'"));
    }
}
