//! # View Evaluation
//!
//! Resolves rows for display and applies a [`View`]'s filter, sort and
//! grouping.
//!
//! ## Semantics
//!
//! - A row missing a key reads the property's default for its type
//! - Formula cells are computed on read, never stored; a formula that fails
//!   reads as empty and its error is kept on the resolved row
//! - Sorting is stable over the database's row order; empty values sort
//!   last in both directions
//! - Kanban columns follow the group property's option order, followed by
//!   a "No <Property>" column when some rows have no (or an unknown) option

use chrono::NaiveDateTime;
use folio_formula::FormulaEvaluator;
use folio_model::{
    compare_cells, Database, EngineError, EntityKind, PropertyId, PropertyType, PropertyValue, Row, RowId,
    SelectOption, View, ViewType,
};
use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;

/// A row as displayed: every property of the schema, formulas computed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRow {
    pub id: RowId,
    pub cells: IndexMap<PropertyId, PropertyValue>,
    /// Formula cells that failed to evaluate
    #[serde(skip)]
    pub errors: Vec<(PropertyId, EngineError)>,
}

impl ResolvedRow {
    pub fn get(&self, property: &PropertyId) -> &PropertyValue {
        const EMPTY: &PropertyValue = &PropertyValue::Empty;
        self.cells.get(property).unwrap_or(EMPTY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanColumn {
    /// `None` for the trailing "No <Property>" column
    pub option: Option<SelectOption>,
    pub title: String,
    pub rows: Vec<ResolvedRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum ViewRows {
    /// Table, calendar and chart views
    Flat { rows: Vec<ResolvedRow> },
    Kanban {
        group_by: PropertyId,
        columns: Vec<KanbanColumn>,
    },
}

impl ViewRows {
    /// Every row, column by column for kanban
    pub fn rows(&self) -> Vec<&ResolvedRow> {
        match self {
            ViewRows::Flat { rows } => rows.iter().collect(),
            ViewRows::Kanban { columns, .. } => columns.iter().flat_map(|c| c.rows.iter()).collect(),
        }
    }

    pub fn column(&self, option_id: &str) -> Option<&KanbanColumn> {
        match self {
            ViewRows::Flat { .. } => None,
            ViewRows::Kanban { columns, .. } => columns
                .iter()
                .find(|c| c.option.as_ref().map(|o| o.id.as_str()) == Some(option_id)),
        }
    }
}

/// Resolve every cell of `row`
pub fn resolve_row(database: &Database, row: &Row, now: NaiveDateTime) -> ResolvedRow {
    let mut evaluator = FormulaEvaluator::new(database, now);
    resolve_with(&mut evaluator, database, row)
}

fn resolve_with<'a>(evaluator: &mut FormulaEvaluator<'a>, database: &'a Database, row: &'a Row) -> ResolvedRow {
    let mut cells = IndexMap::with_capacity(database.properties.len());
    let mut errors = Vec::new();

    for (id, definition) in &database.properties {
        let value = if definition.property_type == PropertyType::Formula {
            match evaluator.property_value(id, row) {
                Ok(value) => PropertyValue::Formula(value),
                Err(error) => {
                    errors.push((id.clone(), EngineError::from(error)));
                    PropertyValue::Empty
                }
            }
        } else {
            row.get(id).cloned().unwrap_or_else(|| definition.read_default())
        };
        cells.insert(id.clone(), value);
    }

    ResolvedRow {
        id: row.id.clone(),
        cells,
        errors,
    }
}

fn compare_rows(view: &View, a: &ResolvedRow, b: &ResolvedRow) -> Ordering {
    for spec in &view.sort {
        let ordering = compare_cells(a.get(&spec.property_id), b.get(&spec.property_id), spec.direction);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Filter, sort and (for kanban) group the rows of `database` for `view`
pub fn rows_for_view(database: &Database, view: &View, now: NaiveDateTime) -> Result<ViewRows, EngineError> {
    view.validate(database)?;

    let mut evaluator = FormulaEvaluator::new(database, now);
    let mut rows: Vec<ResolvedRow> = database
        .rows
        .iter()
        .map(|row| resolve_with(&mut evaluator, database, row))
        .filter(|row| match &view.filter {
            Some(filter) => filter.matches(&|id: &PropertyId| row.cells.get(id)),
            None => true,
        })
        .collect();
    rows.sort_by(|a, b| compare_rows(view, a, b));

    if view.view_type != ViewType::Kanban {
        return Ok(ViewRows::Flat { rows });
    }

    // Validated above: kanban views group by an existing select property
    let group_by = view
        .group_by
        .clone()
        .ok_or_else(|| EngineError::invalid("kanban view without group property"))?;
    let definition = database
        .property(&group_by)
        .ok_or_else(|| EngineError::not_found(EntityKind::Property, &group_by))?;

    let mut columns: Vec<KanbanColumn> = definition
        .options
        .iter()
        .map(|option| KanbanColumn {
            option: Some(option.clone()),
            title: option.name.clone(),
            rows: Vec::new(),
        })
        .collect();
    let mut ungrouped = Vec::new();

    for row in rows {
        let slot = match row.get(&group_by) {
            PropertyValue::Select(option) => definition.options.iter().position(|o| &o.id == option),
            _ => None,
        };
        match slot {
            Some(index) => columns[index].rows.push(row),
            None => ungrouped.push(row),
        }
    }

    if !ungrouped.is_empty() {
        columns.push(KanbanColumn {
            option: None,
            title: format!("No {}", definition.name),
            rows: ungrouped,
        });
    }

    Ok(ViewRows::Kanban { group_by, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use folio_model::{Filter, FilterOp, PropertyDefinition, SortSpec};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn database() -> Database {
        let mut db = Database::new("db", "Tasks");
        for definition in [
            PropertyDefinition::select(
                "status",
                "Status",
                vec![
                    SelectOption::new("todo", "To Do", "gray"),
                    SelectOption::new("done", "Done", "green"),
                ],
            ),
            PropertyDefinition::new("points", "Points", PropertyType::Number),
            PropertyDefinition::formula("double", "Double", r#"prop("Points") * 2"#),
        ] {
            db.properties.insert(definition.id.clone(), definition);
        }

        let rows = [
            ("r1", "Alpha", Some("done"), Some(3.0)),
            ("r2", "beta", Some("todo"), None),
            ("r3", "Gamma", Some("gone"), Some(1.0)),
            ("r4", "Delta", Some("todo"), Some(3.0)),
        ];
        for (id, title, status, points) in rows {
            let mut row = Row::new(RowId::from(id));
            row.properties.insert(PropertyId::from("title"), PropertyValue::text(title));
            if let Some(status) = status {
                row.properties.insert(PropertyId::from("status"), PropertyValue::select(status));
            }
            if let Some(points) = points {
                row.properties.insert(PropertyId::from("points"), PropertyValue::Number(points));
            }
            db.rows.push(row);
        }
        db
    }

    fn ids(rows: Vec<&ResolvedRow>) -> Vec<&str> {
        rows.into_iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_resolve_computes_formulas_and_defaults() {
        let db = database();
        let row = resolve_row(&db, &db.rows[1], now());
        assert_eq!(row.get(&PropertyId::from("points")), &PropertyValue::Number(0.0));
        assert_eq!(
            row.get(&PropertyId::from("double")),
            &PropertyValue::Formula(folio_model::FormulaValue::Number(0.0))
        );
        assert!(row.errors.is_empty());
    }

    #[test]
    fn test_broken_formula_reads_empty_with_error() {
        let mut db = database();
        let broken = PropertyDefinition::formula("broken", "Broken", r#"prop("Missing")"#);
        db.properties.insert(broken.id.clone(), broken);

        let row = resolve_row(&db, &db.rows[0], now());
        assert_eq!(row.get(&PropertyId::from("broken")), &PropertyValue::Empty);
        assert!(matches!(row.errors[0].1, EngineError::UnknownProperty(_)));
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let db = database();
        let view = View::new("v", "By points", ViewType::Table).with_sort(vec![
            SortSpec::descending("points"),
            SortSpec::ascending("title"),
        ]);
        let rows = rows_for_view(&db, &view, now()).unwrap();
        // r2 has no stored points but reads the default 0
        assert_eq!(ids(rows.rows()), vec!["r1", "r4", "r3", "r2"]);
    }

    #[test]
    fn test_filter_on_formula_cell() {
        let db = database();
        let view = View::new("v", "Big", ViewType::Table).with_filter(Filter::condition(
            "double",
            FilterOp::GreaterThan,
            PropertyValue::Number(4.0),
        ));
        let rows = rows_for_view(&db, &view, now()).unwrap();
        assert_eq!(ids(rows.rows()), vec!["r1", "r4"]);
    }

    #[test]
    fn test_kanban_columns_follow_option_order() {
        let db = database();
        let view = View::kanban("k", "Board", "status");
        let rows = rows_for_view(&db, &view, now()).unwrap();

        let ViewRows::Kanban { columns, .. } = &rows else {
            panic!("expected kanban layout");
        };
        let titles: Vec<&str> = columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["To Do", "Done", "No Status"]);
        assert_eq!(ids(columns[0].rows.iter().collect()), vec!["r2", "r4"]);
        assert_eq!(ids(rows.column("done").unwrap().rows.iter().collect()), vec!["r1"]);
        assert_eq!(ids(columns[2].rows.iter().collect()), vec!["r3"]);
    }

    #[test]
    fn test_invalid_view_rejected() {
        let db = database();
        let view = View::kanban("k", "Board", "points");
        assert!(matches!(rows_for_view(&db, &view, now()), Err(EngineError::InvalidValue(_))));
    }
}
