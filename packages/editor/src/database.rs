//! # Database Engine
//!
//! Owns one database's schema, rows and views.
//!
//! ## Invariants
//!
//! - Exactly one property has type `title`, and it cannot be removed
//! - Row keys are a subset of the schema's property ids
//! - Select cells reference an existing option of their property, or are empty
//! - Formula properties are computed on read and never written
//! - At least one view exists and exactly one is the default
//!
//! Missing row keys read as the property's default. Changing a property's
//! type leaves stored values alone; a stale value is coerced to the new
//! type (or cleared) the next time its row is updated.

use crate::mutations::DatabaseMutation;
use crate::views::{self, ResolvedRow, ViewRows};
use chrono::{NaiveDateTime, Utc};
use folio_formula::{Formula, FormulaError};
use folio_model::{
    ActorContext, Database, EngineError, EngineResult, EntityKind, IdGenerator, OptionId,
    PropertyDefinition, PropertyId, PropertyPatch, PropertyType, PropertyValue, Row, RowId, View,
    ViewId, ViewType,
};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Property values keyed by property id
pub type RowValues = IndexMap<PropertyId, PropertyValue>;

#[derive(Debug, Clone)]
pub struct DatabaseEngine {
    database: Database,
    context: ActorContext,
    row_ids: IdGenerator,
    /// Fixed evaluation instant; wall clock when unset
    pinned_now: Option<NaiveDateTime>,
    changes: Vec<DatabaseMutation>,
}

impl DatabaseEngine {
    pub fn open(database: Database, context: ActorContext) -> EngineResult<Self> {
        database.validate()?;
        let row_ids = IdGenerator::new(database.id.as_str(), &context.actor);
        debug!(database_id = %database.id, rows = database.rows.len(), "Opened database");
        Ok(Self {
            database,
            context,
            row_ids,
            pinned_now: None,
            changes: Vec::new(),
        })
    }

    /// Evaluate formulas and date defaults at `now` instead of the wall clock
    pub fn pin_now(&mut self, now: NaiveDateTime) {
        self.pinned_now = Some(now);
    }

    pub fn now(&self) -> NaiveDateTime {
        self.pinned_now.unwrap_or_else(|| Utc::now().naive_utc())
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn into_database(self) -> Database {
        self.database
    }

    pub fn context(&self) -> &ActorContext {
        &self.context
    }

    pub fn rows(&self) -> &[Row] {
        &self.database.rows
    }

    pub fn pending_changes(&self) -> &[DatabaseMutation] {
        &self.changes
    }

    pub fn take_changes(&mut self) -> Vec<DatabaseMutation> {
        std::mem::take(&mut self.changes)
    }

    /// Install a converged database from the merge layer. Not recorded.
    pub fn replace_database(&mut self, database: Database) {
        self.database = database;
    }

    fn require_property(&self, id: &PropertyId) -> EngineResult<&PropertyDefinition> {
        self.database
            .property(id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Property, id))
    }

    fn row_index(&self, id: &RowId) -> EngineResult<usize> {
        self.database
            .rows
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Row, id))
    }

    /// Check a definition on its own and against the rest of the schema
    fn check_definition(&self, definition: &PropertyDefinition, replacing: Option<&PropertyId>) -> EngineResult<()> {
        if definition.name.trim().is_empty() {
            return Err(EngineError::invalid("property name is empty"));
        }
        let others = self
            .database
            .properties
            .values()
            .filter(|p| Some(&p.id) != replacing);

        for other in others {
            if other.name == definition.name {
                return Err(EngineError::invalid(format!(
                    "a property named '{}' already exists",
                    definition.name
                )));
            }
            if other.property_type == PropertyType::Title && definition.property_type == PropertyType::Title {
                return Err(EngineError::invalid("database already has a title property"));
            }
        }

        let mut option_ids = HashSet::new();
        for option in &definition.options {
            if !option_ids.insert(&option.id) {
                return Err(EngineError::invalid(format!(
                    "duplicate option '{}' in property '{}'",
                    option.id, definition.name
                )));
            }
        }

        if definition.property_type == PropertyType::Formula {
            let source = definition.formula.as_deref().ok_or_else(|| {
                EngineError::invalid(format!("formula property '{}' has no expression", definition.name))
            })?;
            Formula::parse(source).map_err(|e| EngineError::from(FormulaError::from(e)))?;
        }
        Ok(())
    }

    /// Append a property. Existing rows are not populated.
    #[instrument(skip(self, definition), fields(property_id = %definition.id))]
    pub fn add_property(&mut self, definition: PropertyDefinition) -> EngineResult<()> {
        if self.database.properties.contains_key(&definition.id) {
            return Err(EngineError::duplicate(EntityKind::Property, &definition.id));
        }
        self.check_definition(&definition, None)?;

        self.changes.push(DatabaseMutation::AddProperty {
            definition: definition.clone(),
        });
        self.database.properties.insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Merge `patch` into a property definition
    #[instrument(skip(self, patch))]
    pub fn update_property(&mut self, id: &PropertyId, patch: &PropertyPatch) -> EngineResult<()> {
        let current = self.require_property(id)?;
        let mut updated = current.clone();
        updated.apply_patch(patch);

        if (current.property_type == PropertyType::Title) != (updated.property_type == PropertyType::Title) {
            return Err(EngineError::invalid(
                "the title property cannot change type and no other property can become one",
            ));
        }
        self.check_definition(&updated, Some(id))?;

        if current.property_type != updated.property_type {
            debug!(
                property_id = %id,
                from = %current.property_type,
                to = %updated.property_type,
                "Property type changed, stored values kept"
            );
        }

        if updated.property_type == PropertyType::Select {
            self.clear_dangling_options(&updated);
        }
        self.database.properties.insert(id.clone(), updated);
        self.changes.push(DatabaseMutation::UpdateProperty {
            property_id: id.clone(),
            patch: patch.clone(),
        });

        // A board or calendar can't keep a property that lost its type
        for view in &mut self.database.views {
            if view.repair(&self.database.properties) {
                debug!(view_id = %view.id, property_id = %id, "Detached property from view");
                self.changes.push(DatabaseMutation::PutView { view: view.clone() });
            }
        }
        Ok(())
    }

    /// Empty select cells whose option was removed
    fn clear_dangling_options(&mut self, definition: &PropertyDefinition) {
        for row in &mut self.database.rows {
            if let Some(PropertyValue::Select(option)) = row.properties.get(&definition.id) {
                if definition.option(option).is_none() {
                    debug!(row_id = %row.id, option = %option, "Clearing removed option");
                    row.properties.insert(definition.id.clone(), PropertyValue::Empty);
                }
            }
        }
    }

    /// Remove a non-title property, its cells and view references to it
    #[instrument(skip(self))]
    pub fn remove_property(&mut self, id: &PropertyId) -> EngineResult<()> {
        if self.require_property(id)?.property_type == PropertyType::Title {
            return Err(EngineError::invalid("the title property cannot be removed"));
        }

        self.database.properties.shift_remove(id);
        for row in &mut self.database.rows {
            row.properties.shift_remove(id);
        }
        for view in &mut self.database.views {
            view.detach_property(id);
        }

        self.changes.push(DatabaseMutation::RemoveProperty {
            property_id: id.clone(),
        });
        Ok(())
    }

    fn check_values(&self, values: &RowValues) -> EngineResult<()> {
        for (id, value) in values {
            self.require_property(id)?.validate_value(value)?;
        }
        Ok(())
    }

    /// Create a row with defaults for every non-formula property,
    /// overridden by `initial`
    #[instrument(skip(self, initial))]
    pub fn add_row(&mut self, initial: RowValues) -> EngineResult<Row> {
        self.check_values(&initial)?;

        let today = self.now().date();
        let mut row = Row::new(self.row_ids.next_row_id());
        for (id, definition) in &self.database.properties {
            if definition.property_type == PropertyType::Formula {
                continue;
            }
            let value = initial
                .get(id)
                .cloned()
                .unwrap_or_else(|| definition.default_value(today));
            row.properties.insert(id.clone(), value);
        }

        debug!(row_id = %row.id, "Added row");
        self.database.rows.push(row.clone());
        self.changes.push(DatabaseMutation::AddRow { row: row.clone() });
        Ok(row)
    }

    /// Insert a complete row (keeping its id), e.g. when replaying
    pub fn insert_row(&mut self, row: Row) -> EngineResult<()> {
        if self.database.row(&row.id).is_some() {
            return Err(EngineError::duplicate(EntityKind::Row, &row.id));
        }
        self.check_values(&row.properties)?;
        self.database.rows.push(row.clone());
        self.changes.push(DatabaseMutation::AddRow { row });
        Ok(())
    }

    /// Merge `patch` into a row. Every value must fit its property;
    /// formula properties reject all writes.
    #[instrument(skip(self, patch))]
    pub fn update_row(&mut self, row_id: &RowId, patch: RowValues) -> EngineResult<()> {
        let index = self.row_index(row_id)?;
        self.check_values(&patch)?;

        let properties = &self.database.properties;
        let row = &mut self.database.rows[index];

        // Values left over from a type change are journaled with the patch
        let mut written = RowValues::new();
        for (id, value) in row.properties.iter_mut() {
            if let Some(definition) = properties.get(id) {
                if !patch.contains_key(id) && definition.validate_value(value).is_err() {
                    *value = definition.coerce(value);
                    written.insert(id.clone(), value.clone());
                }
            }
        }
        for (id, value) in patch {
            row.properties.insert(id.clone(), value.clone());
            written.insert(id, value);
        }

        self.changes.push(DatabaseMutation::UpdateRow {
            row_id: row_id.clone(),
            values: written,
        });
        Ok(())
    }

    /// Remove a row; deleting an unknown row is a no-op. Returns whether a
    /// row was removed.
    pub fn delete_row(&mut self, row_id: &RowId) -> bool {
        let before = self.database.rows.len();
        self.database.rows.retain(|r| &r.id != row_id);
        let removed = self.database.rows.len() != before;
        if removed {
            debug!(row_id = %row_id, "Deleted row");
            self.changes.push(DatabaseMutation::DeleteRow { row_id: row_id.clone() });
        }
        removed
    }

    /// Row with every cell resolved and formulas computed
    pub fn read_row(&self, row_id: &RowId) -> EngineResult<ResolvedRow> {
        let index = self.row_index(row_id)?;
        Ok(views::resolve_row(&self.database, &self.database.rows[index], self.now()))
    }

    pub fn get_rows_for_view(&self, view_id: &ViewId) -> EngineResult<ViewRows> {
        let view = self
            .database
            .view(view_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::View, view_id))?;
        views::rows_for_view(&self.database, view, self.now())
    }

    /// Move a kanban card: an `update_row` on the view's group property.
    /// `None` moves it to the "No <Property>" column.
    pub fn move_card(&mut self, view_id: &ViewId, row_id: &RowId, option: Option<OptionId>) -> EngineResult<()> {
        let view = self
            .database
            .view(view_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::View, view_id))?;
        let group_by = match (&view.view_type, &view.group_by) {
            (ViewType::Kanban, Some(group_by)) => group_by.clone(),
            _ => return Err(EngineError::invalid(format!("view '{}' is not a kanban board", view.name))),
        };

        let value = option.map(PropertyValue::Select).unwrap_or(PropertyValue::Empty);
        let mut patch = RowValues::new();
        patch.insert(group_by, value);
        self.update_row(row_id, patch)
    }

    pub fn add_view(&mut self, view: View) -> EngineResult<()> {
        if self.database.view(&view.id).is_some() {
            return Err(EngineError::duplicate(EntityKind::View, &view.id));
        }
        view.validate(&self.database)?;
        if view.is_default {
            self.clear_default();
        }
        self.database.views.push(view.clone());
        self.changes.push(DatabaseMutation::PutView { view });
        Ok(())
    }

    /// Replace a view's configuration
    pub fn update_view(&mut self, view: View) -> EngineResult<()> {
        let index = self
            .database
            .views
            .iter()
            .position(|v| v.id == view.id)
            .ok_or_else(|| EngineError::not_found(EntityKind::View, &view.id))?;
        view.validate(&self.database)?;

        let was_default = self.database.views[index].is_default;
        if view.is_default {
            self.clear_default();
        }
        let mut view = view;
        // The default can move, not disappear
        view.is_default |= was_default;
        self.database.views[index] = view.clone();
        self.changes.push(DatabaseMutation::PutView { view });
        Ok(())
    }

    pub fn set_default_view(&mut self, view_id: &ViewId) -> EngineResult<()> {
        let mut view = self
            .database
            .view(view_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(EntityKind::View, view_id))?;
        view.is_default = true;
        self.update_view(view)
    }

    /// Remove a view; the last view cannot be removed. Removing the default
    /// makes the first remaining view the default.
    pub fn remove_view(&mut self, view_id: &ViewId) -> EngineResult<()> {
        let index = self
            .database
            .views
            .iter()
            .position(|v| &v.id == view_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::View, view_id))?;
        if self.database.views.len() == 1 {
            return Err(EngineError::invalid("a database needs at least one view"));
        }

        let removed = self.database.views.remove(index);
        self.changes.push(DatabaseMutation::RemoveView {
            view_id: view_id.clone(),
        });
        if removed.is_default {
            let mut first = self.database.views[0].clone();
            first.is_default = true;
            self.database.views[0] = first.clone();
            self.changes.push(DatabaseMutation::PutView { view: first });
        }
        Ok(())
    }

    fn clear_default(&mut self) {
        for index in 0..self.database.views.len() {
            if self.database.views[index].is_default {
                self.database.views[index].is_default = false;
                let view = self.database.views[index].clone();
                self.changes.push(DatabaseMutation::PutView { view });
            }
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) -> EngineResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::invalid("database name is empty"));
        }
        self.database.name = name.clone();
        self.changes.push(DatabaseMutation::Rename { name });
        Ok(())
    }
}
