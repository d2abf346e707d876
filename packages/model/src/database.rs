//! # Databases
//!
//! A database is a typed table: an ordered schema of property definitions,
//! a list of rows, and views over those rows.
//!
//! ## Invariants
//!
//! - Exactly one property has type `title`
//! - Row property keys are a subset of the schema ids
//! - Select cells reference an existing option of their property (or are empty)
//! - At least one view is marked default

use crate::error::{EngineError, EngineResult, EntityKind};
use crate::ids::{DatabaseId, OptionId, PropertyId, RowId, ViewId};
use crate::value::PropertyValue;
use crate::view::{View, ViewType};
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Title,
    Text,
    Number,
    Select,
    Date,
    Person,
    Checkbox,
    Formula,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::Title => "title",
            PropertyType::Text => "text",
            PropertyType::Number => "number",
            PropertyType::Select => "select",
            PropertyType::Date => "date",
            PropertyType::Person => "person",
            PropertyType::Checkbox => "checkbox",
            PropertyType::Formula => "formula",
        };
        f.write_str(name)
    }
}

/// Display format of number properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    #[default]
    Number,
    Percent,
    Currency,
}

/// Choice of a select property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: OptionId,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

impl SelectOption {
    pub fn new(id: impl Into<OptionId>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
        }
    }
}

/// Schema entry of a database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: PropertyId,
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<NumberFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl PropertyDefinition {
    pub fn new(id: impl Into<PropertyId>, name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            property_type,
            options: Vec::new(),
            format: None,
            formula: None,
        }
    }

    pub fn title(id: impl Into<PropertyId>, name: impl Into<String>) -> Self {
        Self::new(id, name, PropertyType::Title)
    }

    pub fn select(id: impl Into<PropertyId>, name: impl Into<String>, options: Vec<SelectOption>) -> Self {
        Self {
            options,
            ..Self::new(id, name, PropertyType::Select)
        }
    }

    pub fn number(id: impl Into<PropertyId>, name: impl Into<String>, format: NumberFormat) -> Self {
        Self {
            format: Some(format),
            ..Self::new(id, name, PropertyType::Number)
        }
    }

    pub fn formula(id: impl Into<PropertyId>, name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            formula: Some(expression.into()),
            ..Self::new(id, name, PropertyType::Formula)
        }
    }

    pub fn option(&self, id: &OptionId) -> Option<&SelectOption> {
        self.options.iter().find(|o| &o.id == id)
    }

    pub fn option_by_name(&self, name: &str) -> Option<&SelectOption> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Value a new row gets for this property
    pub fn default_value(&self, today: NaiveDate) -> PropertyValue {
        match self.property_type {
            PropertyType::Title => PropertyValue::text("Untitled"),
            PropertyType::Text => PropertyValue::text(""),
            PropertyType::Number => PropertyValue::Number(0.0),
            PropertyType::Select => self
                .options
                .first()
                .map(|o| PropertyValue::Select(o.id.clone()))
                .unwrap_or(PropertyValue::Empty),
            PropertyType::Date => PropertyValue::Date(today),
            PropertyType::Checkbox => PropertyValue::Boolean(false),
            PropertyType::Person | PropertyType::Formula => PropertyValue::Empty,
        }
    }

    /// Value read for a row that has no key for this property.
    ///
    /// Same as [`default_value`](Self::default_value) except dates, which
    /// read as empty since the row's creation date is not known here.
    pub fn read_default(&self) -> PropertyValue {
        match self.property_type {
            PropertyType::Date => PropertyValue::Empty,
            _ => self.default_value(NaiveDate::MIN),
        }
    }

    /// Check a user-supplied value against this property
    pub fn validate_value(&self, value: &PropertyValue) -> EngineResult<()> {
        if self.property_type == PropertyType::Formula {
            return Err(EngineError::invalid(format!(
                "formula property '{}' cannot be written directly",
                self.name
            )));
        }
        if !value.fits(self.property_type) {
            return Err(EngineError::invalid(format!(
                "cannot assign {} value to {} property '{}'",
                value.type_name(),
                self.property_type,
                self.name
            )));
        }
        if let PropertyValue::Select(option) = value {
            if self.option(option).is_none() {
                return Err(EngineError::invalid(format!(
                    "'{}' is not an option of select property '{}'",
                    option, self.name
                )));
            }
        }
        Ok(())
    }

    /// Best-effort conversion of a value written under another type.
    ///
    /// Returns `Empty` when no sensible conversion exists.
    pub fn coerce(&self, value: &PropertyValue) -> PropertyValue {
        if self.validate_value(value).is_ok() {
            return value.clone();
        }
        let text = match value {
            PropertyValue::Select(id) => {
                // The value was written while this was a select; the option
                // list may still carry its name.
                self.option(id)
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| id.to_string())
            }
            other => other.to_string(),
        };
        match self.property_type {
            PropertyType::Title | PropertyType::Text => PropertyValue::Text(text),
            PropertyType::Number => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(PropertyValue::Number)
                .unwrap_or(PropertyValue::Empty),
            PropertyType::Select => self
                .option_by_name(&text)
                .map(|o| PropertyValue::Select(o.id.clone()))
                .unwrap_or(PropertyValue::Empty),
            PropertyType::Date => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map(PropertyValue::Date)
                .unwrap_or(PropertyValue::Empty),
            PropertyType::Checkbox => match text.trim() {
                "true" => PropertyValue::Boolean(true),
                "false" | "" => PropertyValue::Boolean(false),
                _ => PropertyValue::Empty,
            },
            PropertyType::Person => PropertyValue::Person(text),
            PropertyType::Formula => PropertyValue::Empty,
        }
    }
}

/// Partial update of a property definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<NumberFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl PropertyDefinition {
    /// Merge a patch into this definition
    pub fn apply_patch(&mut self, patch: &PropertyPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(property_type) = patch.property_type {
            self.property_type = property_type;
        }
        if let Some(options) = &patch.options {
            self.options = options.clone();
        }
        if let Some(format) = patch.format {
            self.format = Some(format);
        }
        if let Some(formula) = &patch.formula {
            self.formula = Some(formula.clone());
        }
    }
}

/// Database row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    #[serde(default)]
    pub properties: IndexMap<PropertyId, PropertyValue>,
}

impl Row {
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            properties: IndexMap::new(),
        }
    }

    pub fn get(&self, property: &PropertyId) -> Option<&PropertyValue> {
        self.properties.get(property)
    }
}

/// Typed table with views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub id: DatabaseId,
    pub name: String,
    /// Schema in column order
    pub properties: IndexMap<PropertyId, PropertyDefinition>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub views: Vec<View>,
}

impl Database {
    /// New database with a "Name" title property and a default table view
    pub fn new(id: impl Into<DatabaseId>, name: impl Into<String>) -> Self {
        let id = id.into();
        let title = PropertyDefinition::title("title", "Name");
        let mut properties = IndexMap::new();
        properties.insert(title.id.clone(), title);

        let view = View::new(ViewId::new(format!("{}_table", id)), "Table", ViewType::Table).as_default();

        Self {
            id,
            name: name.into(),
            properties,
            rows: Vec::new(),
            views: vec![view],
        }
    }

    pub fn property(&self, id: &PropertyId) -> Option<&PropertyDefinition> {
        self.properties.get(id)
    }

    /// Resolve a property by display name
    pub fn property_by_name(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.values().find(|p| p.name == name)
    }

    pub fn title_property(&self) -> Option<&PropertyDefinition> {
        self.properties
            .values()
            .find(|p| p.property_type == PropertyType::Title)
    }

    pub fn row(&self, id: &RowId) -> Option<&Row> {
        self.rows.iter().find(|r| &r.id == id)
    }

    pub fn view(&self, id: &ViewId) -> Option<&View> {
        self.views.iter().find(|v| &v.id == id)
    }

    pub fn default_view(&self) -> Option<&View> {
        self.views.iter().find(|v| v.is_default)
    }

    /// Check the structural invariants of the database
    pub fn validate(&self) -> EngineResult<()> {
        let titles = self
            .properties
            .values()
            .filter(|p| p.property_type == PropertyType::Title)
            .count();
        if titles != 1 {
            return Err(EngineError::invalid(format!(
                "database must have exactly one title property, found {}",
                titles
            )));
        }

        for (key, definition) in &self.properties {
            if key != &definition.id {
                return Err(EngineError::invalid(format!(
                    "property keyed '{}' has id '{}'",
                    key, definition.id
                )));
            }
        }

        let mut row_ids = HashSet::new();
        for row in &self.rows {
            if !row_ids.insert(&row.id) {
                return Err(EngineError::duplicate(EntityKind::Row, &row.id));
            }
            for (key, value) in &row.properties {
                let definition = self
                    .properties
                    .get(key)
                    .ok_or_else(|| EngineError::not_found(EntityKind::Property, key))?;
                if let (PropertyValue::Select(option), PropertyType::Select) =
                    (value, definition.property_type)
                {
                    if definition.option(option).is_none() {
                        return Err(EngineError::invalid(format!(
                            "row '{}' references unknown option '{}'",
                            row.id, option
                        )));
                    }
                }
            }
        }

        if !self.views.iter().any(|v| v.is_default) {
            return Err(EngineError::invalid("database must have a default view"));
        }
        for view in &self.views {
            view.validate(self)?;
        }

        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
