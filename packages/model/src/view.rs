//! Views: filter / sort / group configurations over a database's rows

use crate::database::{Database, PropertyDefinition, PropertyType};
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::ids::{PropertyId, ViewId};
use crate::value::{FormulaValue, PropertyValue};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    Table,
    Kanban,
    Calendar,
    Chart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub property_id: PropertyId,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(property_id: impl Into<PropertyId>) -> Self {
        Self {
            property_id: property_id.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(property_id: impl Into<PropertyId>) -> Self {
        Self {
            property_id: property_id.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Comparison applied by a filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    IsEmpty,
    IsNotEmpty,
    GreaterThan,
    LessThan,
    Checked,
    Unchecked,
}

/// Predicate over row values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    And {
        filters: Vec<Filter>,
    },
    Or {
        filters: Vec<Filter>,
    },
    Condition {
        property: PropertyId,
        op: FilterOp,
        #[serde(default)]
        value: PropertyValue,
    },
}

impl Filter {
    pub fn condition(property: impl Into<PropertyId>, op: FilterOp, value: PropertyValue) -> Self {
        Filter::Condition {
            property: property.into(),
            op,
            value,
        }
    }

    /// Evaluate against a row; `lookup` returns the resolved cell value
    pub fn matches<'a, F>(&self, lookup: &F) -> bool
    where
        F: Fn(&PropertyId) -> Option<&'a PropertyValue>,
    {
        match self {
            Filter::And { filters } => filters.iter().all(|f| f.matches(lookup)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(lookup)),
            Filter::Condition { property, op, value } => {
                let empty = PropertyValue::Empty;
                let cell = lookup(property).unwrap_or(&empty);
                op.matches(cell, value)
            }
        }
    }

    /// Copy of this filter without conditions on `property`; `None` when
    /// nothing is left
    pub fn without_property(&self, property: &PropertyId) -> Option<Filter> {
        match self {
            Filter::Condition { property: p, .. } if p == property => None,
            Filter::Condition { .. } => Some(self.clone()),
            Filter::And { filters } => {
                let filters: Vec<Filter> = filters.iter().filter_map(|f| f.without_property(property)).collect();
                (!filters.is_empty()).then_some(Filter::And { filters })
            }
            Filter::Or { filters } => {
                let filters: Vec<Filter> = filters.iter().filter_map(|f| f.without_property(property)).collect();
                (!filters.is_empty()).then_some(Filter::Or { filters })
            }
        }
    }

    fn properties(&self) -> Vec<&PropertyId> {
        match self {
            Filter::And { filters } | Filter::Or { filters } => {
                filters.iter().flat_map(|f| f.properties()).collect()
            }
            Filter::Condition { property, .. } => vec![property],
        }
    }
}

/// Scalar form used for comparisons across stored and computed values
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl Scalar {
    fn of(value: &PropertyValue) -> Option<Scalar> {
        match value {
            PropertyValue::Empty => None,
            PropertyValue::Text(s) | PropertyValue::Person(s) => Some(Scalar::Text(s.clone())),
            PropertyValue::Select(id) => Some(Scalar::Text(id.to_string())),
            PropertyValue::Number(n) => Some(Scalar::Number(*n)),
            PropertyValue::Boolean(b) => Some(Scalar::Bool(*b)),
            PropertyValue::Date(d) => Some(Scalar::Date(d.and_time(chrono::NaiveTime::MIN))),
            PropertyValue::Formula(v) => match v {
                FormulaValue::Empty => None,
                FormulaValue::Text(s) => Some(Scalar::Text(s.clone())),
                FormulaValue::Number(n) => Some(Scalar::Number(*n)),
                FormulaValue::Boolean(b) => Some(Scalar::Bool(*b)),
                FormulaValue::Date(d) => Some(Scalar::Date(*d)),
            },
        }
    }

    fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            (Scalar::Date(a), Scalar::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl FilterOp {
    pub fn matches(self, cell: &PropertyValue, operand: &PropertyValue) -> bool {
        match self {
            FilterOp::IsEmpty => cell.is_empty(),
            FilterOp::IsNotEmpty => !cell.is_empty(),
            FilterOp::Checked => Scalar::of(cell) == Some(Scalar::Bool(true)),
            FilterOp::Unchecked => Scalar::of(cell) != Some(Scalar::Bool(true)),
            FilterOp::Equals => Scalar::of(cell) == Scalar::of(operand),
            FilterOp::NotEquals => Scalar::of(cell) != Scalar::of(operand),
            FilterOp::Contains => match (Scalar::of(cell), Scalar::of(operand)) {
                (Some(Scalar::Text(haystack)), Some(Scalar::Text(needle))) => {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            FilterOp::GreaterThan | FilterOp::LessThan => {
                let ordering = match (Scalar::of(cell), Scalar::of(operand)) {
                    (Some(a), Some(b)) => a.compare(&b),
                    _ => None,
                };
                match (self, ordering) {
                    (FilterOp::GreaterThan, Some(Ordering::Greater)) => true,
                    (FilterOp::LessThan, Some(Ordering::Less)) => true,
                    _ => false,
                }
            }
        }
    }
}

/// Order two cell values for sorting. Empty values always sort last,
/// whatever the direction.
pub fn compare_cells(a: &PropertyValue, b: &PropertyValue, direction: SortDirection) -> Ordering {
    let (a, b) = (Scalar::of(a).filter(|_| !a.is_empty()), Scalar::of(b).filter(|_| !b.is_empty()));
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = a.compare(&b).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        }
    }
}

/// Presentation of a database's rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: ViewId,
    pub name: String,
    #[serde(rename = "type")]
    pub view_type: ViewType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<PropertyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_property: Option<PropertyId>,
    #[serde(default)]
    pub is_default: bool,
}

impl View {
    pub fn new(id: impl Into<ViewId>, name: impl Into<String>, view_type: ViewType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            view_type,
            filter: None,
            sort: Vec::new(),
            group_by: None,
            date_property: None,
            is_default: false,
        }
    }

    pub fn kanban(id: impl Into<ViewId>, name: impl Into<String>, group_by: impl Into<PropertyId>) -> Self {
        Self {
            group_by: Some(group_by.into()),
            ..Self::new(id, name, ViewType::Kanban)
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    /// Every property this view refers to
    pub fn referenced_properties(&self) -> Vec<&PropertyId> {
        let mut properties: Vec<&PropertyId> = self.sort.iter().map(|s| &s.property_id).collect();
        if let Some(filter) = &self.filter {
            properties.extend(filter.properties());
        }
        properties.extend(self.group_by.iter());
        properties.extend(self.date_property.iter());
        properties
    }

    /// Drop every reference to `property`. A kanban board that loses its
    /// group property becomes a table.
    pub fn detach_property(&mut self, property: &PropertyId) {
        self.sort.retain(|s| &s.property_id != property);
        self.filter = self.filter.as_ref().and_then(|f| f.without_property(property));
        if self.date_property.as_ref() == Some(property) {
            self.date_property = None;
        }
        if self.group_by.as_ref() == Some(property) {
            self.group_by = None;
            if self.view_type == ViewType::Kanban {
                self.view_type = ViewType::Table;
            }
        }
    }

    /// Detach properties that are missing from `properties` or no longer
    /// fit the role the view gives them. Returns whether anything changed.
    pub fn repair(&mut self, properties: &IndexMap<PropertyId, PropertyDefinition>) -> bool {
        let broken: Vec<PropertyId> = self
            .referenced_properties()
            .into_iter()
            .filter(|id| match properties.get(*id) {
                None => true,
                Some(definition) => {
                    (self.group_by.as_ref() == Some(*id) && definition.property_type != PropertyType::Select)
                        || (self.date_property.as_ref() == Some(*id)
                            && definition.property_type != PropertyType::Date)
                }
            })
            .cloned()
            .collect();
        for id in &broken {
            self.detach_property(id);
        }
        !broken.is_empty()
    }

    /// Check referenced properties exist and have the right types
    pub fn validate(&self, database: &Database) -> EngineResult<()> {
        let require = |id: &PropertyId| {
            database
                .property(id)
                .ok_or_else(|| EngineError::not_found(EntityKind::Property, id))
        };

        if self.view_type == ViewType::Kanban {
            let group_by = self.group_by.as_ref().ok_or_else(|| {
                EngineError::invalid(format!("kanban view '{}' needs a group property", self.name))
            })?;
            if require(group_by)?.property_type != PropertyType::Select {
                return Err(EngineError::invalid(format!(
                    "kanban view '{}' must group by a select property",
                    self.name
                )));
            }
        }

        if let Some(date_property) = &self.date_property {
            if require(date_property)?.property_type != PropertyType::Date {
                return Err(EngineError::invalid(format!(
                    "calendar view '{}' needs a date property",
                    self.name
                )));
            }
        }

        for spec in &self.sort {
            require(&spec.property_id)?;
        }
        if let Some(filter) = &self.filter {
            for property in filter.properties() {
                require(property)?;
            }
        }
        Ok(())
    }
}
