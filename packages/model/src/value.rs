use crate::database::PropertyType;
use crate::ids::OptionId;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value stored in a row cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// Unset cell (valid for every property type)
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    /// Reference to a select option id
    Select(OptionId),
    Boolean(bool),
    /// Reference to a workspace member
    Person(String),
    /// Computed value of a formula property (never written by users)
    Formula(FormulaValue),
}

impl PropertyValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn select(option: impl Into<OptionId>) -> Self {
        Self::Select(option.into())
    }

    /// Whether this value is empty (unset, empty text)
    pub fn is_empty(&self) -> bool {
        match self {
            PropertyValue::Empty => true,
            PropertyValue::Text(s) | PropertyValue::Person(s) => s.is_empty(),
            PropertyValue::Formula(v) => v.is_empty(),
            _ => false,
        }
    }

    /// Whether this value may be stored in a property of the given type
    pub fn fits(&self, property_type: PropertyType) -> bool {
        match (self, property_type) {
            (_, PropertyType::Formula) => false,
            (PropertyValue::Empty, _) => true,
            (PropertyValue::Text(_), PropertyType::Title | PropertyType::Text) => true,
            (PropertyValue::Number(n), PropertyType::Number) => n.is_finite(),
            (PropertyValue::Date(_), PropertyType::Date) => true,
            (PropertyValue::Select(_), PropertyType::Select) => true,
            (PropertyValue::Boolean(_), PropertyType::Checkbox) => true,
            (PropertyValue::Person(_), PropertyType::Person) => true,
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Empty => "empty",
            PropertyValue::Text(_) => "text",
            PropertyValue::Number(_) => "number",
            PropertyValue::Date(_) => "date",
            PropertyValue::Select(_) => "select",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Person(_) => "person",
            PropertyValue::Formula(_) => "formula",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Empty => Ok(()),
            PropertyValue::Text(s) | PropertyValue::Person(s) => f.write_str(s),
            PropertyValue::Number(n) => f.write_str(&format_number(*n)),
            PropertyValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            PropertyValue::Select(id) => f.write_str(id.as_str()),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::Formula(v) => write!(f, "{}", v),
        }
    }
}

/// Runtime value produced by formula evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FormulaValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
}

impl FormulaValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FormulaValue::Empty => true,
            FormulaValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FormulaValue::Empty => "empty",
            FormulaValue::Text(_) => "text",
            FormulaValue::Number(_) => "number",
            FormulaValue::Boolean(_) => "boolean",
            FormulaValue::Date(_) => "date",
        }
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaValue::Empty => Ok(()),
            FormulaValue::Text(s) => f.write_str(s),
            FormulaValue::Number(n) => f.write_str(&format_number(*n)),
            FormulaValue::Boolean(b) => write!(f, "{}", b),
            FormulaValue::Date(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    write!(f, "{}", dt.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", dt.format("%Y-%m-%d %H:%M"))
                }
            }
        }
    }
}

/// Render a number without a trailing `.0` for whole values
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_fit_declared_types() {
        assert!(PropertyValue::Number(3.0).fits(PropertyType::Number));
        assert!(!PropertyValue::text("3").fits(PropertyType::Number));
        assert!(PropertyValue::Empty.fits(PropertyType::Select));
        assert!(!PropertyValue::Empty.fits(PropertyType::Formula));
        assert!(!PropertyValue::Number(f64::NAN).fits(PropertyType::Number));
    }

    #[test]
    fn test_number_display() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-3.0), "-3");
    }

    #[test]
    fn test_tagged_wire_shape() {
        let json = serde_json::to_value(PropertyValue::select("done")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "select", "value": "done"}));

        let empty = serde_json::to_value(PropertyValue::Empty).unwrap();
        assert_eq!(empty, serde_json::json!({"type": "empty"}));
    }
}
