//! Built-in function catalog

use crate::error::{FormulaError, FormulaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Math,
    Text,
    Date,
    Logic,
    Aggregate,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::Math => "Math",
            Category::Text => "Text",
            Category::Date => "Date",
            Category::Logic => "Logic",
            Category::Aggregate => "Aggregate",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub category: Category,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    pub signature: &'static str,
    pub description: &'static str,
}

impl FunctionSpec {
    pub fn check_arity(&self, found: usize) -> FormulaResult<()> {
        let within = found >= self.min_args && self.max_args.map_or(true, |max| found <= max);
        if within {
            return Ok(());
        }
        let expected = match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        };
        Err(FormulaError::Arity {
            function: self.name.to_string(),
            expected,
            found,
        })
    }
}

const fn spec(
    name: &'static str,
    category: Category,
    min_args: usize,
    max_args: Option<usize>,
    signature: &'static str,
    description: &'static str,
) -> FunctionSpec {
    FunctionSpec {
        name,
        category,
        min_args,
        max_args,
        signature,
        description,
    }
}

pub const FUNCTIONS: &[FunctionSpec] = &[
    spec("add", Category::Math, 2, Some(2), "add(a, b)", "Adds two numbers (or joins text)"),
    spec("subtract", Category::Math, 2, Some(2), "subtract(a, b)", "Subtracts b from a"),
    spec("multiply", Category::Math, 2, Some(2), "multiply(a, b)", "Multiplies two numbers"),
    spec("divide", Category::Math, 2, Some(2), "divide(a, b)", "Divides a by b"),
    spec("round", Category::Math, 1, Some(1), "round(x)", "Rounds half away from zero"),
    spec("abs", Category::Math, 1, Some(1), "abs(x)", "Absolute value"),
    spec("max", Category::Math, 1, None, "max(a, b, ...)", "Largest of the numbers"),
    spec("min", Category::Math, 1, None, "min(a, b, ...)", "Smallest of the numbers"),
    spec("concat", Category::Text, 0, None, "concat(a, b, ...)", "Joins values as text"),
    spec("length", Category::Text, 1, Some(1), "length(text)", "Number of characters"),
    spec("upper", Category::Text, 1, Some(1), "upper(text)", "Converts to upper case"),
    spec("lower", Category::Text, 1, Some(1), "lower(text)", "Converts to lower case"),
    spec(
        "substring",
        Category::Text,
        2,
        Some(3),
        "substring(text, start, end)",
        "Characters from start up to (not including) end",
    ),
    spec("contains", Category::Text, 2, Some(2), "contains(text, search)", "Whether text contains search"),
    spec("now", Category::Date, 0, Some(0), "now()", "Current date and time"),
    spec("today", Category::Date, 0, Some(0), "today()", "Current date"),
    spec(
        "dateAdd",
        Category::Date,
        3,
        Some(3),
        "dateAdd(date, amount, unit)",
        "Adds an amount of years, quarters, months, weeks, days, hours or minutes",
    ),
    spec(
        "dateBetween",
        Category::Date,
        3,
        Some(3),
        "dateBetween(date1, date2, unit)",
        "Signed whole-unit difference date1 - date2",
    ),
    spec("formatDate", Category::Date, 2, Some(2), "formatDate(date, format)", "Formats a date (YYYY-MM-DD, MMM D, HH:mm, ...)"),
    spec("year", Category::Date, 1, Some(1), "year(date)", "Year of a date"),
    spec("month", Category::Date, 1, Some(1), "month(date)", "Month of a date (1-12)"),
    spec("day", Category::Date, 1, Some(1), "day(date)", "Day of the month"),
    spec("if", Category::Logic, 3, Some(3), "if(condition, then, else)", "Chooses a value by condition"),
    spec("and", Category::Logic, 2, None, "and(a, b, ...)", "True when every argument is true"),
    spec("or", Category::Logic, 2, None, "or(a, b, ...)", "True when any argument is true"),
    spec("not", Category::Logic, 1, Some(1), "not(value)", "Negates a condition"),
    spec("empty", Category::Logic, 1, Some(1), "empty(value)", "True when the value is unset or empty text"),
    spec("equal", Category::Logic, 2, Some(2), "equal(a, b)", "Whether two values are equal"),
    spec("sum", Category::Aggregate, 1, None, "sum(prop(\"Name\"), ...)", "Sum of a property over all rows"),
    spec("count", Category::Aggregate, 1, None, "count(prop(\"Name\"), ...)", "Number of rows with a value"),
    spec("average", Category::Aggregate, 1, None, "average(prop(\"Name\"), ...)", "Mean of a property over all rows"),
];

pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

pub fn by_category(category: Category) -> impl Iterator<Item = &'static FunctionSpec> {
    FUNCTIONS.iter().filter(move |f| f.category == category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("dateBetween").map(|f| f.category), Some(Category::Date));
        assert!(lookup("datebetween").is_none());
    }

    #[test]
    fn test_arity_messages() {
        let add = lookup("add").unwrap();
        assert!(add.check_arity(2).is_ok());
        match add.check_arity(3) {
            Err(FormulaError::Arity { expected, found, .. }) => {
                assert_eq!(expected, "2");
                assert_eq!(found, 3);
            }
            other => panic!("unexpected {:?}", other),
        }

        let concat = lookup("concat").unwrap();
        assert!(concat.check_arity(0).is_ok());
        assert!(concat.check_arity(7).is_ok());
    }
}
