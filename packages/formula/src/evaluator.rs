//! # Formula Evaluator
//!
//! Tree-walking evaluation of parsed formulas against one row of a database.
//!
//! ## Property resolution
//!
//! `prop("Name")` resolves by display name. Select cells read as the option
//! name, missing cells read as the property's default, and formula
//! properties are evaluated recursively with a guard against cycles.
//!
//! ## Determinism
//!
//! Evaluation is pure: the same row state and the same `now` give the same
//! result.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{FormulaError, FormulaResult, ParseResult};
use crate::functions;
use crate::parser::{parse, parse_date_literal};
use chrono::{Datelike, Duration, Months, NaiveDateTime, NaiveTime};
use folio_model::{
    Database, FormulaValue, PropertyDefinition, PropertyId, PropertyType, PropertyValue, Row, RowId,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, instrument, warn};

/// A parsed formula
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> ParseResult<Self> {
        Ok(Self {
            source: source.to_string(),
            expr: parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Property names referenced by the formula
    pub fn property_refs(&self) -> Vec<&str> {
        self.expr.property_refs()
    }
}

/// Evaluates formulas against the rows of one database
pub struct FormulaEvaluator<'a> {
    database: &'a Database,
    now: NaiveDateTime,
    compiled: HashMap<PropertyId, Rc<Expr>>,
    stack: Vec<(RowId, PropertyId)>,
}

impl<'a> FormulaEvaluator<'a> {
    pub fn new(database: &'a Database, now: NaiveDateTime) -> Self {
        Self {
            database,
            now,
            compiled: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Parse and evaluate a formula in the context of `row`
    pub fn evaluate(&mut self, source: &str, row: &'a Row) -> FormulaResult<FormulaValue> {
        let expr = parse(source)?;
        self.eval(&expr, row)
    }

    pub fn evaluate_formula(&mut self, formula: &Formula, row: &'a Row) -> FormulaResult<FormulaValue> {
        self.eval(&formula.expr, row)
    }

    /// Displayed value of a property for `row`, computing formulas
    #[instrument(skip(self, row), fields(row = %row.id))]
    pub fn property_value(&mut self, property: &PropertyId, row: &'a Row) -> FormulaResult<FormulaValue> {
        let database = self.database;
        let definition = database
            .property(property)
            .ok_or_else(|| FormulaError::UnknownProperty(property.to_string()))?;
        let result = self.read_property(definition, row);
        if let Err(e) = &result {
            warn!(property = %property, error = %e, "Formula evaluation failed");
        }
        result
    }

    fn read_property(&mut self, definition: &'a PropertyDefinition, row: &'a Row) -> FormulaResult<FormulaValue> {
        if definition.property_type != PropertyType::Formula {
            let stored = row
                .get(&definition.id)
                .cloned()
                .unwrap_or_else(|| definition.read_default());
            return Ok(cell_value(definition, &stored));
        }

        let key = (row.id.clone(), definition.id.clone());
        if self.stack.contains(&key) {
            return Err(FormulaError::CircularReference(definition.name.clone()));
        }
        let Some(expr) = self.compile(definition)? else {
            return Ok(FormulaValue::Empty);
        };

        debug!(property = %definition.id, row = %row.id, "Computing formula property");
        self.stack.push(key);
        let result = self.eval(&expr, row);
        self.stack.pop();
        result
    }

    fn compile(&mut self, definition: &PropertyDefinition) -> FormulaResult<Option<Rc<Expr>>> {
        if let Some(expr) = self.compiled.get(&definition.id) {
            return Ok(Some(expr.clone()));
        }
        let source = match definition.formula.as_deref() {
            Some(source) if !source.trim().is_empty() => source,
            _ => return Ok(None),
        };
        let expr = Rc::new(parse(source)?);
        self.compiled.insert(definition.id.clone(), expr.clone());
        Ok(Some(expr))
    }

    fn eval(&mut self, expr: &Expr, row: &'a Row) -> FormulaResult<FormulaValue> {
        match expr {
            Expr::Number { value, .. } => Ok(FormulaValue::Number(*value)),
            Expr::String { value, .. } => Ok(FormulaValue::Text(value.clone())),
            Expr::Boolean { value, .. } => Ok(FormulaValue::Boolean(*value)),
            Expr::Date { value, .. } => Ok(FormulaValue::Date(*value)),
            Expr::Prop { name, .. } => {
                let database = self.database;
                let definition = database
                    .property_by_name(name)
                    .ok_or_else(|| FormulaError::UnknownProperty(name.clone()))?;
                self.read_property(definition, row)
            }
            Expr::Unary {
                operator: UnaryOp::Negate,
                operand,
                ..
            } => {
                let value = self.eval(operand, row)?;
                Ok(FormulaValue::Number(-to_number(&value)?))
            }
            Expr::Binary {
                left, operator, right, ..
            } => {
                let left = self.eval(left, row)?;
                let right = self.eval(right, row)?;
                binary(*operator, &left, &right)
            }
            Expr::Call {
                function, arguments, ..
            } => self.call(function, arguments, row),
        }
    }

    fn call(&mut self, function: &str, arguments: &[Expr], row: &'a Row) -> FormulaResult<FormulaValue> {
        let spec = functions::lookup(function)
            .ok_or_else(|| FormulaError::UnknownFunction(function.to_string()))?;
        spec.check_arity(arguments.len())?;

        match function {
            "if" => {
                let condition = self.eval(&arguments[0], row)?;
                if truthy(&condition) {
                    self.eval(&arguments[1], row)
                } else {
                    self.eval(&arguments[2], row)
                }
            }
            "and" => {
                for argument in arguments {
                    if !truthy(&self.eval(argument, row)?) {
                        return Ok(FormulaValue::Boolean(false));
                    }
                }
                Ok(FormulaValue::Boolean(true))
            }
            "or" => {
                for argument in arguments {
                    if truthy(&self.eval(argument, row)?) {
                        return Ok(FormulaValue::Boolean(true));
                    }
                }
                Ok(FormulaValue::Boolean(false))
            }
            "sum" | "count" | "average" => self.aggregate(function, arguments),
            _ => {
                let values = arguments
                    .iter()
                    .map(|argument| self.eval(argument, row))
                    .collect::<FormulaResult<Vec<_>>>()?;
                builtin(function, &values, self.now)
            }
        }
    }

    /// sum / count / average of properties over every row of the database
    fn aggregate(&mut self, function: &str, arguments: &[Expr]) -> FormulaResult<FormulaValue> {
        let database = self.database;
        let mut numbers = Vec::new();
        let mut count = 0usize;

        for argument in arguments {
            let Expr::Prop { name, .. } = argument else {
                return Err(FormulaError::invalid_argument(
                    function,
                    "expects prop(\"Name\") references",
                ));
            };
            let definition = database
                .property_by_name(name)
                .ok_or_else(|| FormulaError::UnknownProperty(name.clone()))?;

            for row in &database.rows {
                let value = self.read_property(definition, row)?;
                if value.is_empty() {
                    continue;
                }
                count += 1;
                if let FormulaValue::Number(n) = value {
                    numbers.push(n);
                }
            }
        }

        Ok(match function {
            "count" => FormulaValue::Number(count as f64),
            "average" if numbers.is_empty() => FormulaValue::Empty,
            "average" => FormulaValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64),
            _ => FormulaValue::Number(numbers.iter().sum()),
        })
    }
}

/// Evaluate a formula that references no properties
pub fn evaluate_standalone(source: &str, now: NaiveDateTime) -> FormulaResult<FormulaValue> {
    let database = Database::new("standalone", "");
    let row = Row::new(RowId::from("standalone"));
    FormulaEvaluator::new(&database, now).evaluate(source, &row)
}

/// How a stored cell reads inside a formula
pub fn cell_value(definition: &PropertyDefinition, value: &PropertyValue) -> FormulaValue {
    match value {
        PropertyValue::Empty => FormulaValue::Empty,
        PropertyValue::Text(s) | PropertyValue::Person(s) => FormulaValue::Text(s.clone()),
        PropertyValue::Number(n) => FormulaValue::Number(*n),
        PropertyValue::Boolean(b) => FormulaValue::Boolean(*b),
        PropertyValue::Date(d) => FormulaValue::Date(d.and_time(NaiveTime::MIN)),
        PropertyValue::Select(id) => FormulaValue::Text(
            definition
                .option(id)
                .map(|o| o.name.clone())
                .unwrap_or_else(|| id.to_string()),
        ),
        PropertyValue::Formula(v) => v.clone(),
    }
}

fn truthy(value: &FormulaValue) -> bool {
    match value {
        FormulaValue::Empty => false,
        FormulaValue::Boolean(b) => *b,
        FormulaValue::Number(n) => *n != 0.0,
        FormulaValue::Text(s) => !s.is_empty(),
        FormulaValue::Date(_) => true,
    }
}

fn to_number(value: &FormulaValue) -> FormulaResult<f64> {
    match value {
        FormulaValue::Number(n) => Ok(*n),
        FormulaValue::Empty => Ok(0.0),
        FormulaValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        FormulaValue::Text(s) if s.trim().is_empty() => Ok(0.0),
        FormulaValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FormulaError::type_error(format!("cannot use text '{}' as a number", s))),
        FormulaValue::Date(_) => Err(FormulaError::type_error("cannot use a date as a number")),
    }
}

/// `None` for empty input, so date functions propagate empty cells
fn to_date(value: &FormulaValue, function: &str) -> FormulaResult<Option<NaiveDateTime>> {
    match value {
        FormulaValue::Date(d) => Ok(Some(*d)),
        FormulaValue::Empty => Ok(None),
        FormulaValue::Text(s) if s.trim().is_empty() => Ok(None),
        FormulaValue::Text(s) => parse_date_literal(s.trim()).map(Some).ok_or_else(|| {
            FormulaError::invalid_argument(function, format!("'{}' is not a date", s))
        }),
        other => Err(FormulaError::type_error(format!(
            "{}() expects a date, got {}",
            function,
            other.type_name()
        ))),
    }
}

fn to_integer(value: &FormulaValue) -> FormulaResult<i64> {
    Ok(to_number(value)?.trunc() as i64)
}

fn values_equal(left: &FormulaValue, right: &FormulaValue) -> bool {
    match (left, right) {
        (FormulaValue::Number(a), FormulaValue::Number(b)) => a == b,
        (FormulaValue::Boolean(a), FormulaValue::Boolean(b)) => a == b,
        (FormulaValue::Date(a), FormulaValue::Date(b)) => a == b,
        (FormulaValue::Date(d), FormulaValue::Text(s)) | (FormulaValue::Text(s), FormulaValue::Date(d)) => {
            parse_date_literal(s.trim()) == Some(*d)
        }
        (a, b) if a.is_empty() || b.is_empty() => a.is_empty() && b.is_empty(),
        (a, b) => a.to_string() == b.to_string(),
    }
}

fn compare(left: &FormulaValue, right: &FormulaValue) -> FormulaResult<Ordering> {
    let ordering = match (left, right) {
        (FormulaValue::Text(a), FormulaValue::Text(b)) => Some(a.cmp(b)),
        (FormulaValue::Date(a), FormulaValue::Date(b)) => Some(a.cmp(b)),
        (FormulaValue::Date(a), FormulaValue::Text(s)) => parse_date_literal(s.trim()).map(|b| a.cmp(&b)),
        (FormulaValue::Text(s), FormulaValue::Date(b)) => parse_date_literal(s.trim()).map(|a| a.cmp(b)),
        (FormulaValue::Boolean(a), FormulaValue::Boolean(b)) => Some(a.cmp(b)),
        (
            FormulaValue::Number(_) | FormulaValue::Empty | FormulaValue::Boolean(_),
            FormulaValue::Number(_) | FormulaValue::Empty | FormulaValue::Boolean(_),
        ) => to_number(left)?.partial_cmp(&to_number(right)?),
        _ => None,
    };
    ordering.ok_or_else(|| {
        FormulaError::type_error(format!(
            "cannot compare {} with {}",
            left.type_name(),
            right.type_name()
        ))
    })
}

fn binary(operator: BinaryOp, left: &FormulaValue, right: &FormulaValue) -> FormulaResult<FormulaValue> {
    use FormulaValue::{Boolean, Number, Text};

    match operator {
        BinaryOp::Add => match (left, right) {
            (Text(_), _) | (_, Text(_)) => Ok(Text(format!("{}{}", left, right))),
            _ => Ok(Number(to_number(left)? + to_number(right)?)),
        },
        BinaryOp::Subtract => Ok(Number(to_number(left)? - to_number(right)?)),
        BinaryOp::Multiply => Ok(Number(to_number(left)? * to_number(right)?)),
        BinaryOp::Divide => {
            let divisor = to_number(right)?;
            if divisor == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            Ok(Number(to_number(left)? / divisor))
        }
        BinaryOp::Equals => Ok(Boolean(values_equal(left, right))),
        BinaryOp::NotEquals => Ok(Boolean(!values_equal(left, right))),
        BinaryOp::LessThan => Ok(Boolean(compare(left, right)? == Ordering::Less)),
        BinaryOp::LessThanOrEqual => Ok(Boolean(compare(left, right)? != Ordering::Greater)),
        BinaryOp::GreaterThan => Ok(Boolean(compare(left, right)? == Ordering::Greater)),
        BinaryOp::GreaterThanOrEqual => Ok(Boolean(compare(left, right)? != Ordering::Less)),
    }
}

/// Functions whose arguments are evaluated eagerly
fn builtin(function: &str, args: &[FormulaValue], now: NaiveDateTime) -> FormulaResult<FormulaValue> {
    use FormulaValue::{Boolean, Date, Empty, Number, Text};

    let text = |i: usize| args[i].to_string();

    let value = match function {
        "add" => binary(BinaryOp::Add, &args[0], &args[1])?,
        "subtract" => binary(BinaryOp::Subtract, &args[0], &args[1])?,
        "multiply" => binary(BinaryOp::Multiply, &args[0], &args[1])?,
        "divide" => binary(BinaryOp::Divide, &args[0], &args[1])?,
        "round" => Number(to_number(&args[0])?.round()),
        "abs" => Number(to_number(&args[0])?.abs()),
        "max" | "min" => {
            let mut numbers = args.iter().map(to_number);
            let first = numbers.next().unwrap_or(Ok(0.0))?;
            let mut best = first;
            for n in numbers {
                let n = n?;
                best = if function == "max" { best.max(n) } else { best.min(n) };
            }
            Number(best)
        }

        "concat" => Text(args.iter().map(|a| a.to_string()).collect()),
        "length" => Number(text(0).chars().count() as f64),
        "upper" => Text(text(0).to_uppercase()),
        "lower" => Text(text(0).to_lowercase()),
        "substring" => {
            let chars: Vec<char> = text(0).chars().collect();
            let clamp = |n: i64| n.clamp(0, chars.len() as i64) as usize;
            let start = clamp(to_integer(&args[1])?);
            let end = match args.get(2) {
                Some(end) => clamp(to_integer(end)?),
                None => chars.len(),
            };
            Text(if end > start {
                chars[start..end].iter().collect()
            } else {
                String::new()
            })
        }
        "contains" => Boolean(text(0).contains(&text(1))),

        "now" => Date(now),
        "today" => Date(now.date().and_time(NaiveTime::MIN)),
        "dateAdd" => match to_date(&args[0], function)? {
            Some(date) => Date(date_add(date, to_integer(&args[1])?, &text(2))?),
            None => Empty,
        },
        "dateBetween" => match (to_date(&args[0], function)?, to_date(&args[1], function)?) {
            (Some(a), Some(b)) => Number(date_between(a, b, &text(2))? as f64),
            _ => Empty,
        },
        "formatDate" => match to_date(&args[0], function)? {
            Some(date) => Text(format_date(date, &text(1))),
            None => Empty,
        },
        "year" | "month" | "day" => match to_date(&args[0], function)? {
            Some(date) => Number(match function {
                "year" => date.year() as f64,
                "month" => date.month() as f64,
                _ => date.day() as f64,
            }),
            None => Empty,
        },

        "not" => Boolean(!truthy(&args[0])),
        "empty" => Boolean(args[0].is_empty()),
        "equal" => Boolean(values_equal(&args[0], &args[1])),

        other => return Err(FormulaError::UnknownFunction(other.to_string())),
    };
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateUnit {
    Years,
    Quarters,
    Months,
    Weeks,
    Days,
    Hours,
    Minutes,
}

fn date_unit(unit: &str, function: &str) -> FormulaResult<DateUnit> {
    let unit = unit.trim().to_lowercase();
    let unit = unit.strip_suffix('s').unwrap_or(&unit);
    match unit {
        "year" => Ok(DateUnit::Years),
        "quarter" => Ok(DateUnit::Quarters),
        "month" => Ok(DateUnit::Months),
        "week" => Ok(DateUnit::Weeks),
        "day" => Ok(DateUnit::Days),
        "hour" => Ok(DateUnit::Hours),
        "minute" => Ok(DateUnit::Minutes),
        other => Err(FormulaError::invalid_argument(
            function,
            format!("unknown unit '{}'", other),
        )),
    }
}

fn date_add(date: NaiveDateTime, amount: i64, unit: &str) -> FormulaResult<NaiveDateTime> {
    let out_of_range = || FormulaError::invalid_argument("dateAdd", "resulting date is out of range");

    let add_months = |months: i64| {
        let magnitude = u32::try_from(months.unsigned_abs()).map_err(|_| out_of_range())?;
        let result = if months >= 0 {
            date.checked_add_months(Months::new(magnitude))
        } else {
            date.checked_sub_months(Months::new(magnitude))
        };
        result.ok_or_else(out_of_range)
    };

    let duration = match date_unit(unit, "dateAdd")? {
        DateUnit::Years => return add_months(amount.saturating_mul(12)),
        DateUnit::Quarters => return add_months(amount.saturating_mul(3)),
        DateUnit::Months => return add_months(amount),
        DateUnit::Weeks => Duration::try_weeks(amount),
        DateUnit::Days => Duration::try_days(amount),
        DateUnit::Hours => Duration::try_hours(amount),
        DateUnit::Minutes => Duration::try_minutes(amount),
    };
    duration
        .and_then(|d| date.checked_add_signed(d))
        .ok_or_else(out_of_range)
}

/// Signed whole-unit difference `a - b`
fn date_between(a: NaiveDateTime, b: NaiveDateTime, unit: &str) -> FormulaResult<i64> {
    let days = (a.date() - b.date()).num_days();
    let months = months_between(a, b);
    Ok(match date_unit(unit, "dateBetween")? {
        DateUnit::Years => months / 12,
        DateUnit::Quarters => months / 3,
        DateUnit::Months => months,
        DateUnit::Weeks => days / 7,
        DateUnit::Days => days,
        DateUnit::Hours => (a - b).num_hours(),
        DateUnit::Minutes => (a - b).num_minutes(),
    })
}

/// Whole calendar months from `b` to `a`
fn months_between(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    let raw = (a.year() as i64 - b.year() as i64) * 12 + (a.month() as i64 - b.month() as i64);
    let a_rest = (a.day(), a.time());
    let b_rest = (b.day(), b.time());
    if raw > 0 && a_rest < b_rest {
        raw - 1
    } else if raw < 0 && a_rest > b_rest {
        raw + 1
    } else {
        raw
    }
}

const DATE_TOKENS: [&str; 11] = ["YYYY", "MMMM", "MMM", "YY", "MM", "DD", "HH", "mm", "ss", "M", "D"];

/// Format with YYYY, YY, MMMM, MMM, MM, M, DD, D, HH, mm and ss; other
/// characters are copied as-is
fn format_date(date: NaiveDateTime, pattern: &str) -> String {
    let mut out = String::new();
    let mut rest = pattern;

    while let Some(c) = rest.chars().next() {
        match DATE_TOKENS.iter().find(|token| rest.starts_with(**token)) {
            Some(token) => {
                let piece = match *token {
                    "YYYY" => date.format("%Y").to_string(),
                    "YY" => date.format("%y").to_string(),
                    "MMMM" => date.format("%B").to_string(),
                    "MMM" => date.format("%b").to_string(),
                    "MM" => date.format("%m").to_string(),
                    "M" => date.month().to_string(),
                    "DD" => date.format("%d").to_string(),
                    "D" => date.day().to_string(),
                    "HH" => date.format("%H").to_string(),
                    "mm" => date.format("%M").to_string(),
                    _ => date.format("%S").to_string(),
                };
                out.push_str(&piece);
                rest = &rest[token.len()..];
            }
            None => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn eval(source: &str) -> FormulaResult<FormulaValue> {
        evaluate_standalone(source, at(2024, 1, 15, 14, 30))
    }

    #[test]
    fn test_math() {
        assert_eq!(eval("add(2, 3)"), Ok(FormulaValue::Number(5.0)));
        assert_eq!(eval("round(2.5)"), Ok(FormulaValue::Number(3.0)));
        assert_eq!(eval("round(-2.5)"), Ok(FormulaValue::Number(-3.0)));
        assert_eq!(eval("max(1, 7, 3)"), Ok(FormulaValue::Number(7.0)));
        assert_eq!(eval("abs(subtract(2, 9))"), Ok(FormulaValue::Number(7.0)));
        assert_eq!(eval("divide(1, 0)"), Err(FormulaError::DivisionByZero));
        assert_eq!(eval("10 / (5 - 5)"), Err(FormulaError::DivisionByZero));
    }

    #[test]
    fn test_text() {
        assert_eq!(eval(r#"concat("a", 1, true)"#), Ok(FormulaValue::Text("a1true".into())));
        assert_eq!(eval(r#"substring("hello", 1, 3)"#), Ok(FormulaValue::Text("el".into())));
        assert_eq!(eval(r#"substring("hello", -4, 99)"#), Ok(FormulaValue::Text("hello".into())));
        assert_eq!(eval(r#"substring("hello", 4, 2)"#), Ok(FormulaValue::Text("".into())));
        assert_eq!(eval(r#"length("héllo")"#), Ok(FormulaValue::Number(5.0)));
        assert_eq!(eval(r#"contains("report", "port")"#), Ok(FormulaValue::Boolean(true)));
        assert_eq!(eval(r#""n = " + 2"#), Ok(FormulaValue::Text("n = 2".into())));
    }

    #[test]
    fn test_logic() {
        assert_eq!(eval(r#"if(1 < 2, "yes", divide(1, 0))"#), Ok(FormulaValue::Text("yes".into())));
        assert_eq!(eval("and(true, false)"), Ok(FormulaValue::Boolean(false)));
        assert_eq!(eval("or(false, 1)"), Ok(FormulaValue::Boolean(true)));
        assert_eq!(eval(r#"empty("")"#), Ok(FormulaValue::Boolean(true)));
        assert_eq!(eval("equal(2, 2.0)"), Ok(FormulaValue::Boolean(true)));
        assert_eq!(eval("not(true)"), Ok(FormulaValue::Boolean(false)));
    }

    #[test]
    fn test_dates() {
        assert_eq!(
            eval(r#"dateBetween(2024-01-20, now(), "days")"#),
            Ok(FormulaValue::Number(5.0))
        );
        assert_eq!(
            eval(r#"dateBetween(today(), now(), "days")"#),
            Ok(FormulaValue::Number(0.0))
        );
        assert_eq!(
            eval(r#"dateBetween(2024-03-14, 2024-01-15, "months")"#),
            Ok(FormulaValue::Number(1.0))
        );
        assert_eq!(
            eval(r#"dateAdd(2024-01-31, 1, "months")"#),
            Ok(FormulaValue::Date(at(2024, 2, 29, 0, 0)))
        );
        assert_eq!(
            eval(r#"dateAdd("2024-01-15", -2, "days")"#),
            Ok(FormulaValue::Date(at(2024, 1, 13, 0, 0)))
        );
        assert_eq!(
            eval(r#"formatDate(now(), "MMM D, YYYY HH:mm")"#),
            Ok(FormulaValue::Text("Jan 15, 2024 14:30".into()))
        );
        assert_eq!(eval("month(2024-07-04)"), Ok(FormulaValue::Number(7.0)));
        assert!(matches!(
            eval(r#"dateAdd(now(), 1, "fortnights")"#),
            Err(FormulaError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_unknown_function_and_arity() {
        assert_eq!(eval("sqrt(4)"), Err(FormulaError::UnknownFunction("sqrt".into())));
        assert!(matches!(eval("add(1)"), Err(FormulaError::Arity { .. })));
    }

    #[test]
    fn test_type_errors() {
        assert!(matches!(eval(r#"add(1, "x") * 2"#), Err(FormulaError::Type(_))));
        assert!(matches!(eval(r#"now() < 3"#), Err(FormulaError::Type(_))));
    }

    #[test]
    fn test_format_date_copies_other_characters() {
        assert_eq!(format_date(at(2024, 3, 5, 9, 7), "DD/MM/YY"), "05/03/24");
        assert_eq!(format_date(at(2024, 3, 5, 9, 7), "MMMM"), "March");
    }
}
