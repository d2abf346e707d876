//! Formula language for computed database properties.
//!
//! Formulas are function calls (`dateBetween(prop("Due"), now(), "days")`)
//! combined with infix arithmetic and comparisons:
//!
//! ```text
//! if(prop("Status") = "Done", "✓", concat(round(prop("Completed") / prop("Total") * 100), "%"))
//! ```

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod tokenizer;

pub use ast::{BinaryOp, Expr, Span, UnaryOp};
#[cfg(feature = "pretty-errors")]
pub use error::format_error;
pub use error::{FormulaError, FormulaResult, ParseError, ParseResult};
pub use evaluator::{cell_value, evaluate_standalone, Formula, FormulaEvaluator};
pub use functions::{Category, FunctionSpec, FUNCTIONS};
pub use parser::parse;
