pub mod check;
pub mod demo;
pub mod formula;
pub mod view;

pub use check::{check, CheckArgs};
pub use demo::{collab_demo, DemoArgs};
pub use formula::{formula, FormulaArgs};
pub use view::{view, ViewArgs};
