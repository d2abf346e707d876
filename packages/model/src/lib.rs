//! Document model shared by the editor, formula and collaboration crates:
//! identifiers, pages made of typed blocks, and typed databases.

pub mod block;
pub mod context;
pub mod database;
pub mod error;
pub mod ids;
pub mod page;
pub mod value;
pub mod view;

pub use block::{Block, BlockProperties, BlockType, MentionTarget, PropertyKey, TableData, TableRow};
pub use context::ActorContext;
pub use database::{
    Database, NumberFormat, PropertyDefinition, PropertyPatch, PropertyType, Row, SelectOption,
};
pub use error::{EngineError, EngineResult, EntityKind};
pub use ids::{
    get_document_seed, ActorId, BlockId, CommentId, DatabaseId, IdGenerator, OptionId, PageId,
    PropertyId, RowId, ViewId, WorkspaceId,
};
pub use page::{Page, PageTree, Permissions};
pub use value::{format_number, FormulaValue, PropertyValue};
pub use view::{compare_cells, Filter, FilterOp, SortDirection, SortSpec, View, ViewType};
