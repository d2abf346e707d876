//! The `/` block-type menu

use folio_model::BlockType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub block_type: BlockType,
    pub label: &'static str,
    pub description: &'static str,
}

const fn command(block_type: BlockType, label: &'static str, description: &'static str) -> Command {
    Command {
        block_type,
        label,
        description,
    }
}

/// Every block type the menu offers, in display order
pub const CATALOG: &[Command] = &[
    command(BlockType::Paragraph, "Text", "Just start writing with plain text"),
    command(BlockType::Heading1, "Heading 1", "Big section heading"),
    command(BlockType::Heading2, "Heading 2", "Medium section heading"),
    command(BlockType::Heading3, "Heading 3", "Small section heading"),
    command(BlockType::BulletedList, "Bulleted List", "Create a simple bulleted list"),
    command(BlockType::NumberedList, "Numbered List", "Create a list with numbering"),
    command(BlockType::Checkbox, "To-do List", "Track tasks with a to-do list"),
    command(BlockType::Code, "Code", "Capture a code snippet"),
    command(BlockType::Quote, "Quote", "Capture a quote"),
    command(BlockType::Image, "Image", "Upload or embed an image"),
    command(BlockType::Table, "Table", "Add a simple table"),
    command(BlockType::DatabaseEmbed, "Database", "Create a database"),
    command(BlockType::Embed, "Embed", "Embed a link or video"),
    command(BlockType::Mention, "Mention", "Mention a page or person"),
];

/// Commands whose label or description contains `query` (case-insensitive)
pub fn filter(query: &str) -> Vec<&'static Command> {
    let query = query.to_lowercase();
    CATALOG
        .iter()
        .filter(|c| c.label.to_lowercase().contains(&query) || c.description.to_lowercase().contains(&query))
        .collect()
}

/// Highlight movement that wraps around `len` entries
pub fn step(selected: usize, len: usize, forward: bool) -> usize {
    if len == 0 {
        return 0;
    }
    if forward {
        (selected + 1) % len
    } else {
        (selected + len - 1) % len
    }
}
