//! # Editor State Machine
//!
//! Turns user intent (focus, typing, keys, menu picks) into block store
//! operations.
//!
//! ```text
//!            Focus                 "/" typed
//!   Idle ───────────▶ Editing ────────────────▶ CommandMenuOpen
//!    ▲                  │  ▲                        │
//!    └────── Blur ──────┘  └── Escape / pick / ─────┘
//!                              non-"/" content
//! ```
//!
//! At most one block is mutated per transition, except `Enter`, which
//! creates a block and moves focus to it.

use crate::block_store::BlockStore;
use crate::command_menu::{self, Command};
use folio_model::{BlockId, BlockProperties, BlockType, EngineResult};
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditorState {
    #[default]
    Idle,
    Editing {
        block_id: BlockId,
    },
    CommandMenuOpen {
        block_id: BlockId,
        /// Text typed after the `/`
        query: String,
        /// Highlighted entry of the filtered catalog
        selected: usize,
    },
}

impl EditorState {
    pub fn focused(&self) -> Option<&BlockId> {
        match self {
            EditorState::Idle => None,
            EditorState::Editing { block_id } | EditorState::CommandMenuOpen { block_id, .. } => {
                Some(block_id)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Backspace,
    ArrowUp,
    ArrowDown,
    Escape,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorIntent {
    Focus(BlockId),
    Blur,
    /// New full content of the focused block
    Input(String),
    KeyDown { key: Key, shift: bool },
    /// Pick a block type from the open command menu
    SelectCommand(BlockType),
}

impl EditorIntent {
    pub fn key(key: Key) -> Self {
        EditorIntent::KeyDown { key, shift: false }
    }

    /// Whether handling this intent can change the page
    pub fn may_mutate(&self) -> bool {
        match self {
            EditorIntent::Focus(_) | EditorIntent::Blur => false,
            EditorIntent::Input(_) | EditorIntent::SelectCommand(_) => true,
            EditorIntent::KeyDown { key, .. } => matches!(key, Key::Enter | Key::Backspace),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EditorStateMachine {
    state: EditorState,
}

impl EditorStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn focused(&self) -> Option<&BlockId> {
        self.state.focused()
    }

    /// Entries of the open command menu (empty when closed)
    pub fn menu_entries(&self) -> Vec<&'static Command> {
        match &self.state {
            EditorState::CommandMenuOpen { query, .. } => command_menu::filter(query),
            _ => Vec::new(),
        }
    }

    /// Drop focus from a block that no longer exists (e.g. deleted remotely)
    pub fn reconcile(&mut self, store: &BlockStore) {
        if let Some(id) = self.state.focused() {
            if store.get(id).is_none() {
                debug!(block_id = %id, "Focused block disappeared");
                self.state = EditorState::Idle;
            }
        }
    }

    #[instrument(skip(self, store), fields(state = ?self.state))]
    pub fn handle(&mut self, intent: EditorIntent, store: &mut BlockStore) -> EngineResult<&EditorState> {
        self.reconcile(store);

        let next = match (&self.state, intent) {
            (_, EditorIntent::Focus(block_id)) => {
                store.index_of(&block_id)?;
                EditorState::Editing { block_id }
            }
            (_, EditorIntent::Blur) => EditorState::Idle,
            (EditorState::Idle, _) => EditorState::Idle,

            (EditorState::Editing { block_id }, EditorIntent::Input(content)) => {
                store.update_content(block_id, content.as_str(), &BlockProperties::default())?;
                if content == "/" {
                    EditorState::CommandMenuOpen {
                        block_id: block_id.clone(),
                        query: String::new(),
                        selected: 0,
                    }
                } else {
                    self.state.clone()
                }
            }
            (
                EditorState::CommandMenuOpen {
                    block_id,
                    query,
                    selected,
                },
                EditorIntent::Input(content),
            ) => {
                store.update_content(block_id, content.as_str(), &BlockProperties::default())?;
                match content.strip_prefix('/') {
                    Some(new_query) => EditorState::CommandMenuOpen {
                        block_id: block_id.clone(),
                        selected: if new_query == query { *selected } else { 0 },
                        query: new_query.to_string(),
                    },
                    None => EditorState::Editing {
                        block_id: block_id.clone(),
                    },
                }
            }

            (EditorState::Editing { block_id }, EditorIntent::KeyDown { key, shift }) => {
                Self::editing_key(block_id, key, shift, store)?
            }
            (
                EditorState::CommandMenuOpen {
                    block_id,
                    query,
                    selected,
                },
                EditorIntent::KeyDown { key, .. },
            ) => {
                let entries = command_menu::filter(query);
                match key {
                    Key::Escape => EditorState::Editing {
                        block_id: block_id.clone(),
                    },
                    Key::ArrowUp | Key::ArrowDown => EditorState::CommandMenuOpen {
                        block_id: block_id.clone(),
                        query: query.clone(),
                        selected: command_menu::step(*selected, entries.len(), key == Key::ArrowDown),
                    },
                    Key::Enter => match entries.get(*selected) {
                        Some(command) => Self::select(block_id, command.block_type, store)?,
                        None => EditorState::Editing {
                            block_id: block_id.clone(),
                        },
                    },
                    Key::Backspace => self.state.clone(),
                }
            }

            (EditorState::CommandMenuOpen { block_id, .. }, EditorIntent::SelectCommand(block_type)) => {
                Self::select(block_id, block_type, store)?
            }
            (EditorState::Editing { .. }, EditorIntent::SelectCommand(_)) => self.state.clone(),
        };

        self.state = next;
        Ok(&self.state)
    }

    fn editing_key(block_id: &BlockId, key: Key, shift: bool, store: &mut BlockStore) -> EngineResult<EditorState> {
        let index = store.index_of(block_id)?;
        let focus = |id: &BlockId| EditorState::Editing { block_id: id.clone() };

        let next = match key {
            Key::Enter if !shift => {
                let block = store.insert(index + 1, BlockType::Paragraph, "")?;
                focus(&block.id)
            }
            Key::Backspace => {
                let empty = store.get(block_id).map(|b| b.is_empty()).unwrap_or(false);
                if empty && store.len() > 1 {
                    store.delete(block_id)?;
                    let previous = index.saturating_sub(1);
                    focus(&store.blocks()[previous].id)
                } else {
                    focus(block_id)
                }
            }
            Key::ArrowUp if index > 0 => focus(&store.blocks()[index - 1].id),
            Key::ArrowDown if index + 1 < store.len() => focus(&store.blocks()[index + 1].id),
            _ => focus(block_id),
        };
        Ok(next)
    }

    /// Clear the `/query` text, then change the block's type
    fn select(block_id: &BlockId, block_type: BlockType, store: &mut BlockStore) -> EngineResult<EditorState> {
        store.update_content(block_id, "", &BlockProperties::default())?;
        store.change_type(block_id, block_type)?;
        Ok(EditorState::Editing {
            block_id: block_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::{Block, IdGenerator, PageId};

    fn setup() -> (EditorStateMachine, BlockStore) {
        let blocks = vec![
            Block::new(BlockId::from("a"), BlockType::Heading1, "Title"),
            Block::new(BlockId::from("b"), BlockType::Paragraph, "Body"),
        ];
        let store = BlockStore::new(PageId::from("p"), blocks, IdGenerator::from_seed("t".to_string()));
        (EditorStateMachine::new(), store)
    }

    #[test]
    fn test_focus_and_blur() {
        let (mut machine, mut store) = setup();
        machine.handle(EditorIntent::Focus(BlockId::from("a")), &mut store).unwrap();
        assert_eq!(machine.focused(), Some(&BlockId::from("a")));

        machine.handle(EditorIntent::Blur, &mut store).unwrap();
        assert_eq!(machine.state(), &EditorState::Idle);

        assert!(machine
            .handle(EditorIntent::Focus(BlockId::from("zz")), &mut store)
            .is_err());
    }

    #[test]
    fn test_shift_enter_is_noop() {
        let (mut machine, mut store) = setup();
        machine.handle(EditorIntent::Focus(BlockId::from("a")), &mut store).unwrap();
        machine
            .handle(
                EditorIntent::KeyDown {
                    key: Key::Enter,
                    shift: true,
                },
                &mut store,
            )
            .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(machine.focused(), Some(&BlockId::from("a")));
    }

    #[test]
    fn test_backspace_on_non_empty_block_keeps_it() {
        let (mut machine, mut store) = setup();
        machine.handle(EditorIntent::Focus(BlockId::from("b")), &mut store).unwrap();
        machine.handle(EditorIntent::key(Key::Backspace), &mut store).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_arrows_move_focus_without_mutation() {
        let (mut machine, mut store) = setup();
        machine.handle(EditorIntent::Focus(BlockId::from("a")), &mut store).unwrap();
        machine.handle(EditorIntent::key(Key::ArrowUp), &mut store).unwrap();
        assert_eq!(machine.focused(), Some(&BlockId::from("a")));

        machine.handle(EditorIntent::key(Key::ArrowDown), &mut store).unwrap();
        assert_eq!(machine.focused(), Some(&BlockId::from("b")));
        assert!(store.take_changes().is_empty());
    }

    #[test]
    fn test_menu_query_and_escape() {
        let (mut machine, mut store) = setup();
        machine.handle(EditorIntent::Focus(BlockId::from("b")), &mut store).unwrap();
        machine.handle(EditorIntent::Input("/".into()), &mut store).unwrap();
        machine.handle(EditorIntent::Input("/hea".into()), &mut store).unwrap();
        assert_eq!(
            machine.state(),
            &EditorState::CommandMenuOpen {
                block_id: BlockId::from("b"),
                query: "hea".into(),
                selected: 0
            }
        );
        assert_eq!(machine.menu_entries().len(), 3);

        machine.handle(EditorIntent::key(Key::Escape), &mut store).unwrap();
        assert_eq!(
            machine.state(),
            &EditorState::Editing {
                block_id: BlockId::from("b")
            }
        );
    }

    #[test]
    fn test_focused_block_deleted_elsewhere() {
        let (mut machine, mut store) = setup();
        machine.handle(EditorIntent::Focus(BlockId::from("b")), &mut store).unwrap();
        store.delete(&BlockId::from("b")).unwrap();

        machine.handle(EditorIntent::key(Key::Enter), &mut store).unwrap();
        assert_eq!(machine.state(), &EditorState::Idle);
        assert_eq!(store.len(), 1);
    }
}
