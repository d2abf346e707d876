//! # Merge Layer
//!
//! Replicated state for pages and databases. Every replica applies the
//! same set of events, in any order and any number of times, and renders
//! the same document.
//!
//! ## Pages
//!
//! Each block is a set of last-writer-wins registers keyed by block id:
//!
//! ```text
//! BlockRegisters
//!   body      (content, properties)   Lww
//!   type      BlockType               Lww
//!   position  fractional order key    Lww
//!   deleted   tombstone stamp
//! ```
//!
//! Live blocks render sorted by `(order key, position stamp, block id)`.
//! Two actors inserting at the same index pick the same key, so their
//! blocks order by stamp, i.e. by `(timestamp, actor)`.
//!
//! ## Databases
//!
//! Properties and views are LWW records with tombstones, rows are
//! tombstoned records, and every `(row, property)` cell is its own LWW
//! register. Rendering repairs what concurrent schema changes can break:
//! cells of removed properties are dropped, select cells pointing at a
//! removed option read as empty, views lose references to removed
//! properties and exactly one view ends up the default.
//!
//! ## Invariants
//!
//! - Tombstones are permanent: no later write brings a block, row,
//!   property or view back
//! - Writes addressed to an entity that has not arrived yet are kept and
//!   take effect once it does
//! - An event id is applied at most once

use crate::clock::Stamp;
use crate::events::{DatabaseOp, EventId, MutationEvent, MutationPayload, PageOp};
use crate::fractional::{key_between, spread, stamped};
use folio_editor::{BlockMutation, DatabaseMutation};
use folio_model::{
    Block, BlockId, BlockProperties, BlockType, Database, DatabaseId, EngineError, EngineResult,
    EntityKind, PageId, PropertyDefinition, PropertyId, PropertyType, PropertyValue, Row, RowId,
    View, ViewId, ViewType,
};
use indexmap::IndexMap;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, instrument, trace};

/// Last-writer-wins register
#[derive(Debug, Clone, PartialEq)]
pub struct Lww<T> {
    pub value: T,
    pub stamp: Stamp,
}

impl<T> Lww<T> {
    pub fn new(value: T, stamp: Stamp) -> Self {
        Self { value, stamp }
    }

    /// Take `value` unless the register holds a newer write. Ops of one
    /// event share a stamp, so an equal stamp overwrites.
    pub fn set(&mut self, value: T, stamp: &Stamp) -> bool {
        if *stamp >= self.stamp {
            self.value = value;
            self.stamp = stamp.clone();
            true
        } else {
            false
        }
    }
}

fn write<T>(register: &mut Option<Lww<T>>, value: T, stamp: &Stamp) {
    match register {
        Some(current) => {
            current.set(value, stamp);
        }
        None => *register = Some(Lww::new(value, stamp.clone())),
    }
}

fn write_entry<K: Ord, T>(map: &mut BTreeMap<K, Lww<T>>, key: K, value: T, stamp: &Stamp) {
    match map.entry(key) {
        Entry::Occupied(mut entry) => {
            entry.get_mut().set(value, stamp);
        }
        Entry::Vacant(entry) => {
            entry.insert(Lww::new(value, stamp.clone()));
        }
    }
}

#[derive(Debug, Clone, Default)]
struct BlockRegisters {
    inserted: bool,
    body: Option<Lww<(String, BlockProperties)>>,
    block_type: Option<Lww<BlockType>>,
    position: Option<Lww<String>>,
    deleted: Option<Stamp>,
}

impl BlockRegisters {
    fn is_live(&self) -> bool {
        self.inserted && self.deleted.is_none()
    }

    fn sort_key(&self) -> Option<(&str, &Stamp)> {
        self.position.as_ref().map(|p| (p.value.as_str(), &p.stamp))
    }

    fn render(&self, id: &BlockId) -> Option<Block> {
        if !self.is_live() {
            return None;
        }
        let block_type = self.block_type.as_ref()?.value;
        let (content, properties) = &self.body.as_ref()?.value;
        let mut block = Block::new(id.clone(), block_type, content.clone());
        // The type may have changed after the body was written
        block.properties = properties.for_type_change(block_type);
        Some(block)
    }
}

/// Order key for `stamp` strictly between the keys at `index - 1` and `index`
fn slot_key(keys: &[String], index: usize, stamp: &Stamp) -> String {
    let lo = index.checked_sub(1).and_then(|i| keys.get(i)).map(String::as_str);
    let hi = keys.get(index).map(String::as_str);
    stamped(key_between(lo, hi), stamp)
}

/// Replicated block array of one page
#[derive(Debug, Clone)]
pub struct ReplicatedPage {
    page_id: PageId,
    blocks: BTreeMap<BlockId, BlockRegisters>,
    seen: HashSet<EventId>,
}

impl ReplicatedPage {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            blocks: BTreeMap::new(),
            seen: HashSet::new(),
        }
    }

    /// Seed from stored blocks. Every replica loading the same blocks
    /// starts from the same state.
    pub fn from_blocks(page_id: PageId, blocks: &[Block]) -> Self {
        let mut page = Self::new(page_id);
        let genesis = Stamp::genesis();
        for (block, order_key) in blocks.iter().zip(spread(blocks.len())) {
            page.apply_op(
                &PageOp::Insert {
                    block: block.clone(),
                    order_key,
                },
                &genesis,
            );
        }
        page
    }

    pub fn page_id(&self) -> &PageId {
        &self.page_id
    }

    fn ordered(&self) -> Vec<(&BlockId, &BlockRegisters)> {
        let mut live: Vec<(&BlockId, &BlockRegisters)> = self
            .blocks
            .iter()
            .filter(|(_, registers)| registers.is_live() && registers.position.is_some())
            .collect();
        live.sort_by(|(a_id, a), (b_id, b)| a.sort_key().cmp(&b.sort_key()).then_with(|| a_id.cmp(b_id)));
        live
    }

    /// Order keys of live blocks, optionally leaving one out
    fn ordered_keys(&self, except: Option<&BlockId>) -> Vec<String> {
        self.ordered()
            .into_iter()
            .filter(|(id, _)| Some(*id) != except)
            .filter_map(|(_, registers)| registers.position.as_ref().map(|p| p.value.clone()))
            .collect()
    }

    pub fn ordered_ids(&self) -> Vec<BlockId> {
        self.ordered().into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Live blocks in order
    pub fn render(&self) -> Vec<Block> {
        self.ordered()
            .into_iter()
            .filter_map(|(id, registers)| registers.render(id))
            .collect()
    }

    pub fn is_deleted(&self, id: &BlockId) -> bool {
        self.blocks.get(id).is_some_and(|r| r.deleted.is_some())
    }

    fn require_live(&self, id: &BlockId) -> EngineResult<Block> {
        self.blocks
            .get(id)
            .and_then(|registers| registers.render(id))
            .ok_or_else(|| EngineError::not_found(EntityKind::Block, id))
    }

    /// Turn a local editor mutation into replicated ops and apply them.
    ///
    /// Indices are resolved against this replica's current order, which is
    /// what the local editor displays.
    #[instrument(skip(self, mutation), fields(page_id = %self.page_id, block_id = %mutation.block_id()))]
    pub fn localize(&mut self, mutation: &BlockMutation, stamp: &Stamp) -> EngineResult<Vec<PageOp>> {
        let ops = match mutation {
            BlockMutation::Insert { index, block } => {
                let keys = self.ordered_keys(None);
                let index = (*index).min(keys.len());
                vec![PageOp::Insert {
                    block: block.clone(),
                    order_key: slot_key(&keys, index, stamp),
                }]
            }
            BlockMutation::Delete { block_id } => {
                self.require_live(block_id)?;
                vec![PageOp::Delete {
                    block_id: block_id.clone(),
                }]
            }
            BlockMutation::UpdateContent {
                block_id,
                content,
                properties,
            } => {
                let mut current = self.require_live(block_id)?;
                current.properties.merge(properties);
                vec![PageOp::SetBody {
                    block_id: block_id.clone(),
                    content: content.clone(),
                    properties: current.properties,
                }]
            }
            BlockMutation::ChangeType { block_id, block_type } => {
                self.require_live(block_id)?;
                vec![PageOp::SetType {
                    block_id: block_id.clone(),
                    block_type: *block_type,
                }]
            }
            BlockMutation::Move { block_id, to_index } => {
                self.require_live(block_id)?;
                let keys = self.ordered_keys(Some(block_id));
                let index = (*to_index).min(keys.len());
                vec![PageOp::Move {
                    block_id: block_id.clone(),
                    order_key: slot_key(&keys, index, stamp),
                }]
            }
        };

        for op in &ops {
            self.apply_op(op, stamp);
        }
        Ok(ops)
    }

    fn apply_op(&mut self, op: &PageOp, stamp: &Stamp) {
        trace!(block_id = %op.block_id(), stamp = %stamp, "Applying page op");
        let registers = self.blocks.entry(op.block_id().clone()).or_default();
        match op {
            PageOp::Insert { block, order_key } => {
                registers.inserted = true;
                write(&mut registers.body, (block.content.clone(), block.properties.clone()), stamp);
                write(&mut registers.block_type, block.block_type, stamp);
                write(&mut registers.position, order_key.clone(), stamp);
            }
            PageOp::SetBody {
                content, properties, ..
            } => write(&mut registers.body, (content.clone(), properties.clone()), stamp),
            PageOp::SetType { block_type, .. } => write(&mut registers.block_type, *block_type, stamp),
            PageOp::Move { order_key, .. } => write(&mut registers.position, order_key.clone(), stamp),
            PageOp::Delete { .. } => {
                let deleted = match registers.deleted.take() {
                    Some(previous) => previous.max(stamp.clone()),
                    None => stamp.clone(),
                };
                registers.deleted = Some(deleted);
            }
        }
    }

    /// Record a locally issued event so an echo of it is ignored
    pub fn mark_seen(&mut self, id: EventId) {
        self.seen.insert(id);
    }

    /// Merge a remote event. Returns false for duplicates and events
    /// addressed to another document.
    #[instrument(skip_all, fields(page_id = %self.page_id, event = %event.id))]
    pub fn apply_event(&mut self, event: &MutationEvent) -> bool {
        let MutationPayload::Page { page_id, ops } = &event.payload else {
            return false;
        };
        if page_id != &self.page_id {
            return false;
        }
        if !self.seen.insert(event.id.clone()) {
            debug!("Duplicate event ignored");
            return false;
        }
        for op in ops {
            self.apply_op(op, &event.stamp);
        }
        debug!(ops = ops.len(), "Merged page event");
        true
    }
}

/// LWW value plus the order it was first created in
#[derive(Debug, Clone)]
struct Record<T> {
    value: Lww<T>,
    /// Stamp of the earliest write, then position in the loaded snapshot
    created: (Stamp, usize),
}

fn put<K: Ord, T>(records: &mut BTreeMap<K, Record<T>>, key: K, value: T, stamp: &Stamp, ordinal: usize) {
    let created = (stamp.clone(), ordinal);
    match records.entry(key) {
        Entry::Occupied(mut entry) => {
            let record = entry.get_mut();
            if created < record.created {
                record.created = created;
            }
            record.value.set(value, stamp);
        }
        Entry::Vacant(entry) => {
            entry.insert(Record {
                value: Lww::new(value, stamp.clone()),
                created,
            });
        }
    }
}

/// Live records in creation order
fn live<'a, K: Ord, T>(records: &'a BTreeMap<K, Record<T>>, removed: &BTreeSet<K>) -> Vec<(&'a K, &'a Record<T>)> {
    let mut live: Vec<(&K, &Record<T>)> = records.iter().filter(|(key, _)| !removed.contains(*key)).collect();
    live.sort_by(|(a_key, a), (b_key, b)| a.created.cmp(&b.created).then_with(|| a_key.cmp(b_key)));
    live
}

/// Replicated schema, rows and views of one database
#[derive(Debug, Clone)]
pub struct ReplicatedDatabase {
    database_id: DatabaseId,
    name: Lww<String>,
    properties: BTreeMap<PropertyId, Record<PropertyDefinition>>,
    removed_properties: BTreeSet<PropertyId>,
    rows: BTreeMap<RowId, (Stamp, usize)>,
    deleted_rows: BTreeSet<RowId>,
    cells: BTreeMap<(RowId, PropertyId), Lww<PropertyValue>>,
    views: BTreeMap<ViewId, Record<View>>,
    removed_views: BTreeSet<ViewId>,
    seen: HashSet<EventId>,
}

impl ReplicatedDatabase {
    pub fn from_database(database: &Database) -> Self {
        let genesis = Stamp::genesis();
        let mut replica = Self {
            database_id: database.id.clone(),
            name: Lww::new(database.name.clone(), genesis.clone()),
            properties: BTreeMap::new(),
            removed_properties: BTreeSet::new(),
            rows: BTreeMap::new(),
            deleted_rows: BTreeSet::new(),
            cells: BTreeMap::new(),
            views: BTreeMap::new(),
            removed_views: BTreeSet::new(),
            seen: HashSet::new(),
        };

        for (ordinal, definition) in database.properties.values().enumerate() {
            put(&mut replica.properties, definition.id.clone(), definition.clone(), &genesis, ordinal);
        }
        for (ordinal, row) in database.rows.iter().enumerate() {
            replica.rows.insert(row.id.clone(), (genesis.clone(), ordinal));
            for (property_id, value) in &row.properties {
                write_entry(
                    &mut replica.cells,
                    (row.id.clone(), property_id.clone()),
                    value.clone(),
                    &genesis,
                );
            }
        }
        for (ordinal, view) in database.views.iter().enumerate() {
            put(&mut replica.views, view.id.clone(), view.clone(), &genesis, ordinal);
        }
        replica
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.database_id
    }

    /// Converged database
    pub fn render(&self) -> Database {
        let properties: IndexMap<PropertyId, PropertyDefinition> = live(&self.properties, &self.removed_properties)
            .into_iter()
            .map(|(id, record)| (id.clone(), record.value.value.clone()))
            .collect();

        let mut row_order: Vec<(&RowId, &(Stamp, usize))> = self
            .rows
            .iter()
            .filter(|(id, _)| !self.deleted_rows.contains(*id))
            .collect();
        row_order.sort_by(|(a_id, a), (b_id, b)| a.cmp(b).then_with(|| a_id.cmp(b_id)));

        let rows = row_order
            .into_iter()
            .map(|(row_id, _)| {
                let mut row = Row::new(row_id.clone());
                for (property_id, definition) in &properties {
                    if definition.property_type == PropertyType::Formula {
                        continue;
                    }
                    let Some(cell) = self.cells.get(&(row_id.clone(), property_id.clone())) else {
                        continue;
                    };
                    let value = match &cell.value {
                        PropertyValue::Select(option)
                            if definition.property_type == PropertyType::Select
                                && definition.option(option).is_none() =>
                        {
                            PropertyValue::Empty
                        }
                        value => value.clone(),
                    };
                    row.properties.insert(property_id.clone(), value);
                }
                row
            })
            .collect();

        let mut views: Vec<(View, &Stamp)> = live(&self.views, &self.removed_views)
            .into_iter()
            .map(|(_, record)| (record.value.value.clone(), &record.value.stamp))
            .collect();
        for (view, _) in &mut views {
            if view.repair(&properties) {
                debug!(view_id = %view.id, "Detached properties from view");
            }
        }

        // Concurrent "make default" writes: the latest one wins
        let default = views
            .iter()
            .filter(|(view, _)| view.is_default)
            .max_by(|(a, a_stamp), (b, b_stamp)| a_stamp.cmp(b_stamp).then_with(|| a.id.cmp(&b.id)))
            .or_else(|| views.first())
            .map(|(view, _)| view.id.clone());
        let mut views: Vec<View> = views
            .into_iter()
            .map(|(mut view, _)| {
                view.is_default = Some(&view.id) == default.as_ref();
                view
            })
            .collect();
        if views.is_empty() {
            views.push(
                View::new(ViewId::new(format!("{}_table", self.database_id)), "Table", ViewType::Table).as_default(),
            );
        }

        Database {
            id: self.database_id.clone(),
            name: self.name.value.clone(),
            properties,
            rows,
            views,
        }
    }

    /// Turn a local engine mutation into replicated ops and apply them.
    /// `current` is the engine's database after the mutation.
    #[instrument(skip_all, fields(database_id = %self.database_id))]
    pub fn localize(
        &mut self,
        mutation: &DatabaseMutation,
        current: &Database,
        stamp: &Stamp,
    ) -> EngineResult<Vec<DatabaseOp>> {
        let ops = match mutation {
            DatabaseMutation::AddProperty { definition } => vec![DatabaseOp::PutProperty {
                definition: definition.clone(),
            }],
            DatabaseMutation::UpdateProperty { property_id, .. } => {
                let definition = current
                    .property(property_id)
                    .cloned()
                    .ok_or_else(|| EngineError::not_found(EntityKind::Property, property_id))?;
                vec![DatabaseOp::PutProperty { definition }]
            }
            DatabaseMutation::RemoveProperty { property_id } => vec![DatabaseOp::RemoveProperty {
                property_id: property_id.clone(),
            }],
            DatabaseMutation::AddRow { row } => vec![DatabaseOp::AddRow {
                row_id: row.id.clone(),
                cells: row.properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            }],
            DatabaseMutation::UpdateRow { row_id, values } => values
                .iter()
                .map(|(property_id, value)| DatabaseOp::SetCell {
                    row_id: row_id.clone(),
                    property_id: property_id.clone(),
                    value: value.clone(),
                })
                .collect(),
            DatabaseMutation::DeleteRow { row_id } => vec![DatabaseOp::DeleteRow { row_id: row_id.clone() }],
            DatabaseMutation::PutView { view } => vec![DatabaseOp::PutView { view: view.clone() }],
            DatabaseMutation::RemoveView { view_id } => vec![DatabaseOp::RemoveView {
                view_id: view_id.clone(),
            }],
            DatabaseMutation::Rename { name } => vec![DatabaseOp::Rename { name: name.clone() }],
        };

        for op in &ops {
            self.apply_op(op, stamp);
        }
        Ok(ops)
    }

    fn apply_op(&mut self, op: &DatabaseOp, stamp: &Stamp) {
        match op {
            DatabaseOp::PutProperty { definition } => {
                put(&mut self.properties, definition.id.clone(), definition.clone(), stamp, 0);
            }
            DatabaseOp::RemoveProperty { property_id } => {
                self.removed_properties.insert(property_id.clone());
            }
            DatabaseOp::AddRow { row_id, cells } => {
                let created = (stamp.clone(), 0);
                match self.rows.entry(row_id.clone()) {
                    Entry::Occupied(mut entry) => {
                        if &created < entry.get() {
                            entry.insert(created);
                        }
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(created);
                    }
                }
                for (property_id, value) in cells {
                    write_entry(&mut self.cells, (row_id.clone(), property_id.clone()), value.clone(), stamp);
                }
            }
            DatabaseOp::SetCell {
                row_id,
                property_id,
                value,
            } => write_entry(&mut self.cells, (row_id.clone(), property_id.clone()), value.clone(), stamp),
            DatabaseOp::DeleteRow { row_id } => {
                self.deleted_rows.insert(row_id.clone());
            }
            DatabaseOp::PutView { view } => put(&mut self.views, view.id.clone(), view.clone(), stamp, 0),
            DatabaseOp::RemoveView { view_id } => {
                self.removed_views.insert(view_id.clone());
            }
            DatabaseOp::Rename { name } => {
                self.name.set(name.clone(), stamp);
            }
        }
    }

    pub fn mark_seen(&mut self, id: EventId) {
        self.seen.insert(id);
    }

    #[instrument(skip_all, fields(database_id = %self.database_id, event = %event.id))]
    pub fn apply_event(&mut self, event: &MutationEvent) -> bool {
        let MutationPayload::Database { database_id, ops } = &event.payload else {
            return false;
        };
        if database_id != &self.database_id {
            return false;
        }
        if !self.seen.insert(event.id.clone()) {
            debug!("Duplicate event ignored");
            return false;
        }
        for op in ops {
            self.apply_op(op, &event.stamp);
        }
        debug!(ops = ops.len(), "Merged database event");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::{ActorId, SelectOption};

    fn stamp(wall_ms: u64, actor: &str) -> Stamp {
        Stamp::new(wall_ms, 0, actor)
    }

    fn page_event(actor: &str, seq: u64, stamp: Stamp, ops: Vec<PageOp>) -> MutationEvent {
        MutationEvent {
            id: EventId {
                actor: ActorId::from(actor),
                seq,
            },
            stamp,
            payload: MutationPayload::Page {
                page_id: PageId::from("p"),
                ops,
            },
        }
    }

    fn database_event(actor: &str, seq: u64, stamp: Stamp, ops: Vec<DatabaseOp>) -> MutationEvent {
        MutationEvent {
            id: EventId {
                actor: ActorId::from(actor),
                seq,
            },
            stamp,
            payload: MutationPayload::Database {
                database_id: DatabaseId::from("db"),
                ops,
            },
        }
    }

    fn seeded() -> ReplicatedPage {
        ReplicatedPage::from_blocks(
            PageId::from("p"),
            &[
                Block::new(BlockId::from("a"), BlockType::Paragraph, "A"),
                Block::new(BlockId::from("b"), BlockType::Paragraph, "B"),
            ],
        )
    }

    fn ids(page: &ReplicatedPage) -> Vec<String> {
        page.ordered_ids().iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_lww_keeps_newer_write() {
        let mut register = Lww::new("old", stamp(5, "ana"));
        assert!(!register.set("older", &stamp(4, "zed")));
        assert!(register.set("newer", &stamp(5, "ben")));
        assert_eq!(register.value, "newer");
    }

    #[test]
    fn test_concurrent_inserts_at_same_index_converge() {
        let mut ana = seeded();
        let mut ben = seeded();

        let ana_stamp = stamp(100, "ana");
        let ana_ops = ana
            .localize(
                &BlockMutation::Insert {
                    index: 1,
                    block: Block::new(BlockId::from("x"), BlockType::Paragraph, "from ana"),
                },
                &ana_stamp,
            )
            .unwrap();
        let ben_stamp = stamp(100, "ben");
        let ben_ops = ben
            .localize(
                &BlockMutation::Insert {
                    index: 1,
                    block: Block::new(BlockId::from("y"), BlockType::Paragraph, "from ben"),
                },
                &ben_stamp,
            )
            .unwrap();

        assert!(ben.apply_event(&page_event("ana", 1, ana_stamp, ana_ops)));
        assert!(ana.apply_event(&page_event("ben", 1, ben_stamp, ben_ops)));

        assert_eq!(ids(&ana), vec!["a", "x", "y", "b"]);
        assert_eq!(ana.render(), ben.render());
    }

    #[test]
    fn test_insert_between_concurrent_inserts_stays_put() {
        let mut ana = seeded();
        let mut ben = seeded();
        let insert = |id: &str, index: usize| BlockMutation::Insert {
            index,
            block: Block::new(BlockId::from(id), BlockType::Paragraph, id),
        };

        let ana_stamp = stamp(100, "ana");
        let ana_ops = ana.localize(&insert("x", 1), &ana_stamp).unwrap();
        let ben_stamp = stamp(100, "ben");
        let ben_ops = ben.localize(&insert("y", 1), &ben_stamp).unwrap();
        ben.apply_event(&page_event("ana", 1, ana_stamp, ana_ops));
        ana.apply_event(&page_event("ben", 1, ben_stamp, ben_ops));
        assert_eq!(ids(&ana), vec!["a", "x", "y", "b"]);

        let z_stamp = stamp(120, "ana");
        let z_ops = ana.localize(&insert("z", 2), &z_stamp).unwrap();
        assert_eq!(ids(&ana), vec!["a", "x", "z", "y", "b"]);

        ben.apply_event(&page_event("ana", 2, z_stamp, z_ops));
        assert_eq!(ana.render(), ben.render());

        let w_ops = ben.localize(&insert("w", 3), &stamp(130, "ben")).unwrap();
        assert_eq!(ids(&ben), vec!["a", "x", "z", "w", "y", "b"]);
        assert_eq!(w_ops.len(), 1);
    }

    #[test]
    fn test_same_block_later_write_wins_everywhere() {
        let mut ana = seeded();
        let mut ben = seeded();
        let update = |content: &str| BlockMutation::UpdateContent {
            block_id: BlockId::from("a"),
            content: content.to_string(),
            properties: BlockProperties::default(),
        };

        let late = stamp(200, "ana");
        let early = stamp(150, "ben");
        let ana_ops = ana.localize(&update("ana wins"), &late).unwrap();
        let ben_ops = ben.localize(&update("ben loses"), &early).unwrap();

        ana.apply_event(&page_event("ben", 1, early, ben_ops));
        ben.apply_event(&page_event("ana", 1, late, ana_ops));

        assert_eq!(ana.render()[0].content, "ana wins");
        assert_eq!(ana.render(), ben.render());
    }

    #[test]
    fn test_delete_is_not_undone_by_later_write() {
        let mut page = seeded();
        page.apply_event(&page_event(
            "ben",
            1,
            stamp(300, "ben"),
            vec![PageOp::SetBody {
                block_id: BlockId::from("b"),
                content: "late edit".into(),
                properties: BlockProperties::default(),
            }],
        ));
        page.apply_event(&page_event(
            "ana",
            1,
            stamp(100, "ana"),
            vec![PageOp::Delete {
                block_id: BlockId::from("b"),
            }],
        ));

        assert_eq!(ids(&page), vec!["a"]);
        assert!(page.is_deleted(&BlockId::from("b")));
    }

    #[test]
    fn test_write_before_insert_applies_on_arrival() {
        let mut page = seeded();
        let insert = page_event(
            "ben",
            1,
            stamp(100, "ben"),
            vec![PageOp::Insert {
                block: Block::new(BlockId::from("y"), BlockType::Paragraph, ""),
                order_key: "z".into(),
            }],
        );
        let edit = page_event(
            "ben",
            2,
            stamp(110, "ben"),
            vec![PageOp::SetBody {
                block_id: BlockId::from("y"),
                content: "typed".into(),
                properties: BlockProperties::default(),
            }],
        );

        page.apply_event(&edit);
        assert_eq!(ids(&page), vec!["a", "b"]);
        page.apply_event(&insert);
        assert_eq!(page.render()[2].content, "typed");
    }

    #[test]
    fn test_duplicate_delivery_is_ignored() {
        let mut page = seeded();
        let event = page_event(
            "ben",
            1,
            stamp(100, "ben"),
            vec![PageOp::Move {
                block_id: BlockId::from("a"),
                order_key: "z".into(),
            }],
        );
        assert!(page.apply_event(&event));
        let once = page.render();
        assert!(!page.apply_event(&event));
        assert_eq!(page.render(), once);
        assert_eq!(ids(&page), vec!["b", "a"]);
    }

    #[test]
    fn test_type_change_and_body_edit_merge() {
        let mut page = seeded();
        page.apply_event(&page_event(
            "ana",
            1,
            stamp(100, "ana"),
            vec![PageOp::SetType {
                block_id: BlockId::from("a"),
                block_type: BlockType::Checkbox,
            }],
        ));
        page.apply_event(&page_event(
            "ben",
            1,
            stamp(90, "ben"),
            vec![PageOp::SetBody {
                block_id: BlockId::from("a"),
                content: "buy milk".into(),
                properties: BlockProperties::default(),
            }],
        ));

        let block = &page.render()[0];
        assert_eq!(block.block_type, BlockType::Checkbox);
        assert_eq!(block.content, "buy milk");
        assert_eq!(block.properties.checked, Some(false));
    }

    #[test]
    fn test_move_localizes_between_neighbours() {
        let mut page = ReplicatedPage::from_blocks(
            PageId::from("p"),
            &[
                Block::new(BlockId::from("a"), BlockType::Paragraph, ""),
                Block::new(BlockId::from("b"), BlockType::Paragraph, ""),
                Block::new(BlockId::from("c"), BlockType::Paragraph, ""),
            ],
        );
        page.localize(
            &BlockMutation::Move {
                block_id: BlockId::from("a"),
                to_index: 1,
            },
            &stamp(1, "ana"),
        )
        .unwrap();
        assert_eq!(ids(&page), vec!["b", "a", "c"]);

        let missing = page.localize(
            &BlockMutation::Delete {
                block_id: BlockId::from("zz"),
            },
            &stamp(2, "ana"),
        );
        assert!(matches!(missing, Err(EngineError::NotFound { .. })));
    }

    fn tasks() -> Database {
        let mut database = Database::new("db", "Tasks");
        let status = PropertyDefinition::select(
            "status",
            "Status",
            vec![
                SelectOption::new("todo", "To Do", "gray"),
                SelectOption::new("done", "Done", "green"),
            ],
        );
        database.properties.insert(status.id.clone(), status);
        let mut row = Row::new(RowId::from("r1"));
        row.properties.insert(PropertyId::from("title"), PropertyValue::text("Write"));
        row.properties.insert(PropertyId::from("status"), PropertyValue::select("todo"));
        database.rows.push(row);
        database.views.push(View::kanban("board", "Board", "status"));
        database
    }

    fn set_cell(row: &str, property: &str, value: PropertyValue) -> DatabaseOp {
        DatabaseOp::SetCell {
            row_id: RowId::from(row),
            property_id: PropertyId::from(property),
            value,
        }
    }

    #[test]
    fn test_render_round_trips_snapshot() {
        let database = tasks();
        assert_eq!(ReplicatedDatabase::from_database(&database).render(), database);
    }

    #[test]
    fn test_cells_merge_per_property() {
        let mut replica = ReplicatedDatabase::from_database(&tasks());
        let title = database_event("ana", 1, stamp(100, "ana"), vec![set_cell("r1", "title", PropertyValue::text("Ship"))]);
        let status = database_event("ben", 1, stamp(90, "ben"), vec![set_cell("r1", "status", PropertyValue::select("done"))]);
        let stale = database_event("cy", 1, stamp(50, "cy"), vec![set_cell("r1", "title", PropertyValue::text("Old"))]);

        replica.apply_event(&stale);
        replica.apply_event(&status);
        replica.apply_event(&title);

        let row = replica.render().rows[0].clone();
        assert_eq!(row.get(&PropertyId::from("title")), Some(&PropertyValue::text("Ship")));
        assert_eq!(row.get(&PropertyId::from("status")), Some(&PropertyValue::select("done")));
    }

    #[test]
    fn test_deleted_row_stays_deleted() {
        let mut replica = ReplicatedDatabase::from_database(&tasks());
        replica.apply_event(&database_event(
            "ana",
            1,
            stamp(100, "ana"),
            vec![DatabaseOp::DeleteRow {
                row_id: RowId::from("r1"),
            }],
        ));
        replica.apply_event(&database_event(
            "ben",
            1,
            stamp(200, "ben"),
            vec![set_cell("r1", "title", PropertyValue::text("Edited"))],
        ));
        assert!(replica.render().rows.is_empty());
    }

    #[test]
    fn test_removed_property_repairs_rows_and_views() {
        let mut replica = ReplicatedDatabase::from_database(&tasks());
        replica.apply_event(&database_event(
            "ana",
            1,
            stamp(100, "ana"),
            vec![DatabaseOp::RemoveProperty {
                property_id: PropertyId::from("status"),
            }],
        ));
        // Concurrent write to the removed column
        replica.apply_event(&database_event(
            "ben",
            1,
            stamp(150, "ben"),
            vec![set_cell("r1", "status", PropertyValue::select("done"))],
        ));

        let database = replica.render();
        assert!(database.rows[0].get(&PropertyId::from("status")).is_none());
        let board = database.view(&ViewId::from("board")).unwrap();
        assert_eq!(board.view_type, ViewType::Table);
        database.validate().unwrap();
    }

    #[test]
    fn test_removed_option_reads_empty() {
        let mut replica = ReplicatedDatabase::from_database(&tasks());
        let mut status = tasks().properties[&PropertyId::from("status")].clone();
        status.options.retain(|o| o.id.as_str() != "todo");
        replica.apply_event(&database_event(
            "ana",
            1,
            stamp(100, "ana"),
            vec![DatabaseOp::PutProperty { definition: status }],
        ));

        let database = replica.render();
        assert_eq!(database.rows[0].get(&PropertyId::from("status")), Some(&PropertyValue::Empty));
        database.validate().unwrap();
    }

    #[test]
    fn test_latest_default_view_wins() {
        let mut replica = ReplicatedDatabase::from_database(&tasks());
        let table = replica.render().default_view().unwrap().clone();
        let board = View::kanban("board", "Board", "status").as_default();

        replica.apply_event(&database_event(
            "ana",
            1,
            stamp(100, "ana"),
            vec![DatabaseOp::PutView { view: board }],
        ));
        replica.apply_event(&database_event(
            "ben",
            1,
            stamp(200, "ben"),
            vec![DatabaseOp::PutView { view: table.clone() }],
        ));

        let database = replica.render();
        let defaults: Vec<&ViewId> = database.views.iter().filter(|v| v.is_default).map(|v| &v.id).collect();
        assert_eq!(defaults, vec![&table.id]);

        replica.apply_event(&database_event(
            "ben",
            2,
            stamp(300, "ben"),
            vec![
                DatabaseOp::RemoveView { view_id: table.id.clone() },
                DatabaseOp::RemoveView {
                    view_id: ViewId::from("board"),
                },
            ],
        ));
        let database = replica.render();
        assert_eq!(database.views.len(), 1);
        assert!(database.views[0].is_default);
    }
}
