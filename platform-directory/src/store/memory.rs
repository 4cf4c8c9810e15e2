//! In-memory organization store.
//!
//! Rows live in a hash map keyed by id, next to an ordered index from path key
//! to id that serves prefix range scans, and a precomputed searchable-text
//! projection. One `RwLock` guards all three: reads share it, a commit holds
//! it exclusively for validation and application, so a reader sees a batch
//! either entirely or not at all.
//!
//! This is suitable for single-process deployments and testing. Database
//! backends implement [`OrganizationStore`] the same way with a transaction
//! around the batch and a `LIKE 'prefix.%'`-style range scan on an indexed
//! path column.

use async_trait::async_trait;
use chrono::Utc;
use platform_org::{OrganizationNode, PageCursor, PathKey};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CommitSummary, OrganizationStore, StoreResult, WriteBatch, WriteOp};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct StoreState {
    rows: HashMap<Uuid, OrganizationNode>,
    by_path: BTreeMap<PathKey, Uuid>,
    search_text: HashMap<Uuid, String>,
}

impl StoreState {
    /// Ids of the row at `root` and every row below it, in path order.
    fn subtree_ids(&self, root: &PathKey) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.by_path.get(root).copied().into_iter().collect();
        ids.extend(self.by_path.range(root.descendant_range()).map(|(_, id)| *id));
        ids
    }

    fn validate(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut new_ids = HashSet::new();
        let mut new_paths = HashSet::new();

        for op in batch.ops() {
            match op {
                WriteOp::Expect { id, version } => {
                    let row = self
                        .rows
                        .get(id)
                        .ok_or_else(|| conflict(format!("organization {id} vanished")))?;
                    if row.is_deleted() {
                        return Err(conflict(format!("organization {id} was deleted")));
                    }
                    if row.version != *version {
                        return Err(conflict(format!(
                            "organization {id} changed (version {} != {version})",
                            row.version
                        )));
                    }
                }
                WriteOp::Insert(node) => {
                    if self.rows.contains_key(&node.id) || !new_ids.insert(node.id) {
                        return Err(conflict(format!("organization {} already exists", node.id)));
                    }
                    if self.by_path.contains_key(&node.path) || !new_paths.insert(node.path.clone()) {
                        return Err(conflict(format!("path {} already in use", node.path)));
                    }
                }
                WriteOp::Replace(node) => {
                    let row = self
                        .rows
                        .get(&node.id)
                        .ok_or_else(|| conflict(format!("organization {} vanished", node.id)))?;
                    if row.path != node.path {
                        return Err(conflict(format!("organization {} was moved", node.id)));
                    }
                }
                WriteOp::RewritePrefix {
                    subtree_root,
                    from,
                    to,
                    depth_delta,
                    ..
                } => {
                    let row = self
                        .rows
                        .get(subtree_root)
                        .filter(|row| &row.path == from)
                        .ok_or_else(|| conflict(format!("organization {subtree_root} was moved")))?;
                    if from.is_prefix_of(to) {
                        return Err(conflict(format!("cannot move {from} below itself")));
                    }
                    if to != from && self.by_path.contains_key(to) {
                        return Err(conflict(format!("path {to} already in use")));
                    }
                    if i64::from(row.depth) + depth_delta < 0 {
                        return Err(StoreError::Backend(format!(
                            "depth shift {depth_delta} underflows {from}"
                        )));
                    }
                }
                WriteOp::ReattachChildren {
                    from,
                    new_parent,
                    to,
                } => {
                    if !self.by_path.contains_key(from) {
                        return Err(conflict(format!("path {from} vanished")));
                    }
                    match (new_parent, to) {
                        (None, None) => {}
                        (Some(parent_id), Some(to)) => {
                            if self.by_path.get(to) != Some(parent_id) {
                                return Err(conflict(format!(
                                    "organization {parent_id} is no longer at {to}"
                                )));
                            }
                            if from.covers(to) {
                                return Err(conflict(format!("cannot reattach {from} below itself")));
                            }
                        }
                        _ => {
                            return Err(StoreError::Backend(format!(
                                "reattach of {from} names a parent without a path"
                            )))
                        }
                    }
                }
                WriteOp::Tombstone { id, .. } => {
                    if !self.rows.contains_key(id) {
                        return Err(conflict(format!("organization {id} vanished")));
                    }
                }
                WriteOp::TombstoneSubtree { root, .. } => {
                    if !self.by_path.contains_key(root) {
                        return Err(conflict(format!("path {root} vanished")));
                    }
                }
            }
        }
        Ok(())
    }

    /// Move the subtree at `from` to `to`, shifting depths by `depth_delta`.
    fn rewrite_subtree(
        &mut self,
        subtree_root: Uuid,
        new_parent: Option<Uuid>,
        from: &PathKey,
        to: &PathKey,
        depth_delta: i64,
        touched: &mut HashSet<Uuid>,
    ) {
        let ids = self.subtree_ids(from);
        let mut rewritten = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(row) = self.rows.get_mut(&id) else {
                continue;
            };
            let Some(path) = row.path.rebase(from, to) else {
                continue;
            };
            self.by_path.remove(&row.path);
            row.path = path;
            row.depth = (i64::from(row.depth) + depth_delta) as u32;
            if id == subtree_root {
                row.parent_id = new_parent;
            }
            rewritten.push((row.path.clone(), id));
            touched.insert(id);
        }
        // Old keys are all removed before new ones go in.
        self.by_path.extend(rewritten);
    }

    /// Apply a validated batch; returns the ids of changed rows.
    fn apply(&mut self, batch: WriteBatch) -> HashSet<Uuid> {
        let mut touched = HashSet::new();

        for op in batch.ops {
            match op {
                WriteOp::Expect { .. } => {}
                WriteOp::Insert(node) => {
                    self.by_path.insert(node.path.clone(), node.id);
                    self.search_text.insert(node.id, node.searchable_text());
                    touched.insert(node.id);
                    self.rows.insert(node.id, node);
                }
                WriteOp::Replace(node) => {
                    self.search_text.insert(node.id, node.searchable_text());
                    touched.insert(node.id);
                    self.rows.insert(node.id, node);
                }
                WriteOp::RewritePrefix {
                    subtree_root,
                    new_parent,
                    from,
                    to,
                    depth_delta,
                } => {
                    self.rewrite_subtree(subtree_root, new_parent, &from, &to, depth_delta, &mut touched);
                }
                WriteOp::ReattachChildren {
                    from,
                    new_parent,
                    to,
                } => {
                    let child_depth = from.depth() + 1;
                    let children: Vec<(Uuid, PathKey)> = self
                        .by_path
                        .range(from.descendant_range())
                        .filter(|(path, _)| path.depth() == child_depth)
                        .filter(|(_, id)| self.rows.get(id).is_some_and(|row| !row.is_deleted()))
                        .map(|(path, id)| (*id, path.clone()))
                        .collect();

                    let new_depth = to.as_ref().map_or(0, |to| i64::from(to.depth()) + 1);
                    let depth_delta = new_depth - i64::from(child_depth);
                    for (id, path) in children {
                        let target = match &to {
                            Some(to) => to.child(id),
                            None => PathKey::root(id),
                        };
                        self.rewrite_subtree(id, new_parent, &path, &target, depth_delta, &mut touched);
                    }
                }
                WriteOp::Tombstone { id, at } => {
                    if let Some(row) = self.rows.get_mut(&id) {
                        if row.deleted_at.is_none() {
                            row.deleted_at = Some(at);
                            touched.insert(id);
                        }
                    }
                }
                WriteOp::TombstoneSubtree { root, at } => {
                    for id in self.subtree_ids(&root) {
                        if let Some(row) = self.rows.get_mut(&id) {
                            if row.deleted_at.is_none() {
                                row.deleted_at = Some(at);
                                touched.insert(id);
                            }
                        }
                    }
                }
            }
        }

        let now = Utc::now();
        for id in &touched {
            if let Some(row) = self.rows.get_mut(id) {
                row.version += 1;
                row.updated_at = now;
            }
        }
        touched
    }
}

fn conflict(reason: String) -> StoreError {
    StoreError::Conflict(reason)
}

/// In-memory [`OrganizationStore`].
#[derive(Debug, Default)]
pub struct MemoryOrganizationStore {
    state: RwLock<StoreState>,
}

impl MemoryOrganizationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, tombstoned included.
    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    /// Whether the store holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.rows.is_empty()
    }
}

#[async_trait]
impl OrganizationStore for MemoryOrganizationStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<OrganizationNode>> {
        Ok(self.state.read().await.rows.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> StoreResult<Vec<OrganizationNode>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.rows.get(id).cloned()).collect())
    }

    async fn scan_descendants(&self, prefix: &PathKey) -> StoreResult<Vec<OrganizationNode>> {
        let state = self.state.read().await;
        Ok(state
            .by_path
            .range(prefix.descendant_range())
            .filter_map(|(_, id)| state.rows.get(id).cloned())
            .collect())
    }

    async fn count_descendants(&self, prefix: &PathKey) -> StoreResult<usize> {
        let state = self.state.read().await;
        Ok(state.by_path.range(prefix.descendant_range()).count())
    }

    async fn scan_roots(
        &self,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> StoreResult<Vec<OrganizationNode>> {
        let state = self.state.read().await;
        let mut roots: Vec<&OrganizationNode> = state
            .rows
            .values()
            .filter(|row| row.depth == 0 && !row.is_deleted())
            .filter(|row| after.map_or(true, |cursor| cursor.precedes(row)))
            .collect();
        roots.sort_by(|a, b| (a.name.as_str(), a.id).cmp(&(b.name.as_str(), b.id)));
        Ok(roots.into_iter().take(limit).cloned().collect())
    }

    async fn scan_by_path(&self) -> StoreResult<Vec<OrganizationNode>> {
        let state = self.state.read().await;
        Ok(state
            .by_path
            .values()
            .filter_map(|id| state.rows.get(id).cloned())
            .collect())
    }

    async fn search(&self, term: &str, limit: usize) -> StoreResult<Vec<OrganizationNode>> {
        let state = self.state.read().await;

        let mut hits: Vec<(u8, &OrganizationNode)> = state
            .search_text
            .iter()
            .filter(|(_, text)| text.contains(term))
            .filter_map(|(id, _)| state.rows.get(id))
            .filter(|row| !row.is_deleted())
            .map(|row| {
                let name = row.name.to_lowercase();
                let rank = if name.starts_with(term) {
                    0
                } else if name.contains(term) {
                    1
                } else {
                    2
                };
                (rank, row)
            })
            .collect();

        hits.sort_by(|(ra, a), (rb, b)| (ra, a.name.as_str(), a.id).cmp(&(rb, b.name.as_str(), b.id)));
        Ok(hits.into_iter().take(limit).map(|(_, row)| row.clone()).collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<CommitSummary> {
        let mut state = self.state.write().await;
        state.validate(&batch)?;
        let ops = batch.len();
        let touched = state.apply(batch);

        tracing::debug!(ops, rows_changed = touched.len(), "Batch committed");
        Ok(CommitSummary {
            rows_changed: touched.len(),
        })
    }
}
