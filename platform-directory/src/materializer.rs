//! Path materialization
//!
//! [`PathMaterializer`] keeps every node's `path` and `depth` consistent with
//! its live parent chain. Each structural change is turned into one
//! [`WriteBatch`] carrying version preconditions on every row the change was
//! computed from, so the store either applies it against exactly the state it
//! was planned on or rejects it as a conflict.
//!
//! ```text
//! move B under D                      before           after
//!   A ─ B ─ C          A              A                A
//!   D                  A.B            A.B      ──►     D
//!                      A.B.C          A.B.C            D.B
//!                      D              D                D.B.C
//! ```
//!
//! Moves and deletes additionally hold a [`PrefixLocks`] lock on the old
//! subtree path while they run, which serializes changes to overlapping
//! subtrees.

use chrono::Utc;
use platform_org::{OrgAttrs, OrganizationNode, PathKey, Placement};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::DirectoryConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::locks::PrefixLocks;
use crate::store::{OrganizationStore, WriteBatch, WriteOp};

/// What happens to the children of a deleted organization.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStrategy {
    /// Tombstone the node and its entire subtree
    #[default]
    CascadeTombstoneSubtree,

    /// Re-link direct children to the node's own parent (or make them roots)
    ReattachChildrenToGrandparent,
}

/// Result of a move.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    /// The moved node as committed
    pub node: OrganizationNode,
    /// Its path before the move
    pub from: PathKey,
    /// Rows rewritten (0 when the node already had the requested parent)
    pub rows: usize,
}

/// Maintains materialized paths under create, move and delete.
pub struct PathMaterializer {
    store: Arc<dyn OrganizationStore>,
    locks: PrefixLocks,
    config: DirectoryConfig,
}

impl std::fmt::Debug for PathMaterializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathMaterializer")
            .field("held_locks", &self.locks.held_count())
            .field("config", &self.config)
            .finish()
    }
}

impl PathMaterializer {
    /// Create a materializer over `store`.
    pub fn new(store: Arc<dyn OrganizationStore>, config: DirectoryConfig) -> Self {
        Self {
            store,
            locks: PrefixLocks::new(),
            config,
        }
    }

    /// Fetch a row if it exists and is not tombstoned.
    async fn live(&self, id: Uuid) -> DirectoryResult<Option<OrganizationNode>> {
        Ok(self.store.get(id).await?.filter(|node| !node.is_deleted()))
    }

    async fn live_parent(&self, parent_id: Uuid) -> DirectoryResult<OrganizationNode> {
        self.live(parent_id)
            .await?
            .ok_or(DirectoryError::ParentNotFound(parent_id))
    }

    /// Set `parent_id`, `path` and `depth` of a not-yet-stored node.
    ///
    /// Returns the parent row the path was derived from, `None` for a root.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::ParentNotFound`] if the parent is missing or
    /// tombstoned.
    pub async fn assign_on_create(
        &self,
        node: &mut OrganizationNode,
        parent_id: Option<Uuid>,
    ) -> DirectoryResult<Option<OrganizationNode>> {
        match parent_id {
            None => {
                node.parent_id = None;
                node.path = PathKey::root(node.id);
                node.depth = 0;
                Ok(None)
            }
            Some(parent_id) => {
                let parent = self.live_parent(parent_id).await?;
                node.parent_id = Some(parent.id);
                node.path = parent.path.child(node.id);
                node.depth = parent.depth + 1;
                Ok(Some(parent))
            }
        }
    }

    /// Insert a new organization as a root or under `parent_id`.
    pub async fn insert(
        &self,
        attrs: OrgAttrs,
        parent_id: Option<Uuid>,
    ) -> DirectoryResult<OrganizationNode> {
        let mut node = OrganizationNode::new_root(attrs);
        let parent = self.assign_on_create(&mut node, parent_id).await?;

        let mut batch = WriteBatch::new();
        if let Some(parent) = &parent {
            // A concurrent move or delete of the parent invalidates our path.
            batch.expect(parent);
        }
        batch.push(WriteOp::Insert(node.clone()));
        self.store.commit(batch).await?;

        tracing::info!(
            organization_id = %node.id,
            parent_id = ?node.parent_id,
            depth = node.depth,
            "Organization created"
        );
        self.reload(node.id).await
    }

    /// Re-parent `id` (and implicitly its subtree) according to `placement`.
    ///
    /// Moving a node to the parent it already has changes nothing.
    ///
    /// # Errors
    ///
    /// - [`DirectoryError::NotFound`] if the node is missing or tombstoned
    /// - [`DirectoryError::ParentNotFound`] if the new parent is
    /// - [`DirectoryError::Cycle`] if the new parent is the node or inside
    ///   its subtree
    /// - [`DirectoryError::SubtreeTooLarge`] above `max_subtree_size` rows
    /// - [`DirectoryError::ConcurrentModification`] on lock timeout or a
    ///   concurrent change to the node or the new parent
    pub async fn move_node(&self, id: Uuid, placement: Placement) -> DirectoryResult<MoveOutcome> {
        let node = self.live(id).await?.ok_or(DirectoryError::NotFound(id))?;

        if node.parent_id == placement.parent_id() {
            return Ok(MoveOutcome {
                from: node.path.clone(),
                node,
                rows: 0,
            });
        }

        let parent = match placement {
            Placement::Root => None,
            Placement::Under(parent_id) if parent_id == id => {
                return Err(DirectoryError::Cycle {
                    node: id,
                    parent: parent_id,
                })
            }
            Placement::Under(parent_id) => Some(self.live_parent(parent_id).await?),
        };
        if let Some(parent) = &parent {
            if node.path.is_prefix_of(&parent.path) {
                return Err(DirectoryError::Cycle {
                    node: id,
                    parent: parent.id,
                });
            }
        }

        self.check_subtree_size(&node).await?;

        let mut keys = vec![node.path.clone()];
        keys.extend(parent.iter().map(|p| p.path.clone()));
        let _guard = self.locks.acquire(keys, self.config.lock_timeout()).await?;

        // Rows may have been added below the node while we waited.
        self.check_subtree_size(&node).await?;

        let (to, new_depth) = match &parent {
            Some(parent) => (parent.path.child(id), parent.depth + 1),
            None => (PathKey::root(id), 0),
        };

        let mut batch = WriteBatch::new();
        batch.expect(&node);
        if let Some(parent) = &parent {
            batch.expect(parent);
        }
        batch.push(WriteOp::RewritePrefix {
            subtree_root: id,
            new_parent: placement.parent_id(),
            from: node.path.clone(),
            to: to.clone(),
            depth_delta: i64::from(new_depth) - i64::from(node.depth),
        });
        let summary = self.store.commit(batch).await?;

        tracing::info!(
            organization_id = %id,
            from = %node.path,
            to = %to,
            rows = summary.rows_changed,
            "Organization moved"
        );
        Ok(MoveOutcome {
            node: self.reload(id).await?,
            from: node.path,
            rows: summary.rows_changed,
        })
    }

    /// Tombstone `id`, applying `strategy` to its children first.
    ///
    /// Returns the number of rows changed; 0 if the node is unknown or
    /// already tombstoned. Reattaching rewrites every child subtree and fails
    /// with [`DirectoryError::SubtreeTooLarge`] above `max_subtree_size` rows.
    pub async fn delete(&self, id: Uuid, strategy: DeleteStrategy) -> DirectoryResult<usize> {
        let Some(node) = self.live(id).await? else {
            return Ok(0);
        };

        let rows = match strategy {
            DeleteStrategy::CascadeTombstoneSubtree => self.delete_cascade(&node).await?,
            DeleteStrategy::ReattachChildrenToGrandparent => self.delete_reattach(&node).await?,
        };

        tracing::info!(
            organization_id = %id,
            strategy = ?strategy,
            rows,
            "Organization deleted"
        );
        Ok(rows)
    }

    async fn delete_cascade(&self, node: &OrganizationNode) -> DirectoryResult<usize> {
        let _guard = self
            .locks
            .acquire(vec![node.path.clone()], self.config.lock_timeout())
            .await?;

        let mut batch = WriteBatch::new();
        batch.expect(node).push(WriteOp::TombstoneSubtree {
            root: node.path.clone(),
            at: Utc::now(),
        });
        Ok(self.store.commit(batch).await?.rows_changed)
    }

    async fn delete_reattach(&self, node: &OrganizationNode) -> DirectoryResult<usize> {
        let grandparent = match node.parent_id {
            Some(parent_id) => self.live(parent_id).await?,
            None => None,
        };

        // Every child subtree is rewritten, so the same bound as a move applies.
        self.check_subtree_size(node).await?;

        let mut keys = vec![node.path.clone()];
        keys.extend(grandparent.iter().map(|gp| gp.path.clone()));
        let _guard = self.locks.acquire(keys, self.config.lock_timeout()).await?;

        self.check_subtree_size(node).await?;

        // Children are resolved by the store at commit time, so a child
        // created after this point is carried along instead of orphaned.
        let mut batch = WriteBatch::new();
        batch.expect(node);
        if let Some(gp) = &grandparent {
            batch.expect(gp);
        }
        batch
            .push(WriteOp::ReattachChildren {
                from: node.path.clone(),
                new_parent: grandparent.as_ref().map(|gp| gp.id),
                to: grandparent.as_ref().map(|gp| gp.path.clone()),
            })
            .push(WriteOp::Tombstone {
                id: node.id,
                at: Utc::now(),
            });
        let rows = self.store.commit(batch).await?.rows_changed;

        tracing::debug!(
            organization_id = %node.id,
            grandparent_id = ?grandparent.as_ref().map(|gp| gp.id),
            rows,
            "Children reattached before delete"
        );
        Ok(rows)
    }

    async fn check_subtree_size(&self, node: &OrganizationNode) -> DirectoryResult<()> {
        let size = self.store.count_descendants(&node.path).await? + 1;
        let limit = self.config.max_subtree_size;
        if size > limit {
            tracing::warn!(organization_id = %node.id, size, limit, "Subtree too large to rewrite");
            return Err(DirectoryError::SubtreeTooLarge { size, limit });
        }
        Ok(())
    }

    async fn reload(&self, id: Uuid) -> DirectoryResult<OrganizationNode> {
        self.store
            .get(id)
            .await?
            .ok_or(DirectoryError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryOrganizationStore;
    use platform_org::OrganizationType;
    use std::time::Duration;

    fn materializer() -> PathMaterializer {
        PathMaterializer::new(Arc::new(MemoryOrganizationStore::new()), DirectoryConfig::default())
    }

    fn attrs(name: &str) -> OrgAttrs {
        OrgAttrs::new(name, OrganizationType::Subsidiary)
    }

    #[tokio::test]
    async fn test_assign_on_create_root_and_child() {
        let m = materializer();
        let root = m.insert(attrs("A"), None).await.unwrap();

        let mut child = OrganizationNode::new_root(attrs("B"));
        let parent = m.assign_on_create(&mut child, Some(root.id)).await.unwrap();

        assert_eq!(parent.map(|p| p.id), Some(root.id));
        assert_eq!(child.depth, 1);
        assert_eq!(child.path, root.path.child(child.id));
    }

    #[tokio::test]
    async fn test_insert_under_missing_parent() {
        let m = materializer();
        let missing = Uuid::now_v7();

        let err = m.insert(attrs("B"), Some(missing)).await.unwrap_err();
        assert!(matches!(err, DirectoryError::ParentNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_move_rejects_self_and_descendant() {
        let m = materializer();
        let a = m.insert(attrs("A"), None).await.unwrap();
        let b = m.insert(attrs("B"), Some(a.id)).await.unwrap();

        let own = m.move_node(a.id, Placement::Under(a.id)).await.unwrap_err();
        assert!(matches!(own, DirectoryError::Cycle { .. }));

        let below = m.move_node(a.id, Placement::Under(b.id)).await.unwrap_err();
        assert!(matches!(below, DirectoryError::Cycle { .. }));
    }

    #[tokio::test]
    async fn test_move_to_current_parent_is_noop() {
        let m = materializer();
        let a = m.insert(attrs("A"), None).await.unwrap();
        let b = m.insert(attrs("B"), Some(a.id)).await.unwrap();

        let outcome = m.move_node(b.id, Placement::Under(a.id)).await.unwrap();
        assert_eq!(outcome.rows, 0);
        assert_eq!(outcome.node.version, b.version);
    }

    #[tokio::test]
    async fn test_subtree_limit() {
        let config = DirectoryConfig {
            max_subtree_size: 2,
            ..DirectoryConfig::default()
        };
        let m = PathMaterializer::new(Arc::new(MemoryOrganizationStore::new()), config);
        let a = m.insert(attrs("A"), None).await.unwrap();
        let b = m.insert(attrs("B"), Some(a.id)).await.unwrap();
        m.insert(attrs("C"), Some(b.id)).await.unwrap();

        let err = m.move_node(a.id, Placement::Root).await;
        // Already a root: no rewrite needed, no limit applied.
        assert!(err.is_ok());

        let other = m.insert(attrs("D"), None).await.unwrap();
        let err = m.move_node(a.id, Placement::Under(other.id)).await.unwrap_err();
        assert!(matches!(err, DirectoryError::SubtreeTooLarge { size: 3, limit: 2 }));
    }

    #[tokio::test]
    async fn test_reattach_delete_respects_subtree_limit() {
        let config = DirectoryConfig {
            max_subtree_size: 2,
            ..DirectoryConfig::default()
        };
        let m = PathMaterializer::new(Arc::new(MemoryOrganizationStore::new()), config);
        let a = m.insert(attrs("A"), None).await.unwrap();
        let b = m.insert(attrs("B"), Some(a.id)).await.unwrap();
        let c = m.insert(attrs("C"), Some(b.id)).await.unwrap();
        m.insert(attrs("D"), Some(c.id)).await.unwrap();

        let err = m
            .delete(b.id, DeleteStrategy::ReattachChildrenToGrandparent)
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::SubtreeTooLarge { size: 3, limit: 2 }));
        assert!(m.live(b.id).await.unwrap().is_some());

        // A cascade is a single range tombstone and is not bounded.
        assert_eq!(m.delete(b.id, DeleteStrategy::default()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_subtree_recounted_after_lock_wait() {
        let config = DirectoryConfig {
            max_subtree_size: 3,
            ..DirectoryConfig::default()
        };
        let m = Arc::new(PathMaterializer::new(
            Arc::new(MemoryOrganizationStore::new()),
            config,
        ));
        let a = m.insert(attrs("A"), None).await.unwrap();
        let b = m.insert(attrs("B"), Some(a.id)).await.unwrap();
        let target = m.insert(attrs("T"), None).await.unwrap();

        let guard = m
            .locks
            .acquire(vec![a.path.clone()], Duration::from_millis(10))
            .await
            .unwrap();

        let (a_id, target_id) = (a.id, target.id);
        let mover = {
            let m = m.clone();
            tokio::spawn(async move { m.move_node(a_id, Placement::Under(target_id)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The subtree grows past the limit while the move waits for its lock.
        m.insert(attrs("C"), Some(b.id)).await.unwrap();
        m.insert(attrs("D"), Some(b.id)).await.unwrap();
        drop(guard);

        let err = mover.await.unwrap().unwrap_err();
        assert!(matches!(err, DirectoryError::SubtreeTooLarge { size: 4, limit: 3 }));
        assert_eq!(m.live(a_id).await.unwrap().unwrap().parent_id, None);
    }

    #[tokio::test]
    async fn test_delete_unknown_or_twice() {
        let m = materializer();
        assert_eq!(m.delete(Uuid::now_v7(), DeleteStrategy::default()).await.unwrap(), 0);

        let a = m.insert(attrs("A"), None).await.unwrap();
        assert_eq!(m.delete(a.id, DeleteStrategy::default()).await.unwrap(), 1);
        assert_eq!(m.delete(a.id, DeleteStrategy::default()).await.unwrap(), 0);
    }
}
