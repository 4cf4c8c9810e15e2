//! Storage collaborator abstraction
//!
//! The directory never touches rows directly: it reads through
//! [`OrganizationStore`] and writes by committing a [`WriteBatch`], which the
//! store must apply all-or-nothing. Any backend with an ordered index over
//! path keys (a B-tree index on a SQL column, an ordered KV store, ...) can
//! implement the trait; [`MemoryOrganizationStore`] is the in-process one.
//!
//! # Consistency contract
//!
//! - Each read method observes a single committed state.
//! - `commit` validates every precondition before applying anything; a failed
//!   precondition leaves the store untouched and returns
//!   [`StoreError::Conflict`].
//! - Every row changed by a commit gets its `version` bumped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use platform_org::{OrganizationNode, PageCursor, PathKey};
use uuid::Uuid;

use crate::error::StoreError;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryOrganizationStore;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A single write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Precondition: the row exists, is live, and has this version
    Expect {
        /// Row id
        id: Uuid,
        /// Expected version
        version: u64,
    },

    /// Insert a new row; its id and path must be unused
    Insert(OrganizationNode),

    /// Overwrite the descriptive attributes of an existing row
    Replace(OrganizationNode),

    /// Prefix substitution over a whole subtree: every row whose path is
    /// `from` or starts with it gets `from` replaced by `to` and its depth
    /// shifted by `depth_delta`; the subtree root gets `new_parent`.
    RewritePrefix {
        /// Root of the moved subtree
        subtree_root: Uuid,
        /// New parent of the subtree root
        new_parent: Option<Uuid>,
        /// Old prefix
        from: PathKey,
        /// New prefix
        to: PathKey,
        /// Depth change applied to every row
        depth_delta: i64,
    },

    /// Re-link every live direct child of `from`, as found at commit time,
    /// under `new_parent` at path `to` (both `None` promotes them to roots).
    /// Each child's subtree follows it by prefix substitution.
    ReattachChildren {
        /// Path of the node giving up its children
        from: PathKey,
        /// Id of the adopting node
        new_parent: Option<Uuid>,
        /// Path of the adopting node
        to: Option<PathKey>,
    },

    /// Tombstone one row
    Tombstone {
        /// Row id
        id: Uuid,
        /// Deletion time
        at: DateTime<Utc>,
    },

    /// Tombstone the row at `root` and every live row below it
    TombstoneSubtree {
        /// Path of the subtree root
        root: PathKey,
        /// Deletion time
        at: DateTime<Utc>,
    },
}

/// Ordered list of writes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a write.
    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Append a version precondition for `node`.
    pub fn expect(&mut self, node: &OrganizationNode) -> &mut Self {
        self.push(WriteOp::Expect {
            id: node.id,
            version: node.version,
        })
    }

    /// The writes in order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Number of writes.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no writes.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Outcome of a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Rows inserted or changed
    pub rows_changed: usize,
}

/// Backing store for organization rows.
///
/// Implementations must be `Send + Sync`; the directory shares one store
/// between all request workers.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Fetch a row by id, tombstoned rows included.
    async fn get(&self, id: Uuid) -> StoreResult<Option<OrganizationNode>>;

    /// Fetch several rows, in the order of `ids`; unknown ids are skipped.
    async fn get_many(&self, ids: &[Uuid]) -> StoreResult<Vec<OrganizationNode>>;

    /// All rows strictly below `prefix`, tombstoned included, in path order.
    async fn scan_descendants(&self, prefix: &PathKey) -> StoreResult<Vec<OrganizationNode>>;

    /// Number of rows strictly below `prefix`, tombstoned included.
    async fn count_descendants(&self, prefix: &PathKey) -> StoreResult<usize>;

    /// Live roots ordered by `(name, id)`, strictly after `after`.
    async fn scan_roots(
        &self,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> StoreResult<Vec<OrganizationNode>>;

    /// Every row in path order, tombstoned included.
    async fn scan_by_path(&self) -> StoreResult<Vec<OrganizationNode>>;

    /// Live rows whose searchable text contains `term` (already lower-cased),
    /// best match first, at most `limit`.
    async fn search(&self, term: &str, limit: usize) -> StoreResult<Vec<OrganizationNode>>;

    /// Apply a batch atomically.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<CommitSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_org::{OrgAttrs, OrganizationType};

    #[test]
    fn test_batch_builder() {
        let node = OrganizationNode::new_root(OrgAttrs::new("Acme", OrganizationType::Headquarters));

        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());

        batch.expect(&node).push(WriteOp::Replace(node.clone()));
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.ops()[0],
            WriteOp::Expect {
                id: node.id,
                version: 0
            }
        );
    }
}
