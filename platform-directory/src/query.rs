//! Read-only traversal over materialized paths.
//!
//! Ancestors come from decoding a node's own path; descendants from one range
//! scan over the path index. No query walks parent pointers, and none takes a
//! prefix lock: each runs against a single committed state of the store.

use platform_org::{
    DecodeError, OrganizationNode, OrganizationType, Page, PageCursor, PageSpec, SelectOption,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::DirectoryConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::store::OrganizationStore;

/// Which ancestors to return.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AncestorView {
    /// Every ancestor; tombstoned ones carry `deleted_at`
    #[default]
    All,

    /// Only ancestors that are not tombstoned
    LiveOnly,
}

/// Decode a node's path, checking it ends with the node itself and matches
/// its depth.
pub(crate) fn decode_path(node: &OrganizationNode) -> DirectoryResult<Vec<Uuid>> {
    let ids = node.path.decode().map_err(|err| {
        tracing::error!(
            organization_id = %node.id,
            path = %node.path,
            error = %err,
            "Stored path does not decode"
        );
        DirectoryError::Decode(err)
    })?;

    let consistent = ids.last() == Some(&node.id) && ids.len() == node.depth as usize + 1;
    if !consistent {
        tracing::error!(
            organization_id = %node.id,
            path = %node.path,
            depth = node.depth,
            "Stored path disagrees with its row"
        );
        return Err(DirectoryError::Decode(DecodeError::InvalidSegment {
            position: ids.len().saturating_sub(1),
            segment: node.path.segments().last().unwrap_or_default().to_string(),
        }));
    }
    Ok(ids)
}

/// Answers ancestor, descendant, root, search and select-list queries.
pub struct TreeQueryEngine {
    store: Arc<dyn OrganizationStore>,
    config: DirectoryConfig,
}

impl std::fmt::Debug for TreeQueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeQueryEngine")
            .field("config", &self.config)
            .finish()
    }
}

impl TreeQueryEngine {
    /// Create a query engine over `store`.
    pub fn new(store: Arc<dyn OrganizationStore>, config: DirectoryConfig) -> Self {
        Self { store, config }
    }

    /// Ancestors of `node`, root first, parent last. Empty for a root.
    pub async fn ancestors(
        &self,
        node: &OrganizationNode,
        view: AncestorView,
    ) -> DirectoryResult<Vec<OrganizationNode>> {
        let mut ids = decode_path(node)?;
        ids.pop();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self.store.get_many(&ids).await?;
        if rows.len() != ids.len() {
            tracing::error!(
                organization_id = %node.id,
                path = %node.path,
                found = rows.len(),
                expected = ids.len(),
                "Path references missing ancestors"
            );
        }

        Ok(rows
            .into_iter()
            .filter(|row| view == AncestorView::All || !row.is_deleted())
            .collect())
    }

    /// Live nodes strictly below `node`, in path order.
    pub async fn descendants(
        &self,
        node: &OrganizationNode,
    ) -> DirectoryResult<Vec<OrganizationNode>> {
        let rows = self.store.scan_descendants(&node.path).await?;
        tracing::debug!(organization_id = %node.id, scanned = rows.len(), "Descendant scan");
        Ok(rows.into_iter().filter(|row| !row.is_deleted()).collect())
    }

    /// Live direct children of `node`, ordered by name.
    pub async fn children(&self, node: &OrganizationNode) -> DirectoryResult<Vec<OrganizationNode>> {
        let mut children: Vec<OrganizationNode> = self
            .descendants(node)
            .await?
            .into_iter()
            .filter(|row| row.depth == node.depth + 1)
            .collect();
        children.sort_by(|a, b| (a.name.as_str(), a.id).cmp(&(b.name.as_str(), b.id)));
        Ok(children)
    }

    /// One page of live roots ordered by name, ties broken by id.
    pub async fn roots(&self, page: &PageSpec) -> DirectoryResult<Page<OrganizationNode>> {
        let limit = self.config.page_size(page.limit);
        let mut items = self.store.scan_roots(page.after.as_ref(), limit + 1).await?;

        let next = if items.len() > limit {
            items.truncate(limit);
            items.last().map(PageCursor::after)
        } else {
            None
        };
        Ok(Page { items, next })
    }

    /// Live nodes whose name or contact emails contain `term`, best match
    /// first, at most `limit`.
    pub async fn search(&self, term: &str, limit: usize) -> DirectoryResult<Vec<OrganizationNode>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit.min(self.config.max_page_size);
        Ok(self.store.search(&term, limit).await?)
    }

    /// Picker entries for all live nodes, optionally of one type, in path
    /// order so parents precede their children.
    pub async fn select_options(
        &self,
        org_type: Option<OrganizationType>,
    ) -> DirectoryResult<Vec<SelectOption>> {
        Ok(self
            .store
            .scan_by_path()
            .await?
            .iter()
            .filter(|row| !row.is_deleted())
            .filter(|row| org_type.map_or(true, |t| row.org_type == t))
            .map(OrganizationNode::to_select_option)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryOrganizationStore, WriteBatch, WriteOp};
    use platform_org::OrgAttrs;

    async fn seed(store: &MemoryOrganizationStore, nodes: &[&OrganizationNode]) {
        let mut batch = WriteBatch::new();
        for node in nodes {
            batch.push(WriteOp::Insert((*node).clone()));
        }
        store.commit(batch).await.unwrap();
    }

    fn engine(store: Arc<MemoryOrganizationStore>) -> TreeQueryEngine {
        TreeQueryEngine::new(store, DirectoryConfig::default())
    }

    #[tokio::test]
    async fn test_ancestors_in_root_first_order() {
        let store = Arc::new(MemoryOrganizationStore::new());
        let a = OrganizationNode::new_root(OrgAttrs::new("A", OrganizationType::Headquarters));
        let b = OrganizationNode::new_child(&a, OrgAttrs::new("B", OrganizationType::Subsidiary));
        let c = OrganizationNode::new_child(&b, OrgAttrs::new("C", OrganizationType::Branch));
        seed(&store, &[&c, &a, &b]).await;

        let q = engine(store);
        let ids: Vec<Uuid> = q
            .ancestors(&c, AncestorView::All)
            .await
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!(q.ancestors(&a, AncestorView::All).await.unwrap().is_empty());
    }

    #[test]
    fn test_decode_path_rejects_mismatched_depth() {
        let mut node = OrganizationNode::new_root(OrgAttrs::new("A", OrganizationType::Headquarters));
        node.depth = 3;
        assert!(matches!(decode_path(&node), Err(DirectoryError::Decode(_))));
    }

    #[tokio::test]
    async fn test_select_options_filter_by_type() {
        let store = Arc::new(MemoryOrganizationStore::new());
        let a = OrganizationNode::new_root(OrgAttrs::new("A", OrganizationType::Headquarters));
        let b = OrganizationNode::new_child(&a, OrgAttrs::new("B", OrganizationType::Branch));
        seed(&store, &[&a, &b]).await;

        let q = engine(store);
        let all = q.select_options(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id);

        let branches = q.select_options(Some(OrganizationType::Branch)).await.unwrap();
        assert_eq!(branches, vec![b.to_select_option()]);
    }

    #[tokio::test]
    async fn test_blank_search_returns_nothing() {
        let store = Arc::new(MemoryOrganizationStore::new());
        let a = OrganizationNode::new_root(OrgAttrs::new("Acme", OrganizationType::Headquarters));
        seed(&store, &[&a]).await;

        let q = engine(store);
        assert!(q.search("   ", 10).await.unwrap().is_empty());
        assert!(q.search("acme", 0).await.unwrap().is_empty());
        assert_eq!(q.search("  ACME ", 10).await.unwrap().len(), 1);
    }
}
