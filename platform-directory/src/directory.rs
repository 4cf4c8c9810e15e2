//! Organization directory façade
//!
//! [`OrganizationDirectory`] is the contract the CRM layer calls. It validates
//! input, routes structural changes through the [`PathMaterializer`] and reads
//! through the [`TreeQueryEngine`], retries structural changes that lose a
//! race, and announces committed changes on the optional [`DirectoryFeed`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use platform_directory::OrganizationDirectory;
//! use platform_org::{OrgAttrs, OrganizationType, OrgUpdate, Placement};
//!
//! async fn example() -> platform_directory::DirectoryResult<()> {
//!     let directory = OrganizationDirectory::in_memory();
//!
//!     let hq = directory
//!         .create(OrgAttrs::new("Acme Holding", OrganizationType::Headquarters), None)
//!         .await?;
//!     let eu = directory
//!         .create(OrgAttrs::new("Acme EU", OrganizationType::Subsidiary), Some(hq.id))
//!         .await?;
//!
//!     // Spin the subsidiary off into its own group.
//!     directory.update(eu.id, OrgUpdate::move_to(Placement::Root)).await?;
//!     assert!(directory.descendants(hq.id).await?.is_empty());
//!     Ok(())
//! }
//! ```

use platform_org::{
    OrgAttrs, OrgUpdate, OrganizationNode, OrganizationType, Page, PageSpec, SelectOption,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::DirectoryConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::feed::{DirectoryEvent, DirectoryFeed};
use crate::materializer::{DeleteStrategy, PathMaterializer};
use crate::query::{AncestorView, TreeQueryEngine};
use crate::retry::RetryPolicy;
use crate::store::{OrganizationStore, WriteBatch, WriteOp};

/// Public contract of the organization directory.
///
/// Cheap to share: wrap it in an `Arc` and hand it to every request worker.
pub struct OrganizationDirectory {
    store: Arc<dyn OrganizationStore>,
    materializer: PathMaterializer,
    queries: TreeQueryEngine,
    retry: RetryPolicy,
    feed: Option<Arc<DirectoryFeed>>,
    config: DirectoryConfig,
}

impl std::fmt::Debug for OrganizationDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrganizationDirectory")
            .field("materializer", &self.materializer)
            .field("retry", &self.retry)
            .field("feed", &self.feed)
            .finish()
    }
}

impl OrganizationDirectory {
    /// Create a directory over `store`.
    pub fn new(store: Arc<dyn OrganizationStore>, config: DirectoryConfig) -> Self {
        Self {
            materializer: PathMaterializer::new(store.clone(), config.clone()),
            queries: TreeQueryEngine::new(store.clone(), config.clone()),
            retry: config.retry_policy(),
            feed: None,
            store,
            config,
        }
    }

    /// Directory backed by a fresh in-memory store and default settings.
    #[cfg(feature = "memory")]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::store::MemoryOrganizationStore::new()),
            DirectoryConfig::default(),
        )
    }

    /// Announce committed changes on `feed`.
    pub fn with_feed(mut self, feed: Arc<DirectoryFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Override the retry policy for structural changes.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn publish(&self, event: DirectoryEvent) {
        if let Some(feed) = &self.feed {
            feed.publish(event);
        }
    }

    /// Create an organization as a root (`parent_id = None`) or under a
    /// live parent.
    ///
    /// # Errors
    ///
    /// - [`DirectoryError::Validation`] for a blank name
    /// - [`DirectoryError::ParentNotFound`] if the parent is missing or
    ///   tombstoned
    pub async fn create(
        &self,
        attrs: OrgAttrs,
        parent_id: Option<Uuid>,
    ) -> DirectoryResult<OrganizationNode> {
        validate_name(&attrs.name)?;

        let node = self
            .retry
            .run("create", || self.materializer.insert(attrs.clone(), parent_id))
            .await
            .inspect_err(|err| log_failure("create", err))?;

        self.publish(DirectoryEvent::Created {
            organization_id: node.id,
            path: node.path.clone(),
        });
        Ok(node)
    }

    /// Update an organization.
    ///
    /// Descriptive fields are written in place. A `placement` different from
    /// the current parent re-parents the node and its subtree first.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Validation`, `ParentNotFound`, `Cycle`,
    /// `SubtreeTooLarge`, or `ConcurrentModification` once retries are
    /// exhausted.
    pub async fn update(&self, id: Uuid, update: OrgUpdate) -> DirectoryResult<OrganizationNode> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }

        let current = self.find(id).await?.ok_or(DirectoryError::NotFound(id))?;

        if let Some(placement) = update.placement {
            if placement.parent_id() != current.parent_id {
                let outcome = self
                    .retry
                    .run("move", || self.materializer.move_node(id, placement))
                    .await
                    .inspect_err(|err| log_failure("move", err))?;

                if outcome.rows > 0 {
                    self.publish(DirectoryEvent::Moved {
                        organization_id: id,
                        from: outcome.from,
                        to: outcome.node.path.clone(),
                        rows: outcome.rows,
                    });
                }
            }
        }

        if update.has_attribute_changes() {
            let (node, changed) = self
                .retry
                .run("update", || self.write_attributes(id, &update))
                .await
                .inspect_err(|err| log_failure("update", err))?;
            if changed {
                self.publish(DirectoryEvent::Updated {
                    organization_id: id,
                });
            }
            return Ok(node);
        }

        self.find(id).await?.ok_or(DirectoryError::NotFound(id))
    }

    async fn write_attributes(
        &self,
        id: Uuid,
        update: &OrgUpdate,
    ) -> DirectoryResult<(OrganizationNode, bool)> {
        let current = self.find(id).await?.ok_or(DirectoryError::NotFound(id))?;

        let mut next = current.clone();
        if !next.apply_attributes(update) {
            return Ok((current, false));
        }

        let mut batch = WriteBatch::new();
        batch.expect(&current).push(WriteOp::Replace(next));
        self.store.commit(batch).await?;

        tracing::debug!(organization_id = %id, "Organization attributes updated");
        let stored = self.find(id).await?.ok_or(DirectoryError::NotFound(id))?;
        Ok((stored, true))
    }

    /// Remove an organization and its whole subtree (tombstone).
    ///
    /// Returns whether any row changed; `false` for unknown or already
    /// removed organizations.
    pub async fn delete(&self, id: Uuid) -> DirectoryResult<bool> {
        self.delete_with(id, DeleteStrategy::CascadeTombstoneSubtree)
            .await
    }

    /// Remove an organization with an explicit child policy.
    pub async fn delete_with(&self, id: Uuid, strategy: DeleteStrategy) -> DirectoryResult<bool> {
        let rows = self
            .retry
            .run("delete", || self.materializer.delete(id, strategy))
            .await
            .inspect_err(|err| log_failure("delete", err))?;

        if rows > 0 {
            self.publish(DirectoryEvent::Deleted {
                organization_id: id,
                strategy,
                rows,
            });
        }
        Ok(rows > 0)
    }

    /// Find a live organization.
    pub async fn find(&self, id: Uuid) -> DirectoryResult<Option<OrganizationNode>> {
        Ok(self.find_including_deleted(id).await?.filter(|node| !node.is_deleted()))
    }

    /// Find an organization, tombstoned ones included.
    pub async fn find_including_deleted(&self, id: Uuid) -> DirectoryResult<Option<OrganizationNode>> {
        Ok(self.store.get(id).await?)
    }

    async fn require(&self, id: Uuid) -> DirectoryResult<OrganizationNode> {
        self.find_including_deleted(id)
            .await?
            .ok_or(DirectoryError::NotFound(id))
    }

    /// Ancestors root-first, tombstoned ones included.
    pub async fn ancestors(&self, id: Uuid) -> DirectoryResult<Vec<OrganizationNode>> {
        self.ancestors_with(id, AncestorView::All).await
    }

    /// Ancestors root-first with an explicit view.
    pub async fn ancestors_with(
        &self,
        id: Uuid,
        view: AncestorView,
    ) -> DirectoryResult<Vec<OrganizationNode>> {
        let node = self.require(id).await?;
        self.queries
            .ancestors(&node, view)
            .await
            .inspect_err(|err| log_failure("ancestors", err))
    }

    /// Live organizations below `id`.
    pub async fn descendants(&self, id: Uuid) -> DirectoryResult<Vec<OrganizationNode>> {
        let node = self.require(id).await?;
        self.queries.descendants(&node).await
    }

    /// Live direct children of `id`, by name.
    pub async fn children(&self, id: Uuid) -> DirectoryResult<Vec<OrganizationNode>> {
        let node = self.require(id).await?;
        self.queries.children(&node).await
    }

    /// A page of live roots by name.
    pub async fn roots(&self, page: &PageSpec) -> DirectoryResult<Page<OrganizationNode>> {
        self.queries.roots(page).await
    }

    /// Best-effort name/email search over live organizations.
    pub async fn search(&self, term: &str, limit: usize) -> DirectoryResult<Vec<OrganizationNode>> {
        self.queries.search(term, limit).await
    }

    /// Picker entries in tree order.
    pub async fn select_options(
        &self,
        org_type: Option<OrganizationType>,
    ) -> DirectoryResult<Vec<SelectOption>> {
        self.queries.select_options(org_type).await
    }
}

fn validate_name(name: &str) -> DirectoryResult<()> {
    if name.trim().is_empty() {
        return Err(DirectoryError::Validation(
            "organization name must not be blank".to_string(),
        ));
    }
    Ok(())
}

fn log_failure(operation: &'static str, err: &DirectoryError) {
    if err.is_server_error() {
        tracing::error!(operation, error = %err, code = err.error_code(), "Directory operation failed");
    } else {
        tracing::debug!(operation, error = %err, code = err.error_code(), "Directory operation rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_org::{OrganizationStatus, Placement};

    fn hq(name: &str) -> OrgAttrs {
        OrgAttrs::new(name, OrganizationType::Headquarters)
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let directory = OrganizationDirectory::in_memory();
        let err = directory.create(hq("  "), None).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_attributes_only() {
        let directory = OrganizationDirectory::in_memory();
        let org = directory.create(hq("Acme"), None).await.unwrap();

        let update = OrgUpdate {
            name: Some("Acme Group".to_string()),
            status: Some(OrganizationStatus::Inactive),
            ..OrgUpdate::default()
        };
        let updated = directory.update(org.id, update).await.unwrap();

        assert_eq!(updated.name, "Acme Group");
        assert_eq!(updated.status, OrganizationStatus::Inactive);
        assert_eq!(updated.path, org.path);
        assert!(updated.version > org.version);
    }

    #[tokio::test]
    async fn test_update_with_same_parent_is_not_a_move() {
        let directory = OrganizationDirectory::in_memory();
        let a = directory.create(hq("A"), None).await.unwrap();
        let b = directory.create(hq("B"), Some(a.id)).await.unwrap();

        let same = directory
            .update(b.id, OrgUpdate::move_to(Placement::Under(a.id)))
            .await
            .unwrap();
        assert_eq!(same.version, b.version);
    }

    #[tokio::test]
    async fn test_update_unknown_organization() {
        let directory = OrganizationDirectory::in_memory();
        let err = directory
            .update(Uuid::now_v7(), OrgUpdate::rename("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_feed_receives_changes() {
        let feed = Arc::new(DirectoryFeed::new());
        let mut sub = feed.subscribe();
        let directory = OrganizationDirectory::in_memory().with_feed(feed);

        let a = directory.create(hq("A"), None).await.unwrap();
        directory.delete(a.id).await.unwrap();

        assert_eq!(sub.recv().await.unwrap().topic(), "directory.organization.created");
        assert_eq!(
            sub.recv().await.unwrap(),
            DirectoryEvent::Deleted {
                organization_id: a.id,
                strategy: DeleteStrategy::CascadeTombstoneSubtree,
                rows: 1,
            }
        );
    }
}
