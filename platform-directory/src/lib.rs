//! # Platform Organization Directory
//!
//! This crate keeps the organization hierarchy of the Relay CRM consistent
//! under concurrent changes and answers hierarchy queries from materialized
//! paths.
//!
//! ## Overview
//!
//! The platform-directory crate handles:
//! - **Materialization**: Path assignment on create, subtree rewrites on move,
//!   tombstoning or re-linking on delete
//! - **Queries**: Ancestors, descendants, children, paged roots, search and
//!   select lists without walking parent pointers
//! - **Concurrency**: Prefix locks and version checks so overlapping subtree
//!   changes are serialized and lost updates are impossible
//! - **Change Feed**: Broadcast of committed changes for caches and indexers
//!
//! ## Features
//!
//! - `memory` (default): In-memory store for tests and single-process apps
//!
//! ## Architecture
//!
//! ```text
//! OrganizationDirectory
//!   ├─ PathMaterializer ─→ PrefixLocks
//!   │        └──────────→ OrganizationStore::commit(WriteBatch)
//!   ├─ TreeQueryEngine  ─→ OrganizationStore (range scans)
//!   ├─ RetryPolicy        (ConcurrentModification only)
//!   └─ DirectoryFeed      (optional)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use platform_directory::{DirectoryConfig, OrganizationDirectory, MemoryOrganizationStore};
//! use platform_org::{OrgAttrs, OrganizationType};
//! use std::sync::Arc;
//!
//! async fn example() -> platform_directory::DirectoryResult<()> {
//!     let directory = OrganizationDirectory::new(
//!         Arc::new(MemoryOrganizationStore::new()),
//!         DirectoryConfig::from_env(),
//!     );
//!
//!     let hq = directory
//!         .create(OrgAttrs::new("Acme", OrganizationType::Headquarters), None)
//!         .await?;
//!     let branch = directory
//!         .create(OrgAttrs::new("Acme Berlin", OrganizationType::Branch), Some(hq.id))
//!         .await?;
//!
//!     let chain = directory.ancestors(branch.id).await?;
//!     assert_eq!(chain[0].id, hq.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Read by [`DirectoryConfig::from_env`]:
//! - `ORG_DIRECTORY_MAX_SUBTREE_SIZE` - largest subtree a single move may rewrite
//! - `ORG_DIRECTORY_LOCK_TIMEOUT_MS` - prefix lock wait before giving up
//! - `ORG_DIRECTORY_MAX_RETRIES` - attempts for a conflicting change
//! - `ORG_DIRECTORY_RETRY_BASE_DELAY_MS` - first retry delay
//! - `ORG_DIRECTORY_DEFAULT_PAGE_SIZE` / `ORG_DIRECTORY_MAX_PAGE_SIZE`

pub mod config;
pub mod directory;
pub mod error;
pub mod feed;
pub mod locks;
pub mod materializer;
pub mod query;
pub mod retry;
pub mod store;

// Re-export main types
pub use config::{ConfigError, DirectoryConfig};
pub use directory::OrganizationDirectory;
pub use error::{DirectoryError, DirectoryResult, StoreError};
pub use feed::{DirectoryEvent, DirectoryFeed, FeedError, FeedStats, FeedSubscription};
pub use locks::{PrefixGuard, PrefixLocks};
pub use materializer::{DeleteStrategy, MoveOutcome, PathMaterializer};
pub use query::{AncestorView, TreeQueryEngine};
pub use retry::RetryPolicy;
pub use store::{CommitSummary, OrganizationStore, StoreResult, WriteBatch, WriteOp};

#[cfg(feature = "memory")]
pub use store::MemoryOrganizationStore;
