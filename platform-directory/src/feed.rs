//! Directory change feed
//!
//! Every committed structural or attribute change is announced on an
//! in-process broadcast channel. The external search index subscribes to it
//! to re-index the affected organizations; the directory itself never waits
//! for subscribers.

use platform_org::PathKey;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::materializer::DeleteStrategy;

/// Feed error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    /// The feed was dropped
    #[error("Feed closed")]
    Closed,

    /// The subscriber fell behind and missed events
    #[error("Subscriber lagged, {0} events skipped")]
    Lagged(u64),
}

/// A committed directory change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryEvent {
    /// A new organization was inserted
    Created {
        /// New organization
        organization_id: Uuid,
        /// Its path
        path: PathKey,
    },

    /// Descriptive attributes changed
    Updated {
        /// Changed organization
        organization_id: Uuid,
    },

    /// A subtree was re-parented
    Moved {
        /// Root of the moved subtree
        organization_id: Uuid,
        /// Old path of the subtree root
        from: PathKey,
        /// New path of the subtree root
        to: PathKey,
        /// Rows rewritten
        rows: usize,
    },

    /// An organization was tombstoned
    Deleted {
        /// Removed organization
        organization_id: Uuid,
        /// How its children were handled
        strategy: DeleteStrategy,
        /// Rows changed
        rows: usize,
    },
}

impl DirectoryEvent {
    /// Topic string, e.g. `directory.organization.moved`.
    pub fn topic(&self) -> &'static str {
        match self {
            DirectoryEvent::Created { .. } => "directory.organization.created",
            DirectoryEvent::Updated { .. } => "directory.organization.updated",
            DirectoryEvent::Moved { .. } => "directory.organization.moved",
            DirectoryEvent::Deleted { .. } => "directory.organization.deleted",
        }
    }

    /// The organization the change is about.
    pub fn organization_id(&self) -> Uuid {
        match self {
            DirectoryEvent::Created { organization_id, .. }
            | DirectoryEvent::Updated { organization_id }
            | DirectoryEvent::Moved { organization_id, .. }
            | DirectoryEvent::Deleted { organization_id, .. } => *organization_id,
        }
    }
}

/// Feed statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Events published
    pub events_published: u64,
    /// Live subscribers
    pub subscribers: usize,
}

/// Receiving end of the feed.
pub struct FeedSubscription {
    receiver: broadcast::Receiver<DirectoryEvent>,
}

impl FeedSubscription {
    /// Receive the next event.
    pub async fn recv(&mut self) -> Result<DirectoryEvent, FeedError> {
        self.receiver.recv().await.map_err(|err| match err {
            broadcast::error::RecvError::Closed => FeedError::Closed,
            broadcast::error::RecvError::Lagged(skipped) => FeedError::Lagged(skipped),
        })
    }

    /// Receive an event if one is already queued.
    pub fn try_recv(&mut self) -> Option<DirectoryEvent> {
        self.receiver.try_recv().ok()
    }
}

/// In-process broadcast feed of directory changes.
pub struct DirectoryFeed {
    sender: broadcast::Sender<DirectoryEvent>,
    published: AtomicU64,
}

impl std::fmt::Debug for DirectoryFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryFeed")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl DirectoryFeed {
    /// Create a feed with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create with custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Announce a change. Returns the number of subscribers reached.
    pub fn publish(&self, event: DirectoryEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(topic = event.topic(), organization_id = %event.organization_id(), "Directory event published");
        // No subscribers is fine: the index may not be attached yet.
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to all subsequent events.
    pub fn subscribe(&self) -> FeedSubscription {
        FeedSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get feed stats.
    pub fn stats(&self) -> FeedStats {
        FeedStats {
            events_published: self.published.load(Ordering::Relaxed),
            subscribers: self.sender.receiver_count(),
        }
    }
}

impl Default for DirectoryFeed {
    fn default() -> Self {
        Self::new()
    }
}
