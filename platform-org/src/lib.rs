//! # Platform Organization Hierarchy
//!
//! This crate provides the organization model and the materialized path codec
//! behind the Relay CRM organization directory.
//!
//! ## Overview
//!
//! The platform-org crate handles:
//! - **Organizations**: Headquarters, subsidiaries and branches with their
//!   descriptive attributes
//! - **Paths**: Sortable path keys encoding each node's ancestry
//! - **Projections**: Select-list entries and keyset pagination
//!
//! Everything here is pure: no storage, no locking, no async. The engine that
//! keeps paths consistent lives in `platform-directory`.
//!
//! ## Architecture
//!
//! ```text
//! OrganizationNode
//!   ├─ parent_id ─→ OrganizationNode (None for roots)
//!   ├─ path       = PathKey(root … parent . self)
//!   └─ depth      = segments(path) - 1
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use platform_org::{OrgAttrs, OrganizationNode, OrganizationType, PathKey};
//!
//! let hq = OrganizationNode::new_root(OrgAttrs::new("Acme", OrganizationType::Headquarters));
//! let sub = OrganizationNode::new_child(&hq, OrgAttrs::new("Acme EU", OrganizationType::Subsidiary));
//!
//! assert!(hq.path.is_prefix_of(&sub.path));
//! assert_eq!(PathKey::parse(sub.path.as_str()).unwrap(), sub.path);
//! ```

pub mod organization;
pub mod page;
pub mod path;

// Re-export main types for convenience
pub use organization::{
    OrgAttrs, OrgUpdate, OrganizationNode, OrganizationStatus, OrganizationType, Placement,
    SelectOption,
};
pub use page::{Page, PageCursor, PageSpec};
pub use path::{DecodeError, PathKey};
