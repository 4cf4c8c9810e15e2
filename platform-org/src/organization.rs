//! Organization domain models
//!
//! This module provides the [`OrganizationNode`] entity stored in the
//! directory, the attribute sets used to create and update it, and the
//! tier/status enums the CRM layer attaches to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::path::PathKey;

/// Tier of an organization inside its hierarchy.
///
/// The tier is informational: the directory does not enforce that a branch
/// sits under a subsidiary, or that headquarters are roots.
///
/// # Examples
///
/// ```
/// use platform_org::OrganizationType;
///
/// assert_eq!(OrganizationType::Headquarters.as_str(), "headquarters");
/// assert_eq!("branch".parse::<OrganizationType>(), Ok(OrganizationType::Branch));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationType {
    /// Top of a group (root tier)
    Headquarters,

    /// Owned company under a headquarters
    Subsidiary,

    /// Office or location of a company
    Branch,
}

impl OrganizationType {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationType::Headquarters => "headquarters",
            OrganizationType::Subsidiary => "subsidiary",
            OrganizationType::Branch => "branch",
        }
    }
}

impl std::str::FromStr for OrganizationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "headquarters" => Ok(OrganizationType::Headquarters),
            "subsidiary" => Ok(OrganizationType::Subsidiary),
            "branch" => Ok(OrganizationType::Branch),
            other => Err(format!("unknown organization type: {other}")),
        }
    }
}

/// Commercial status, owned by the CRM layer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStatus {
    /// Current customer
    #[default]
    Active,

    /// Former customer or dormant account
    Inactive,

    /// Not yet a customer
    Prospect,
}

/// Descriptive attributes supplied when an organization is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgAttrs {
    /// Display name
    pub name: String,

    /// Hierarchy tier
    pub org_type: OrganizationType,

    /// Commercial status
    #[serde(default)]
    pub status: OrganizationStatus,

    /// Main contact email
    pub email: Option<String>,

    /// Emails of the organization's contacts
    #[serde(default)]
    pub contact_emails: Vec<String>,

    /// Custom metadata for extensibility
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OrgAttrs {
    /// Attributes with only a name and tier set.
    ///
    /// ```
    /// use platform_org::{OrgAttrs, OrganizationType};
    ///
    /// let attrs = OrgAttrs::new("Acme Holding", OrganizationType::Headquarters)
    ///     .with_email("hq@acme.test");
    /// assert_eq!(attrs.email.as_deref(), Some("hq@acme.test"));
    /// ```
    pub fn new(name: impl Into<String>, org_type: OrganizationType) -> Self {
        Self {
            name: name.into(),
            org_type,
            status: OrganizationStatus::default(),
            email: None,
            contact_emails: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set the main contact email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Add a contact email.
    pub fn with_contact(mut self, email: impl Into<String>) -> Self {
        self.contact_emails.push(email.into());
        self
    }
}

/// Where a node should live in the forest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "parent_id", rename_all = "snake_case")]
pub enum Placement {
    /// Promote to a root
    Root,

    /// Attach under the given parent
    Under(Uuid),
}

impl Placement {
    /// Placement matching an optional parent id.
    pub fn from_parent(parent_id: Option<Uuid>) -> Self {
        match parent_id {
            Some(id) => Placement::Under(id),
            None => Placement::Root,
        }
    }

    /// The parent id, `None` for [`Placement::Root`].
    pub fn parent_id(&self) -> Option<Uuid> {
        match self {
            Placement::Root => None,
            Placement::Under(id) => Some(*id),
        }
    }
}

/// Partial update of an organization.
///
/// `None` fields are left untouched. A `placement` that differs from the
/// current parent turns the update into a structural move.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgUpdate {
    /// New display name
    pub name: Option<String>,

    /// New hierarchy tier
    pub org_type: Option<OrganizationType>,

    /// New status
    pub status: Option<OrganizationStatus>,

    /// New main email (`Some(None)` clears it)
    pub email: Option<Option<String>>,

    /// Replacement contact email list
    pub contact_emails: Option<Vec<String>>,

    /// Metadata entries to merge in
    pub metadata: Option<HashMap<String, serde_json::Value>>,

    /// New position in the hierarchy
    pub placement: Option<Placement>,
}

impl OrgUpdate {
    /// An update that only re-parents the node.
    pub fn move_to(placement: Placement) -> Self {
        Self {
            placement: Some(placement),
            ..Self::default()
        }
    }

    /// An update that only renames the node.
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Whether any non-structural field is set.
    pub fn has_attribute_changes(&self) -> bool {
        self.name.is_some()
            || self.org_type.is_some()
            || self.status.is_some()
            || self.email.is_some()
            || self.contact_emails.is_some()
            || self.metadata.is_some()
    }
}

/// An organization stored in the directory.
///
/// `path` and `depth` are derived from the parent chain and are maintained by
/// the directory; the CRM layer only owns the descriptive attributes.
///
/// # Architecture
///
/// ```text
/// Headquarters (depth 0)   path = [hq]
///   ├─ Subsidiary (1)      path = [hq, sub]
///   │    └─ Branch (2)     path = [hq, sub, branch]
///   └─ Branch (1)          path = [hq, branch2]
/// ```
///
/// # Examples
///
/// ```
/// use platform_org::{OrgAttrs, OrganizationNode, OrganizationType};
///
/// let hq = OrganizationNode::new_root(OrgAttrs::new("Acme", OrganizationType::Headquarters));
/// let branch = OrganizationNode::new_child(&hq, OrgAttrs::new("Acme Lyon", OrganizationType::Branch));
///
/// assert!(hq.is_root());
/// assert_eq!(branch.depth, 1);
/// assert_eq!(branch.parent_id, Some(hq.id));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationNode {
    /// Unique identifier, immutable
    pub id: Uuid,

    /// Parent organization, `None` for a root
    pub parent_id: Option<Uuid>,

    /// Materialized path, root first, ending with `id`
    pub path: PathKey,

    /// Distance from the root (0 for a root)
    pub depth: u32,

    /// Hierarchy tier
    pub org_type: OrganizationType,

    /// Display name
    pub name: String,

    /// Commercial status
    pub status: OrganizationStatus,

    /// Main contact email
    pub email: Option<String>,

    /// Emails of the organization's contacts
    #[serde(default)]
    pub contact_emails: Vec<String>,

    /// Custom metadata for extensibility
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Tombstone marker; set when the organization was removed
    pub deleted_at: Option<DateTime<Utc>>,

    /// Row version, bumped on every committed change
    pub version: u64,

    /// When the organization was created
    pub created_at: DateTime<Utc>,

    /// When the organization was last updated
    pub updated_at: DateTime<Utc>,
}

impl OrganizationNode {
    /// Creates a new root organization.
    pub fn new_root(attrs: OrgAttrs) -> Self {
        let id = Uuid::now_v7();
        Self::build(id, None, PathKey::root(id), 0, attrs)
    }

    /// Creates a new organization under `parent`.
    ///
    /// Path and depth are derived from the parent's current values.
    pub fn new_child(parent: &OrganizationNode, attrs: OrgAttrs) -> Self {
        let id = Uuid::now_v7();
        Self::build(
            id,
            Some(parent.id),
            parent.path.child(id),
            parent.depth + 1,
            attrs,
        )
    }

    fn build(id: Uuid, parent_id: Option<Uuid>, path: PathKey, depth: u32, attrs: OrgAttrs) -> Self {
        let now = Utc::now();
        Self {
            id,
            parent_id,
            path,
            depth,
            org_type: attrs.org_type,
            name: attrs.name,
            status: attrs.status,
            email: attrs.email,
            contact_emails: attrs.contact_emails,
            metadata: attrs.metadata,
            deleted_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether this node has been tombstoned.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Number of known contacts.
    pub fn contact_count(&self) -> usize {
        self.contact_emails.len()
    }

    /// Lower-cased text the search facility matches against: name, main
    /// email and contact emails.
    pub fn searchable_text(&self) -> String {
        let mut text = self.name.to_lowercase();
        for email in self.email.iter().chain(self.contact_emails.iter()) {
            text.push(' ');
            text.push_str(&email.to_lowercase());
        }
        text
    }

    /// Apply the non-structural fields of `update`.
    ///
    /// Returns `true` if anything changed. `placement` is ignored here.
    pub fn apply_attributes(&mut self, update: &OrgUpdate) -> bool {
        let before = (
            self.name.clone(),
            self.org_type,
            self.status,
            self.email.clone(),
            self.contact_emails.clone(),
            self.metadata.clone(),
        );

        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(org_type) = update.org_type {
            self.org_type = org_type;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(email) = &update.email {
            self.email = email.clone();
        }
        if let Some(contacts) = &update.contact_emails {
            self.contact_emails = contacts.clone();
        }
        if let Some(metadata) = &update.metadata {
            for (key, value) in metadata {
                self.metadata.insert(key.clone(), value.clone());
            }
        }

        let changed = before
            != (
                self.name.clone(),
                self.org_type,
                self.status,
                self.email.clone(),
                self.contact_emails.clone(),
                self.metadata.clone(),
            );
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    /// Lightweight picker projection.
    pub fn to_select_option(&self) -> SelectOption {
        SelectOption {
            id: self.id,
            name: self.name.clone(),
            depth: self.depth,
        }
    }
}

/// Entry of a tree-select widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Organization ID
    pub id: Uuid,

    /// Organization name
    pub name: String,

    /// Depth, used for indentation
    pub depth: u32,
}

impl SelectOption {
    /// Name prefixed by one indent unit per level.
    ///
    /// ```
    /// use platform_org::SelectOption;
    /// use uuid::Uuid;
    ///
    /// let option = SelectOption { id: Uuid::nil(), name: "Lyon".into(), depth: 2 };
    /// assert_eq!(option.indented_label(), "— — Lyon");
    /// ```
    pub fn indented_label(&self) -> String {
        let mut label = "— ".repeat(self.depth as usize);
        label.push_str(&self.name);
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hq() -> OrganizationNode {
        OrganizationNode::new_root(OrgAttrs::new("Acme Corp", OrganizationType::Headquarters))
    }

    #[test]
    fn test_root_creation() {
        let org = hq();

        assert!(org.is_root());
        assert!(!org.is_deleted());
        assert_eq!(org.depth, 0);
        assert_eq!(org.path, PathKey::root(org.id));
        assert_eq!(org.status, OrganizationStatus::Active);
        assert_eq!(org.version, 0);
    }

    #[test]
    fn test_child_creation() {
        let root = hq();
        let sub = OrganizationNode::new_child(&root, OrgAttrs::new("Acme EU", OrganizationType::Subsidiary));
        let branch = OrganizationNode::new_child(&sub, OrgAttrs::new("Acme Lyon", OrganizationType::Branch));

        assert_eq!(branch.depth, 2);
        assert_eq!(branch.parent_id, Some(sub.id));
        assert_eq!(branch.path.decode().unwrap(), vec![root.id, sub.id, branch.id]);
    }

    #[test]
    fn test_searchable_text() {
        let mut org = hq();
        org.email = Some("HQ@Acme.test".to_string());
        org.contact_emails = vec!["jane@acme.test".to_string()];

        assert_eq!(org.searchable_text(), "acme corp hq@acme.test jane@acme.test");
        assert_eq!(org.contact_count(), 1);
    }

    #[test]
    fn test_apply_attributes() {
        let mut org = hq();

        let unchanged = OrgUpdate {
            name: Some("Acme Corp".to_string()),
            ..OrgUpdate::default()
        };
        assert!(!org.apply_attributes(&unchanged));

        let update = OrgUpdate {
            name: Some("Acme Group".to_string()),
            status: Some(OrganizationStatus::Prospect),
            email: Some(Some("group@acme.test".to_string())),
            ..OrgUpdate::default()
        };
        assert!(org.apply_attributes(&update));
        assert_eq!(org.name, "Acme Group");
        assert_eq!(org.status, OrganizationStatus::Prospect);
        assert_eq!(org.email.as_deref(), Some("group@acme.test"));

        let clear = OrgUpdate {
            email: Some(None),
            ..OrgUpdate::default()
        };
        assert!(org.apply_attributes(&clear));
        assert!(org.email.is_none());
    }

    #[test]
    fn test_update_flags() {
        assert!(!OrgUpdate::move_to(Placement::Root).has_attribute_changes());
        assert!(OrgUpdate::rename("x").has_attribute_changes());
        assert_eq!(Placement::from_parent(None), Placement::Root);

        let id = Uuid::now_v7();
        assert_eq!(Placement::from_parent(Some(id)).parent_id(), Some(id));
    }

    #[test]
    fn test_organization_type_roundtrip_names() {
        for t in [
            OrganizationType::Headquarters,
            OrganizationType::Subsidiary,
            OrganizationType::Branch,
        ] {
            assert_eq!(t.as_str().parse::<OrganizationType>(), Ok(t));
        }
        assert!("region".parse::<OrganizationType>().is_err());
    }
}
