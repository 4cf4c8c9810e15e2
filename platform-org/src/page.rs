//! Keyset pagination
//!
//! Root listings are ordered by `(name, id)` and paged with a cursor holding
//! the last row's sort key, so rows inserted between two page requests never
//! shift the window and cause duplicates or gaps.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::organization::OrganizationNode;

/// Sort key of the last row of a page.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageCursor {
    /// Name of the last row
    pub name: String,

    /// Id of the last row, breaks ties between equal names
    pub id: Uuid,
}

impl PageCursor {
    /// Cursor positioned after `node`.
    pub fn after(node: &OrganizationNode) -> Self {
        Self {
            name: node.name.clone(),
            id: node.id,
        }
    }

    /// Whether `node` sorts strictly after this cursor.
    pub fn precedes(&self, node: &OrganizationNode) -> bool {
        (self.name.as_str(), self.id) < (node.name.as_str(), node.id)
    }
}

/// Page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    /// Maximum rows to return
    pub limit: usize,

    /// Resume after this row; `None` for the first page
    pub after: Option<PageCursor>,
}

impl PageSpec {
    /// First page with the given size.
    pub fn first(limit: usize) -> Self {
        Self { limit, after: None }
    }

    /// Page following `cursor`.
    pub fn next(limit: usize, cursor: PageCursor) -> Self {
        Self {
            limit,
            after: Some(cursor),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows of this page
    pub items: Vec<T>,

    /// Cursor for the next page, `None` on the last page
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    /// Whether more rows follow.
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organization::{OrgAttrs, OrganizationType};

    #[test]
    fn test_cursor_ordering_breaks_ties_by_id() {
        let mut a = OrganizationNode::new_root(OrgAttrs::new("Same", OrganizationType::Headquarters));
        let mut b = OrganizationNode::new_root(OrgAttrs::new("Same", OrganizationType::Headquarters));
        a.id = Uuid::from_u128(1);
        b.id = Uuid::from_u128(2);

        let cursor = PageCursor::after(&a);
        assert!(cursor.precedes(&b));
        assert!(!cursor.precedes(&a));
        assert!(!PageCursor::after(&b).precedes(&a));
    }

    #[test]
    fn test_page_spec_constructors() {
        let first = PageSpec::first(10);
        assert!(first.after.is_none());

        let cursor = PageCursor {
            name: "Acme".to_string(),
            id: Uuid::nil(),
        };
        let next = PageSpec::next(10, cursor.clone());
        assert_eq!(next.after, Some(cursor));
    }
}
