//! Contact storage
//!
//! The reconciler only talks to storage through [`ContactStore`]. Two
//! implementations ship with the service (SQLite and in-memory) plus
//! [`CheckedStore`], a wrapper that rejects results breaking the contact
//! graph invariants.

use async_trait::async_trait;
use idlink_common::{Contact, NewContact, Result};

pub mod checked;
pub mod memory;
pub mod sqlite;

pub use checked::CheckedStore;
pub use memory::MemoryContactStore;
pub use sqlite::SqliteContactStore;

/// Storage operations consumed by the reconciler
///
/// Every list returned is ordered ascending by (`created_at`, `id`) and
/// contains only non-deleted rows.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Contacts whose email equals `email` OR whose phone equals `phone`
    ///
    /// Returns an empty list when both values are `None`.
    async fn find_by_value(&self, email: Option<&str>, phone: Option<&str>) -> Result<Vec<Contact>>;

    /// The contact `anchor_id` plus every contact with `linked_id = anchor_id`
    ///
    /// One level only; grandchildren are not followed.
    async fn find_cluster(&self, anchor_id: i64) -> Result<Vec<Contact>>;

    /// Insert a new row with `created_at = updated_at = now`
    async fn create(&self, contact: NewContact) -> Result<Contact>;

    /// Turn `contact_id` into a secondary of `new_primary_id`
    ///
    /// Fails with `Error::NotFound` when the row does not exist.
    async fn demote(&self, contact_id: i64, new_primary_id: i64) -> Result<Contact>;

    /// Point every secondary linked to `old_primary_id` at `new_primary_id`
    ///
    /// Returns the number of rows changed.
    async fn relink_children(&self, old_primary_id: i64, new_primary_id: i64) -> Result<u64>;
}
