//! Invariant-checking store wrapper
//!
//! Wraps any [`ContactStore`] and verifies what goes in and what comes out:
//! results must be ordered by (`created_at`, `id`) and actually match the
//! query, new secondaries and demotions must target a contact that is
//! currently primary, and a contact can never be linked to itself.
//! Violations surface as `Error::Invariant` instead of corrupting the graph.

use async_trait::async_trait;
use idlink_common::{Contact, Error, LinkPrecedence, NewContact, Result};
use tracing::warn;

use super::ContactStore;

pub struct CheckedStore<S> {
    inner: S,
}

impl<S: ContactStore> CheckedStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail unless `id` is a live primary contact
    async fn require_primary(&self, id: i64, purpose: &str) -> Result<()> {
        let cluster = self.inner.find_cluster(id).await?;
        match cluster.iter().find(|c| c.id == id) {
            Some(c) if c.is_primary() => Ok(()),
            Some(_) => Err(violation(format!("{}: contact {} is not primary", purpose, id))),
            None => Err(Error::NotFound(format!("contact {}", id))),
        }
    }
}

fn violation(message: String) -> Error {
    warn!("Contact graph invariant violated: {}", message);
    Error::Invariant(message)
}

fn check_ordered(rows: &[Contact], operation: &str) -> Result<()> {
    for pair in rows.windows(2) {
        if pair[0].order_key() >= pair[1].order_key() {
            return Err(violation(format!(
                "{} returned contacts {} and {} out of order",
                operation, pair[0].id, pair[1].id
            )));
        }
    }
    Ok(())
}

fn check_live(rows: &[Contact], operation: &str) -> Result<()> {
    match rows.iter().find(|c| c.deleted_at.is_some()) {
        Some(c) => Err(violation(format!("{} returned deleted contact {}", operation, c.id))),
        None => Ok(()),
    }
}

#[async_trait]
impl<S: ContactStore> ContactStore for CheckedStore<S> {
    async fn find_by_value(&self, email: Option<&str>, phone: Option<&str>) -> Result<Vec<Contact>> {
        let rows = self.inner.find_by_value(email, phone).await?;
        check_ordered(&rows, "find_by_value")?;
        check_live(&rows, "find_by_value")?;

        for c in &rows {
            let email_hit = email.is_some() && c.email.as_deref() == email;
            let phone_hit = phone.is_some() && c.phone_number.as_deref() == phone;
            if !email_hit && !phone_hit {
                return Err(violation(format!(
                    "find_by_value returned contact {} matching neither value",
                    c.id
                )));
            }
        }
        Ok(rows)
    }

    async fn find_cluster(&self, anchor_id: i64) -> Result<Vec<Contact>> {
        let rows = self.inner.find_cluster(anchor_id).await?;
        check_ordered(&rows, "find_cluster")?;
        check_live(&rows, "find_cluster")?;

        if let Some(stray) = rows
            .iter()
            .find(|c| c.id != anchor_id && c.linked_id != Some(anchor_id))
        {
            return Err(violation(format!(
                "find_cluster({}) returned unrelated contact {}",
                anchor_id, stray.id
            )));
        }
        Ok(rows)
    }

    async fn create(&self, contact: NewContact) -> Result<Contact> {
        match (contact.link_precedence, contact.linked_id) {
            (LinkPrecedence::Primary, None) => {}
            (LinkPrecedence::Secondary, Some(target)) => {
                self.require_primary(target, "create secondary").await?;
            }
            (precedence, linked) => {
                return Err(violation(format!(
                    "create with precedence {} and linked_id {:?}",
                    precedence, linked
                )));
            }
        }

        let expected = contact.clone();
        let row = self.inner.create(contact).await?;
        if row.email != expected.email
            || row.phone_number != expected.phone_number
            || row.linked_id != expected.linked_id
            || row.link_precedence != expected.link_precedence
        {
            return Err(violation(format!("create stored contact {} with different values", row.id)));
        }
        Ok(row)
    }

    async fn demote(&self, contact_id: i64, new_primary_id: i64) -> Result<Contact> {
        if contact_id == new_primary_id {
            return Err(violation(format!("demote would link contact {} to itself", contact_id)));
        }
        self.require_primary(new_primary_id, "demote").await?;

        let row = self.inner.demote(contact_id, new_primary_id).await?;
        if row.is_primary() || row.linked_id != Some(new_primary_id) {
            return Err(violation(format!("demote left contact {} unlinked", contact_id)));
        }
        Ok(row)
    }

    async fn relink_children(&self, old_primary_id: i64, new_primary_id: i64) -> Result<u64> {
        if old_primary_id == new_primary_id {
            return Ok(0);
        }
        self.require_primary(new_primary_id, "relink_children").await?;
        self.inner.relink_children(old_primary_id, new_primary_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryContactStore;

    #[tokio::test]
    async fn test_secondary_must_target_primary() {
        let store = CheckedStore::new(MemoryContactStore::new());
        let root = store.create(NewContact::primary(Some("a@x".into()), None)).await.unwrap();
        let child = store
            .create(NewContact::secondary(None, Some("1".into()), root.id))
            .await
            .unwrap();

        let result = store.create(NewContact::secondary(None, Some("2".into()), child.id)).await;
        assert!(matches!(result, Err(Error::Invariant(_))));
    }

    #[tokio::test]
    async fn test_secondary_to_missing_contact_is_not_found() {
        let store = CheckedStore::new(MemoryContactStore::new());
        let result = store.create(NewContact::secondary(None, Some("2".into()), 99)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_self_demotion_rejected() {
        let store = CheckedStore::new(MemoryContactStore::new());
        let root = store.create(NewContact::primary(Some("a@x".into()), None)).await.unwrap();

        let result = store.demote(root.id, root.id).await;
        assert!(matches!(result, Err(Error::Invariant(_))));
        assert!(store.inner().snapshot().unwrap()[0].is_primary());
    }

    #[tokio::test]
    async fn test_demote_into_secondary_rejected() {
        let store = CheckedStore::new(MemoryContactStore::new());
        let a = store.create(NewContact::primary(Some("a@x".into()), None)).await.unwrap();
        let b = store.create(NewContact::primary(Some("b@x".into()), None)).await.unwrap();
        let c = store.create(NewContact::primary(Some("c@x".into()), None)).await.unwrap();
        store.demote(b.id, a.id).await.unwrap();

        let result = store.demote(c.id, b.id).await;
        assert!(matches!(result, Err(Error::Invariant(_))));
    }
}
